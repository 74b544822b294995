//! Built-in stage tasks, registered under the names in [`BUILTIN_TASKS`].
//!
//! - `noop`          — does nothing; for stages that only mark progress.
//! - `set_variables` — writes the stage's config object into the execution.
//! - `decision`      — compares one variable against an expected value and
//!   writes the outcome to [`RESULT_VARIABLE`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::{StageError, StageTask, Variables, RESULT_VARIABLE};

pub const NOOP: &str = "noop";
pub const SET_VARIABLES: &str = "set_variables";
pub const DECISION: &str = "decision";

pub const BUILTIN_TASKS: [&str; 3] = [NOOP, SET_VARIABLES, DECISION];

/// Every built-in task paired with its registration name.
pub fn builtin_tasks() -> Vec<(&'static str, Arc<dyn StageTask>)> {
    vec![
        (NOOP, Arc::new(Noop) as Arc<dyn StageTask>),
        (SET_VARIABLES, Arc::new(SetVariables) as Arc<dyn StageTask>),
        (DECISION, Arc::new(Decision) as Arc<dyn StageTask>),
    ]
}

pub struct Noop;

#[async_trait]
impl StageTask for Noop {
    async fn execute(&self, _config: &Value, _variables: &Variables) -> Result<Variables, StageError> {
        Ok(Variables::new())
    }
}

pub struct SetVariables;

#[async_trait]
impl StageTask for SetVariables {
    async fn execute(&self, config: &Value, _variables: &Variables) -> Result<Variables, StageError> {
        match config {
            Value::Object(values) => Ok(values.clone()),
            Value::Null => Ok(Variables::new()),
            other => Err(StageError::Fatal(format!(
                "set_variables expects an object config, got {other}"
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DecisionConfig {
    variable: String,
    #[serde(default = "expect_true")]
    equals: Value,
}

fn expect_true() -> Value {
    Value::Bool(true)
}

/// Writes `result = variables[variable] == equals`.
///
/// An unset variable never equals anything, so it routes down the `false`
/// edge.
pub struct Decision;

#[async_trait]
impl StageTask for Decision {
    async fn execute(&self, config: &Value, variables: &Variables) -> Result<Variables, StageError> {
        let config: DecisionConfig = serde_json::from_value(config.clone())
            .map_err(|e| StageError::Fatal(format!("invalid decision config: {e}")))?;

        let outcome = variables.get(&config.variable) == Some(&config.equals);
        debug!(variable = %config.variable, outcome, "decision evaluated");

        let mut out = Variables::new();
        out.insert(RESULT_VARIABLE.to_owned(), Value::Bool(outcome));
        Ok(out)
    }
}
