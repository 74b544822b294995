//! `MockStage` — a test double for `StageTask`.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex};

use crate::{StageError, StageTask, Variables};

/// Behaviour injected into `MockStage` at construction time.
pub enum MockBehaviour {
    /// Return these variables.
    ReturnVariables(Variables),
    /// Fail with a `Retryable` error.
    FailRetryable(String),
    /// Fail with a `Fatal` error.
    FailFatal(String),
    /// Fail with `Retryable` for the first `failures` calls, then return the
    /// variables.
    Flaky { failures: usize, then: Variables },
}

/// A mock stage that records the variables of every call it receives.
pub struct MockStage {
    pub name: String,
    pub behaviour: MockBehaviour,
    /// Variables seen by this stage (in call order).
    pub calls: Arc<Mutex<Vec<Variables>>>,
}

impl MockStage {
    fn with(name: impl Into<String>, behaviour: MockBehaviour) -> Self {
        Self {
            name: name.into(),
            behaviour,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Always succeeds with the given variables. `value` must be a JSON
    /// object; anything else writes nothing.
    pub fn returning(name: impl Into<String>, value: Value) -> Self {
        let vars = value.as_object().cloned().unwrap_or_default();
        Self::with(name, MockBehaviour::ReturnVariables(vars))
    }

    pub fn failing_fatal(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with(name, MockBehaviour::FailFatal(msg.into()))
    }

    pub fn failing_retryable(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with(name, MockBehaviour::FailRetryable(msg.into()))
    }

    /// Fails `failures` times with a retryable error before succeeding.
    pub fn flaky(name: impl Into<String>, failures: usize, value: Value) -> Self {
        let then = value.as_object().cloned().unwrap_or_default();
        Self::with(name, MockBehaviour::Flaky { failures, then })
    }

    /// Number of times this stage has been executed.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl StageTask for MockStage {
    async fn execute(&self, _config: &Value, variables: &Variables) -> Result<Variables, StageError> {
        let attempt = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(variables.clone());
            calls.len()
        };

        match &self.behaviour {
            MockBehaviour::ReturnVariables(v) => Ok(v.clone()),
            MockBehaviour::FailRetryable(msg) => Err(StageError::Retryable(msg.clone())),
            MockBehaviour::FailFatal(msg) => Err(StageError::Fatal(msg.clone())),
            MockBehaviour::Flaky { failures, then } => {
                if attempt <= *failures {
                    Err(StageError::Retryable(format!("{} attempt {attempt} failed", self.name)))
                } else {
                    Ok(then.clone())
                }
            }
        }
    }
}
