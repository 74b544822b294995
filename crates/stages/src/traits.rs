//! The `StageTask` trait and the variable bag it operates on.

use async_trait::async_trait;
use serde_json::Value;

use crate::StageError;

/// Named variables held by one execution of a workflow instance.
pub type Variables = serde_json::Map<String, Value>;

/// The boolean decision variable read by conditional edges.
pub const RESULT_VARIABLE: &str = "result";

#[async_trait]
pub trait StageTask: Send + Sync {
    /// Run the stage against the current `variables` using the stage's own
    /// `config`, and return the variables to merge back into the execution.
    async fn execute(&self, config: &Value, variables: &Variables)
        -> Result<Variables, StageError>;
}
