//! The execution-context port.
//!
//! A process engine hands the tracker one [`ExecutionContext`] per signal.
//! The context exposes who is running (definition, instance, activity) and
//! the execution's variable bag, which is also the hand-off channel between
//! a stage's entered and exited signals.

use serde_json::Value;

use stages::Variables;

/// Optional variable holding the execution identifier (UUID string).
pub const EXECUTION_ID_VARIABLE: &str = "workflowInstanceExecutionId";

/// Variable the tracker stashes the open stage record id in (UUID string).
pub const STAGE_STATE_ID_VARIABLE: &str = "stageInstanceStateId";

/// Derive the definition name from an engine definition id of the form
/// `key:version:unique`. Ids without a `:` are returned whole.
pub fn definition_key_from_id(process_definition_id: &str) -> &str {
    process_definition_id
        .split_once(':')
        .map_or(process_definition_id, |(key, _)| key)
}

/// What an engine adapter must expose for one execution.
pub trait ExecutionContext: Send {
    /// Opaque engine id of the running definition.
    fn process_definition_id(&self) -> &str;

    /// Business key of the workflow instance.
    fn business_key(&self) -> Option<&str>;

    /// Stage currently active, or `None` for process-level signals.
    fn current_activity(&self) -> Option<&str>;

    fn variable(&self, name: &str) -> Option<Value>;

    fn set_variable(&mut self, name: &str, value: Value);

    /// Snapshot of every variable visible to this execution.
    fn variables(&self) -> Variables;

    fn definition_name(&self) -> &str {
        definition_key_from_id(self.process_definition_id())
    }
}

// ---------------------------------------------------------------------------
// LocalExecution
// ---------------------------------------------------------------------------

/// In-process [`ExecutionContext`] used by the local engine and in tests.
#[derive(Debug, Clone, Default)]
pub struct LocalExecution {
    process_definition_id: String,
    business_key: Option<String>,
    current_activity: Option<String>,
    variables: Variables,
}

impl LocalExecution {
    pub fn new(process_definition_id: impl Into<String>, business_key: Option<String>) -> Self {
        Self {
            process_definition_id: process_definition_id.into(),
            business_key,
            ..Self::default()
        }
    }

    pub fn with_variables(mut self, variables: Variables) -> Self {
        self.variables = variables;
        self
    }

    pub fn set_activity(&mut self, activity: Option<&str>) {
        self.current_activity = activity.map(str::to_owned);
    }

    /// Borrow the variables without copying them.
    pub fn vars(&self) -> &Variables {
        &self.variables
    }

    pub fn merge(&mut self, variables: Variables) {
        self.variables.extend(variables);
    }

    pub fn remove_variable(&mut self, name: &str) -> Option<Value> {
        self.variables.remove(name)
    }
}

impl ExecutionContext for LocalExecution {
    fn process_definition_id(&self) -> &str {
        &self.process_definition_id
    }

    fn business_key(&self) -> Option<&str> {
        self.business_key.as_deref()
    }

    fn current_activity(&self) -> Option<&str> {
        self.current_activity.as_deref()
    }

    fn variable(&self, name: &str) -> Option<Value> {
        self.variables.get(name).cloned()
    }

    fn set_variable(&mut self, name: &str, value: Value) {
        self.variables.insert(name.to_owned(), value);
    }

    fn variables(&self) -> Variables {
        self.variables.clone()
    }
}
