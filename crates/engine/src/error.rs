//! Engine-level error types.

use thiserror::Error;

/// Errors surfaced to whoever builds or runs a workflow graph.
///
/// Graph-build variants reject a definition before it can be scheduled; the
/// run-time variants come from the local reference engine only.
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Graph-build errors ------

    #[error("workflow definition has no name")]
    EmptyDefinitionName,

    /// The name would not survive the `name:version:suffix` definition id.
    #[error("workflow definition name '{0}' must not contain ':'")]
    InvalidDefinitionName(String),

    #[error("workflow '{0}' declares no stages")]
    NoStages(String),

    #[error("stage name must not be empty")]
    EmptyStageName,

    /// Two or more stages share the same name.
    #[error("duplicate stage name: '{0}'")]
    DuplicateStage(String),

    /// A transition declaration left `from` or `to` blank.
    #[error("transition is missing its '{side}' stage")]
    MissingEndpoint { side: &'static str },

    /// A transition references a stage that is not declared.
    #[error("transition references unknown stage '{stage}' ({side} side)")]
    UnknownStageReference { stage: String, side: &'static str },

    /// A stage has a conditional edge for one outcome but not the other.
    #[error("stage '{stage}' has no outgoing edge for result = {missing}")]
    IncompleteDecision { stage: String, missing: bool },

    /// A stage has more than one edge guarded on the same outcome.
    #[error("stage '{stage}' has more than one outgoing edge for result = {condition}")]
    DuplicateGuard { stage: String, condition: bool },

    /// A stage mixes conditional and unconditional outgoing edges.
    #[error("stage '{stage}' mixes conditional and unconditional outgoing edges")]
    MixedGuards { stage: String },

    // ------ Run-time errors (local engine) ------

    #[error("stage '{stage}' uses task '{task}' which is not registered")]
    UnregisteredTask { stage: String, task: String },

    /// A stage failed with a fatal error; the whole run is aborted.
    #[error("stage '{stage}' failed fatally: {message}")]
    StageFatal { stage: String, message: String },

    /// A stage's retryable error was exhausted.
    #[error("stage '{stage}' exceeded retry limit: {message}")]
    StageRetryExhausted { stage: String, message: String },

    /// The stage has outgoing edges but none of their guards hold.
    #[error("no outgoing edge of stage '{0}' is eligible")]
    NoEligibleTransition(String),

    #[error("run exceeded {0} transitions")]
    TransitionLimitExceeded(usize),
}

/// Reasons a tracker handler could not record a stage boundary.
///
/// These never reach the process engine; the tracker logs and drops them.
#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("execution has no business key")]
    MissingBusinessKey,

    #[error("business key '{key}' is not a valid instance id: {source}")]
    InvalidBusinessKey {
        key: String,
        #[source]
        source: uuid::Error,
    },

    #[error("variable '{name}' does not hold an id: {value}")]
    InvalidVariable {
        name: &'static str,
        value: serde_json::Value,
    },

    /// The stage record id was never stashed (or was lost) on this execution.
    #[error("no stage record id found in variable '{0}'")]
    MissingCorrelationId(&'static str),

    #[error("stage state store error: {0}")]
    Store(#[from] db::DbError),
}
