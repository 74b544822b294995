//! `engine` crate — workflow graphs, the stage listener port, and the stage
//! instance tracker.
//!
//! - [`graph`] turns declared transitions into guarded edges and rejects
//!   malformed definitions before they can run.
//! - [`context`] and [`listener`] are the narrow port a process engine
//!   implements and calls into.
//! - [`tracker`] records, per stage visit, when it started and ended and
//!   which variables it left behind.
//! - [`runner`] is a local engine adapter driving all of the above.

pub mod context;
pub mod error;
pub mod graph;
pub mod listener;
pub mod models;
pub mod runner;
pub mod tracker;

pub use context::{
    definition_key_from_id, ExecutionContext, LocalExecution, EXECUTION_ID_VARIABLE,
    STAGE_STATE_ID_VARIABLE,
};
pub use error::{EngineError, TrackingError};
pub use graph::{Edge, Guard, ProcessGraph};
pub use listener::{StageListener, StageSignal};
pub use models::{EdgeDefinition, StageDefinition, WorkflowDefinition};
pub use runner::{default_registry, LocalProcessEngine, RunOutcome, RunnerConfig, StageRegistry};
pub use stages::RESULT_VARIABLE;
pub use tracker::StageInstanceTracker;

#[cfg(test)]
mod scenario_tests;
