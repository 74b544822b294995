//! `stages` crate — the `StageTask` trait and built-in stage logic.
//!
//! A stage task is the unit of work an engine runs while a stage is active.
//! Tasks read the execution's variables and return the variables they want
//! to write back; a task that routes the workflow writes the boolean
//! [`RESULT_VARIABLE`] that conditional edges are guarded on.

pub mod builtin;
pub mod error;
pub mod mock;
pub mod traits;

pub use error::StageError;
pub use traits::{StageTask, Variables, RESULT_VARIABLE};
