//! Stage-boundary signals and the listener port an engine calls into.

use async_trait::async_trait;
use tracing::debug;

use crate::context::ExecutionContext;

/// Lifecycle signal reported by the engine for a stage or the whole process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageSignal {
    Entered,
    Exited,
    /// Any other engine event; carries the engine's event name.
    Other(String),
}

impl StageSignal {
    /// Map an engine event name (`"start"`, `"end"`, …) to a signal.
    pub fn from_event_name(event: &str) -> Self {
        match event {
            "start" => Self::Entered,
            "end" => Self::Exited,
            other => Self::Other(other.to_owned()),
        }
    }
}

/// Receives stage-boundary signals from a process engine.
///
/// Methods return nothing: a listener must never hand a failure back to the
/// engine, whose run would otherwise be aborted.
#[async_trait]
pub trait StageListener: Send + Sync {
    async fn on_stage_entered(&self, ctx: &mut dyn ExecutionContext);

    async fn on_stage_exited(&self, ctx: &mut dyn ExecutionContext);

    /// Called for signals that are not stage boundaries.
    async fn on_unsupported(&self, event: &str, ctx: &mut dyn ExecutionContext) {
        debug!(
            definition = %ctx.definition_name(),
            event,
            "stage listener does not handle this event"
        );
    }

    /// Dispatch a signal to the matching handler.
    async fn notify(&self, signal: &StageSignal, ctx: &mut dyn ExecutionContext) {
        match signal {
            StageSignal::Entered => self.on_stage_entered(ctx).await,
            StageSignal::Exited => self.on_stage_exited(ctx).await,
            StageSignal::Other(event) => self.on_unsupported(event, ctx).await,
        }
    }
}
