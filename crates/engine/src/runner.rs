//! Local reference engine.
//!
//! `LocalProcessEngine` is a small in-process engine adapter that drives a
//! [`ProcessGraph`] through the listener port:
//! 1. Fires a process-level entered signal (no current activity).
//! 2. Starting at the entry stage, fires entered, runs the stage's
//!    `StageTask`, merges its output into the variables, fires exited.
//! 3. Follows the first eligible outgoing edge; a stage without outgoing
//!    edges ends the run.
//! 4. Fires the process-level exited signal.
//!
//! `StageError::Retryable` is retried (up to `max_retries`) with exponential
//! back-off; `StageError::Fatal` aborts the run and leaves the stage's record
//! open. Listener failures never reach this loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use stages::builtin::builtin_tasks;
use stages::{StageError, StageTask, Variables};

use crate::context::{
    ExecutionContext, LocalExecution, EXECUTION_ID_VARIABLE, STAGE_STATE_ID_VARIABLE,
};
use crate::graph::ProcessGraph;
use crate::listener::StageListener;
use crate::models::StageDefinition;
use crate::EngineError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the local engine.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Maximum number of times a retryable stage failure will be retried.
    pub max_retries: u32,
    /// Base delay for exponential back-off between retries.
    pub retry_base_delay: Duration,
    /// Upper bound on edges followed in one run; stops runaway loops.
    pub max_transitions: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_base_delay: Duration::from_millis(100),
            max_transitions: 1_000,
        }
    }
}

// ---------------------------------------------------------------------------
// Task registry
// ---------------------------------------------------------------------------

/// Maps stage `task` names to `StageTask` implementations.
pub type StageRegistry = HashMap<String, Arc<dyn StageTask>>;

/// A registry holding every built-in task.
pub fn default_registry() -> StageRegistry {
    builtin_tasks()
        .into_iter()
        .map(|(name, task)| (name.to_owned(), task))
        .collect()
}

// ---------------------------------------------------------------------------
// Output of a completed run
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct RunOutcome {
    pub instance_id: Uuid,
    pub execution_id: Uuid,
    /// Stages in the order they were exited.
    pub visited: Vec<String>,
    /// Variables of the execution when the run ended.
    pub variables: Variables,
}

// ---------------------------------------------------------------------------
// LocalProcessEngine
// ---------------------------------------------------------------------------

pub struct LocalProcessEngine {
    listener: Arc<dyn StageListener>,
    registry: StageRegistry,
    config: RunnerConfig,
}

impl LocalProcessEngine {
    pub fn new(
        listener: Arc<dyn StageListener>,
        registry: StageRegistry,
        config: RunnerConfig,
    ) -> Self {
        Self { listener, registry, config }
    }

    /// Run one instance of `graph` from its entry stage.
    ///
    /// # Errors
    /// Returns `EngineError` for unregistered tasks, fatal stage errors,
    /// retry exhaustion, dead ends, or runaway loops. Listener failures are
    /// never reported here.
    #[instrument(skip(self, graph, initial), fields(definition = %graph.name()))]
    pub async fn run(
        &self,
        graph: &ProcessGraph,
        instance_id: Uuid,
        initial: Variables,
    ) -> Result<RunOutcome, EngineError> {
        let execution_id = Uuid::new_v4();
        let mut ctx = LocalExecution::new(graph.definition_id(), Some(instance_id.to_string()))
            .with_variables(initial);
        ctx.set_variable(EXECUTION_ID_VARIABLE, Value::String(execution_id.to_string()));

        self.listener.on_stage_entered(&mut ctx).await;
        // Stage records reuse the same variable; keep the process-level id
        // aside so the final exited signal closes the right record.
        let process_state_id =
            ctx.remove_variable(STAGE_STATE_ID_VARIABLE).filter(|id| !id.is_null());

        let mut current = graph.entry_stage();
        let mut visited = Vec::new();
        let mut transitions = 0usize;

        loop {
            ctx.set_activity(Some(&current.name));
            self.listener.on_stage_entered(&mut ctx).await;

            let output = self.execute_with_retry(current, ctx.vars()).await.map_err(|e| {
                error!("stage '{}' failed: {}", current.name, e);
                e
            })?;
            ctx.merge(output);

            self.listener.on_stage_exited(&mut ctx).await;
            visited.push(current.name.clone());
            info!("stage '{}' completed", current.name);

            if graph.outgoing(&current.name).next().is_none() {
                break;
            }

            let next = graph
                .eligible_edges(&current.name, ctx.vars())
                .first()
                .map(|edge| edge.to().to_owned())
                .ok_or_else(|| EngineError::NoEligibleTransition(current.name.clone()))?;

            transitions += 1;
            if transitions > self.config.max_transitions {
                return Err(EngineError::TransitionLimitExceeded(self.config.max_transitions));
            }

            // `build` guarantees every edge target is a declared stage.
            current = graph
                .stage(&next)
                .ok_or(EngineError::UnknownStageReference { stage: next, side: "to" })?;
        }

        ctx.set_activity(None);
        ctx.remove_variable(STAGE_STATE_ID_VARIABLE);
        if let Some(id) = process_state_id {
            ctx.set_variable(STAGE_STATE_ID_VARIABLE, id);
        }
        self.listener.on_stage_exited(&mut ctx).await;

        info!(
            "workflow '{}' instance {} completed after {} stages",
            graph.name(),
            instance_id,
            visited.len()
        );

        Ok(RunOutcome {
            instance_id,
            execution_id,
            visited,
            variables: ctx.variables(),
        })
    }

    // -----------------------------------------------------------------------
    // Internal: execute a single stage with retry logic.
    // -----------------------------------------------------------------------

    async fn execute_with_retry(
        &self,
        stage: &StageDefinition,
        variables: &Variables,
    ) -> Result<Variables, EngineError> {
        let task = self.registry.get(&stage.task).ok_or_else(|| EngineError::UnregisteredTask {
            stage: stage.name.clone(),
            task: stage.task.clone(),
        })?;

        let mut attempts = 0u32;

        loop {
            match task.execute(&stage.config, variables).await {
                Ok(output) => return Ok(output),

                Err(StageError::Fatal(msg)) => {
                    return Err(EngineError::StageFatal {
                        stage: stage.name.clone(),
                        message: msg,
                    });
                }

                Err(StageError::Retryable(msg)) => {
                    attempts += 1;
                    if attempts > self.config.max_retries {
                        return Err(EngineError::StageRetryExhausted {
                            stage: stage.name.clone(),
                            message: msg,
                        });
                    }

                    let delay = backoff_delay(self.config.retry_base_delay, attempts);

                    warn!(
                        "stage '{}' retryable error (attempt {}/{}), retrying in {:?}: {}",
                        stage.name, attempts, self.config.max_retries, delay, msg
                    );

                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Longest pause between two retries of one stage.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// `base * 2^(attempt - 1)`, capped at [`MAX_BACKOFF`].
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    2u32.checked_pow(attempt.saturating_sub(1))
        .and_then(|factor| base.checked_mul(factor))
        .map_or(MAX_BACKOFF, |delay| delay.min(MAX_BACKOFF))
}
