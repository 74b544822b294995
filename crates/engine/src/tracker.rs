//! The stage instance tracker.
//!
//! On a stage-entered signal the tracker opens a [`StageInstanceState`]
//! record and stashes its id in the execution's variables under
//! [`STAGE_STATE_ID_VARIABLE`]. On the matching stage-exited signal it reads
//! the id back and finalizes that record with the exit time and a snapshot
//! of every variable visible at that moment.
//!
//! The tracker holds no mutable state of its own; all writes go through the
//! shared [`StageStateStore`], scoped by record id, so handlers may run
//! concurrently on any engine thread. Ordering between entry and exit of one
//! stage is the engine's guarantee.
//!
//! Failures are logged with the workflow definition name and dropped. A
//! broken store costs an audit-trail gap (a missing or never-closed record),
//! never the governed run.
//!
//! [`StageInstanceState`]: db::StageInstanceState

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, error, instrument};
use uuid::Uuid;

use db::{NewStageState, StageStateStore};

use crate::context::{ExecutionContext, EXECUTION_ID_VARIABLE, STAGE_STATE_ID_VARIABLE};
use crate::listener::StageListener;
use crate::TrackingError;

#[derive(Clone)]
pub struct StageInstanceTracker {
    store: Arc<dyn StageStateStore>,
}

impl StageInstanceTracker {
    pub fn new(store: Arc<dyn StageStateStore>) -> Self {
        Self { store }
    }

    /// Open a record for the stage `ctx` just entered and stash its id.
    ///
    /// The stage is the current activity, or the definition name for
    /// process-level signals. Any id left over from an earlier stage is
    /// cleared first, so a failed entry leaves no id for the exit to close.
    #[instrument(skip_all, fields(definition = %ctx.definition_name()))]
    pub async fn open_stage(&self, ctx: &mut dyn ExecutionContext) -> Result<Uuid, TrackingError> {
        ctx.set_variable(STAGE_STATE_ID_VARIABLE, Value::Null);

        let definition_name = ctx.definition_name().to_owned();
        let instance_id = instance_id(ctx)?;
        let execution_id = uuid_variable(ctx, EXECUTION_ID_VARIABLE)?;
        let stage = ctx
            .current_activity()
            .unwrap_or(&definition_name)
            .to_owned();

        let id = self
            .store
            .create(NewStageState {
                stage: stage.clone(),
                execution_id,
                instance_id,
                definition_name,
                start_time: now_millis(),
            })
            .await?;

        ctx.set_variable(STAGE_STATE_ID_VARIABLE, Value::String(id.to_string()));
        debug!(%id, %stage, %instance_id, "stage entered");
        Ok(id)
    }

    /// Finalize the record whose id was stashed by [`Self::open_stage`].
    ///
    /// The id is consumed whether or not the store accepts the write.
    #[instrument(skip_all, fields(definition = %ctx.definition_name()))]
    pub async fn close_stage(&self, ctx: &mut dyn ExecutionContext) -> Result<Uuid, TrackingError> {
        let id = uuid_variable(ctx, STAGE_STATE_ID_VARIABLE)?
            .ok_or(TrackingError::MissingCorrelationId(STAGE_STATE_ID_VARIABLE))?;
        let variables = ctx.variables();

        let finalized = self.store.finalize(id, now_millis(), variables).await;
        ctx.set_variable(STAGE_STATE_ID_VARIABLE, Value::Null);
        finalized?;

        debug!(%id, "stage exited");
        Ok(id)
    }
}

#[async_trait]
impl StageListener for StageInstanceTracker {
    async fn on_stage_entered(&self, ctx: &mut dyn ExecutionContext) {
        if let Err(err) = self.open_stage(ctx).await {
            error!(
                definition = %ctx.definition_name(),
                error = %err,
                cause = ?err,
                "failed to record stage entry"
            );
        }
    }

    async fn on_stage_exited(&self, ctx: &mut dyn ExecutionContext) {
        if let Err(err) = self.close_stage(ctx).await {
            error!(
                definition = %ctx.definition_name(),
                error = %err,
                cause = ?err,
                "failed to record stage exit"
            );
        }
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn instance_id(ctx: &dyn ExecutionContext) -> Result<Uuid, TrackingError> {
    let key = ctx.business_key().ok_or(TrackingError::MissingBusinessKey)?;
    Uuid::parse_str(key).map_err(|source| TrackingError::InvalidBusinessKey {
        key: key.to_owned(),
        source,
    })
}

/// Read an id variable. Unset or `null` is `None`; anything other than a
/// UUID string is malformed.
fn uuid_variable(
    ctx: &dyn ExecutionContext,
    name: &'static str,
) -> Result<Option<Uuid>, TrackingError> {
    match ctx.variable(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => match Uuid::parse_str(&s) {
            Ok(id) => Ok(Some(id)),
            Err(_) => Err(TrackingError::InvalidVariable {
                name,
                value: Value::String(s),
            }),
        },
        Some(value) => Err(TrackingError::InvalidVariable { name, value }),
    }
}
