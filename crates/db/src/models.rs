//! Stage-instance records.
//!
//! [`StageInstanceState`] is the domain record handed out by every store
//! adapter. [`StageStateRow`] maps 1-to-1 onto the `stage_instance_states`
//! table and is only used by the Postgres adapter.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::DbError;

/// Captured variables of an execution, keyed by variable name.
pub type VariableSnapshot = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Domain record
// ---------------------------------------------------------------------------

/// One visit of one stage by one execution of a workflow instance.
///
/// Created open (no `end_time`) when the stage is entered and finalized once
/// when it is exited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageInstanceState {
    pub id: Uuid,
    pub stage: String,
    pub execution_id: Option<Uuid>,
    pub instance_id: Uuid,
    pub definition_name: String,
    /// Epoch milliseconds.
    pub start_time: i64,
    /// Epoch milliseconds; `None` while the stage is still running.
    pub end_time: Option<i64>,
    /// Variables visible on the execution when the stage was exited.
    pub variables: Option<VariableSnapshot>,
}

impl StageInstanceState {
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }
}

/// Everything needed to open a new stage record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStageState {
    pub stage: String,
    pub execution_id: Option<Uuid>,
    pub instance_id: Uuid,
    pub definition_name: String,
    pub start_time: i64,
}

impl NewStageState {
    /// Materialise the record under a freshly generated identifier.
    pub fn into_record(self, id: Uuid) -> StageInstanceState {
        StageInstanceState {
            id,
            stage: self.stage,
            execution_id: self.execution_id,
            instance_id: self.instance_id,
            definition_name: self.definition_name,
            start_time: self.start_time,
            end_time: None,
            variables: None,
        }
    }
}

// ---------------------------------------------------------------------------
// stage_instance_states
// ---------------------------------------------------------------------------

/// A persisted stage state row.
#[derive(Debug, Clone, FromRow)]
pub struct StageStateRow {
    pub id: Uuid,
    pub stage: String,
    pub execution_id: Option<Uuid>,
    pub instance_id: Uuid,
    pub definition_name: String,
    pub start_time: i64,
    pub end_time: Option<i64>,
    /// JSONB object; `NULL` until finalized.
    pub variables: Option<serde_json::Value>,
}

impl TryFrom<StageStateRow> for StageInstanceState {
    type Error = DbError;

    fn try_from(row: StageStateRow) -> Result<Self, Self::Error> {
        let variables = row
            .variables
            .map(serde_json::from_value::<VariableSnapshot>)
            .transpose()?;

        Ok(Self {
            id: row.id,
            stage: row.stage,
            execution_id: row.execution_id,
            instance_id: row.instance_id,
            definition_name: row.definition_name,
            start_time: row.start_time,
            end_time: row.end_time,
            variables,
        })
    }
}
