//! The `StageStateStore` trait — the contract every store adapter fulfils.

use async_trait::async_trait;
use uuid::Uuid;

use crate::{DbError, NewStageState, StageInstanceState, VariableSnapshot};

/// Durable storage for stage-instance records.
///
/// Every write is scoped by a record identifier, so implementations only need
/// per-record consistency: a `create` followed later by `finalize` on the
/// returned id must be safe while unrelated instances write concurrently.
#[async_trait]
pub trait StageStateStore: Send + Sync {
    /// Open a new record and return its generated identifier.
    async fn create(&self, state: NewStageState) -> Result<Uuid, DbError>;

    /// Close the record with an end timestamp and the captured variables.
    ///
    /// # Errors
    /// - [`DbError::NotFound`] if no record has this id.
    /// - [`DbError::AlreadyFinalized`] if the record was closed before.
    async fn finalize(
        &self,
        id: Uuid,
        end_time: i64,
        variables: VariableSnapshot,
    ) -> Result<(), DbError>;

    /// Fetch one record.
    async fn get(&self, id: Uuid) -> Result<StageInstanceState, DbError>;

    /// Every record of a workflow instance, oldest start first.
    async fn list_for_instance(&self, instance_id: Uuid)
        -> Result<Vec<StageInstanceState>, DbError>;

    /// Records of a workflow instance that were never finalized.
    async fn list_open(&self, instance_id: Uuid) -> Result<Vec<StageInstanceState>, DbError> {
        let records = self.list_for_instance(instance_id).await?;
        Ok(records.into_iter().filter(StageInstanceState::is_open).collect())
    }
}
