//! In-memory `StageStateStore`.
//!
//! Backs tests and the CLI's `simulate` command. Records are kept in
//! insertion order so stages opened within the same millisecond still list
//! in the order they were entered. A single mutex guards the list; it is
//! never held across an `.await`.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::{DbError, NewStageState, StageInstanceState, StageStateStore, VariableSnapshot};

#[derive(Debug, Default)]
pub struct InMemoryStageStateStore {
    records: Mutex<Vec<StageInstanceState>>,
}

impl InMemoryStageStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of records held.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every record, oldest start first.
    pub fn all(&self) -> Vec<StageInstanceState> {
        let mut records = self.lock().clone();
        records.sort_by_key(|r| r.start_time);
        records
    }

    fn lock(&self) -> MutexGuard<'_, Vec<StageInstanceState>> {
        // A panic while holding the lock cannot leave a record half-written.
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl StageStateStore for InMemoryStageStateStore {
    async fn create(&self, state: NewStageState) -> Result<Uuid, DbError> {
        let id = Uuid::new_v4();
        debug!(%id, stage = %state.stage, "opening stage record");
        self.lock().push(state.into_record(id));
        Ok(id)
    }

    async fn finalize(
        &self,
        id: Uuid,
        end_time: i64,
        variables: VariableSnapshot,
    ) -> Result<(), DbError> {
        let mut records = self.lock();
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(DbError::NotFound(id))?;
        if !record.is_open() {
            return Err(DbError::AlreadyFinalized(id));
        }
        record.end_time = Some(end_time);
        record.variables = Some(variables);
        debug!(%id, stage = %record.stage, "closed stage record");
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<StageInstanceState, DbError> {
        self.lock()
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or(DbError::NotFound(id))
    }

    async fn list_for_instance(
        &self,
        instance_id: Uuid,
    ) -> Result<Vec<StageInstanceState>, DbError> {
        let mut records: Vec<_> = self
            .lock()
            .iter()
            .filter(|r| r.instance_id == instance_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.start_time);
        Ok(records)
    }
}
