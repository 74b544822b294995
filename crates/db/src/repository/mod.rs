//! Postgres adapter for [`StageStateStore`].
//!
//! The SQL lives in [`stage_states`], one function per statement, each
//! taking a `&DbPool`. [`PgStageStateStore`] only adapts those functions to
//! the trait.

pub mod stage_states;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{DbError, DbPool, NewStageState, StageInstanceState, StageStateStore, VariableSnapshot};

#[derive(Debug, Clone)]
pub struct PgStageStateStore {
    pool: DbPool,
}

impl PgStageStateStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StageStateStore for PgStageStateStore {
    async fn create(&self, state: NewStageState) -> Result<Uuid, DbError> {
        stage_states::insert_stage_state(&self.pool, &state).await
    }

    async fn finalize(
        &self,
        id: Uuid,
        end_time: i64,
        variables: VariableSnapshot,
    ) -> Result<(), DbError> {
        stage_states::finalize_stage_state(&self.pool, id, end_time, variables).await
    }

    async fn get(&self, id: Uuid) -> Result<StageInstanceState, DbError> {
        stage_states::get_stage_state(&self.pool, id).await
    }

    async fn list_for_instance(
        &self,
        instance_id: Uuid,
    ) -> Result<Vec<StageInstanceState>, DbError> {
        stage_states::list_stage_states(&self.pool, instance_id, false).await
    }

    async fn list_open(&self, instance_id: Uuid) -> Result<Vec<StageInstanceState>, DbError> {
        stage_states::list_stage_states(&self.pool, instance_id, true).await
    }
}
