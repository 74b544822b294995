//! `stage_instance_states` statements.

use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    models::{StageStateRow, VariableSnapshot},
    DbError, NewStageState, StageInstanceState,
};

const COLUMNS: &str =
    "id, stage, execution_id, instance_id, definition_name, start_time, end_time, variables";

/// Insert an open stage record and return its generated id.
pub async fn insert_stage_state(pool: &PgPool, state: &NewStageState) -> Result<Uuid, DbError> {
    let id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO stage_instance_states
            (id, stage, execution_id, instance_id, definition_name, start_time)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(id)
    .bind(state.stage.as_str())
    .bind(state.execution_id)
    .bind(state.instance_id)
    .bind(state.definition_name.as_str())
    .bind(state.start_time)
    .execute(pool)
    .await?;

    Ok(id)
}

/// Set `end_time` and `variables` on a still-open record.
///
/// Only open rows are updated; when nothing matched, a follow-up lookup tells
/// `NotFound` apart from `AlreadyFinalized`.
pub async fn finalize_stage_state(
    pool: &PgPool,
    id: Uuid,
    end_time: i64,
    variables: VariableSnapshot,
) -> Result<(), DbError> {
    let result = sqlx::query(
        r#"
        UPDATE stage_instance_states
        SET end_time = $1, variables = $2
        WHERE id = $3 AND end_time IS NULL
        "#,
    )
    .bind(end_time)
    .bind(serde_json::Value::Object(variables))
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM stage_instance_states WHERE id = $1)",
        )
        .bind(id)
        .fetch_one(pool)
        .await?;
        return Err(unmatched_finalize(id, exists));
    }

    Ok(())
}

/// The error for a finalize that updated no row.
fn unmatched_finalize(id: Uuid, exists: bool) -> DbError {
    if exists {
        DbError::AlreadyFinalized(id)
    } else {
        DbError::NotFound(id)
    }
}

/// Fetch a single record by primary key.
pub async fn get_stage_state(pool: &PgPool, id: Uuid) -> Result<StageInstanceState, DbError> {
    let row = sqlx::query_as::<_, StageStateRow>(&format!(
        "SELECT {COLUMNS} FROM stage_instance_states WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound(id))?;

    row.try_into()
}

/// All records of an instance ordered by start time (insertion order on
/// ties), optionally only the ones that are still open.
pub async fn list_stage_states(
    pool: &PgPool,
    instance_id: Uuid,
    open_only: bool,
) -> Result<Vec<StageInstanceState>, DbError> {
    let rows = sqlx::query_as::<_, StageStateRow>(&list_query(open_only))
        .bind(instance_id)
        .fetch_all(pool)
        .await?;

    rows.into_iter().map(StageInstanceState::try_from).collect()
}

fn list_query(open_only: bool) -> String {
    let filter = if open_only { " AND end_time IS NULL" } else { "" };
    format!(
        "SELECT {COLUMNS} FROM stage_instance_states \
         WHERE instance_id = $1{filter} ORDER BY start_time ASC, seq ASC"
    )
}
