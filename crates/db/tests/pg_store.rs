//! Postgres adapter checks. They need a disposable database and are skipped
//! unless `DATABASE_URL` is set.

use db::pool::{create_pool, run_migrations};
use db::{DbError, NewStageState, PgStageStateStore, StageStateStore};
use serde_json::json;
use uuid::Uuid;

async fn store() -> Option<PgStageStateStore> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = create_pool(&url, 2).await.expect("connect");
    run_migrations(&pool).await.expect("migrate");
    Some(PgStageStateStore::new(pool))
}

fn open(instance_id: Uuid, stage: &str, start_time: i64) -> NewStageState {
    NewStageState {
        stage: stage.into(),
        execution_id: None,
        instance_id,
        definition_name: "glossary-approval".into(),
        start_time,
    }
}

#[tokio::test]
async fn equal_start_times_list_in_insertion_order() {
    let Some(store) = store().await else { return };
    let instance = Uuid::new_v4();

    let mut ids = Vec::new();
    for stage in ["review", "approve", "publish"] {
        ids.push(store.create(open(instance, stage, 1_700_000_000_000)).await.unwrap());
    }

    let listed: Vec<Uuid> = store
        .list_for_instance(instance)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(listed, ids);
}

#[tokio::test]
async fn finalize_distinguishes_missing_and_closed_records() {
    let Some(store) = store().await else { return };
    let instance = Uuid::new_v4();
    let id = store.create(open(instance, "review", 1)).await.unwrap();

    let snapshot = json!({ "approved": true }).as_object().cloned().unwrap();
    store.finalize(id, 2, snapshot.clone()).await.unwrap();
    assert!(matches!(
        store.finalize(id, 3, snapshot.clone()).await,
        Err(DbError::AlreadyFinalized(got)) if got == id
    ));

    let missing = Uuid::new_v4();
    assert!(matches!(
        store.finalize(missing, 3, snapshot.clone()).await,
        Err(DbError::NotFound(got)) if got == missing
    ));

    let record = store.get(id).await.unwrap();
    assert_eq!(record.end_time, Some(2));
    assert_eq!(record.variables, Some(snapshot));
    assert!(store.list_open(instance).await.unwrap().is_empty());
}
