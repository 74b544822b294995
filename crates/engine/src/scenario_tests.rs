//! End-to-end tests: the tracker wired to the in-memory store, driven either
//! directly through the listener port or by `LocalProcessEngine`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use db::{
    DbError, InMemoryStageStateStore, NewStageState, StageInstanceState, StageStateStore,
    VariableSnapshot,
};
use stages::mock::MockStage;
use stages::{StageTask, Variables};

use crate::{
    EdgeDefinition, EngineError, ExecutionContext, LocalExecution, LocalProcessEngine,
    ProcessGraph, RunnerConfig, StageDefinition, StageInstanceTracker, StageListener,
    StageRegistry, StageSignal, WorkflowDefinition, EXECUTION_ID_VARIABLE,
    STAGE_STATE_ID_VARIABLE,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

struct FailingStore;

#[async_trait]
impl StageStateStore for FailingStore {
    async fn create(&self, _: NewStageState) -> Result<Uuid, DbError> {
        Err(DbError::Unavailable("store offline".into()))
    }

    async fn finalize(&self, _: Uuid, _: i64, _: VariableSnapshot) -> Result<(), DbError> {
        Err(DbError::Unavailable("store offline".into()))
    }

    async fn get(&self, id: Uuid) -> Result<StageInstanceState, DbError> {
        Err(DbError::NotFound(id))
    }

    async fn list_for_instance(&self, _: Uuid) -> Result<Vec<StageInstanceState>, DbError> {
        Err(DbError::Unavailable("store offline".into()))
    }
}

fn vars(value: Value) -> Variables {
    value.as_object().cloned().expect("object literal")
}

/// review --true--> approve, review --false--> reject
fn review_workflow() -> WorkflowDefinition {
    WorkflowDefinition::new(
        "glossary-approval",
        vec![
            StageDefinition::new("review").with_task("review", Value::Null),
            StageDefinition::new("approve"),
            StageDefinition::new("reject"),
        ],
        vec![
            EdgeDefinition::when("review", "approve", true),
            EdgeDefinition::when("review", "reject", false),
        ],
    )
}

fn registry_with(name: &str, task: Arc<dyn StageTask>) -> StageRegistry {
    let mut registry = crate::default_registry();
    registry.insert(name.to_owned(), task);
    registry
}

fn fast_config() -> RunnerConfig {
    RunnerConfig {
        max_retries: 3,
        retry_base_delay: Duration::from_millis(1),
        max_transitions: 10,
    }
}

fn engine_over(store: Arc<dyn StageStateStore>, registry: StageRegistry) -> LocalProcessEngine {
    let tracker = Arc::new(StageInstanceTracker::new(store));
    LocalProcessEngine::new(tracker, registry, fast_config())
}

// ============================================================
// Tracker through the listener port
// ============================================================

#[tokio::test]
async fn stage_visit_is_recorded_from_entry_to_exit() {
    let store = Arc::new(InMemoryStageStateStore::new());
    let tracker = StageInstanceTracker::new(store.clone());

    let instance = Uuid::new_v4();
    let execution = Uuid::new_v4();
    let mut ctx = LocalExecution::new("glossary-approval:1:aa", Some(instance.to_string()));
    ctx.set_variable(EXECUTION_ID_VARIABLE, json!(execution.to_string()));
    ctx.set_activity(Some("review"));

    tracker.notify(&StageSignal::from_event_name("start"), &mut ctx).await;

    let opened = store.list_for_instance(instance).await.unwrap();
    assert_eq!(opened.len(), 1);
    let record_id = opened[0].id;
    assert_eq!(opened[0].stage, "review");
    assert_eq!(opened[0].execution_id, Some(execution));
    assert!(opened[0].is_open());

    ctx.set_variable("approved", json!(true));
    let at_exit = ctx.variables();
    tracker.notify(&StageSignal::from_event_name("end"), &mut ctx).await;

    let closed = store.get(record_id).await.unwrap();
    assert!(closed.end_time.unwrap() >= closed.start_time);
    let snapshot = closed.variables.unwrap();
    assert_eq!(snapshot["approved"], json!(true));
    assert_eq!(snapshot, at_exit);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn exit_for_a_record_that_was_never_created_mutates_nothing() {
    let store = Arc::new(InMemoryStageStateStore::new());
    let tracker = StageInstanceTracker::new(store.clone());

    let instance = Uuid::new_v4();
    let mut existing = LocalExecution::new("glossary-approval:1:aa", Some(instance.to_string()));
    existing.set_activity(Some("review"));
    tracker.on_stage_entered(&mut existing).await;
    let before = store.all();

    // Engine restarted and the bag now points at an id the store never issued.
    let mut ctx = LocalExecution::new("glossary-approval:1:aa", Some(instance.to_string()));
    ctx.set_activity(Some("review"));
    ctx.set_variable(STAGE_STATE_ID_VARIABLE, json!(Uuid::new_v4().to_string()));

    assert!(matches!(
        tracker.close_stage(&mut ctx).await,
        Err(crate::TrackingError::Store(DbError::NotFound(_)))
    ));
    tracker.on_stage_exited(&mut ctx).await;

    assert_eq!(store.all(), before);
}

// ============================================================
// Local engine runs
// ============================================================

#[tokio::test]
async fn approved_review_routes_only_to_approve() {
    let graph = ProcessGraph::build(&review_workflow()).expect("valid workflow");
    let after_review = vars(json!({ "approved": true, "result": true }));

    let eligible = graph.eligible_edges("review", &after_review);
    assert_eq!(eligible.len(), 1);
    assert_eq!(eligible[0].to(), "approve");

    let store = Arc::new(InMemoryStageStateStore::new());
    let review = Arc::new(MockStage::returning(
        "review",
        json!({ "approved": true, "result": true }),
    ));
    let engine = engine_over(store.clone(), registry_with("review", review.clone()));

    let instance = Uuid::new_v4();
    let outcome = engine.run(&graph, instance, Variables::new()).await.expect("run completes");

    assert_eq!(outcome.visited, vec!["review", "approve"]);
    assert_eq!(review.call_count(), 1);

    let records = store.list_for_instance(instance).await.unwrap();
    let stages: Vec<_> = records.iter().map(|r| r.stage.as_str()).collect();
    assert_eq!(stages, vec!["glossary-approval", "review", "approve"]);
    assert!(records.iter().all(|r| !r.is_open()));
    assert!(records.iter().all(|r| r.execution_id == Some(outcome.execution_id)));

    let review_record = &records[1];
    assert_eq!(review_record.variables.as_ref().unwrap()["approved"], json!(true));
}

#[tokio::test]
async fn rejected_review_routes_to_reject() {
    let graph = ProcessGraph::build(&review_workflow()).unwrap();
    let review = Arc::new(MockStage::returning("review", json!({ "result": false })));
    let engine = engine_over(
        Arc::new(InMemoryStageStateStore::new()),
        registry_with("review", review),
    );

    let outcome = engine.run(&graph, Uuid::new_v4(), Variables::new()).await.unwrap();
    assert_eq!(outcome.visited, vec!["review", "reject"]);
}

#[tokio::test]
async fn built_in_decision_stage_drives_routing() {
    let mut def = review_workflow();
    def.stages[0] = StageDefinition::new("review")
        .with_task(stages::builtin::DECISION, json!({ "variable": "approved" }));
    let graph = ProcessGraph::build(&def).unwrap();
    let engine = engine_over(Arc::new(InMemoryStageStateStore::new()), crate::default_registry());

    let outcome = engine
        .run(&graph, Uuid::new_v4(), vars(json!({ "approved": true })))
        .await
        .unwrap();
    assert_eq!(outcome.visited, vec!["review", "approve"]);
    assert_eq!(outcome.variables["result"], json!(true));
}

#[tokio::test]
async fn revisited_stage_gets_one_record_per_visit() {
    // draft -> review; review --false--> draft; review --true--> publish
    let def = WorkflowDefinition::new(
        "glossary-approval",
        vec![
            StageDefinition::new("draft"),
            StageDefinition::new("review").with_task("review", Value::Null),
            StageDefinition::new("publish"),
        ],
        vec![
            EdgeDefinition::new("draft", "review"),
            EdgeDefinition::when("review", "draft", false),
            EdgeDefinition::when("review", "publish", true),
        ],
    );
    let graph = ProcessGraph::build(&def).unwrap();

    struct SecondTimeLucky(MockStage);

    #[async_trait]
    impl StageTask for SecondTimeLucky {
        async fn execute(
            &self,
            config: &Value,
            variables: &Variables,
        ) -> Result<Variables, stages::StageError> {
            self.0.execute(config, variables).await?;
            Ok(vars(json!({ "result": self.0.call_count() >= 2 })))
        }
    }

    let store = Arc::new(InMemoryStageStateStore::new());
    let review = SecondTimeLucky(MockStage::returning("review", json!({})));
    let engine = engine_over(store.clone(), registry_with("review", Arc::new(review)));

    let instance = Uuid::new_v4();
    let outcome = engine.run(&graph, instance, Variables::new()).await.unwrap();
    assert_eq!(outcome.visited, vec!["draft", "review", "draft", "review", "publish"]);

    let records = store.list_for_instance(instance).await.unwrap();
    let reviews: Vec<_> = records.iter().filter(|r| r.stage == "review").collect();
    assert_eq!(reviews.len(), 2);
    assert_ne!(reviews[0].id, reviews[1].id);
    assert_eq!(reviews[0].variables.as_ref().unwrap()["result"], json!(false));
    assert_eq!(reviews[1].variables.as_ref().unwrap()["result"], json!(true));
    assert!(store.list_open(instance).await.unwrap().is_empty());
}

#[tokio::test]
async fn broken_store_does_not_affect_the_run() {
    let graph = ProcessGraph::build(&review_workflow()).unwrap();
    let review = Arc::new(MockStage::returning("review", json!({ "result": true })));
    let engine = engine_over(Arc::new(FailingStore), registry_with("review", review));

    let outcome = engine
        .run(&graph, Uuid::new_v4(), Variables::new())
        .await
        .expect("tracking failures must not abort the run");
    assert_eq!(outcome.visited, vec!["review", "approve"]);
    assert!(!outcome.variables.contains_key(STAGE_STATE_ID_VARIABLE));
}

#[tokio::test]
async fn retryable_stage_is_retried_until_it_succeeds() {
    let graph = ProcessGraph::build(&review_workflow()).unwrap();
    let review = Arc::new(MockStage::flaky("review", 2, json!({ "result": true })));
    let engine = engine_over(
        Arc::new(InMemoryStageStateStore::new()),
        registry_with("review", review.clone()),
    );

    let outcome = engine.run(&graph, Uuid::new_v4(), Variables::new()).await.unwrap();
    assert_eq!(review.call_count(), 3);
    assert_eq!(outcome.visited, vec!["review", "approve"]);
}

#[tokio::test]
async fn retry_exhaustion_aborts_the_run() {
    let graph = ProcessGraph::build(&review_workflow()).unwrap();
    let review = Arc::new(MockStage::failing_retryable("review", "reviewer service down"));
    let engine = engine_over(
        Arc::new(InMemoryStageStateStore::new()),
        registry_with("review", review.clone()),
    );

    let result = engine.run(&graph, Uuid::new_v4(), Variables::new()).await;
    assert!(matches!(result, Err(EngineError::StageRetryExhausted { stage, .. }) if stage == "review"));
    assert_eq!(review.call_count(), 4);
}

#[tokio::test]
async fn fatal_stage_aborts_and_leaves_its_record_open() {
    let graph = ProcessGraph::build(&review_workflow()).unwrap();
    let store = Arc::new(InMemoryStageStateStore::new());
    let review = Arc::new(MockStage::failing_fatal("review", "policy violated"));
    let engine = engine_over(store.clone(), registry_with("review", review));

    let instance = Uuid::new_v4();
    let result = engine.run(&graph, instance, Variables::new()).await;
    assert!(matches!(result, Err(EngineError::StageFatal { stage, .. }) if stage == "review"));

    let open: Vec<_> = store
        .list_open(instance)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.stage)
        .collect();
    assert_eq!(open, vec!["glossary-approval", "review"]);
}

#[tokio::test]
async fn missing_decision_variable_is_a_dead_end() {
    let graph = ProcessGraph::build(&review_workflow()).unwrap();
    let review = Arc::new(MockStage::returning("review", json!({})));
    let engine = engine_over(
        Arc::new(InMemoryStageStateStore::new()),
        registry_with("review", review),
    );

    let result = engine.run(&graph, Uuid::new_v4(), Variables::new()).await;
    assert!(matches!(result, Err(EngineError::NoEligibleTransition(stage)) if stage == "review"));
}

#[tokio::test]
async fn unregistered_task_is_reported() {
    let graph = ProcessGraph::build(&review_workflow()).unwrap();
    let engine = engine_over(Arc::new(InMemoryStageStateStore::new()), crate::default_registry());

    let result = engine.run(&graph, Uuid::new_v4(), Variables::new()).await;
    assert!(matches!(result, Err(EngineError::UnregisteredTask { task, .. }) if task == "review"));
}

#[tokio::test]
async fn endless_loop_hits_the_transition_limit() {
    let def = WorkflowDefinition::new(
        "spin",
        vec![StageDefinition::new("a"), StageDefinition::new("b")],
        vec![EdgeDefinition::new("a", "b"), EdgeDefinition::new("b", "a")],
    );
    let graph = ProcessGraph::build(&def).unwrap();
    let engine = engine_over(Arc::new(InMemoryStageStateStore::new()), crate::default_registry());

    let result = engine.run(&graph, Uuid::new_v4(), Variables::new()).await;
    assert!(matches!(result, Err(EngineError::TransitionLimitExceeded(10))));
}
