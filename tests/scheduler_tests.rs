use std::sync::Arc;

use chrono::{Duration, Utc};
use kpi_sync::adapters::ManualAdapter;
use kpi_sync::scheduler::{RetryPolicy, Scheduler};
use kpi_sync::sync_engine::SyncResult;
use serde_json::json;
use uuid::Uuid;

mod test_utils;
use test_utils::{
    builtin_registry, insert_integration, registry_with, reload, set_schedule, setup_test_db,
};

fn scheduler(db: &sea_orm::DatabaseConnection) -> Scheduler {
    Scheduler::new(db.clone(), builtin_registry(), RetryPolicy::default())
}

#[tokio::test]
async fn due_query_selects_only_schedulable_integrations() {
    let db = setup_test_db().await.unwrap();
    let now = Utc::now();
    let api = json!({"url": "https://example.com/metrics"});

    let never_synced = insert_integration(&db, "API", api.clone(), Some(300))
        .await
        .unwrap();
    let overdue = insert_integration(&db, "GRAPHQL", api.clone(), Some(300))
        .await
        .unwrap();
    set_schedule(&db, overdue.id, true, Some(now - Duration::minutes(5)), Some(now - Duration::hours(1)))
        .await
        .unwrap();

    let manual = insert_integration(&db, "MANUAL", json!({}), Some(300))
        .await
        .unwrap();
    let disabled = insert_integration(&db, "API", api.clone(), Some(300))
        .await
        .unwrap();
    set_schedule(&db, disabled.id, false, None, None).await.unwrap();
    let unscheduled = insert_integration(&db, "API", api.clone(), None)
        .await
        .unwrap();
    let future = insert_integration(&db, "API", api.clone(), Some(300))
        .await
        .unwrap();
    set_schedule(&db, future.id, true, Some(now + Duration::hours(1)), Some(now))
        .await
        .unwrap();
    let synced_without_next = insert_integration(&db, "API", api.clone(), Some(300))
        .await
        .unwrap();
    set_schedule(&db, synced_without_next.id, true, None, Some(now))
        .await
        .unwrap();

    let due: Vec<Uuid> = scheduler(&db)
        .get_integrations_due_for_sync(10)
        .await
        .unwrap()
        .into_iter()
        .map(|integration| integration.id)
        .collect();

    assert_eq!(due, vec![never_synced.id, overdue.id]);
    for excluded in [manual.id, disabled.id, unscheduled.id, future.id, synced_without_next.id] {
        assert!(!due.contains(&excluded));
    }
}

#[tokio::test]
async fn due_query_orders_by_next_sync_and_honours_limit() {
    let db = setup_test_db().await.unwrap();
    let now = Utc::now();
    let api = json!({"url": "https://example.com/metrics"});

    let recent = insert_integration(&db, "API", api.clone(), Some(60)).await.unwrap();
    set_schedule(&db, recent.id, true, Some(now - Duration::minutes(1)), Some(now - Duration::minutes(2)))
        .await
        .unwrap();
    let oldest = insert_integration(&db, "API", api.clone(), Some(60)).await.unwrap();
    set_schedule(&db, oldest.id, true, Some(now - Duration::minutes(30)), Some(now - Duration::minutes(31)))
        .await
        .unwrap();
    let middle = insert_integration(&db, "API", api.clone(), Some(60)).await.unwrap();
    set_schedule(&db, middle.id, true, Some(now - Duration::minutes(10)), Some(now - Duration::minutes(11)))
        .await
        .unwrap();

    let scheduler = scheduler(&db);
    let due: Vec<Uuid> = scheduler
        .get_integrations_due_for_sync(10)
        .await
        .unwrap()
        .into_iter()
        .map(|integration| integration.id)
        .collect();
    assert_eq!(due, vec![oldest.id, middle.id, recent.id]);

    let limited = scheduler.get_integrations_due_for_sync(2).await.unwrap();
    assert_eq!(limited.len(), 2);
    assert_eq!(limited[0].id, oldest.id);
}

#[tokio::test]
async fn success_resets_retries_and_schedules_next_interval() {
    let db = setup_test_db().await.unwrap();
    let integration = insert_integration(&db, "API", json!({}), Some(600))
        .await
        .unwrap();
    let scheduler = scheduler(&db);

    let failed = scheduler
        .update_integration_after_sync(integration.id, &SyncResult::failed("timeout", 10))
        .await
        .unwrap()
        .expect("update applied");
    assert_eq!(failed.retry_count, 1);
    assert!(failed.last_sync.is_none());

    let before = Utc::now();
    let update = scheduler
        .update_integration_after_sync(integration.id, &SyncResult::succeeded(3, 10))
        .await
        .unwrap()
        .expect("update applied");
    assert_eq!(update.retry_count, 0);

    let state = reload(&db, integration.id).await.unwrap();
    assert_eq!(state.retry_count, 0);
    assert_eq!(state.status, "synced");
    let next = state.next_sync_at.expect("next sync").to_utc();
    assert!(next >= before + Duration::seconds(600));
    assert!(state.last_sync.is_some());
}

#[tokio::test]
async fn missing_integration_is_not_an_error() {
    let db = setup_test_db().await.unwrap();
    let outcome = scheduler(&db)
        .update_integration_after_sync(Uuid::new_v4(), &SyncResult::succeeded(0, 1))
        .await
        .unwrap();
    assert!(outcome.is_none());
}

#[tokio::test]
async fn failing_an_already_disabled_integration_is_not_an_auto_disable() {
    let db = setup_test_db().await.unwrap();
    let integration = insert_integration(&db, "API", json!({}), Some(600))
        .await
        .unwrap();
    set_schedule(&db, integration.id, false, None, None).await.unwrap();

    let update = scheduler(&db)
        .update_integration_after_sync(integration.id, &SyncResult::failed("timeout", 10))
        .await
        .unwrap()
        .expect("update applied");
    assert_eq!(update.retry_count, 1);
    assert!(!update.sync_enabled);
    assert!(!update.auto_disabled);

    let state = reload(&db, integration.id).await.unwrap();
    assert!(!state.sync_enabled);
    assert_eq!(state.retry_count, 1);
}

#[tokio::test]
async fn auto_disable_is_reported_once() {
    let db = setup_test_db().await.unwrap();
    let integration = insert_integration(&db, "API", json!({}), Some(600))
        .await
        .unwrap();
    let scheduler = scheduler(&db);
    let failure = SyncResult::failed("timeout", 10);

    let mut disabled_transitions = 0;
    for _ in 0..6 {
        let update = scheduler
            .update_integration_after_sync(integration.id, &failure)
            .await
            .unwrap()
            .expect("update applied");
        if update.auto_disabled {
            disabled_transitions += 1;
            assert_eq!(update.retry_count, 4);
        }
    }
    assert_eq!(disabled_transitions, 1);

    let state = reload(&db, integration.id).await.unwrap();
    assert!(!state.sync_enabled);
    assert_eq!(state.retry_count, 6);
}

#[tokio::test]
async fn lowercase_registered_adapter_is_scheduled() {
    let db = setup_test_db().await.unwrap();
    let registry = registry_with("csv", Arc::new(ManualAdapter));
    let integration = insert_integration(&db, "CSV", json!({}), Some(600))
        .await
        .unwrap();

    let due = Scheduler::new(db.clone(), registry, RetryPolicy::default())
        .get_integrations_due_for_sync(10)
        .await
        .unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].id, integration.id);
}
