//! Integration tests for the bulk pipeline and read side together.

use chronicle_core::{ChangeEvent, Operation, QueryFilter, StoreConfig};
use chronicle_store::{BulkIndexer, IndexStore, MemoryStore, QueryService};
use chrono::{Duration, Utc};
use std::sync::Arc;

fn config() -> StoreConfig {
    StoreConfig {
        bulk_size: 5,
        num_workers: 2,
        flush_interval: 50,
        ..StoreConfig::default()
    }
}

fn backdated(domain: &str, pk: &str, operation: Operation, actor: &str, age_days: i64) -> ChangeEvent {
    ChangeEvent::builder(domain, chronicle_core::capitalize(domain), operation, pk)
        .changed_by(actor, format!("{actor}@example.com"))
        .timestamp(Utc::now() - Duration::days(age_days))
        .build()
}

#[tokio::test]
async fn events_flow_from_enqueue_to_query() {
    let store = Arc::new(MemoryStore::new());
    let indexer = BulkIndexer::new(store.clone(), &config());

    indexer.enqueue(backdated("appointment", "A1", Operation::Create, "u1", 3)).unwrap();
    indexer.enqueue(backdated("appointment", "A1", Operation::Update, "u2", 2)).unwrap();
    indexer.enqueue(backdated("appointment", "A1", Operation::Update, "u1", 1)).unwrap();
    indexer.enqueue(backdated("patient", "P1", Operation::Create, "u1", 1)).unwrap();
    indexer.close().await;

    let status = indexer.status();
    assert_eq!(status.processed_count, 4);
    assert_eq!(status.dropped_count, 0);

    let queries = QueryService::new(store.clone());

    let result = queries
        .get_by_primary_key("appointment", "Appointment", "A1", 10, 0)
        .await
        .unwrap();
    assert_eq!(result.total, 3);
    // Newest first.
    assert_eq!(result.records[0].changed_by, "u1");
    assert_eq!(result.records[0].operation, Operation::Update);

    let history = queries
        .get_entity_history("appointment", "Appointment", "A1")
        .await
        .unwrap();
    assert_eq!(history.change_count, 3);
    assert_eq!(history.changed_by.len(), 2);
    assert_eq!(history.operations[&Operation::Update], 2);

    let stats = queries
        .get_stats(
            "appointment",
            "Appointment",
            Utc::now() - Duration::days(30),
            Utc::now(),
        )
        .await
        .unwrap();
    assert_eq!(stats.total_records, 3);
    assert_eq!(stats.unique_actors, 2);
    assert_eq!(stats.unique_keys, 1);
}

#[tokio::test]
async fn retention_keeps_recent_events_only() {
    let store = Arc::new(MemoryStore::new());
    store
        .bulk_write(&[
            backdated("appointment", "A-200", Operation::Create, "u1", 200),
            backdated("appointment", "A-100", Operation::Update, "u1", 100),
            backdated("appointment", "A-10", Operation::Update, "u1", 10),
        ])
        .await
        .unwrap();

    let queries = QueryService::new(store);
    queries
        .delete_older_than("appointment", "Appointment", Utc::now() - Duration::days(90))
        .await
        .unwrap();

    let result = queries
        .get_by_primary_key("appointment", "Appointment", "A-10", 10, 0)
        .await
        .unwrap();
    assert_eq!(result.total, 1);

    let all = queries
        .get_entity_history("appointment", "Appointment", "A-200")
        .await
        .unwrap();
    assert_eq!(all.change_count, 0);
    assert!(all.first_change.is_none());
}

#[tokio::test]
async fn query_filter_by_operation_and_actor() {
    let store = Arc::new(MemoryStore::new());
    store
        .bulk_write(&[
            backdated("appointment", "A1", Operation::Create, "u1", 2),
            backdated("appointment", "A2", Operation::Delete, "u2", 1),
        ])
        .await
        .unwrap();

    let by_op = store
        .query(&QueryFilter {
            operation: Some(Operation::Delete),
            ..QueryFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(by_op.total, 1);
    assert_eq!(by_op.records[0].primary_key_str, "A2");

    let by_actor = store
        .query(&QueryFilter {
            changed_by: Some("u1".to_string()),
            ..QueryFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(by_actor.total, 1);
    assert_eq!(by_actor.records[0].primary_key_str, "A1");
}
