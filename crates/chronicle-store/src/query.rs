//! Read-side façade over an [`IndexStore`].

use crate::error::StoreError;
use crate::IndexStore;
use chrono::{DateTime, Utc};
use chronicle_core::{AuditStats, DateRange, EntityHistory, QueryFilter, QueryResult};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Cap on how many changes a history request pulls back.
const HISTORY_LIMIT: usize = 10_000;

/// Point queries, history, statistics, and retention over stored events.
#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn IndexStore>,
}

impl QueryService {
    pub fn new(store: Arc<dyn IndexStore>) -> Self {
        Self { store }
    }

    /// All changes for one entity instance, newest first.
    pub async fn get_by_primary_key(
        &self,
        domain: &str,
        entity: &str,
        primary_key: &str,
        limit: usize,
        offset: usize,
    ) -> Result<QueryResult, StoreError> {
        self.store
            .query(&QueryFilter {
                domain: Some(domain.to_string()),
                entity: Some(entity.to_string()),
                primary_key_str: Some(primary_key.to_string()),
                limit,
                offset,
                ..QueryFilter::default()
            })
            .await
    }

    /// The complete change history of one entity instance, with derived
    /// summary fields. Fetches at most [`HISTORY_LIMIT`] changes.
    pub async fn get_entity_history(
        &self,
        domain: &str,
        entity: &str,
        primary_key: &str,
    ) -> Result<EntityHistory, StoreError> {
        let result = self
            .get_by_primary_key(domain, entity, primary_key, HISTORY_LIMIT, 0)
            .await?;

        let mut operations = BTreeMap::new();
        let mut actors: Vec<String> = Vec::new();
        let mut first_change: Option<DateTime<Utc>> = None;
        let mut last_change: Option<DateTime<Utc>> = None;

        for event in &result.records {
            *operations.entry(event.operation).or_insert(0) += 1;

            if !event.changed_by.is_empty() && !actors.contains(&event.changed_by) {
                actors.push(event.changed_by.clone());
            }

            if first_change.map_or(true, |t| event.change_timestamp < t) {
                first_change = Some(event.change_timestamp);
            }
            if last_change.map_or(true, |t| event.change_timestamp > t) {
                last_change = Some(event.change_timestamp);
            }
        }

        Ok(EntityHistory {
            domain: domain.to_string(),
            entity: entity.to_string(),
            primary_key_str: primary_key.to_string(),
            change_count: result.records.len() as u64,
            first_change,
            last_change,
            changed_by: actors,
            operations,
            changes: result.records,
        })
    }

    /// Aggregate statistics for a `(domain, entity)` over a date range.
    pub async fn get_stats(
        &self,
        domain: &str,
        entity: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<AuditStats, StoreError> {
        self.store
            .aggregate(domain, entity, DateRange { start, end })
            .await
    }

    /// Retention: delete events older than the cutoff.
    pub async fn delete_older_than(
        &self,
        domain: &str,
        entity: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.store.delete_older_than(domain, entity, cutoff).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use chronicle_core::{ChangeEvent, Operation};
    use chrono::Duration;

    async fn seed(store: &MemoryStore) {
        let events = vec![
            ChangeEvent::builder("appointment", "Appointment", Operation::Create, "A1")
                .changed_by("u1", "u1@example.com")
                .timestamp(Utc::now() - Duration::days(3))
                .build(),
            ChangeEvent::builder("appointment", "Appointment", Operation::Update, "A1")
                .changed_by("u2", "u2@example.com")
                .timestamp(Utc::now() - Duration::days(2))
                .build(),
            ChangeEvent::builder("appointment", "Appointment", Operation::Update, "A1")
                .changed_by("u1", "u1@example.com")
                .timestamp(Utc::now() - Duration::days(1))
                .build(),
            ChangeEvent::builder("appointment", "Appointment", Operation::Create, "A2")
                .timestamp(Utc::now())
                .build(),
        ];
        store.bulk_write(&events).await.unwrap();
    }

    #[tokio::test]
    async fn history_derives_summary_fields() {
        let store = Arc::new(MemoryStore::new());
        seed(&store).await;
        let queries = QueryService::new(store);

        let history = queries
            .get_entity_history("appointment", "Appointment", "A1")
            .await
            .unwrap();

        assert_eq!(history.change_count, 3);
        assert_eq!(history.operations[&Operation::Create], 1);
        assert_eq!(history.operations[&Operation::Update], 2);
        assert_eq!(history.changed_by.len(), 2);
        assert!(history.first_change.unwrap() < history.last_change.unwrap());
        assert_eq!(history.changes.len(), 3);
    }

    #[tokio::test]
    async fn point_query_scopes_to_key() {
        let store = Arc::new(MemoryStore::new());
        seed(&store).await;
        let queries = QueryService::new(store);

        let result = queries
            .get_by_primary_key("appointment", "Appointment", "A2", 10, 0)
            .await
            .unwrap();
        assert_eq!(result.total, 1);
        assert_eq!(result.records[0].primary_key_str, "A2");
    }

    #[tokio::test]
    async fn stats_pass_through_to_aggregate() {
        let store = Arc::new(MemoryStore::new());
        seed(&store).await;
        let queries = QueryService::new(store);

        let stats = queries
            .get_stats(
                "appointment",
                "Appointment",
                Utc::now() - Duration::days(7),
                Utc::now(),
            )
            .await
            .unwrap();
        assert_eq!(stats.total_records, 4);
        assert_eq!(stats.unique_keys, 2);
    }
}
