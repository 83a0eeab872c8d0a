//! In-memory index store for tests and runtime fallback.

use crate::error::StoreError;
use crate::{IndexStore, DEFAULT_QUERY_LIMIT};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chronicle_core::{AuditStats, ChangeEvent, DateRange, QueryFilter, QueryResult};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;

/// A [`IndexStore`] backed by a process-local map.
///
/// Used by tests and as the fallback backend when the real cluster is
/// unreachable at setup time. Always healthy; `close` clears it.
#[derive(Debug, Default)]
pub struct MemoryStore {
    events: RwLock<HashMap<String, ChangeEvent>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored events.
    pub fn len(&self) -> usize {
        self.events.read().expect("store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy out every stored event, unordered.
    pub fn all_events(&self) -> Vec<ChangeEvent> {
        self.events
            .read()
            .expect("store lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.events.write().expect("store lock poisoned").clear();
    }

    fn matches(event: &ChangeEvent, filter: &QueryFilter) -> bool {
        if let Some(domain) = &filter.domain {
            if &event.domain != domain {
                return false;
            }
        }
        if let Some(entity) = &filter.entity {
            if &event.entity != entity {
                return false;
            }
        }
        if let Some(pk) = &filter.primary_key_str {
            if &event.primary_key_str != pk {
                return false;
            }
        }
        if let Some(operation) = filter.operation {
            if event.operation != operation {
                return false;
            }
        }
        if let Some(changed_by) = &filter.changed_by {
            if &event.changed_by != changed_by {
                return false;
            }
        }
        if let Some(start) = filter.start {
            if event.change_timestamp < start {
                return false;
            }
        }
        if let Some(end) = filter.end {
            if event.change_timestamp > end {
                return false;
            }
        }
        true
    }
}

#[async_trait]
impl IndexStore for MemoryStore {
    async fn put(&self, _index: &str, id: &str, event: &ChangeEvent) -> Result<(), StoreError> {
        if id.is_empty() {
            return Err(StoreError::Backend("event id cannot be empty".to_string()));
        }
        self.events
            .write()
            .expect("store lock poisoned")
            .insert(id.to_string(), event.clone());
        Ok(())
    }

    async fn bulk_write(&self, events: &[ChangeEvent]) -> Result<(), StoreError> {
        let mut guard = self.events.write().expect("store lock poisoned");
        for event in events {
            guard.insert(event.id.clone(), event.clone());
        }
        Ok(())
    }

    async fn query(&self, filter: &QueryFilter) -> Result<QueryResult, StoreError> {
        let guard = self.events.read().expect("store lock poisoned");
        let mut matched: Vec<ChangeEvent> = guard
            .values()
            .filter(|event| Self::matches(event, filter))
            .cloned()
            .collect();
        drop(guard);

        matched.sort_by(|a, b| b.change_timestamp.cmp(&a.change_timestamp));

        let total = matched.len() as u64;
        let limit = if filter.limit == 0 { DEFAULT_QUERY_LIMIT } else { filter.limit };
        let records: Vec<ChangeEvent> = matched
            .into_iter()
            .skip(filter.offset)
            .take(limit)
            .collect();

        Ok(QueryResult {
            total,
            limit,
            offset: filter.offset,
            records,
        })
    }

    async fn delete_older_than(
        &self,
        domain: &str,
        entity: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut guard = self.events.write().expect("store lock poisoned");
        guard.retain(|_, event| {
            !(event.domain == domain && event.entity == entity && event.change_timestamp < cutoff)
        });
        Ok(())
    }

    async fn aggregate(
        &self,
        domain: &str,
        entity: &str,
        range: DateRange,
    ) -> Result<AuditStats, StoreError> {
        let guard = self.events.read().expect("store lock poisoned");

        let mut operation_counts = BTreeMap::new();
        let mut actors = HashSet::new();
        let mut keys = HashSet::new();
        let mut total = 0u64;

        for event in guard.values() {
            if event.domain != domain || event.entity != entity {
                continue;
            }
            if event.change_timestamp < range.start || event.change_timestamp > range.end {
                continue;
            }

            total += 1;
            *operation_counts.entry(event.operation).or_insert(0) += 1;
            if !event.changed_by.is_empty() {
                actors.insert(event.changed_by.clone());
            }
            if !event.primary_key_str.is_empty() {
                keys.insert(event.primary_key_str.clone());
            }
        }

        Ok(AuditStats {
            domain: domain.to_string(),
            entity: entity.to_string(),
            total_records: total,
            date_range: range,
            operation_counts,
            unique_actors: actors.len() as u64,
            unique_keys: keys.len() as u64,
        })
    }

    async fn health(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.clear();
        Ok(())
    }
}
