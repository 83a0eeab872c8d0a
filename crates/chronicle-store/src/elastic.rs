//! Elasticsearch-backed index store.
//!
//! Talks plain HTTP/JSON to the cluster: `_bulk` with NDJSON for batches,
//! `_search` with a bool query for reads, `_delete_by_query` for retention,
//! and terms/cardinality aggregations for statistics. Writes land in
//! per-(domain, month) indices derived from the configured pattern.

use crate::error::StoreError;
use crate::{IndexStore, DEFAULT_QUERY_LIMIT};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chronicle_core::{AuditStats, ChangeEvent, DateRange, QueryFilter, QueryResult, StoreConfig};
use reqwest::Method;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Elasticsearch adapter over plain HTTP.
pub struct ElasticStore {
    client: reqwest::Client,
    config: StoreConfig,
    /// Round-robin cursor over the configured addresses.
    cursor: AtomicUsize,
}

impl ElasticStore {
    /// Build a client from the store configuration. Does not contact the
    /// cluster; use [`IndexStore::health`] to probe connectivity.
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        if config.addresses.is_empty() {
            return Err(StoreError::Backend(
                "store addresses must be specified".to_string(),
            ));
        }

        let mut builder = reqwest::Client::builder().timeout(config.request_timeout());
        if config.insecure_skip_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            config: config.clone(),
            cursor: AtomicUsize::new(0),
        })
    }

    fn next_address(&self) -> &str {
        let i = self.cursor.fetch_add(1, Ordering::Relaxed);
        let addr = &self.config.addresses[i % self.config.addresses.len()];
        addr.trim_end_matches('/')
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if !self.config.api_key.is_empty() {
            request.header("Authorization", format!("ApiKey {}", self.config.api_key))
        } else if !self.config.username.is_empty() {
            request.basic_auth(&self.config.username, Some(&self.config.password))
        } else {
            request
        }
    }

    /// Issue a request, retrying transport failures and 5xx responses up to
    /// `max_retries` times with `retry_delay` between attempts. 4xx
    /// responses fail immediately.
    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<RequestBody>,
    ) -> Result<Value, StoreError> {
        let mut last_error: Option<StoreError> = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tokio::time::sleep(self.config.retry_delay()).await;
            }

            let url = format!("{}/{}", self.next_address(), path.trim_start_matches('/'));
            let mut request = self.authorize(self.client.request(method.clone(), &url));
            request = match &body {
                Some(RequestBody::Json(value)) => request.json(value),
                Some(RequestBody::Ndjson(lines)) => request
                    .header("Content-Type", "application/x-ndjson")
                    .body(lines.clone()),
                None => request,
            };

            let response = match request.send().await {
                Ok(response) => response,
                Err(err) => {
                    last_error = Some(StoreError::Transport(err.to_string()));
                    continue;
                }
            };

            let status = response.status();
            if status.is_server_error() {
                let text = response.text().await.unwrap_or_default();
                last_error = Some(StoreError::Backend(format!("{status}: {text}")));
                continue;
            }
            if status.is_client_error() {
                let text = response.text().await.unwrap_or_default();
                return Err(StoreError::Backend(format!("{status}: {text}")));
            }

            return Ok(response.json::<Value>().await?);
        }

        Err(last_error.unwrap_or_else(|| StoreError::Transport("no attempts made".to_string())))
    }

    fn build_query(&self, filter: &QueryFilter) -> Value {
        let mut must: Vec<Value> = Vec::new();

        let mut term = |field: &str, value: Value| {
            must.push(json!({"term": {field: value}}));
        };

        if let Some(domain) = &filter.domain {
            term("domain.keyword", json!(domain));
        }
        if let Some(entity) = &filter.entity {
            term("entity.keyword", json!(entity));
        }
        if let Some(pk) = &filter.primary_key_str {
            term("primary_key_str.keyword", json!(pk));
        }
        if let Some(operation) = filter.operation {
            term("operation.keyword", json!(operation.as_str()));
        }
        if let Some(changed_by) = &filter.changed_by {
            term("changed_by.keyword", json!(changed_by));
        }

        if filter.start.is_some() || filter.end.is_some() {
            let mut range = serde_json::Map::new();
            if let Some(start) = filter.start {
                range.insert("gte".to_string(), json!(start.to_rfc3339()));
            }
            if let Some(end) = filter.end {
                range.insert("lte".to_string(), json!(end.to_rfc3339()));
            }
            must.push(json!({"range": {"change_timestamp": range}}));
        }

        if must.is_empty() {
            json!({"match_all": {}})
        } else {
            json!({"bool": {"must": must}})
        }
    }

    fn parse_hits(&self, response: &Value, limit: usize, offset: usize) -> QueryResult {
        let mut result = QueryResult {
            total: 0,
            limit,
            offset,
            records: Vec::new(),
        };

        let Some(hits) = response.get("hits") else {
            return result;
        };
        if let Some(total) = hits.pointer("/total/value").and_then(Value::as_u64) {
            result.total = total;
        }
        if let Some(list) = hits.get("hits").and_then(Value::as_array) {
            for hit in list {
                let Some(source) = hit.get("_source") else { continue };
                match serde_json::from_value::<ChangeEvent>(source.clone()) {
                    Ok(event) => result.records.push(event),
                    Err(err) => {
                        tracing::warn!(error = %err, "skipping undecodable stored event");
                    }
                }
            }
        }

        result
    }
}

enum RequestBody {
    Json(Value),
    Ndjson(String),
}

#[async_trait]
impl IndexStore for ElasticStore {
    async fn put(&self, index: &str, id: &str, event: &ChangeEvent) -> Result<(), StoreError> {
        let body = serde_json::to_value(event)?;
        let path = format!("{index}/_doc/{id}?refresh=false");
        self.execute(Method::PUT, &path, Some(RequestBody::Json(body)))
            .await?;
        Ok(())
    }

    async fn bulk_write(&self, events: &[ChangeEvent]) -> Result<(), StoreError> {
        if events.is_empty() {
            return Ok(());
        }

        let mut lines = String::new();
        for event in events {
            let index = self.config.index_name(&event.domain, event.change_timestamp);
            let action = json!({"index": {"_index": index, "_id": event.id}});
            lines.push_str(&action.to_string());
            lines.push('\n');
            lines.push_str(&serde_json::to_string(event)?);
            lines.push('\n');
        }

        let response = self
            .execute(Method::POST, "_bulk", Some(RequestBody::Ndjson(lines)))
            .await?;

        // Per-document failures are logged, not propagated; the batch is
        // never retried by the pipeline.
        if response.get("errors").and_then(Value::as_bool) == Some(true) {
            let items = response.get("items").and_then(Value::as_array);
            let mut failed = 0usize;
            let mut first_reason: Option<String> = None;
            for item in items.into_iter().flatten() {
                let Some(index_result) = item.get("index") else { continue };
                if index_result.get("error").is_some() {
                    failed += 1;
                    if first_reason.is_none() {
                        first_reason = index_result
                            .pointer("/error/reason")
                            .and_then(Value::as_str)
                            .map(str::to_string);
                    }
                }
            }
            tracing::warn!(
                batch = events.len(),
                failed,
                first_error = first_reason.as_deref().unwrap_or("unknown"),
                "bulk write reported per-document errors"
            );
        }

        Ok(())
    }

    async fn query(&self, filter: &QueryFilter) -> Result<QueryResult, StoreError> {
        let limit = if filter.limit == 0 { DEFAULT_QUERY_LIMIT } else { filter.limit };
        let body = json!({
            "query": self.build_query(filter),
            "sort": [{"change_timestamp": {"order": "desc"}}],
            "from": filter.offset,
            "size": limit,
            "track_total_hits": true,
        });

        let pattern = self.config.search_pattern(filter.domain.as_deref());
        let response = self
            .execute(Method::POST, &format!("{pattern}/_search"), Some(RequestBody::Json(body)))
            .await?;

        Ok(self.parse_hits(&response, limit, filter.offset))
    }

    async fn delete_older_than(
        &self,
        domain: &str,
        entity: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut must = vec![json!({
            "range": {"change_timestamp": {"lt": cutoff.to_rfc3339()}}
        })];
        if !domain.is_empty() {
            must.push(json!({"term": {"domain.keyword": domain}}));
        }
        if !entity.is_empty() {
            must.push(json!({"term": {"entity.keyword": entity}}));
        }

        let body = json!({"query": {"bool": {"must": must}}});
        let pattern = self
            .config
            .search_pattern(if domain.is_empty() { None } else { Some(domain) });
        self.execute(
            Method::POST,
            &format!("{pattern}/_delete_by_query"),
            Some(RequestBody::Json(body)),
        )
        .await?;
        Ok(())
    }

    async fn aggregate(
        &self,
        domain: &str,
        entity: &str,
        range: DateRange,
    ) -> Result<AuditStats, StoreError> {
        let mut must = vec![json!({
            "range": {"change_timestamp": {
                "gte": range.start.to_rfc3339(),
                "lte": range.end.to_rfc3339(),
            }}
        })];
        if !domain.is_empty() {
            must.push(json!({"term": {"domain.keyword": domain}}));
        }
        if !entity.is_empty() {
            must.push(json!({"term": {"entity.keyword": entity}}));
        }

        let body = json!({
            "query": {"bool": {"must": must}},
            "size": 0,
            "track_total_hits": true,
            "aggs": {
                "operations": {"terms": {"field": "operation.keyword", "size": 100}},
                "actors": {"cardinality": {"field": "changed_by.keyword"}},
                "keys": {"cardinality": {"field": "primary_key_str.keyword"}},
            },
        });

        let pattern = self
            .config
            .search_pattern(if domain.is_empty() { None } else { Some(domain) });
        let response = self
            .execute(Method::POST, &format!("{pattern}/_search"), Some(RequestBody::Json(body)))
            .await?;

        let mut operation_counts = BTreeMap::new();
        if let Some(buckets) = response
            .pointer("/aggregations/operations/buckets")
            .and_then(Value::as_array)
        {
            for bucket in buckets {
                let Some(key) = bucket.get("key").and_then(Value::as_str) else { continue };
                let Ok(operation) = serde_json::from_value::<chronicle_core::Operation>(json!(key)) else {
                    continue;
                };
                let count = bucket.get("doc_count").and_then(Value::as_u64).unwrap_or(0);
                operation_counts.insert(operation, count);
            }
        }

        Ok(AuditStats {
            domain: domain.to_string(),
            entity: entity.to_string(),
            total_records: response
                .pointer("/hits/total/value")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            date_range: range,
            operation_counts,
            unique_actors: response
                .pointer("/aggregations/actors/value")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            unique_keys: response
                .pointer("/aggregations/keys/value")
                .and_then(Value::as_u64)
                .unwrap_or(0),
        })
    }

    async fn health(&self) -> Result<(), StoreError> {
        let probe = self.execute(Method::GET, "", None);
        match tokio::time::timeout(HEALTH_TIMEOUT, probe).await {
            Ok(result) => result.map(|_| ()),
            Err(_) => Err(StoreError::Transport("health probe timed out".to_string())),
        }
    }

    async fn close(&self) -> Result<(), StoreError> {
        // The HTTP client keeps no server-side state to release.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_core::Operation;

    fn store() -> ElasticStore {
        ElasticStore::new(&StoreConfig {
            addresses: vec!["http://localhost:9200".to_string()],
            ..StoreConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn requires_addresses() {
        assert!(ElasticStore::new(&StoreConfig::default()).is_err());
    }

    #[test]
    fn round_robin_over_addresses() {
        let store = ElasticStore::new(&StoreConfig {
            addresses: vec![
                "http://a:9200/".to_string(),
                "http://b:9200".to_string(),
            ],
            ..StoreConfig::default()
        })
        .unwrap();

        assert_eq!(store.next_address(), "http://a:9200");
        assert_eq!(store.next_address(), "http://b:9200");
        assert_eq!(store.next_address(), "http://a:9200");
    }

    #[test]
    fn query_body_reflects_filter() {
        let store = store();
        let filter = QueryFilter {
            domain: Some("appointment".to_string()),
            operation: Some(Operation::Delete),
            start: Some(Utc::now()),
            ..QueryFilter::default()
        };
        let query = store.build_query(&filter);

        let must = query.pointer("/bool/must").unwrap().as_array().unwrap();
        assert_eq!(must.len(), 3);
        assert!(must.iter().any(|m| m.pointer("/term/domain.keyword").is_some()));
        assert!(must
            .iter()
            .any(|m| m.pointer("/term/operation.keyword") == Some(&json!("DELETE"))));
        assert!(must.iter().any(|m| m.pointer("/range/change_timestamp/gte").is_some()));
    }

    #[test]
    fn empty_filter_matches_all() {
        let query = store().build_query(&QueryFilter::default());
        assert!(query.get("match_all").is_some());
    }

    #[test]
    fn parse_hits_decodes_sources() {
        let store = store();
        let event = ChangeEvent::new("appointment", "Appointment", Operation::Create, "A1");
        let response = json!({
            "hits": {
                "total": {"value": 7},
                "hits": [
                    {"_source": serde_json::to_value(&event).unwrap()},
                    {"_source": {"not": "an event"}},
                ],
            },
        });

        let result = store.parse_hits(&response, 10, 0);
        assert_eq!(result.total, 7);
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].primary_key_str, "A1");
    }
}
