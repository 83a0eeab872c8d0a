//! # chronicle-store
//!
//! Persistence and read side of the Chronicle audit pipeline:
//!
//! - [`IndexStore`], the abstract time-partitioned index backend
//! - [`ElasticStore`], the Elasticsearch HTTP adapter
//! - [`MemoryStore`], an in-memory backend for tests and fallback
//! - [`BulkIndexer`], the bounded asynchronous batching layer
//! - [`QueryService`], the read-side façade
//!
//! Writes through the [`BulkIndexer`] are best-effort: a full queue or a
//! failed flush drops events and is logged, never surfaced to callers.

pub mod bulk;
pub mod elastic;
pub mod error;
pub mod memory;
pub mod query;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chronicle_core::{AuditStats, ChangeEvent, DateRange, QueryFilter, QueryResult};

pub use bulk::{BulkIndexer, IndexerStatus};
pub use elastic::ElasticStore;
pub use error::StoreError;
pub use memory::MemoryStore;
pub use query::QueryService;

/// Number of records a query returns when the filter leaves `limit` at 0.
pub const DEFAULT_QUERY_LIMIT: usize = 100;

/// Abstract audit-event store addressed by `(index name, id)`.
///
/// The index name for a write is derived per event from its domain and
/// timestamp; queries fan out over wildcard patterns. Implementations must
/// be safe for concurrent use.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Upsert a single event into an explicit index.
    async fn put(&self, index: &str, id: &str, event: &ChangeEvent) -> Result<(), StoreError>;

    /// Write a batch, atomic per document, across as many indices as the
    /// events' partitions require. Per-document failures are logged by the
    /// implementation and do not fail the batch; transport failures do.
    async fn bulk_write(&self, events: &[ChangeEvent]) -> Result<(), StoreError>;

    /// Filtered query, ordered by `change_timestamp` descending.
    async fn query(&self, filter: &QueryFilter) -> Result<QueryResult, StoreError>;

    /// Delete events older than the cutoff for one `(domain, entity)`.
    async fn delete_older_than(
        &self,
        domain: &str,
        entity: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Aggregate statistics for one `(domain, entity)` over a date range.
    async fn aggregate(
        &self,
        domain: &str,
        entity: &str,
        range: DateRange,
    ) -> Result<AuditStats, StoreError>;

    /// Liveness probe.
    async fn health(&self) -> Result<(), StoreError>;

    /// Release any backend resources.
    async fn close(&self) -> Result<(), StoreError>;
}
