//! Pipeline assembly: configuration file to running audit infrastructure.

use crate::interceptor::AuditInterceptor;
use chronicle_core::{ChronicleConfig, ConfigError};
use chronicle_store::{BulkIndexer, ElasticStore, IndexStore, IndexerStatus, MemoryStore, QueryService, StoreError};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const SETUP_HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from pipeline setup. Only configuration problems are fatal; an
/// unreachable store backend falls back to the in-memory mock.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The assembled audit infrastructure: store, bulk pipeline, interceptor,
/// and read-side queries. Create once per process and [`close`] on
/// shutdown so buffered events are flushed.
///
/// [`close`]: AuditPipeline::close
pub struct AuditPipeline {
    config: Arc<ChronicleConfig>,
    store: Arc<dyn IndexStore>,
    indexer: Arc<BulkIndexer>,
    interceptor: Arc<AuditInterceptor>,
    queries: QueryService,
}

impl AuditPipeline {
    /// Load the configuration file (with `${VAR}` substitution) and build
    /// the pipeline.
    pub async fn init(config_path: impl AsRef<Path>) -> Result<Self, SetupError> {
        let config = ChronicleConfig::from_file(config_path)?;
        Self::from_config(config).await
    }

    /// Build the pipeline from an already-validated configuration.
    ///
    /// When the store is enabled, the Elasticsearch backend is constructed
    /// and health-probed; on failure the pipeline runs against the
    /// in-memory store so the host server still starts.
    pub async fn from_config(config: ChronicleConfig) -> Result<Self, SetupError> {
        config.validate()?;
        let config = Arc::new(config);

        let store = Self::build_store(&config).await;
        let indexer = Arc::new(BulkIndexer::new(store.clone(), &config.store));
        let interceptor = Arc::new(AuditInterceptor::new(config.clone(), indexer.clone()));
        let queries = QueryService::new(store.clone());

        Ok(Self {
            config,
            store,
            indexer,
            interceptor,
            queries,
        })
    }

    /// Build a pipeline over an explicit store, bypassing backend
    /// selection. Tests and embedded setups use this.
    pub fn with_store(config: ChronicleConfig, store: Arc<dyn IndexStore>) -> Self {
        let config = Arc::new(config);
        let indexer = Arc::new(BulkIndexer::new(store.clone(), &config.store));
        let interceptor = Arc::new(AuditInterceptor::new(config.clone(), indexer.clone()));
        let queries = QueryService::new(store.clone());

        Self {
            config,
            store,
            indexer,
            interceptor,
            queries,
        }
    }

    async fn build_store(config: &ChronicleConfig) -> Arc<dyn IndexStore> {
        if !config.store.enabled {
            tracing::info!("audit store disabled; events will stay in memory");
            return Arc::new(MemoryStore::new());
        }

        let store = match ElasticStore::new(&config.store) {
            Ok(store) => store,
            Err(err) => {
                tracing::warn!(error = %err, "failed to build store client; falling back to in-memory store");
                return Arc::new(MemoryStore::new());
            }
        };

        let probe = tokio::time::timeout(SETUP_HEALTH_TIMEOUT, store.health()).await;
        match probe {
            Ok(Ok(())) => {
                tracing::info!(addresses = ?config.store.addresses, "audit store connection verified");
                Arc::new(store)
            }
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "audit store health check failed; falling back to in-memory store");
                Arc::new(MemoryStore::new())
            }
            Err(_) => {
                tracing::warn!("audit store health check timed out; falling back to in-memory store");
                Arc::new(MemoryStore::new())
            }
        }
    }

    pub fn config(&self) -> &ChronicleConfig {
        &self.config
    }

    /// The interceptor to install in the RPC server's unary dispatch.
    pub fn interceptor(&self) -> Arc<AuditInterceptor> {
        self.interceptor.clone()
    }

    /// Read-side operations over the stored events.
    pub fn queries(&self) -> &QueryService {
        &self.queries
    }

    pub fn store(&self) -> Arc<dyn IndexStore> {
        self.store.clone()
    }

    /// Current bulk-pipeline status.
    pub fn indexer_status(&self) -> IndexerStatus {
        self.indexer.status()
    }

    /// Drain the bulk pipeline and release the store.
    pub async fn close(&self) -> Result<(), StoreError> {
        self.indexer.close().await;
        self.store.close().await
    }
}
