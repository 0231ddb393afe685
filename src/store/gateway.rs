//! Shared cache gateway.
//!
//! Builds backend keys and performs get/put against the shared TTL store.
//! Reads collapse "missing" and "backend error" into not-found (the
//! difference only shows in logs). Every backend request is bounded by the
//! request timeout; an elapsed request counts as a transport error. Writes
//! retry transport errors a bounded number of times and then report the
//! failure to the caller.

use crate::adapters::SharedStore;
use crate::core::config::SharedStoreConfig;
use crate::core::error::{CacheError, CacheResult};
use crate::store::entry::{CacheEntry, EntryData, FieldValue, Fields, ID_FIELD, TAGS_FIELD};
use crate::store::key::{CacheKey, StoreKey};
use std::sync::atomic::{AtomicU64, Ordering};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Gateway settings.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Store namespace.
    pub namespace: String,
    /// Primary key prefix.
    pub prefix: String,
    /// Upper bound on a single backend request.
    pub request_timeout: Duration,
    /// Retries after the first attempt for transport errors.
    pub max_retries: u32,
    /// Pause between retries.
    pub retry_backoff: Duration,
}

impl GatewayConfig {
    /// Create a config with default retry policy.
    pub fn new(namespace: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            prefix: prefix.into(),
            request_timeout: Duration::from_millis(50),
            max_retries: 2,
            retry_backoff: Duration::from_millis(10),
        }
    }
}

impl From<&SharedStoreConfig> for GatewayConfig {
    fn from(config: &SharedStoreConfig) -> Self {
        Self {
            namespace: config.namespace.clone(),
            prefix: config.prefix.clone(),
            request_timeout: config.timeout(),
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff(),
        }
    }
}

/// Gateway counters.
#[derive(Debug, Default)]
pub struct GatewayMetrics {
    puts: AtomicU64,
    put_failures: AtomicU64,
    gets: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Snapshot of gateway counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayStats {
    /// Successful writes.
    pub puts: u64,
    /// Writes that failed after all retries.
    pub put_failures: u64,
    /// Read attempts.
    pub gets: u64,
    /// Reads that returned an entry.
    pub hits: u64,
    /// Reads that returned not-found for any reason.
    pub misses: u64,
}

/// Key construction and get/put against the shared store.
pub struct SharedCacheGateway {
    config: GatewayConfig,
    backend: Arc<dyn SharedStore>,
    metrics: GatewayMetrics,
}

impl SharedCacheGateway {
    /// Create a gateway over a store backend.
    pub fn new(config: GatewayConfig, backend: Arc<dyn SharedStore>) -> Self {
        Self {
            config,
            backend,
            metrics: GatewayMetrics::default(),
        }
    }

    /// Get the gateway configuration.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Build the backend key for a cache key.
    pub fn store_key(&self, key: &CacheKey) -> StoreKey {
        StoreKey::qualify(&self.config.namespace, &self.config.prefix, key)
    }

    /// Load an entry into `buf`.
    ///
    /// Only the fields `buf` declares are requested. Returns `false` when the
    /// entry is missing, the backend failed, or the fields do not import.
    pub async fn get<E>(&self, key: &CacheKey, buf: &mut E) -> bool
    where
        E: EntryData + ?Sized,
    {
        self.metrics.gets.fetch_add(1, Ordering::Relaxed);
        let store_key = self.store_key(key);
        let field_names = buf.field_names();

        let mut attempt = 0;
        let fields = loop {
            match self.bounded(self.backend.get(&store_key, &field_names)).await {
                Ok(fields) => break fields,
                Err(e) if e.is_retriable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    tracing::debug!(key = %store_key, attempt, error = %e, "retrying shared store read");
                    tokio::time::sleep(self.config.retry_backoff).await;
                }
                Err(e) => {
                    tracing::warn!(key = %store_key, error = %e, "shared store read failed");
                    self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                    return false;
                }
            }
        };

        let Some(fields) = fields else {
            tracing::debug!(key = %store_key, "entry not found in shared store");
            self.metrics.misses.fetch_add(1, Ordering::Relaxed);
            return false;
        };

        if let Err(e) = buf.import(fields) {
            tracing::warn!(key = %store_key, error = %e, "shared store entry did not import");
            self.metrics.misses.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        self.metrics.hits.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Write an entry, waiting for the outcome.
    ///
    /// Transport errors are retried up to `max_retries` times; the last
    /// error is logged and returned.
    pub async fn put<E>(&self, key: &CacheKey, data: &E, ttl: Duration) -> CacheResult<()>
    where
        E: EntryData + ?Sized,
    {
        let fields = self.fields_with_metadata(key, data);
        self.put_fields(self.store_key(key), fields, ttl).await
    }

    /// Write an entry in the background, logging any failure.
    pub fn put_detached<E>(self: &Arc<Self>, key: &CacheKey, data: &E, ttl: Duration) -> JoinHandle<()>
    where
        E: EntryData + ?Sized,
    {
        let fields = self.fields_with_metadata(key, data);
        let store_key = self.store_key(key);
        let gateway = Arc::clone(self);
        tokio::spawn(async move {
            // Failure is already logged by put_fields.
            let _ = gateway.put_fields(store_key, fields, ttl).await;
        })
    }

    /// Get counter snapshot.
    pub fn stats(&self) -> GatewayStats {
        GatewayStats {
            puts: self.metrics.puts.load(Ordering::Relaxed),
            put_failures: self.metrics.put_failures.load(Ordering::Relaxed),
            gets: self.metrics.gets.load(Ordering::Relaxed),
            hits: self.metrics.hits.load(Ordering::Relaxed),
            misses: self.metrics.misses.load(Ordering::Relaxed),
        }
    }

    fn fields_with_metadata<E>(&self, key: &CacheKey, data: &E) -> Fields
    where
        E: EntryData + ?Sized,
    {
        let mut fields = data.export();
        fields.insert(TAGS_FIELD.to_string(), FieldValue::List(key.tags.clone()));
        fields.insert(
            ID_FIELD.to_string(),
            FieldValue::Str(key.primary_key.clone()),
        );
        fields
    }

    async fn put_fields(&self, store_key: StoreKey, fields: Fields, ttl: Duration) -> CacheResult<()> {
        let entry = CacheEntry::new(fields, ttl);
        let mut attempt = 0;
        loop {
            match self.bounded(self.backend.put(&store_key, entry.clone())).await {
                Ok(()) => {
                    self.metrics.puts.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }
                Err(e) if e.is_retriable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    tracing::debug!(key = %store_key, attempt, error = %e, "retrying shared store write");
                    tokio::time::sleep(self.config.retry_backoff).await;
                }
                Err(e) => {
                    tracing::warn!(key = %store_key, error = %e, "shared store write failed");
                    self.metrics.put_failures.fetch_add(1, Ordering::Relaxed);
                    return Err(e);
                }
            }
        }
    }

    async fn bounded<T>(&self, request: impl Future<Output = CacheResult<T>>) -> CacheResult<T> {
        match tokio::time::timeout(self.config.request_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::transport(format!(
                "shared store request timed out after {:?}",
                self.config.request_timeout
            ))),
        }
    }
}
