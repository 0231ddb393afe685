//! In-memory shared TTL store.

use crate::adapters::{BoxFuture, SharedStore};
use crate::core::error::{CacheError, CacheResult};
use crate::store::entry::{CacheEntry, Fields};
use crate::store::key::StoreKey;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct StoredRecord {
    fields: Fields,
    expires_at: Instant,
}

/// Shared store held in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<StoreKey, StoredRecord>>,
    unavailable: AtomicBool,
    failing_puts: AtomicU32,
    latency_ms: AtomicU64,
    puts: AtomicU64,
    gets: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every request fail with a transport error while `true`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Release);
    }

    /// Fail the next `count` writes with a transport error.
    pub fn fail_next_puts(&self, count: u32) {
        self.failing_puts.store(count, Ordering::Release);
    }

    /// Delay every request by `latency` before it is served.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Release);
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.records
            .read()
            .values()
            .filter(|r| now < r.expires_at)
            .count()
    }

    /// Check if the store holds no live records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All fields of a live record.
    pub fn fields(&self, key: &StoreKey) -> Option<Fields> {
        let now = Instant::now();
        self.records
            .read()
            .get(key)
            .filter(|r| now < r.expires_at)
            .map(|r| r.fields.clone())
    }

    /// Remaining TTL of a live record.
    pub fn remaining_ttl(&self, key: &StoreKey) -> Option<Duration> {
        let now = Instant::now();
        self.records
            .read()
            .get(key)
            .filter(|r| now < r.expires_at)
            .map(|r| r.expires_at - now)
    }

    /// Successful writes so far.
    pub fn put_count(&self) -> u64 {
        self.puts.load(Ordering::Relaxed)
    }

    /// Read requests so far.
    pub fn get_count(&self) -> u64 {
        self.gets.load(Ordering::Relaxed)
    }

    fn check_available(&self) -> CacheResult<()> {
        if self.unavailable.load(Ordering::Acquire) {
            return Err(CacheError::transport("shared store unavailable"));
        }
        Ok(())
    }

    fn take_put_failure(&self) -> bool {
        self.failing_puts
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    async fn delay(&self) {
        let latency = Duration::from_millis(self.latency_ms.load(Ordering::Acquire));
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn put_sync(&self, key: &StoreKey, entry: CacheEntry) -> CacheResult<()> {
        self.check_available()?;
        if self.take_put_failure() {
            return Err(CacheError::transport("injected write failure"));
        }
        let now = Instant::now();
        let mut records = self.records.write();
        // Writes sweep expired records so the map stays bounded by live keys.
        records.retain(|_, record| now < record.expires_at);
        records.insert(
            key.clone(),
            StoredRecord {
                fields: entry.fields,
                expires_at: now + entry.ttl,
            },
        );
        self.puts.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn get_sync(&self, key: &StoreKey, field_names: &[String]) -> CacheResult<Option<Fields>> {
        self.gets.fetch_add(1, Ordering::Relaxed);
        self.check_available()?;
        let now = Instant::now();
        let mut records = self.records.write();
        match records.get(key) {
            None => Ok(None),
            Some(record) if now >= record.expires_at => {
                records.remove(key);
                Ok(None)
            }
            Some(record) if field_names.is_empty() => Ok(Some(record.fields.clone())),
            Some(record) => Ok(Some(
                record
                    .fields
                    .iter()
                    .filter(|(name, _)| field_names.contains(name))
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect(),
            )),
        }
    }
}

impl SharedStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn put<'a>(&'a self, key: &'a StoreKey, entry: CacheEntry) -> BoxFuture<'a, CacheResult<()>> {
        Box::pin(async move {
            self.delay().await;
            self.put_sync(key, entry)
        })
    }

    fn get<'a>(
        &'a self,
        key: &'a StoreKey,
        field_names: &'a [String],
    ) -> BoxFuture<'a, CacheResult<Option<Fields>>> {
        Box::pin(async move {
            self.delay().await;
            self.get_sync(key, field_names)
        })
    }
}
