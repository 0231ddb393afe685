//! Process-wide registry of local mirrors.

use crate::core::error::CacheResult;
use crate::local::body::{CacheBody, SnapshotBody};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Logical key → local mirror body.
///
/// Registration is first-wins: registering a key twice keeps the original
/// body. Reads take the read lock only, so they run alongside the poller.
#[derive(Default)]
pub struct LocalCacheRegistry {
    bodies: RwLock<HashMap<String, Arc<dyn CacheBody>>>,
}

impl LocalCacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a body for `key`.
    ///
    /// Returns `false` and leaves the existing body in place when the key is
    /// already registered.
    pub fn register(&self, key: impl Into<String>, body: Arc<dyn CacheBody>) -> bool {
        let key = key.into();
        let mut bodies = self.bodies.write();
        if bodies.contains_key(&key) {
            tracing::debug!(key = %key, "local cache already registered");
            return false;
        }
        tracing::debug!(key = %key, "local cache registered");
        bodies.insert(key, body);
        true
    }

    /// Register a [`SnapshotBody`] for `key`.
    pub fn register_default(&self, key: impl Into<String>) -> bool {
        self.register(key, Arc::new(SnapshotBody::new()))
    }

    /// Read from the local mirror of `key`.
    ///
    /// Unregistered keys and body errors both yield `None`; errors are
    /// logged.
    pub fn get(&self, key: &str, params: &[Value]) -> Option<Value> {
        let body = self.body(key)?;
        match body.get(params) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "local cache read failed");
                None
            }
        }
    }

    /// Push fresh snapshot bytes into the body of `key`.
    ///
    /// Unregistered keys are ignored.
    pub fn renew(&self, key: &str, raw: &[u8]) -> CacheResult<()> {
        match self.body(key) {
            Some(body) => body.renew(raw),
            None => Ok(()),
        }
    }

    /// Snapshot of registered keys.
    pub fn keys(&self) -> Vec<String> {
        self.bodies.read().keys().cloned().collect()
    }

    /// Check if `key` is registered.
    pub fn contains(&self, key: &str) -> bool {
        self.bodies.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.bodies.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.read().is_empty()
    }

    // Clone the Arc out so body calls never run under the registry lock.
    fn body(&self, key: &str) -> Option<Arc<dyn CacheBody>> {
        self.bodies.read().get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::body::KeyedBody;
    use serde_json::json;

    #[test]
    fn second_registration_is_ignored() {
        let registry = LocalCacheRegistry::new();
        let first = Arc::new(KeyedBody::new());
        first.renew(br#"{"ru":"Moscow"}"#).unwrap();

        assert!(registry.register("weather", first));
        assert!(!registry.register_default("weather"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("weather", &[json!("ru")]), Some(json!("Moscow")));
    }

    #[test]
    fn unknown_key_and_body_errors_are_not_found() {
        let registry = LocalCacheRegistry::new();
        registry.register("weather", Arc::new(KeyedBody::new()));

        assert_eq!(registry.get("traffic", &[json!("ru")]), None);
        assert_eq!(registry.get("weather", &[json!(7)]), None);
    }

    #[test]
    fn renew_of_unregistered_key_is_ignored() {
        let registry = LocalCacheRegistry::new();
        assert!(registry.renew("weather", b"{}").is_ok());
        assert!(registry.is_empty());
    }
}
