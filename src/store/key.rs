//! Shared-store key model.
//!
//! Callers address entries with a [`CacheKey`] (set, primary key, tags).
//! The gateway qualifies it into a [`StoreKey`] by adding the configured
//! namespace and prefixing the primary key. Tags travel with the entry as
//! metadata and never take part in lookups.

use std::fmt;

/// Logical address of a shared-store entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Store set (table) name.
    pub set: String,
    /// Primary key before prefixing.
    pub primary_key: String,
    /// Metadata tags written alongside the entry.
    pub tags: Vec<String>,
}

impl CacheKey {
    /// Create a key without tags.
    pub fn new(set: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            set: set.into(),
            primary_key: primary_key.into(),
            tags: Vec::new(),
        }
    }

    /// Key used for a logical refresh key: set and primary key are both the name.
    pub fn logical(name: &str) -> Self {
        Self::new(name, name)
    }

    /// Attach metadata tags.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Fully qualified backend key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreKey {
    /// Store namespace.
    pub namespace: String,
    /// Store set.
    pub set: String,
    /// Prefix-qualified primary key.
    pub primary_key: String,
}

impl StoreKey {
    /// Qualify a cache key with a namespace and key prefix.
    pub fn qualify(namespace: &str, prefix: &str, key: &CacheKey) -> Self {
        Self {
            namespace: namespace.to_string(),
            set: key.set.clone(),
            primary_key: format!("{}{}", prefix, key.primary_key),
        }
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.namespace, self.set, self.primary_key)
    }
}
