//! Error types shared by the coordination, store and local-cache layers.
//!
//! Steady-state failures (lock conflicts, transport hiccups, bad producer
//! output) are logged by the background loops and never escape them.
//! Configuration errors are the only kind returned to the embedding host,
//! and only at construction time.

use thiserror::Error;

/// Common fleetcache error conditions.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The lock path is held by a peer. Expected in steady state.
    #[error("lock conflict on {path}")]
    Conflict { path: String },

    /// A backend could not be reached or answered with an unexpected status.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// Producer output or a stored entry could not be encoded or decoded.
    #[error("data format error: {message}")]
    DataFormat { message: String },

    /// Malformed endpoints or settings.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// A backend lookup found nothing under the key.
    #[error("key not found: {key}")]
    NotFound { key: String },

    /// The coordinator has been shut down.
    #[error("coordinator stopped")]
    Stopped,
}

impl CacheError {
    /// Create a Transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a DataFormat error.
    pub fn data_format(message: impl Into<String>) -> Self {
        Self::DataFormat {
            message: message.into(),
        }
    }

    /// Create a Configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a Conflict error for the given lock path.
    pub fn conflict(path: impl Into<String>) -> Self {
        Self::Conflict { path: path.into() }
    }

    /// Create a NotFound error for the given key.
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Check if retrying the same request may succeed.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Check if this error only reports that a peer holds the lock.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Check if the backend had nothing under the key.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::data_format(err.to_string())
    }
}

/// Result type using CacheError.
pub type CacheResult<T> = Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_is_retriable() {
        assert!(CacheError::transport("down").is_retriable());
        assert!(!CacheError::conflict("/locks/a").is_retriable());
        assert!(!CacheError::data_format("bad").is_retriable());
        assert!(!CacheError::configuration("bad").is_retriable());
    }

    #[test]
    fn json_errors_become_data_format() {
        let err: CacheError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, CacheError::DataFormat { .. }));
    }

    #[test]
    fn conflict_display_names_path() {
        let err = CacheError::conflict("/fleetcache/locks/weather");
        assert_eq!(err.to_string(), "lock conflict on /fleetcache/locks/weather");
        assert!(err.is_conflict());
    }

    #[test]
    fn not_found_names_key() {
        let err = CacheError::not_found("/fleetcache/locks/weather");
        assert_eq!(err.to_string(), "key not found: /fleetcache/locks/weather");
        assert!(err.is_not_found());
        assert!(!err.is_conflict());
        assert!(!err.is_retriable());
    }
}
