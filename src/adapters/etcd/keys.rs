//! etcd v2 keys API wire types and outcome mapping.
//!
//! Status and `errorCode` map onto coordination outcomes:
//! - 200 / 201 → applied, revision = `node.modifiedIndex`
//! - 412, errorCode 101 (compare failed) or 105 (node exists) → conflict
//! - 404, errorCode 100 (key not found) → not found
//! - anything else → transport error

use crate::adapters::CoordOutcome;
use crate::core::error::{CacheError, CacheResult};
use reqwest::Url;
use serde::Deserialize;

/// errorCode for a missing key.
pub const ERROR_KEY_NOT_FOUND: u32 = 100;

/// errorCode for a failed compare.
pub const ERROR_TEST_FAILED: u32 = 101;

/// errorCode for a create on an existing key.
pub const ERROR_NODE_EXIST: u32 = 105;

/// Node returned by the keys API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EtcdNode {
    /// Full key path.
    #[serde(default)]
    pub key: String,
    /// Value, absent for deletions.
    #[serde(default)]
    pub value: Option<String>,
    /// Index of the last modification.
    #[serde(rename = "modifiedIndex", default)]
    pub modified_index: u64,
    /// Remaining TTL in seconds.
    #[serde(default)]
    pub ttl: Option<i64>,
}

/// Response body of the keys API; error responses share the shape.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EtcdResponse {
    /// Action performed ("create", "compareAndSwap", ...).
    #[serde(default)]
    pub action: Option<String>,
    /// Node after the action.
    #[serde(default)]
    pub node: Option<EtcdNode>,
    /// Error code for failed requests.
    #[serde(rename = "errorCode", default)]
    pub error_code: Option<u32>,
    /// Error message for failed requests.
    #[serde(default)]
    pub message: Option<String>,
    /// Cluster index at the time of the error.
    #[serde(default)]
    pub index: Option<u64>,
}

impl EtcdResponse {
    /// Parse a response body, treating empty or malformed bodies as empty.
    pub fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    fn revision(&self) -> u64 {
        self.node
            .as_ref()
            .map(|n| n.modified_index)
            .or(self.index)
            .unwrap_or(0)
    }
}

/// Map an HTTP status and parsed body to a coordination outcome.
pub fn classify(status: u16, response: &EtcdResponse) -> CacheResult<CoordOutcome> {
    match (status, response.error_code) {
        (200 | 201, None) => Ok(CoordOutcome::Applied {
            revision: response.revision(),
        }),
        (_, Some(ERROR_TEST_FAILED | ERROR_NODE_EXIST)) | (412, _) => Ok(CoordOutcome::Conflict),
        (_, Some(ERROR_KEY_NOT_FOUND)) | (404, _) => Ok(CoordOutcome::NotFound),
        (status, code) => Err(CacheError::transport(format!(
            "etcd answered {} (errorCode {:?}): {}",
            status,
            code,
            response.message.as_deref().unwrap_or("no message")
        ))),
    }
}

/// Build the keys API URL for a path on one endpoint.
///
/// Each path segment is percent-encoded, so `?` and `#` in a key stay part
/// of the key.
pub fn key_url(endpoint: &str, path: &str) -> CacheResult<Url> {
    let mut url = Url::parse(endpoint).map_err(|e| {
        CacheError::configuration(format!("invalid etcd endpoint {:?}: {}", endpoint, e))
    })?;
    url.path_segments_mut()
        .map_err(|()| CacheError::configuration(format!("etcd endpoint {:?} cannot hold a path", endpoint)))?
        .pop_if_empty()
        .extend(["v2", "keys"])
        .extend(path.trim_start_matches('/').split('/'));
    Ok(url)
}
