//! Local mirror bodies.
//!
//! A body ingests the raw snapshot bytes fetched from the shared store and
//! answers reads against its own copy. Each body guards its own state.

use crate::core::error::{CacheError, CacheResult};
use parking_lot::RwLock;
use serde_json::{Map, Value};

/// Capability of a local mirror.
pub trait CacheBody: Send + Sync {
    /// Ingest the latest snapshot bytes.
    fn renew(&self, raw: &[u8]) -> CacheResult<()>;

    /// Answer a read. `Ok(None)` means not found.
    fn get(&self, params: &[Value]) -> CacheResult<Option<Value>>;
}

/// Default body: keeps the whole decoded snapshot and returns it for any
/// lookup once one has been loaded.
#[derive(Debug, Default)]
pub struct SnapshotBody {
    snapshot: RwLock<Option<Value>>,
}

impl SnapshotBody {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheBody for SnapshotBody {
    fn renew(&self, raw: &[u8]) -> CacheResult<()> {
        let decoded: Map<String, Value> = serde_json::from_slice(raw)?;
        *self.snapshot.write() = Some(Value::Object(decoded));
        Ok(())
    }

    fn get(&self, _params: &[Value]) -> CacheResult<Option<Value>> {
        Ok(self.snapshot.read().clone())
    }
}

/// Reshapes a decoded snapshot before it is stored.
pub type Projection = Box<dyn Fn(Map<String, Value>) -> Map<String, Value> + Send + Sync>;

/// Body answering `get([key])` with the value stored under `key`.
///
/// An optional projection reshapes each snapshot on ingest, so a process
/// can keep only the fields it serves, under its own names.
pub struct KeyedBody {
    data: RwLock<Map<String, Value>>,
    projection: Option<Projection>,
}

impl KeyedBody {
    /// Create a body storing snapshots as-is.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(Map::new()),
            projection: None,
        }
    }

    /// Create a body that reshapes snapshots with `projection`.
    pub fn with_projection<F>(projection: F) -> Self
    where
        F: Fn(Map<String, Value>) -> Map<String, Value> + Send + Sync + 'static,
    {
        Self {
            data: RwLock::new(Map::new()),
            projection: Some(Box::new(projection)),
        }
    }

    /// Create a body that keeps only the listed fields, renamed.
    ///
    /// Each pair is `(source, target)`. A source missing from the snapshot
    /// stores `null` under its target.
    pub fn renaming<I, S, T>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, T)>,
        S: Into<String>,
        T: Into<String>,
    {
        let pairs: Vec<(String, String)> = pairs
            .into_iter()
            .map(|(s, t)| (s.into(), t.into()))
            .collect();
        Self::with_projection(move |mut source| {
            pairs
                .iter()
                .map(|(s, t)| (t.clone(), source.remove(s).unwrap_or(Value::Null)))
                .collect()
        })
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Check if nothing has been ingested.
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl Default for KeyedBody {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheBody for KeyedBody {
    fn renew(&self, raw: &[u8]) -> CacheResult<()> {
        let decoded: Map<String, Value> = serde_json::from_slice(raw)?;
        let data = match self.projection {
            Some(ref projection) => projection(decoded),
            None => decoded,
        };
        *self.data.write() = data;
        Ok(())
    }

    fn get(&self, params: &[Value]) -> CacheResult<Option<Value>> {
        let key = match params.first() {
            Some(Value::String(key)) => key,
            Some(other) => {
                return Err(CacheError::data_format(format!(
                    "lookup key must be a string, got: {}",
                    other
                )))
            }
            None => return Err(CacheError::data_format("lookup key missing")),
        };
        Ok(self.data.read().get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn snapshot_body_returns_whole_snapshot() {
        let body = SnapshotBody::new();
        assert_eq!(body.get(&[]).unwrap(), None);

        body.renew(br#"{"super":1}"#).unwrap();
        assert_eq!(body.get(&[json!("ignored")]).unwrap(), Some(json!({"super": 1})));
    }

    #[test]
    fn snapshot_body_keeps_previous_value_on_bad_bytes() {
        let body = SnapshotBody::new();
        body.renew(br#"{"a":"b"}"#).unwrap();
        assert!(body.renew(b"not json").is_err());
        assert_eq!(body.get(&[]).unwrap(), Some(json!({"a": "b"})));
    }

    #[test]
    fn renaming_projects_fields() {
        let body = KeyedBody::renaming([("1", "ru"), ("2", "vi"), ("3", "en")]);
        body.renew(br#"{"1":"Moscow","2":"Hanoi","3":"London","4":"Paris"}"#)
            .unwrap();

        assert_eq!(body.len(), 3);
        assert_eq!(body.get(&[json!("vi")]).unwrap(), Some(json!("Hanoi")));
        assert_eq!(body.get(&[json!("1")]).unwrap(), None);
    }

    #[test]
    fn keyed_lookup_requires_string_key() {
        let body = KeyedBody::new();
        assert!(matches!(body.get(&[]), Err(CacheError::DataFormat { .. })));
        assert!(matches!(
            body.get(&[json!(1)]),
            Err(CacheError::DataFormat { .. })
        ));
    }
}
