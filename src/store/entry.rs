//! Shared-store entries and the export/import capability.
//!
//! Anything persisted through the gateway implements [`EntryData`]: it
//! exports itself as a field mapping and can be rebuilt from one. The
//! refresh loops publish [`SnapshotEntry`], which wraps the producer's JSON
//! mapping in a single `body` bytes field.

use crate::core::error::{CacheError, CacheResult};
use bytes::Bytes;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

/// Name of the field carrying the encoded snapshot.
pub const BODY_FIELD: &str = "body";

/// Metadata field carrying the entry's tags.
pub const TAGS_FIELD: &str = "tags";

/// Metadata field carrying the unprefixed primary key.
pub const ID_FIELD: &str = "id";

/// A single stored field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Raw bytes.
    Bytes(Bytes),
    /// UTF-8 string.
    Str(String),
    /// Signed integer.
    Int(i64),
    /// List of strings.
    List(Vec<String>),
}

impl FieldValue {
    /// Borrow the bytes of a `Bytes` field.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

/// Field mapping as stored in the shared store.
pub type Fields = BTreeMap<String, FieldValue>;

/// Fields plus the TTL they are written with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Stored fields.
    pub fields: Fields,
    /// Time to live in the shared store.
    pub ttl: Duration,
}

impl CacheEntry {
    /// Create an entry.
    pub fn new(fields: Fields, ttl: Duration) -> Self {
        Self { fields, ttl }
    }
}

/// Export/import capability for values persisted through the gateway.
pub trait EntryData: Send + Sync {
    /// Convert the value into a field mapping.
    fn export(&self) -> Fields;

    /// Rebuild the value from a field mapping.
    fn import(&mut self, fields: Fields) -> CacheResult<()>;

    /// Field names to request on reads.
    fn field_names(&self) -> Vec<String> {
        self.export().into_keys().collect()
    }
}

/// Producer output encoded as one JSON `body` field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotEntry {
    body: Bytes,
}

impl SnapshotEntry {
    /// Create an entry with an empty body.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Encode a JSON mapping.
    pub fn from_map(data: &Map<String, Value>) -> CacheResult<Self> {
        let body = serde_json::to_vec(data)?;
        Ok(Self {
            body: Bytes::from(body),
        })
    }

    /// Wrap already-encoded bytes.
    pub fn from_bytes(body: impl Into<Bytes>) -> Self {
        Self { body: body.into() }
    }

    /// Encoded body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Check if nothing has been loaded.
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Decode the body back into a JSON mapping.
    pub fn decode(&self) -> CacheResult<Map<String, Value>> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

impl EntryData for SnapshotEntry {
    fn export(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert(BODY_FIELD.to_string(), FieldValue::Bytes(self.body.clone()));
        fields
    }

    fn import(&mut self, mut fields: Fields) -> CacheResult<()> {
        match fields.remove(BODY_FIELD) {
            Some(FieldValue::Bytes(body)) => {
                self.body = body;
                Ok(())
            }
            Some(_) => Err(CacheError::data_format("body field is not bytes")),
            None => Err(CacheError::data_format("body field missing")),
        }
    }

    fn field_names(&self) -> Vec<String> {
        vec![BODY_FIELD.to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn export_carries_json_body() {
        let data = json!({"super": 1, "puper": "asdsadsadasd"});
        let entry = SnapshotEntry::from_map(data.as_object().unwrap()).unwrap();
        let fields = entry.export();
        let body = fields[BODY_FIELD].as_bytes().unwrap();
        assert_eq!(&body[..], br#"{"puper":"asdsadsadasd","super":1}"#);
    }

    #[test]
    fn empty_entry_has_no_body() {
        let entry = SnapshotEntry::empty();
        assert!(entry.is_empty());
        assert!(entry.decode().is_err());
    }

    #[test]
    fn import_rejects_non_bytes_body() {
        let mut entry = SnapshotEntry::empty();
        let mut fields = Fields::new();
        fields.insert(BODY_FIELD.to_string(), FieldValue::Str("x".to_string()));
        assert!(matches!(
            entry.import(fields),
            Err(CacheError::DataFormat { .. })
        ));
        assert!(matches!(
            entry.import(Fields::new()),
            Err(CacheError::DataFormat { .. })
        ));
    }
}
