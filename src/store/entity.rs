//! Value container stored per key

use bytes::Bytes;

/// A value held by the keyspace
///
/// The keyspace never looks inside; entities are replaced wholesale on
/// update and shared behind an `Arc` once stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataEntity {
    pub data: Bytes,
}

impl DataEntity {
    pub fn new(data: impl Into<Bytes>) -> Self {
        DataEntity { data: data.into() }
    }

    /// Type name reported by TYPE
    pub fn type_name(&self) -> &'static str {
        "string"
    }
}
