//! Read-only access to the document store holding users' items, lists and folders.

mod firestore;
mod memory;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use firestore::{DEFAULT_DATABASE, DEFAULT_FIRESTORE_URL, FirestoreStore};
pub use memory::MemoryStore;

/// Tracing target for document store operations.
pub const TRACING_TARGET_STORE: &str = "docit_functions::store";

/// Field holding the identifier of the user that created a document.
pub const OWNER_FIELD: &str = "createdBy";

/// Collection groups the data-fetch tools read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Items,
    Lists,
    Folders,
}

impl Collection {
    /// Collection id as stored; every sub-collection with this id is part of the group.
    pub const fn id(self) -> &'static str {
        match self {
            Self::Items => "items",
            Self::Lists => "lists",
            Self::Folders => "folders",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// A decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Timestamp(DateTime<Utc>),
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

/// A document as returned by the store: its id and top-level fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: BTreeMap<String, FieldValue>,
}

impl Document {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Value of [`OWNER_FIELD`], when it is a string.
    pub fn owner(&self) -> Option<&str> {
        match self.get(OWNER_FIELD) {
            Some(FieldValue::String(owner)) => Some(owner),
            _ => None,
        }
    }
}

/// Errors raised while querying the store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document store request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("document store rejected the query ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("malformed document store response: {0}")]
    Decode(String),
}

/// Read-only query surface the data-fetch tools depend on.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Returns every document in the `collection` group whose [`OWNER_FIELD`]
    /// equals `owner`, in store order.
    async fn query_owned(
        &self,
        collection: Collection,
        owner: &str,
    ) -> Result<Vec<Document>, StoreError>;
}
