use crate::adapter::{DataApiError, DataApiResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Schemaless document as exchanged with the Data API.
pub type Document = Map<String, Value>;

/// Public identity of a document: the hex string the store assigned.
pub type DocumentId = String;

/// Scope of every request issued by a collection client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreTarget {
    pub data_source: String,
    pub database: String,
    pub collection: String,
}

impl StoreTarget {
    pub fn new(
        data_source: impl Into<String>,
        database: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            data_source: data_source.into(),
            database: database.into(),
            collection: collection.into(),
        }
    }
}

/// Query fields forwarded to the store untouched.
///
/// `filter`, `sort` and `update` are sent as `{}` when absent. `projection`, `limit` and
/// `skip` are only sent when set.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub filter: Option<Document>,
    pub sort: Option<Document>,
    pub update: Option<Document>,
    pub projection: Option<Document>,
    pub limit: Option<u64>,
    pub skip: Option<u64>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(filter: Document) -> Self {
        Self {
            filter: Some(filter),
            ..Self::default()
        }
    }

    pub fn with_sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_update(mut self, update: Document) -> Self {
        self.update = Some(update);
        self
    }

    pub fn with_projection(mut self, projection: Document) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Same filter, nothing else. Used by the composite operations for their lookups.
    pub(crate) fn filter_only(&self) -> Self {
        Self {
            filter: self.filter.clone(),
            ..Self::default()
        }
    }
}

/// Which snapshot `find_one_and_update` hands back.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnDocument {
    /// The document as located before the update was sent.
    #[default]
    Before,
    /// The document as re-fetched after the update round trip.
    After,
}

/// How inserted identities are turned back into documents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterializeStrategy {
    /// One lookup at a time, in identity order.
    #[default]
    Sequential,
    /// All lookups in flight together; results are re-associated by position.
    Concurrent,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FindOneAndUpdateResult {
    pub found: bool,
    pub updated: bool,
    pub document: Option<Document>,
}

impl FindOneAndUpdateResult {
    pub fn not_found() -> Self {
        Self::default()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FindOneAndDeleteResult {
    pub found: bool,
    pub deleted: bool,
    pub document: Option<Document>,
}

impl FindOneAndDeleteResult {
    pub fn not_found() -> Self {
        Self::default()
    }
}

/// Converts a JSON value into a [`Document`], rejecting anything but an object.
pub fn into_document(value: Value) -> DataApiResult<Document> {
    match value {
        Value::Object(document) => Ok(document),
        other => Err(DataApiError::InvalidInput(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
