//! Cloud Firestore client built on the REST `runQuery` endpoint.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::{
    Collection, Document, DocumentStore, FieldValue, OWNER_FIELD, StoreError, TRACING_TARGET_STORE,
};

/// Public Firestore REST endpoint.
pub const DEFAULT_FIRESTORE_URL: &str = "https://firestore.googleapis.com/v1";

/// Database id used when a project has a single database.
pub const DEFAULT_DATABASE: &str = "(default)";

/// Document store backed by Cloud Firestore (or its emulator).
#[derive(Clone)]
pub struct FirestoreStore {
    client: reqwest::Client,
    base_url: String,
    project_id: String,
    database: String,
    access_token: Option<String>,
}

impl std::fmt::Debug for FirestoreStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirestoreStore")
            .field("base_url", &self.base_url)
            .field("project_id", &self.project_id)
            .field("database", &self.database)
            .field("authenticated", &self.access_token.is_some())
            .finish()
    }
}

impl FirestoreStore {
    pub fn new(client: reqwest::Client, project_id: impl Into<String>) -> Self {
        Self {
            client,
            base_url: DEFAULT_FIRESTORE_URL.to_owned(),
            project_id: project_id.into(),
            database: DEFAULT_DATABASE.to_owned(),
            access_token: None,
        }
    }

    /// Overrides the REST base URL, e.g. `http://localhost:8080/v1` for the emulator.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    #[must_use]
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// OAuth access token sent as a bearer token. The emulator needs none.
    #[must_use]
    pub fn with_access_token(mut self, token: Option<String>) -> Self {
        self.access_token = token.filter(|t| !t.is_empty());
        self
    }

    fn run_query_url(&self) -> String {
        format!(
            "{}/projects/{}/databases/{}/documents:runQuery",
            self.base_url, self.project_id, self.database
        )
    }
}

/// Collection-group query for documents whose owner field equals `owner`.
pub(crate) fn owner_query(collection: Collection, owner: &str) -> Value {
    json!({
        "structuredQuery": {
            "from": [{ "collectionId": collection.id(), "allDescendants": true }],
            "where": {
                "fieldFilter": {
                    "field": { "fieldPath": OWNER_FIELD },
                    "op": "EQUAL",
                    "value": { "stringValue": owner }
                }
            }
        }
    })
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn query_owned(
        &self,
        collection: Collection,
        owner: &str,
    ) -> Result<Vec<Document>, StoreError> {
        let mut request = self
            .client
            .post(self.run_query_url())
            .json(&owner_query(collection, owner));
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = api_error_message(&body);
            tracing::warn!(
                target: TRACING_TARGET_STORE,
                collection = %collection,
                status = status.as_u16(),
                message = %message,
                "firestore query rejected"
            );
            return Err(StoreError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let rows: Vec<RunQueryRow> = response.json().await?;
        let documents = rows
            .into_iter()
            .filter_map(|row| row.document)
            .map(RawDocument::decode)
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            target: TRACING_TARGET_STORE,
            collection = %collection,
            count = documents.len(),
            "firestore query completed"
        );
        Ok(documents)
    }
}

// ============================================================================
// WIRE FORMAT
// ============================================================================

/// One element of the streamed `runQuery` response. Rows without a document
/// only carry progress metadata such as `readTime`.
#[derive(Debug, Deserialize)]
struct RunQueryRow {
    #[serde(default)]
    document: Option<RawDocument>,
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

impl RawDocument {
    fn decode(self) -> Result<Document, StoreError> {
        let id = self
            .name
            .rsplit('/')
            .next()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| StoreError::Decode(format!("invalid document name `{}`", self.name)))?
            .to_owned();

        let mut fields = BTreeMap::new();
        for (name, value) in self.fields {
            match decode_value(&value)? {
                Some(decoded) => {
                    fields.insert(name, decoded);
                }
                None => tracing::trace!(
                    target: TRACING_TARGET_STORE,
                    document = %id,
                    field = %name,
                    "skipping field of unsupported type"
                ),
            }
        }

        Ok(Document { id, fields })
    }
}

/// Decodes a typed Firestore value such as `{"integerValue": "5"}`.
///
/// Maps, arrays, references, geo points and bytes are not used by any record
/// and decode to `None`.
pub(crate) fn decode_value(value: &Value) -> Result<Option<FieldValue>, StoreError> {
    let Some((kind, inner)) = value.as_object().and_then(|obj| obj.iter().next()) else {
        return Err(StoreError::Decode(format!("untyped value {value}")));
    };

    let malformed = || StoreError::Decode(format!("malformed {kind}: {inner}"));
    let decoded = match kind.as_str() {
        "nullValue" => FieldValue::Null,
        "booleanValue" => FieldValue::Boolean(inner.as_bool().ok_or_else(malformed)?),
        "stringValue" => FieldValue::String(inner.as_str().ok_or_else(malformed)?.to_owned()),
        // int64 values travel as JSON strings.
        "integerValue" => FieldValue::Integer(match inner {
            Value::String(s) => s.parse().map_err(|_| malformed())?,
            other => other.as_i64().ok_or_else(malformed)?,
        }),
        "doubleValue" => FieldValue::Double(match inner {
            Value::String(s) => s.parse().map_err(|_| malformed())?,
            other => other.as_f64().ok_or_else(malformed)?,
        }),
        "timestampValue" => {
            let raw = inner.as_str().ok_or_else(malformed)?;
            let parsed = DateTime::parse_from_rfc3339(raw).map_err(|_| malformed())?;
            FieldValue::Timestamp(parsed.with_timezone(&Utc))
        }
        _ => return Ok(None),
    };
    Ok(Some(decoded))
}

/// Extracts `error.message` from a Google API error body, falling back to the raw body.
fn api_error_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let error = parsed.as_ref().map(|v| match v {
        // runQuery may wrap the error in a one-element array.
        Value::Array(items) => items.first().unwrap_or(v),
        _ => v,
    });
    error
        .and_then(|v| v["error"]["message"].as_str())
        .map(str::to_owned)
        .unwrap_or_else(|| body.trim().to_owned())
}
