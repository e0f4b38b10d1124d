//! Flat record shapes returned to the model, and their normalization from
//! stored documents.

use assist_macros::ToolSchema;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{Document, FieldValue};

/// Renders a timestamp the way `Date.prototype.toLocaleString()` does for
/// `en-US` in UTC, e.g. `1/15/2024, 10:30:00 AM`.
pub fn format_locale(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%-m/%-d/%Y, %-I:%M:%S %p").to_string()
}

/// A document could not be shaped into a record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("document `{id}` is missing required field `{field}`")]
    MissingField { id: String, field: &'static str },

    #[error("document `{id}` field `{field}` is not {expected}")]
    WrongType {
        id: String,
        field: &'static str,
        expected: &'static str,
    },
}

/// An item owned by a user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToolSchema)]
#[serde(rename_all = "camelCase")]
pub struct ItemRecord {
    /// Document id.
    pub id: String,
    pub name: String,
    /// How many of this item there are.
    pub count: i64,
    /// Creation time, locale formatted.
    pub date_created: String,
    /// Empty when the item has no description.
    pub description: String,
    /// Last modification time, locale formatted; empty when never modified.
    pub date_modified: String,
}

/// A list or folder owned by a user. Both collections share this shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToolSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListRecord {
    /// Document id.
    pub id: String,
    pub name: String,
    /// Creation time, locale formatted.
    pub date_created: String,
    /// Empty when there is no description.
    pub description: String,
    /// Last modification time, locale formatted; empty when never modified.
    pub date_modified: String,
}

impl ItemRecord {
    pub fn from_document(doc: &Document) -> Result<Self, RecordError> {
        let fields = CommonFields::read(doc)?;
        let count = match doc.get("count") {
            Some(FieldValue::Integer(n)) => *n,
            Some(FieldValue::Double(n)) if n.fract() == 0.0 => *n as i64,
            Some(_) => return Err(wrong_type(doc, "count", "an integer")),
            None => return Err(missing(doc, "count")),
        };

        Ok(Self {
            id: doc.id.clone(),
            name: fields.name,
            count,
            date_created: fields.date_created,
            description: fields.description,
            date_modified: fields.date_modified,
        })
    }
}

impl ListRecord {
    pub fn from_document(doc: &Document) -> Result<Self, RecordError> {
        let fields = CommonFields::read(doc)?;
        Ok(Self {
            id: doc.id.clone(),
            name: fields.name,
            date_created: fields.date_created,
            description: fields.description,
            date_modified: fields.date_modified,
        })
    }
}

struct CommonFields {
    name: String,
    date_created: String,
    description: String,
    date_modified: String,
}

impl CommonFields {
    fn read(doc: &Document) -> Result<Self, RecordError> {
        let name = match doc.get("name") {
            Some(FieldValue::String(name)) => name.clone(),
            Some(_) => return Err(wrong_type(doc, "name", "a string")),
            None => return Err(missing(doc, "name")),
        };
        let date_created =
            date_text(doc, "dateCreated")?.ok_or_else(|| missing(doc, "dateCreated"))?;
        let description = match doc.get("description") {
            Some(FieldValue::String(text)) => text.clone(),
            Some(FieldValue::Null) | None => String::new(),
            Some(_) => return Err(wrong_type(doc, "description", "a string")),
        };
        let date_modified = date_text(doc, "dateModified")?.unwrap_or_default();

        Ok(Self {
            name,
            date_created,
            description,
            date_modified,
        })
    }
}

/// Timestamps are locale formatted; dates already stored as text pass through.
fn date_text(doc: &Document, field: &'static str) -> Result<Option<String>, RecordError> {
    match doc.get(field) {
        Some(FieldValue::Timestamp(ts)) => Ok(Some(format_locale(ts))),
        Some(FieldValue::String(text)) => Ok(Some(text.clone())),
        Some(FieldValue::Null) | None => Ok(None),
        Some(_) => Err(wrong_type(doc, field, "a timestamp")),
    }
}

fn missing(doc: &Document, field: &'static str) -> RecordError {
    RecordError::MissingField {
        id: doc.id.clone(),
        field,
    }
}

fn wrong_type(doc: &Document, field: &'static str, expected: &'static str) -> RecordError {
    RecordError::WrongType {
        id: doc.id.clone(),
        field,
        expected,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn created() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 22, 5, 9).unwrap()
    }

    #[test]
    fn formats_like_en_us_locale() {
        assert_eq!(format_locale(&created()), "1/15/2024, 10:05:09 PM");
        let morning = Utc.with_ymd_and_hms(2023, 11, 3, 0, 0, 0).unwrap();
        assert_eq!(format_locale(&morning), "11/3/2023, 12:00:00 AM");
    }

    #[test]
    fn item_defaults_optional_fields() {
        let doc = Document::new("i1")
            .with_field("name", "Run")
            .with_field("count", 5_i64)
            .with_field("dateCreated", created())
            .with_field("createdBy", "u1");

        let record = ItemRecord::from_document(&doc).unwrap();
        assert_eq!(
            record,
            ItemRecord {
                id: "i1".into(),
                name: "Run".into(),
                count: 5,
                date_created: "1/15/2024, 10:05:09 PM".into(),
                description: String::new(),
                date_modified: String::new(),
            }
        );
    }

    #[test]
    fn list_keeps_present_optional_fields() {
        let doc = Document::new("l1")
            .with_field("name", "Errands")
            .with_field("dateCreated", created())
            .with_field("description", "weekly")
            .with_field("dateModified", "yesterday");

        let record = ListRecord::from_document(&doc).unwrap();
        assert_eq!(record.description, "weekly");
        assert_eq!(record.date_modified, "yesterday");
    }

    #[test]
    fn null_description_becomes_empty() {
        let doc = Document::new("f1")
            .with_field("name", "Docs")
            .with_field("dateCreated", created())
            .with_field("description", FieldValue::Null);

        assert_eq!(ListRecord::from_document(&doc).unwrap().description, "");
    }

    #[test]
    fn reports_missing_and_mistyped_fields() {
        let no_date = Document::new("l2").with_field("name", "x");
        assert_eq!(
            ListRecord::from_document(&no_date).unwrap_err(),
            RecordError::MissingField {
                id: "l2".into(),
                field: "dateCreated"
            }
        );

        let bad_count = Document::new("i2")
            .with_field("name", "x")
            .with_field("dateCreated", created())
            .with_field("count", "many");
        assert!(matches!(
            ItemRecord::from_document(&bad_count),
            Err(RecordError::WrongType { field: "count", .. })
        ));
    }

    #[test]
    fn serializes_camel_case() {
        let doc = Document::new("l1")
            .with_field("name", "Errands")
            .with_field("dateCreated", created());
        let value = serde_json::to_value(ListRecord::from_document(&doc).unwrap()).unwrap();
        assert_eq!(value["dateCreated"], "1/15/2024, 10:05:09 PM");
        assert_eq!(value["dateModified"], "");
    }
}
