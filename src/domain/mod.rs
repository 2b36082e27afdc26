use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants;

/// A record in the document store: one flat JSON object per terrace permit.
pub type Document = serde_json::Map<String, Value>;

/// Shape of a heterogeneous input field. Capacity fields in the source data
/// arrive as any of these; the normalizer matches exhaustively instead of
/// coercing implicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldShape {
    Number,
    Text,
    Flag,
    Structured,
    Null,
    Absent,
}

impl FieldShape {
    pub fn of(value: Option<&Value>) -> Self {
        match value {
            None => FieldShape::Absent,
            Some(Value::Null) => FieldShape::Null,
            Some(Value::Number(_)) => FieldShape::Number,
            Some(Value::String(_)) => FieldShape::Text,
            Some(Value::Bool(_)) => FieldShape::Flag,
            Some(Value::Object(_)) | Some(Value::Array(_)) => FieldShape::Structured,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, FieldShape::Number)
    }
}

/// Three-state inspection flag: the sidewalk rule only defines it for
/// sidewalk terraces, everything else stays unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InspectFlag {
    Required,
    NotRequired,
    Unknown,
}

impl InspectFlag {
    pub fn from_document(doc: &Document) -> Self {
        match doc.get(constants::INSPECT) {
            Some(Value::Bool(true)) => InspectFlag::Required,
            Some(Value::Bool(false)) => InspectFlag::NotRequired,
            _ => InspectFlag::Unknown,
        }
    }

    pub fn as_option(self) -> Option<bool> {
        match self {
            InspectFlag::Required => Some(true),
            InspectFlag::NotRequired => Some(false),
            InspectFlag::Unknown => None,
        }
    }
}

/// Fixed annotation attached to every open terrace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Review {
    pub next_inspection: i64,
    pub score: i64,
    pub comment: String,
}

impl Review {
    pub fn standard() -> Self {
        Self {
            next_inspection: 10,
            score: 80,
            comment: "separate the tables".to_string(),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "next_inspection": self.next_inspection,
            "score": self.score,
            "comment": self.comment,
        })
    }
}

/// A district node, keyed by name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct District {
    pub name: String,
}

/// A neighborhood node. Identity is the (name, district) composite: the same
/// neighborhood name may exist in two districts and must stay two nodes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Neighborhood {
    pub name: String,
    pub district: String,
}

/// A venue node, keyed by its natural record identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Venue {
    pub id: String,
    pub address: Option<String>,
    pub number: Option<String>,
    pub postal_code: Option<String>,
    pub district: String,
    pub neighborhood: String,
}

/// A terrace node, keyed by its natural record identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Terrace {
    pub id: String,
    pub venue_id: String,
    pub access_type: Option<String>,
    pub inspect: Option<bool>,
}

/// Node and edge totals after a projection run.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct GraphCounts {
    pub districts: u64,
    pub neighborhoods: u64,
    pub venues: u64,
    pub terraces: u64,
    pub edges: u64,
}

/// Renders a scalar field as a string; identity fields arrive as either
/// strings or numbers depending on the source export.
pub fn string_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Looks up a field and renders it as a string if it is a scalar.
pub fn field_string(doc: &Document, field: &str) -> Option<String> {
    doc.get(field).and_then(string_of)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn field_shape_classification() {
        assert_eq!(FieldShape::of(None), FieldShape::Absent);
        assert_eq!(FieldShape::of(Some(&Value::Null)), FieldShape::Null);
        assert_eq!(FieldShape::of(Some(&json!(3))), FieldShape::Number);
        assert_eq!(FieldShape::of(Some(&json!("abc"))), FieldShape::Text);
        assert_eq!(FieldShape::of(Some(&json!({}))), FieldShape::Structured);
        assert_eq!(FieldShape::of(Some(&json!(true))), FieldShape::Flag);
        assert!(FieldShape::of(Some(&json!(3))).is_numeric());
        assert!(!FieldShape::of(Some(&json!("3"))).is_numeric());
    }

    #[test]
    fn inspect_flag_is_three_state() {
        let mut doc = Document::new();
        assert_eq!(InspectFlag::from_document(&doc), InspectFlag::Unknown);

        doc.insert(constants::INSPECT.to_string(), json!(true));
        assert_eq!(InspectFlag::from_document(&doc), InspectFlag::Required);

        doc.insert(constants::INSPECT.to_string(), json!(false));
        assert_eq!(InspectFlag::from_document(&doc), InspectFlag::NotRequired);

        // A malformed value is unknown, not defaulted
        doc.insert(constants::INSPECT.to_string(), json!("yes"));
        assert_eq!(InspectFlag::from_document(&doc), InspectFlag::Unknown);
        assert_eq!(InspectFlag::from_document(&doc).as_option(), None);
    }

    #[test]
    fn identity_fields_render_from_numbers_and_strings() {
        let mut doc = Document::new();
        doc.insert("local_id".to_string(), json!(285049));
        doc.insert("terrace_id".to_string(), json!("T-12"));
        assert_eq!(field_string(&doc, "local_id").as_deref(), Some("285049"));
        assert_eq!(field_string(&doc, "terrace_id").as_deref(), Some("T-12"));
        assert_eq!(field_string(&doc, "missing"), None);
    }
}
