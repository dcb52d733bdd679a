//! Stored documents and their JSON Lines representation

use crate::model::ATTR_STAND;
use crate::{Error, Result};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Identifier field used by exported documents
pub const ID_FIELD: &str = "_id";

/// A document as held by a store: an immutable id plus its top-level fields
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn has(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Name of the stand this document belongs to, if recorded
    pub fn stand(&self) -> Option<&str> {
        self.get(ATTR_STAND).and_then(Value::as_str)
    }

    /// Build a document from one exported JSON object
    ///
    /// `_id` may be a plain string, an extended-JSON `{"$oid": "..."}`
    /// object or a number; without one a fresh UUID is assigned.
    ///
    /// A non-string `_id` stays among the fields verbatim so that
    /// [`Document::to_json`] writes back the same shape.
    pub fn from_json(value: Value) -> Result<Self> {
        let mut fields = match value {
            Value::Object(map) => map,
            other => {
                return Err(Error::InvalidInput(format!(
                    "document must be a JSON object, got {}",
                    type_name(&other)
                )))
            }
        };

        let id = match fields.get(ID_FIELD).cloned() {
            Some(Value::String(id)) => {
                fields.retain(|key, _| key != ID_FIELD);
                id
            }
            Some(Value::Object(oid)) => match oid.get("$oid").and_then(Value::as_str) {
                Some(id) => id.to_string(),
                None => {
                    return Err(Error::InvalidInput(
                        "_id object has no $oid string".to_string(),
                    ))
                }
            },
            Some(Value::Number(n)) => n.to_string(),
            Some(other) => {
                return Err(Error::InvalidInput(format!(
                    "unsupported _id type: {}",
                    type_name(&other)
                )))
            }
            None => Uuid::new_v4().to_string(),
        };

        Ok(Self { id, fields })
    }

    /// Exported form, `_id` first and in its imported shape
    pub fn to_json(&self) -> Value {
        let id = self
            .fields
            .get(ID_FIELD)
            .cloned()
            .unwrap_or_else(|| Value::String(self.id.clone()));

        let mut map = Map::with_capacity(self.fields.len() + 1);
        map.insert(ID_FIELD.to_string(), id);
        for (key, value) in self.fields.iter().filter(|(key, _)| *key != ID_FIELD) {
            map.insert(key.clone(), value.clone());
        }
        Value::Object(map)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
