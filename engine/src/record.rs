//! Record types for transferred rows.
//!
//! Records are opaque column maps. The engine only ever looks at the `id`
//! column, the deferred-edge columns and the binary columns of a table.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of the identifier column every record carries.
pub const ID_FIELD: &str = "id";

/// Identifier of a record, as found in its `id` column.
///
/// Kept as a raw JSON value so integer and string keys survive a round trip
/// unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Value);

impl RecordId {
    /// The identifier as a JSON value.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self(Value::String(id.to_owned()))
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self(Value::String(id))
    }
}

impl From<i64> for RecordId {
    fn from(id: i64) -> Self {
        Self(Value::from(id))
    }
}

impl From<Value> for RecordId {
    fn from(id: Value) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Value::String(s) => f.write_str(s),
            other => write!(f, "{}", other),
        }
    }
}

/// A single row of a table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// The record's identifier, if it has a non-null `id` column.
    pub fn id(&self) -> Option<RecordId> {
        match self.0.get(ID_FIELD) {
            None | Some(Value::Null) => None,
            Some(id) => Some(RecordId(id.clone())),
        }
    }

    /// Get a column value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Get a column value, treating an absent column as null.
    pub fn get_or_null(&self, field: &str) -> &Value {
        self.0.get(field).unwrap_or(&Value::Null)
    }

    /// Set a column value, returning the previous one.
    pub fn set(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(field.into(), value)
    }

    /// Builder-style column setter.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value.into());
        self
    }

    /// Replace the column with null. Absent columns are added as null.
    pub fn null_out(&mut self, field: &str) {
        self.0.insert(field.to_owned(), Value::Null);
    }

    /// Replace the column with null only if the row has it.
    pub fn null_if_present(&mut self, field: &str) {
        if let Some(value) = self.0.get_mut(field) {
            *value = Value::Null;
        }
    }

    /// Column names and values.
    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Try to view an arbitrary JSON value as a record.
    pub fn from_value(value: &Value) -> Option<Self> {
        value.as_object().cloned().map(Self)
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Object(record.0)
    }
}
