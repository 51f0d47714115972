//! Generic row carrier: a JSON object keyed by storage (snake_case) column
//! names, with typed accessors for the common envelope fields shared by every
//! table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Envelope columns present on every managed table. Generated entity fields
/// exclude these.
pub const ENVELOPE_COLUMNS: [&str; 5] = ["id", "normal", "version", "update_time", "extra"];

/// `normal` value for a live row.
pub const NORMAL_ALIVE: i64 = 1;
/// `normal` value for a soft-deleted row.
pub const NORMAL_DELETED: i64 = 0;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Record { fields: Map::new() }
    }

    /// Wrap a JSON object whose keys are already storage column names.
    pub fn from_map(fields: Map<String, Value>) -> Self {
        Record { fields }
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.fields
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.get(column)
    }

    pub fn set(&mut self, column: impl Into<String>, value: Value) {
        self.fields.insert(column.into(), value);
    }

    pub fn contains(&self, column: &str) -> bool {
        matches!(self.fields.get(column), Some(v) if !v.is_null())
    }

    fn get_i64(&self, column: &str) -> Option<i64> {
        self.fields.get(column).and_then(Value::as_i64)
    }

    pub fn id(&self) -> Option<i64> {
        self.get_i64("id")
    }

    /// Ids are immutable once assigned; callers set this only during insert
    /// field-filling.
    pub fn set_id(&mut self, id: i64) {
        self.fields.insert("id".into(), Value::from(id));
    }

    pub fn normal(&self) -> Option<i64> {
        self.get_i64("normal")
    }

    pub fn set_normal(&mut self, normal: i64) {
        self.fields.insert("normal".into(), Value::from(normal));
    }

    pub fn version(&self) -> Option<i64> {
        self.get_i64("version")
    }

    pub fn set_version(&mut self, version: i64) {
        self.fields.insert("version".into(), Value::from(version));
    }

    pub fn update_time(&self) -> Option<&str> {
        self.fields.get("update_time").and_then(Value::as_str)
    }

    pub fn set_update_time(&mut self, at: DateTime<Utc>) {
        self.fields
            .insert("update_time".into(), Value::String(at.to_rfc3339()));
    }

    pub fn extra(&self) -> Option<&str> {
        self.fields.get("extra").and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_accessors() {
        let mut rec = Record::new();
        assert_eq!(rec.id(), None);
        rec.set_id(42);
        rec.set_normal(NORMAL_ALIVE);
        rec.set_version(42);
        rec.set_update_time(Utc::now());
        assert_eq!(rec.id(), Some(42));
        assert_eq!(rec.normal(), Some(1));
        assert_eq!(rec.version(), Some(42));
        assert!(rec.update_time().is_some());
    }

    #[test]
    fn contains_treats_null_as_absent() {
        let rec = Record::from_map(
            json!({"version": null, "username": "a"})
                .as_object()
                .unwrap()
                .clone(),
        );
        assert!(!rec.contains("version"));
        assert!(rec.contains("username"));
    }
}
