//! Descriptor-driven row decoding: each cell is read with the type its
//! semantic tag prescribes instead of probing every driver type.

use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{Column, Row};

use crate::descriptor::{EntityType, SemanticType};
use crate::record::Record;

/// Decode a row into a [`Record`] using the entity's column semantics. Columns
/// without a descriptor entry (e.g. expressions) fall back to probing.
pub fn row_to_record(entity: &EntityType, row: &PgRow) -> Record {
    let mut record = Record::new();
    for column in row.columns() {
        let name = column.name();
        let value = match entity.semantic(name) {
            Some(semantic) => cell_to_value(row, name, semantic),
            None => probe_cell(row, name),
        };
        record.set(name, value);
    }
    record
}

fn cell_to_value(row: &PgRow, name: &str, semantic: SemanticType) -> Value {
    match semantic {
        SemanticType::Integer => row
            .try_get::<Option<i32>, _>(name)
            .ok()
            .flatten()
            .map(Value::from)
            // Narrow storage still arrives as i16 for int2 columns.
            .or_else(|| {
                row.try_get::<Option<i16>, _>(name)
                    .ok()
                    .flatten()
                    .map(|n| Value::from(n as i64))
            })
            .unwrap_or(Value::Null),
        SemanticType::BigInt => row
            .try_get::<Option<i64>, _>(name)
            .ok()
            .flatten()
            .map(Value::from)
            .unwrap_or(Value::Null),
        SemanticType::Float => row
            .try_get::<Option<f32>, _>(name)
            .ok()
            .flatten()
            .and_then(|n| serde_json::Number::from_f64(n as f64))
            .map(Value::Number)
            .unwrap_or(Value::Null),
        SemanticType::Double => row
            .try_get::<Option<f64>, _>(name)
            .ok()
            .flatten()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        // Decimal columns are selected with a ::text cast.
        SemanticType::Decimal | SemanticType::Text => row
            .try_get::<Option<String>, _>(name)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
        SemanticType::Bool => row
            .try_get::<Option<bool>, _>(name)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),
        SemanticType::Timestamp => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name)
            .ok()
            .flatten()
            .map(|d| Value::String(d.to_rfc3339()))
            .or_else(|| {
                row.try_get::<Option<chrono::NaiveDateTime>, _>(name)
                    .ok()
                    .flatten()
                    .map(|d| Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
            })
            .unwrap_or(Value::Null),
        SemanticType::Date => row
            .try_get::<Option<chrono::NaiveDate>, _>(name)
            .ok()
            .flatten()
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
            .unwrap_or(Value::Null),
        SemanticType::Uuid => row
            .try_get::<Option<uuid::Uuid>, _>(name)
            .ok()
            .flatten()
            .map(|u| Value::String(u.to_string()))
            .unwrap_or(Value::Null),
        SemanticType::Bytes => row
            .try_get::<Option<Vec<u8>>, _>(name)
            .ok()
            .flatten()
            .map(|b| Value::Array(b.into_iter().map(Value::from).collect()))
            .unwrap_or(Value::Null),
        SemanticType::Json => row
            .try_get::<Option<Value>, _>(name)
            .ok()
            .flatten()
            .unwrap_or(Value::Null),
    }
}

fn probe_cell(row: &PgRow, name: &str) -> Value {
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::from(n);
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::from(n);
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(v)) = row.try_get::<Option<Value>, _>(name) {
        return v;
    }
    Value::Null
}
