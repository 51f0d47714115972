//! Runtime type descriptors: the boot-time-derived, immutable model of every
//! table's shape, plus the registry that resolves them by table name.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use crate::error::AppError;
use crate::record::ENVELOPE_COLUMNS;

/// Database-portable semantic type tag derived from the column's storage type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SemanticType {
    Integer,
    BigInt,
    Float,
    Double,
    Decimal,
    Bool,
    Text,
    Timestamp,
    Date,
    Uuid,
    Bytes,
    Json,
}

impl SemanticType {
    /// Map a PostgreSQL udt name to a semantic type. Total: anything not
    /// recognized decodes as text. `int2` deliberately maps to a full Integer
    /// rather than a byte-sized type.
    pub fn from_udt_name(udt: &str) -> SemanticType {
        match udt {
            "int2" | "int4" | "serial" => SemanticType::Integer,
            "int8" | "bigserial" => SemanticType::BigInt,
            "float4" => SemanticType::Float,
            "float8" => SemanticType::Double,
            "numeric" => SemanticType::Decimal,
            "bool" => SemanticType::Bool,
            "timestamp" | "timestamptz" => SemanticType::Timestamp,
            "date" => SemanticType::Date,
            "uuid" => SemanticType::Uuid,
            "bytea" => SemanticType::Bytes,
            "json" | "jsonb" => SemanticType::Json,
            _ => SemanticType::Text,
        }
    }

    /// Cast suffix used when binding parameters (e.g. `$1::timestamptz`), so
    /// string-encoded values bind correctly.
    pub fn pg_cast(&self) -> Option<&'static str> {
        match self {
            SemanticType::Timestamp => Some("timestamptz"),
            SemanticType::Date => Some("date"),
            SemanticType::Uuid => Some("uuid"),
            SemanticType::Decimal => Some("numeric"),
            SemanticType::Json => Some("jsonb"),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ColumnDescriptor {
    pub column: String,
    /// Raw storage type name as discovered (udt name).
    pub type_name: String,
    pub semantic: SemanticType,
    pub comment: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct TableDescriptor {
    pub table: String,
    /// Ordered as discovered from the catalog.
    pub columns: Vec<ColumnDescriptor>,
    pub primary_keys: BTreeSet<String>,
    /// Single-column secondary indexes; composite indexes are ignored.
    pub index_columns: BTreeSet<String>,
    /// Owning datasource; None for the default datasource.
    pub datasource: Option<String>,
    pub comment: Option<String>,
}

impl TableDescriptor {
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.column == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }
}

/// Resolved runtime type for one table: the descriptor plus the semantic type
/// of every table-specific field (envelope columns excluded).
#[derive(Clone, Debug)]
pub struct EntityType {
    pub descriptor: TableDescriptor,
    pub fields: BTreeMap<String, SemanticType>,
}

impl EntityType {
    fn from_descriptor(descriptor: TableDescriptor) -> EntityType {
        let fields = descriptor
            .columns
            .iter()
            .filter(|c| !ENVELOPE_COLUMNS.contains(&c.column.as_str()))
            .map(|c| (c.column.clone(), c.semantic))
            .collect();
        EntityType { descriptor, fields }
    }

    pub fn semantic(&self, column: &str) -> Option<SemanticType> {
        self.descriptor.column(column).map(|c| c.semantic)
    }
}

/// Append-only registry of entity types, populated during the single-threaded
/// boot phase and read-only afterwards.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: HashMap<String, Arc<EntityType>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        TypeRegistry::default()
    }

    pub fn register(&mut self, descriptor: TableDescriptor) -> Arc<EntityType> {
        let entity = Arc::new(EntityType::from_descriptor(descriptor));
        self.types
            .insert(entity.descriptor.table.clone(), entity.clone());
        entity
    }

    /// Unknown table names are a caller/config error, surfaced as a typed
    /// error rather than a panic.
    pub fn resolve(&self, table: &str) -> Result<Arc<EntityType>, AppError> {
        self.types
            .get(table)
            .cloned()
            .ok_or_else(|| AppError::DescriptorNotFound(table.to_string()))
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
pub(crate) fn test_descriptor(table: &str, extra: &[(&str, &str)]) -> TableDescriptor {
    let mut columns = vec![
        ("id", "int8"),
        ("normal", "int4"),
        ("version", "int8"),
        ("update_time", "timestamptz"),
        ("extra", "text"),
    ];
    columns.extend_from_slice(extra);
    TableDescriptor {
        table: table.to_string(),
        columns: columns
            .into_iter()
            .map(|(name, udt)| ColumnDescriptor {
                column: name.to_string(),
                type_name: udt.to_string(),
                semantic: SemanticType::from_udt_name(udt),
                comment: None,
            })
            .collect(),
        primary_keys: ["id".to_string()].into_iter().collect(),
        index_columns: BTreeSet::new(),
        datasource: None,
        comment: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrow_integers_map_to_full_integer() {
        assert_eq!(SemanticType::from_udt_name("int2"), SemanticType::Integer);
        assert_eq!(SemanticType::from_udt_name("int4"), SemanticType::Integer);
        assert_eq!(SemanticType::from_udt_name("int8"), SemanticType::BigInt);
        assert_eq!(SemanticType::from_udt_name("madeup"), SemanticType::Text);
    }

    #[test]
    fn entity_type_excludes_envelope_fields() {
        let mut registry = TypeRegistry::new();
        let entity =
            registry.register(test_descriptor("user", &[("username", "text"), ("age", "int2")]));
        assert_eq!(entity.fields.len(), 2);
        assert!(!entity.fields.contains_key("id"));
        assert_eq!(entity.fields["age"], SemanticType::Integer);
    }

    #[test]
    fn resolve_unknown_table_is_an_error() {
        let registry = TypeRegistry::new();
        let err = registry.resolve("missing").unwrap_err();
        assert!(matches!(err, AppError::DescriptorNotFound(t) if t == "missing"));
    }
}
