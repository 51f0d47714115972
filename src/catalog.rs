//! Schema catalog discovery: reads table, column and index metadata from a
//! PostgreSQL connection at boot and turns it into table descriptors.

use sqlx::PgPool;
use std::collections::{BTreeMap, HashMap};

use crate::descriptor::{ColumnDescriptor, SemanticType, TableDescriptor};
use crate::error::AppError;

const SCHEMA: &str = "public";

/// Discover every table of one datasource. Any I/O error aborts discovery for
/// this datasource; no partial descriptor map is returned.
pub async fn discover(
    datasource: Option<&str>,
    pool: &PgPool,
) -> Result<BTreeMap<String, TableDescriptor>, AppError> {
    let tables: Vec<(String, Option<String>)> = sqlx::query_as(
        "SELECT c.relname, obj_description(c.oid, 'pg_class') \
         FROM pg_class c JOIN pg_namespace n ON n.oid = c.relnamespace \
         WHERE n.nspname = $1 AND c.relkind = 'r' ORDER BY c.relname",
    )
    .bind(SCHEMA)
    .fetch_all(pool)
    .await?;

    let columns: Vec<(String, String, String, Option<String>)> = sqlx::query_as(
        "SELECT c.table_name, c.column_name, c.udt_name, \
                col_description((quote_ident(c.table_schema) || '.' || quote_ident(c.table_name))::regclass::oid, c.ordinal_position::int) \
         FROM information_schema.columns c \
         WHERE c.table_schema = $1 ORDER BY c.table_name, c.ordinal_position",
    )
    .bind(SCHEMA)
    .fetch_all(pool)
    .await?;

    let mut columns_by_table: BTreeMap<String, Vec<ColumnDescriptor>> = BTreeMap::new();
    for (table, column, udt, comment) in columns {
        columns_by_table
            .entry(table)
            .or_default()
            .push(ColumnDescriptor {
                column,
                semantic: SemanticType::from_udt_name(&udt),
                type_name: udt,
                comment,
            });
    }

    // Single-column indexes only; composite indexes are ignored.
    let indexes: Vec<(String, String, bool)> = sqlx::query_as(
        "SELECT t.relname, a.attname, ix.indisprimary \
         FROM pg_index ix \
         JOIN pg_class t ON t.oid = ix.indrelid \
         JOIN pg_namespace n ON n.oid = t.relnamespace \
         JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey) \
         WHERE n.nspname = $1 AND ix.indnatts = 1",
    )
    .bind(SCHEMA)
    .fetch_all(pool)
    .await?;

    let mut descriptors = BTreeMap::new();
    for (table, comment) in tables {
        // Metadata races can yield a table with no visible columns; skip it.
        let Some(columns) = columns_by_table.remove(&table) else {
            tracing::warn!(table = %table, "table has no discovered columns, skipping");
            continue;
        };
        let mut descriptor = TableDescriptor {
            table: table.clone(),
            columns,
            primary_keys: Default::default(),
            index_columns: Default::default(),
            datasource: datasource.map(String::from),
            comment,
        };
        for (index_table, column, is_primary) in &indexes {
            if *index_table != table {
                continue;
            }
            if *is_primary {
                descriptor.primary_keys.insert(column.clone());
            } else {
                descriptor.index_columns.insert(column.clone());
            }
        }
        descriptors.insert(table, descriptor);
    }

    tracing::info!(
        datasource = datasource.unwrap_or("default"),
        tables = descriptors.len(),
        "catalog discovered"
    );
    Ok(descriptors)
}

/// Discover every configured datasource and merge the results, plus the
/// table -> datasource binding map for non-default datasources. The default
/// datasource is discovered first so that a table visible in both the default
/// and a named datasource ends up bound to the named one.
pub async fn discover_all(
    pools: &HashMap<String, PgPool>,
    default_name: &str,
) -> Result<(BTreeMap<String, TableDescriptor>, HashMap<String, String>), AppError> {
    let mut merged = BTreeMap::new();
    let mut bindings = HashMap::new();

    let mut names: Vec<&str> = pools.keys().map(String::as_str).collect();
    names.sort_unstable();
    names.sort_by_key(|name| *name != default_name);

    for name in names {
        let is_default = name == default_name;
        let datasource = (!is_default).then_some(name);
        let descriptors = discover(datasource, &pools[name]).await?;
        for (table, descriptor) in descriptors {
            if !is_default {
                bindings.insert(table.clone(), name.to_string());
            }
            merged.insert(table, descriptor);
        }
    }
    Ok((merged, bindings))
}
