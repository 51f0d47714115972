//! Builds parameterized INSERT, SELECT, UPDATE and DELETE statements from an
//! entity type plus a compiled predicate.

use serde_json::Value;

use crate::descriptor::EntityType;
use crate::record::{Record, NORMAL_ALIVE, NORMAL_DELETED};
use crate::sql::predicate::{quote_ident, CompiledQuery};

pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: Value) -> usize {
        self.params.push(v);
        self.params.len()
    }
}

/// SELECT list: requested columns (already storage-named) intersected with the
/// descriptor, or every descriptor column when none were requested. Decimal
/// columns are cast to text so the driver returns a string.
fn select_column_list(entity: &EntityType, requested: &[String]) -> String {
    let columns: Vec<&str> = if requested.is_empty() {
        entity
            .descriptor
            .columns
            .iter()
            .map(|c| c.column.as_str())
            .collect()
    } else {
        requested
            .iter()
            .map(String::as_str)
            .filter(|c| entity.descriptor.has_column(c))
            .collect()
    };
    columns
        .iter()
        .map(|c| {
            let q = quote_ident(c);
            match entity.semantic(c) {
                Some(crate::descriptor::SemanticType::Decimal) => format!("{}::text", q),
                _ => q,
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn cast_suffix(entity: &EntityType, column: &str) -> String {
    entity
        .semantic(column)
        .and_then(|s| s.pg_cast())
        .map(|t| format!("::{}", t))
        .unwrap_or_default()
}

/// Merge a compiled predicate into the buffer: each `?` marker becomes the next
/// `$n` placeholder with the column's semantic cast. Returns the rendered
/// predicate text (without the WHERE keyword).
fn render_where(buf: &mut QueryBuf, entity: &EntityType, compiled: &CompiledQuery) -> String {
    let mut out = String::with_capacity(compiled.where_sql.len());
    let mut next = compiled.params.iter();
    for c in compiled.where_sql.chars() {
        if c == '?' {
            // Marker counts match the param list by construction.
            let param = next.next().expect("predicate marker without parameter");
            let n = buf.push_param(param.value.clone());
            out.push_str(&format!("${}{}", n, cast_suffix(entity, &param.column)));
        } else {
            out.push(c);
        }
    }
    out
}

/// Predicate text plus the implicit `normal = 1` guard when requested.
fn where_clause(
    buf: &mut QueryBuf,
    entity: &EntityType,
    compiled: &CompiledQuery,
    alive_only: bool,
) -> String {
    let predicate = render_where(buf, entity, compiled);
    let alive = format!("{} = {}", quote_ident("normal"), NORMAL_ALIVE);
    match (predicate.is_empty(), alive_only) {
        (true, true) => format!(" WHERE {}", alive),
        (true, false) => String::new(),
        (false, true) => format!(" WHERE {} AND {}", predicate, alive),
        (false, false) => format!(" WHERE {}", predicate),
    }
}

fn order_clause(compiled: &CompiledQuery) -> String {
    if compiled.order_by.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = compiled
        .order_by
        .iter()
        .map(|(column, sort)| {
            let dir = match sort {
                crate::query::Sort::Asc => "ASC",
                crate::query::Sort::Desc => "DESC",
            };
            format!("{} {}", quote_ident(column), dir)
        })
        .collect();
    format!(" ORDER BY {}", parts.join(", "))
}

/// SELECT with predicate, implicit alive filter, sort and optional pagination.
pub fn select(
    entity: &EntityType,
    compiled: &CompiledQuery,
    alive_only: bool,
    limit: Option<u64>,
    offset: Option<u64>,
) -> QueryBuf {
    let mut buf = QueryBuf::new();
    let table = quote_ident(&entity.descriptor.table);
    let columns = select_column_list(entity, &compiled.columns);
    let where_sql = where_clause(&mut buf, entity, compiled, alive_only);
    let order = order_clause(compiled);
    let limit_sql = limit.map(|n| format!(" LIMIT {}", n)).unwrap_or_default();
    let offset_sql = offset.map(|n| format!(" OFFSET {}", n)).unwrap_or_default();
    buf.sql = format!(
        "SELECT {} FROM {}{}{}{}{}",
        columns, table, where_sql, order, limit_sql, offset_sql
    );
    buf
}

/// COUNT ignores requested columns, sort and pagination.
pub fn count(entity: &EntityType, compiled: &CompiledQuery, alive_only: bool) -> QueryBuf {
    let mut buf = QueryBuf::new();
    let table = quote_ident(&entity.descriptor.table);
    let where_sql = where_clause(&mut buf, entity, compiled, alive_only);
    buf.sql = format!("SELECT COUNT(*) FROM {}{}", table, where_sql);
    buf
}

/// INSERT the record's non-null fields that exist on the table.
pub fn insert(entity: &EntityType, record: &Record) -> QueryBuf {
    let mut buf = QueryBuf::new();
    let table = quote_ident(&entity.descriptor.table);
    let mut columns = Vec::new();
    let mut placeholders = Vec::new();
    for column in &entity.descriptor.columns {
        let name = &column.column;
        let Some(value) = record.get(name) else { continue };
        if value.is_null() {
            continue;
        }
        let n = buf.push_param(value.clone());
        columns.push(quote_ident(name));
        placeholders.push(format!("${}{}", n, cast_suffix(entity, name)));
    }
    buf.sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        columns.join(", "),
        placeholders.join(", ")
    );
    buf
}

fn set_clause(buf: &mut QueryBuf, entity: &EntityType, record: &Record) -> String {
    let mut sets = Vec::new();
    for column in &entity.descriptor.columns {
        let name = &column.column;
        if name == "id" {
            continue;
        }
        let Some(value) = record.get(name) else { continue };
        if value.is_null() {
            continue;
        }
        let n = buf.push_param(value.clone());
        sets.push(format!(
            "{} = ${}{}",
            quote_ident(name),
            n,
            cast_suffix(entity, name)
        ));
    }
    sets.join(", ")
}

/// UPDATE by primary key: SET every non-null field except id.
pub fn update_by_id(entity: &EntityType, record: &Record, id: i64) -> QueryBuf {
    let mut buf = QueryBuf::new();
    let table = quote_ident(&entity.descriptor.table);
    let sets = set_clause(&mut buf, entity, record);
    let id_param = buf.push_param(Value::from(id));
    buf.sql = format!(
        "UPDATE {} SET {} WHERE {} = ${}",
        table,
        sets,
        quote_ident("id"),
        id_param
    );
    buf
}

/// Conditional UPDATE: SET fields, WHERE predicate plus implicit alive filter.
pub fn update_where(entity: &EntityType, record: &Record, compiled: &CompiledQuery) -> QueryBuf {
    let mut buf = QueryBuf::new();
    let table = quote_ident(&entity.descriptor.table);
    let sets = set_clause(&mut buf, entity, record);
    let where_sql = where_clause(&mut buf, entity, compiled, true);
    buf.sql = format!("UPDATE {} SET {}{}", table, sets, where_sql);
    buf
}

/// Conditional soft delete: mark matched live rows as deleted.
pub fn soft_delete(entity: &EntityType, compiled: &CompiledQuery) -> QueryBuf {
    let mut buf = QueryBuf::new();
    let table = quote_ident(&entity.descriptor.table);
    let where_sql = where_clause(&mut buf, entity, compiled, true);
    buf.sql = format!(
        "UPDATE {} SET {} = {}{}",
        table,
        quote_ident("normal"),
        NORMAL_DELETED,
        where_sql
    );
    buf
}

/// Physical delete by primary keys.
pub fn delete_batch_ids(entity: &EntityType, ids: &[i64]) -> QueryBuf {
    let mut buf = QueryBuf::new();
    let table = quote_ident(&entity.descriptor.table);
    let placeholders: Vec<String> = ids
        .iter()
        .map(|id| format!("${}", buf.push_param(Value::from(*id))))
        .collect();
    buf.sql = format!(
        "DELETE FROM {} WHERE {} IN ({})",
        table,
        quote_ident("id"),
        placeholders.join(", ")
    );
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{test_descriptor, TypeRegistry};
    use crate::query::{Condition, Operator, Query, Sort};
    use crate::sql::predicate::compile;
    use serde_json::json;

    fn user_entity() -> std::sync::Arc<EntityType> {
        let mut registry = TypeRegistry::new();
        registry.register(test_descriptor(
            "user",
            &[("username", "text"), ("age", "int4"), ("balance", "numeric")],
        ));
        registry.resolve("user").unwrap()
    }

    #[test]
    fn select_injects_alive_filter_and_numbers_params() {
        let entity = user_entity();
        let compiled = compile(&Query::new().eq("userName", "a")).unwrap();
        let buf = select(&entity, &compiled, true, None, None);
        assert!(buf.sql.contains("WHERE (\"user_name\" = $1) AND \"normal\" = 1"));
        assert_eq!(buf.params, vec![json!("a")]);
    }

    #[test]
    fn select_without_alive_filter_or_conditions() {
        let entity = user_entity();
        let compiled = CompiledQuery::default();
        let buf = select(&entity, &compiled, false, None, None);
        assert!(!buf.sql.contains("WHERE"));
        assert!(buf.params.is_empty());
    }

    #[test]
    fn count_ignores_pagination_and_sort() {
        let entity = user_entity();
        let compiled = compile(&Query::new().eq("age", 30).order("id", Sort::Desc)).unwrap();
        let buf = count(&entity, &compiled, true);
        assert!(buf.sql.starts_with("SELECT COUNT(*) FROM \"user\""));
        assert!(!buf.sql.contains("ORDER BY"));
        assert!(!buf.sql.contains("LIMIT"));
    }

    #[test]
    fn pagination_clauses() {
        let entity = user_entity();
        let compiled = CompiledQuery::default();
        let buf = select(&entity, &compiled, true, Some(20), Some(40));
        assert!(buf.sql.ends_with("LIMIT 20 OFFSET 40"));
    }

    #[test]
    fn insert_skips_nulls_and_unknown_columns() {
        let entity = user_entity();
        let mut record = Record::new();
        record.set_id(7);
        record.set("username", json!("a"));
        record.set("ghost", json!("x"));
        record.set("age", json!(null));
        let buf = insert(&entity, &record);
        assert!(buf.sql.contains("\"id\""));
        assert!(buf.sql.contains("\"username\""));
        assert!(!buf.sql.contains("ghost"));
        assert!(!buf.sql.contains("\"age\""));
        assert_eq!(buf.params.len(), 2);
    }

    #[test]
    fn insert_casts_timestamp_columns() {
        let entity = user_entity();
        let mut record = Record::new();
        record.set_id(7);
        record.set("update_time", json!("2026-01-01T00:00:00Z"));
        let buf = insert(&entity, &record);
        assert!(buf.sql.contains("::timestamptz"));
    }

    #[test]
    fn update_by_id_excludes_id_from_set() {
        let entity = user_entity();
        let mut record = Record::new();
        record.set_id(7);
        record.set("username", json!("b"));
        record.set_version(99);
        let buf = update_by_id(&entity, &record, 7);
        assert!(buf.sql.starts_with("UPDATE \"user\" SET"));
        assert!(!buf.sql.contains("\"id\" = $1"));
        assert!(buf.sql.contains("WHERE \"id\" ="));
        // id is bound last
        assert_eq!(buf.params.last(), Some(&json!(7)));
    }

    #[test]
    fn soft_delete_only_touches_live_rows() {
        let entity = user_entity();
        let compiled = compile(&Query::new().eq("age", 20)).unwrap();
        let buf = soft_delete(&entity, &compiled);
        assert!(buf.sql.contains("SET \"normal\" = 0"));
        assert!(buf.sql.contains("AND \"normal\" = 1"));
    }

    #[test]
    fn delete_batch_is_physical() {
        let entity = user_entity();
        let buf = delete_batch_ids(&entity, &[1, 2, 3]);
        assert_eq!(
            buf.sql,
            "DELETE FROM \"user\" WHERE \"id\" IN ($1, $2, $3)"
        );
    }

    #[test]
    fn in_condition_binds_every_value() {
        let entity = user_entity();
        let compiled = compile(&Query::new().condition(
            Condition::new("id")
                .operator(Operator::In)
                .params(vec![json!(1), json!(2), json!(3)]),
        ))
        .unwrap();
        let buf = select(&entity, &compiled, true, None, None);
        assert!(buf.sql.contains("\"id\" IN ($1, $2, $3)"));
        assert_eq!(buf.params.len(), 3);
    }
}
