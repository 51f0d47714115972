//! Generic table-keyed repository: every operation takes a table name and
//! dynamic records, resolved against the type registry at call time.

mod base;
mod handler;
mod permission;

pub use base::BaseRepository;
pub use handler::{DefaultRepositoryHandler, RepositoryHandler};
pub use permission::{DataPermissionHandler, NoopPermissionHandler, PermissionRepository};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::AppError;
use crate::query::Query;
use crate::record::Record;

/// Data-access operations over any registered table. Mutations publish
/// before/after events, route to the table's datasource and keep the table's
/// cache region (when one exists) in sync.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Insert a record, filling id, normal, version and update_time as needed.
    /// Returns the record as inserted.
    async fn insert(&self, table: &str, record: Record) -> Result<Record, AppError>;

    /// Physically delete one row by primary key, as a one-element batch
    /// delete. Returns affected rows.
    async fn delete_by_id(&self, table: &str, id: i64) -> Result<u64, AppError>;

    /// Soft-delete rows matching the equality map. Returns affected rows.
    async fn delete_by_map(
        &self,
        table: &str,
        entity: &Map<String, Value>,
    ) -> Result<u64, AppError>;

    /// Soft-delete rows matching the query. Returns affected rows.
    async fn delete(&self, table: &str, query: &Query) -> Result<u64, AppError>;

    /// Physically delete rows by primary keys. Returns affected rows.
    async fn delete_batch_ids(&self, table: &str, ids: &[i64]) -> Result<u64, AppError>;

    /// Update one row by the record's own id. Returns affected rows.
    async fn update_by_id(&self, table: &str, record: Record) -> Result<u64, AppError>;

    /// Update live rows matching the query. Returns affected rows.
    async fn update(&self, table: &str, record: Record, query: &Query) -> Result<u64, AppError>;

    async fn select_by_id(&self, table: &str, id: i64) -> Result<Option<Record>, AppError>;

    async fn select_batch_ids(&self, table: &str, ids: &[i64]) -> Result<Vec<Record>, AppError>;

    async fn select_by_map(
        &self,
        table: &str,
        entity: &Map<String, Value>,
    ) -> Result<Vec<Record>, AppError>;

    /// At most one row for the equality map. With `strict`, more than one match
    /// is an error; otherwise the first match wins.
    async fn select_one_by_map(
        &self,
        table: &str,
        entity: &Map<String, Value>,
        strict: bool,
    ) -> Result<Option<Record>, AppError>;

    async fn select_one(
        &self,
        table: &str,
        query: &Query,
        strict: bool,
    ) -> Result<Option<Record>, AppError>;

    async fn exists(&self, table: &str, query: &Query) -> Result<bool, AppError>;

    async fn select_count(&self, table: &str, query: &Query) -> Result<i64, AppError>;

    async fn select_count_by_map(
        &self,
        table: &str,
        entity: &Map<String, Value>,
    ) -> Result<i64, AppError>;

    async fn select_list(&self, table: &str, query: &Query) -> Result<Vec<Record>, AppError>;

    /// One page of matching rows plus the total match count.
    async fn select_page(
        &self,
        table: &str,
        query: &Query,
        page_num: u64,
        page_size: u64,
    ) -> Result<(Vec<Record>, i64), AppError>;
}

/// Build a pure-equality query from an entity map. Null values become IS NULL
/// checks.
pub(crate) fn map_query(entity: &Map<String, Value>) -> Query {
    let mut query = Query::new();
    for (column, value) in entity {
        let condition = if value.is_null() {
            crate::query::Condition::new(column.clone()).operator(crate::query::Operator::IsNull)
        } else {
            crate::query::Condition::new(column.clone()).param(value.clone())
        };
        query = query.condition(condition);
    }
    query
}
