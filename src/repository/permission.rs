//! Row- and column-level data permissions layered over any repository.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::error::AppError;
use crate::query::Query;
use crate::record::Record;
use crate::repository::{map_query, Repository};

/// Scopes what a caller may see or touch. Row permission appends conditions
/// to every condition-bearing operation; column permission rewrites records
/// on their way in (updates) and out (reads), typically to mask fields.
pub trait DataPermissionHandler: Send + Sync {
    fn add_row_permission(&self, table: &str, query: Query) -> Query {
        let _ = table;
        query
    }

    fn add_column_permission(&self, table: &str, record: Record) -> Record {
        let _ = table;
        record
    }
}

/// Applies no permissions at all.
pub struct NoopPermissionHandler;

impl DataPermissionHandler for NoopPermissionHandler {}

/// Repository decorator that routes every operation through a permission
/// handler before and after delegating.
pub struct PermissionRepository<R> {
    inner: R,
    handler: Arc<dyn DataPermissionHandler>,
}

impl<R: Repository> PermissionRepository<R> {
    pub fn new(inner: R, handler: Arc<dyn DataPermissionHandler>) -> Self {
        PermissionRepository { inner, handler }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    fn scoped(&self, table: &str, query: &Query) -> Query {
        self.handler.add_row_permission(table, query.clone())
    }

    fn masked(&self, table: &str, records: Vec<Record>) -> Vec<Record> {
        records
            .into_iter()
            .map(|r| self.handler.add_column_permission(table, r))
            .collect()
    }

    /// Row-scopes a map lookup. Returns the rewritten query when the handler
    /// changes it, `None` when the map equality filter already covers it and
    /// the plain map path (including its cache fast path) can be kept.
    fn scoped_map(&self, table: &str, entity: &Map<String, Value>) -> Option<Query> {
        let query = map_query(entity);
        let scoped = self.handler.add_row_permission(table, query.clone());
        if scoped == query {
            None
        } else {
            Some(scoped)
        }
    }
}

#[async_trait]
impl<R: Repository> Repository for PermissionRepository<R> {
    async fn insert(&self, table: &str, record: Record) -> Result<Record, AppError> {
        self.inner.insert(table, record).await
    }

    async fn delete_by_id(&self, table: &str, id: i64) -> Result<u64, AppError> {
        self.inner.delete_by_id(table, id).await
    }

    async fn delete_by_map(
        &self,
        table: &str,
        entity: &Map<String, Value>,
    ) -> Result<u64, AppError> {
        match self.scoped_map(table, entity) {
            Some(query) => self.inner.delete(table, &query).await,
            None => self.inner.delete_by_map(table, entity).await,
        }
    }

    async fn delete(&self, table: &str, query: &Query) -> Result<u64, AppError> {
        self.inner.delete(table, &self.scoped(table, query)).await
    }

    async fn delete_batch_ids(&self, table: &str, ids: &[i64]) -> Result<u64, AppError> {
        self.inner.delete_batch_ids(table, ids).await
    }

    async fn update_by_id(&self, table: &str, record: Record) -> Result<u64, AppError> {
        let record = self.handler.add_column_permission(table, record);
        self.inner.update_by_id(table, record).await
    }

    async fn update(&self, table: &str, record: Record, query: &Query) -> Result<u64, AppError> {
        let record = self.handler.add_column_permission(table, record);
        self.inner
            .update(table, record, &self.scoped(table, query))
            .await
    }

    async fn select_by_id(&self, table: &str, id: i64) -> Result<Option<Record>, AppError> {
        let row = self.inner.select_by_id(table, id).await?;
        Ok(row.map(|r| self.handler.add_column_permission(table, r)))
    }

    async fn select_batch_ids(&self, table: &str, ids: &[i64]) -> Result<Vec<Record>, AppError> {
        let rows = self.inner.select_batch_ids(table, ids).await?;
        Ok(self.masked(table, rows))
    }

    async fn select_by_map(
        &self,
        table: &str,
        entity: &Map<String, Value>,
    ) -> Result<Vec<Record>, AppError> {
        let rows = match self.scoped_map(table, entity) {
            Some(query) => self.inner.select_list(table, &query).await?,
            None => self.inner.select_by_map(table, entity).await?,
        };
        Ok(self.masked(table, rows))
    }

    async fn select_one_by_map(
        &self,
        table: &str,
        entity: &Map<String, Value>,
        strict: bool,
    ) -> Result<Option<Record>, AppError> {
        let row = match self.scoped_map(table, entity) {
            Some(query) => self.inner.select_one(table, &query, strict).await?,
            None => self.inner.select_one_by_map(table, entity, strict).await?,
        };
        Ok(row.map(|r| self.handler.add_column_permission(table, r)))
    }

    async fn select_one(
        &self,
        table: &str,
        query: &Query,
        strict: bool,
    ) -> Result<Option<Record>, AppError> {
        let row = self
            .inner
            .select_one(table, &self.scoped(table, query), strict)
            .await?;
        Ok(row.map(|r| self.handler.add_column_permission(table, r)))
    }

    async fn exists(&self, table: &str, query: &Query) -> Result<bool, AppError> {
        self.inner.exists(table, &self.scoped(table, query)).await
    }

    async fn select_count(&self, table: &str, query: &Query) -> Result<i64, AppError> {
        self.inner
            .select_count(table, &self.scoped(table, query))
            .await
    }

    async fn select_count_by_map(
        &self,
        table: &str,
        entity: &Map<String, Value>,
    ) -> Result<i64, AppError> {
        match self.scoped_map(table, entity) {
            Some(query) => self.inner.select_count(table, &query).await,
            None => self.inner.select_count_by_map(table, entity).await,
        }
    }

    async fn select_list(&self, table: &str, query: &Query) -> Result<Vec<Record>, AppError> {
        let rows = self
            .inner
            .select_list(table, &self.scoped(table, query))
            .await?;
        Ok(self.masked(table, rows))
    }

    async fn select_page(
        &self,
        table: &str,
        query: &Query,
        page_num: u64,
        page_size: u64,
    ) -> Result<(Vec<Record>, i64), AppError> {
        let (rows, total) = self
            .inner
            .select_page(table, &self.scoped(table, query), page_num, page_size)
            .await?;
        Ok((self.masked(table, rows), total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Condition, Operator};
    use serde_json::json;

    struct TenantScope;

    impl DataPermissionHandler for TenantScope {
        fn add_row_permission(&self, _table: &str, query: Query) -> Query {
            query.eq("tenant_id", 7)
        }

        fn add_column_permission(&self, _table: &str, mut record: Record) -> Record {
            record.set("phone", Value::Null);
            record
        }
    }

    struct FakeRepo;

    #[async_trait]
    impl Repository for FakeRepo {
        async fn insert(&self, _: &str, record: Record) -> Result<Record, AppError> {
            Ok(record)
        }
        async fn delete_by_id(&self, _: &str, _: i64) -> Result<u64, AppError> {
            Ok(1)
        }
        // Map paths answer with a sentinel so tests can tell which side of
        // the decorator a call landed on; query paths report condition counts.
        async fn delete_by_map(&self, _: &str, _: &Map<String, Value>) -> Result<u64, AppError> {
            Ok(77)
        }
        async fn delete(&self, _: &str, query: &Query) -> Result<u64, AppError> {
            Ok(query.conditions.len() as u64)
        }
        async fn delete_batch_ids(&self, _: &str, ids: &[i64]) -> Result<u64, AppError> {
            Ok(ids.len() as u64)
        }
        async fn update_by_id(&self, _: &str, record: Record) -> Result<u64, AppError> {
            Ok(u64::from(record.get("phone") == Some(&Value::Null)))
        }
        async fn update(&self, _: &str, _: Record, _: &Query) -> Result<u64, AppError> {
            Ok(0)
        }
        async fn select_by_id(&self, _: &str, id: i64) -> Result<Option<Record>, AppError> {
            let mut r = Record::new();
            r.set_id(id);
            r.set("phone", json!("123"));
            Ok(Some(r))
        }
        async fn select_batch_ids(&self, _: &str, _: &[i64]) -> Result<Vec<Record>, AppError> {
            Ok(Vec::new())
        }
        async fn select_by_map(
            &self,
            _: &str,
            _: &Map<String, Value>,
        ) -> Result<Vec<Record>, AppError> {
            Ok(Vec::new())
        }
        async fn select_one_by_map(
            &self,
            _: &str,
            _: &Map<String, Value>,
            _: bool,
        ) -> Result<Option<Record>, AppError> {
            Ok(None)
        }
        async fn select_one(
            &self,
            _: &str,
            _: &Query,
            _: bool,
        ) -> Result<Option<Record>, AppError> {
            let mut r = Record::new();
            r.set("phone", json!("123"));
            Ok(Some(r))
        }
        async fn exists(&self, _: &str, _: &Query) -> Result<bool, AppError> {
            Ok(false)
        }
        async fn select_count(&self, _: &str, query: &Query) -> Result<i64, AppError> {
            Ok(query.conditions.len() as i64)
        }
        async fn select_count_by_map(
            &self,
            _: &str,
            _: &Map<String, Value>,
        ) -> Result<i64, AppError> {
            Ok(77)
        }
        async fn select_list(&self, _: &str, query: &Query) -> Result<Vec<Record>, AppError> {
            let mut r = Record::new();
            r.set("phone", json!("123"));
            Ok(vec![r; query.conditions.len()])
        }
        async fn select_page(
            &self,
            _: &str,
            _: &Query,
            _: u64,
            _: u64,
        ) -> Result<(Vec<Record>, i64), AppError> {
            Ok((Vec::new(), 0))
        }
    }

    #[tokio::test]
    async fn row_permission_appends_conditions() {
        let repo = PermissionRepository::new(FakeRepo, Arc::new(TenantScope));
        let query = Query::new().condition(Condition::new("city").operator(Operator::IsNotNull));
        // FakeRepo reports back how many conditions it received.
        assert_eq!(repo.select_count("t", &query).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn column_permission_masks_reads_and_writes() {
        let repo = PermissionRepository::new(FakeRepo, Arc::new(TenantScope));
        let row = repo.select_by_id("t", 1).await.unwrap().unwrap();
        assert_eq!(row.get("phone"), Some(&Value::Null));

        let mut record = Record::new();
        record.set_id(1);
        record.set("phone", json!("123"));
        assert_eq!(repo.update_by_id("t", record).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn noop_handler_passes_through() {
        let repo = PermissionRepository::new(FakeRepo, Arc::new(NoopPermissionHandler));
        let query = Query::new();
        assert_eq!(repo.select_count("t", &query).await.unwrap(), 0);
    }

    fn city_map() -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("city".into(), json!("berlin"));
        map
    }

    #[tokio::test]
    async fn map_lookups_carry_row_permission() {
        let repo = PermissionRepository::new(FakeRepo, Arc::new(TenantScope));
        let map = city_map();

        // Each map variant must reach the inner repository with the caller's
        // equality filter plus the tenant condition, never the bare map.
        assert_eq!(repo.select_count_by_map("t", &map).await.unwrap(), 2);
        assert_eq!(repo.delete_by_map("t", &map).await.unwrap(), 2);

        let rows = repo.select_by_map("t", &map).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.get("phone") == Some(&Value::Null)));
    }

    #[tokio::test]
    async fn scoped_select_one_by_map_masks_columns() {
        let repo = PermissionRepository::new(FakeRepo, Arc::new(TenantScope));
        let row = repo
            .select_one_by_map("t", &city_map(), false)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.get("phone"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn unscoped_map_lookups_keep_the_map_path() {
        let repo = PermissionRepository::new(FakeRepo, Arc::new(NoopPermissionHandler));
        let map = city_map();
        assert_eq!(repo.select_count_by_map("t", &map).await.unwrap(), 77);
        assert_eq!(repo.delete_by_map("t", &map).await.unwrap(), 77);
        assert!(repo.select_by_map("t", &map).await.unwrap().is_empty());
        assert!(repo
            .select_one_by_map("t", &map, false)
            .await
            .unwrap()
            .is_none());
    }
}
