//! Storage-backed repository over the datasource router, with event
//! publication and per-table cache synchronization around every mutation.

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::PgPool;
use std::sync::Arc;

use crate::cache::RegionCache;
use crate::datasource::{DatasourceRouter, DsContext};
use crate::descriptor::{EntityType, TypeRegistry};
use crate::error::AppError;
use crate::events::{EntityEvent, EventBus, EventKind, EventPayload};
use crate::query::Query;
use crate::record::Record;
use crate::repository::handler::RepositoryHandler;
use crate::repository::{map_query, Repository};
use crate::sql;
use crate::sql::{PgBindValue, QueryBuf};

pub struct BaseRepository {
    registry: Arc<TypeRegistry>,
    router: DatasourceRouter,
    cache: RegionCache,
    events: EventBus,
    handler: Arc<dyn RepositoryHandler>,
}

impl BaseRepository {
    pub fn new(
        registry: Arc<TypeRegistry>,
        router: DatasourceRouter,
        cache: RegionCache,
        events: EventBus,
        handler: Arc<dyn RepositoryHandler>,
    ) -> Self {
        BaseRepository {
            registry,
            router,
            cache,
            events,
            handler,
        }
    }

    pub fn cache(&self) -> &RegionCache {
        &self.cache
    }

    fn entity(&self, table: &str) -> Result<Arc<EntityType>, AppError> {
        self.registry.resolve(table)
    }

    fn publish(&self, table: &str, kind: EventKind, payload: EventPayload, before: bool) {
        self.events.publish(&EntityEvent {
            table: table.to_string(),
            kind,
            payload,
            before,
        });
    }

    async fn execute(pool: &PgPool, q: &QueryBuf) -> Result<u64, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "execute");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        let result = query.execute(pool).await?;
        Ok(result.rows_affected())
    }

    async fn fetch_all(
        entity: &EntityType,
        pool: &PgPool,
        q: &QueryBuf,
    ) -> Result<Vec<Record>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        let rows = query.fetch_all(pool).await?;
        Ok(rows.iter().map(|r| sql::row_to_record(entity, r)).collect())
    }

    async fn fetch_count(pool: &PgPool, q: &QueryBuf) -> Result<i64, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query_scalar(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        let count: i64 = query.fetch_one(pool).await?;
        Ok(count)
    }

    /// Fetch one live row by primary key straight from storage.
    async fn storage_by_id(
        &self,
        entity: &EntityType,
        pool: &PgPool,
        id: i64,
    ) -> Result<Option<Record>, AppError> {
        let compiled = sql::compile(&Query::new().eq("id", id))?;
        let q = sql::builder::select(entity, &compiled, true, Some(1), None);
        let mut rows = Self::fetch_all(entity, pool, &q).await?;
        Ok(rows.pop())
    }

    /// Replace the table's cache region with a fresh full scan of live rows.
    async fn rescan_cache(&self, entity: &EntityType, pool: &PgPool) -> Result<(), AppError> {
        if !self.cache.exists(&entity.descriptor.table) {
            return Ok(());
        }
        let q = sql::builder::select(entity, &Default::default(), true, None, None);
        let rows = Self::fetch_all(entity, pool, &q).await?;
        let entries: Vec<(i64, Value)> = rows
            .into_iter()
            .filter_map(|r| {
                let id = r.id()?;
                Some((id, Value::Object(r.into_map())))
            })
            .collect();
        self.cache.clear(&entity.descriptor.table).await;
        self.cache
            .set_many(&entity.descriptor.table, entries)
            .await;
        Ok(())
    }

    fn first_or_strict(
        &self,
        table: &str,
        mut rows: Vec<Record>,
        strict: bool,
    ) -> Result<Option<Record>, AppError> {
        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop()),
            count if strict => Err(AppError::TooManyResults {
                table: table.to_string(),
                count,
            }),
            _ => Ok(Some(rows.swap_remove(0))),
        }
    }
}

/// True when every map entry matches the cached row: equality on the value, or
/// absent/null for a null filter.
fn matches_map(row: &Value, entity_map: &Map<String, Value>) -> bool {
    let Value::Object(fields) = row else {
        return false;
    };
    entity_map.iter().all(|(column, expected)| {
        let actual = fields.get(column).unwrap_or(&Value::Null);
        if expected.is_null() {
            actual.is_null()
        } else {
            actual == expected
        }
    })
}

/// Storage-named copy of an entity map (camelCase keys accepted).
fn storage_map(entity: &Map<String, Value>) -> Map<String, Value> {
    entity
        .iter()
        .map(|(k, v)| (crate::case::to_snake_case(k), v.clone()))
        .collect()
}

/// Row offset for a 1-based page. Unrepresentable offsets are a validation
/// error, not wraparound.
fn page_offset(page_num: u64, page_size: u64) -> Result<u64, AppError> {
    page_num
        .max(1)
        .checked_sub(1)
        .and_then(|n| n.checked_mul(page_size))
        .ok_or_else(|| AppError::Validation("pageNum is out of range".to_string()))
}

#[async_trait]
impl Repository for BaseRepository {
    async fn insert(&self, table: &str, mut record: Record) -> Result<Record, AppError> {
        let entity = self.entity(table)?;
        self.handler.insert_fill(&mut record);
        self.publish(
            table,
            EventKind::Insert,
            EventPayload::Entity(record.clone()),
            true,
        );

        let ctx = DsContext::new();
        let _scope = ctx.enter(self.router.binding(table));
        let pool = self.router.pool(&ctx);

        let q = sql::builder::insert(&entity, &record);
        Self::execute(pool, &q).await?;

        if let Some(id) = record.id() {
            self.cache
                .set(table, id, Value::Object(record.as_map().clone()))
                .await;
        }

        self.publish(
            table,
            EventKind::Insert,
            EventPayload::Entity(record.clone()),
            false,
        );
        Ok(record)
    }

    async fn delete_by_id(&self, table: &str, id: i64) -> Result<u64, AppError> {
        // Single-id delete is the batch path with one key, physical included.
        self.delete_batch_ids(table, &[id]).await
    }

    async fn delete_by_map(
        &self,
        table: &str,
        entity_map: &Map<String, Value>,
    ) -> Result<u64, AppError> {
        let entity = self.entity(table)?;
        let condition = Value::Object(entity_map.clone());
        self.publish(
            table,
            EventKind::Delete,
            EventPayload::Condition(condition.clone()),
            true,
        );

        let ctx = DsContext::new();
        let _scope = ctx.enter(self.router.binding(table));
        let pool = self.router.pool(&ctx);

        let compiled = sql::compile(&map_query(entity_map))?;
        let q = sql::builder::soft_delete(&entity, &compiled);
        let affected = Self::execute(pool, &q).await?;

        self.rescan_cache(&entity, pool).await?;
        self.publish(
            table,
            EventKind::Delete,
            EventPayload::Condition(condition),
            false,
        );
        Ok(affected)
    }

    async fn delete(&self, table: &str, query: &Query) -> Result<u64, AppError> {
        let entity = self.entity(table)?;
        let condition = serde_json::to_value(query).unwrap_or(Value::Null);
        self.publish(
            table,
            EventKind::Delete,
            EventPayload::Condition(condition.clone()),
            true,
        );

        let ctx = DsContext::new();
        let _scope = ctx.enter(self.router.binding(table));
        let pool = self.router.pool(&ctx);

        let compiled = sql::compile(query)?;
        let q = sql::builder::soft_delete(&entity, &compiled);
        let affected = Self::execute(pool, &q).await?;

        self.rescan_cache(&entity, pool).await?;
        self.publish(
            table,
            EventKind::Delete,
            EventPayload::Condition(condition),
            false,
        );
        Ok(affected)
    }

    async fn delete_batch_ids(&self, table: &str, ids: &[i64]) -> Result<u64, AppError> {
        let entity = self.entity(table)?;
        if ids.is_empty() {
            return Ok(0);
        }
        self.publish(
            table,
            EventKind::DeleteBatch,
            EventPayload::Ids(ids.to_vec()),
            true,
        );

        let ctx = DsContext::new();
        let _scope = ctx.enter(self.router.binding(table));
        let pool = self.router.pool(&ctx);

        let q = sql::builder::delete_batch_ids(&entity, ids);
        let affected = Self::execute(pool, &q).await?;

        self.cache.remove(table, ids).await;
        self.publish(
            table,
            EventKind::DeleteBatch,
            EventPayload::Ids(ids.to_vec()),
            false,
        );
        Ok(affected)
    }

    async fn update_by_id(&self, table: &str, mut record: Record) -> Result<u64, AppError> {
        let entity = self.entity(table)?;
        let id = record
            .id()
            .ok_or_else(|| AppError::MissingId(table.to_string()))?;
        self.handler.update_fill(&mut record);
        self.publish(
            table,
            EventKind::UpdateById,
            EventPayload::Entity(record.clone()),
            true,
        );

        let ctx = DsContext::new();
        let _scope = ctx.enter(self.router.binding(table));
        let pool = self.router.pool(&ctx);

        let q = sql::builder::update_by_id(&entity, &record, id);
        let affected = Self::execute(pool, &q).await?;

        // Partial updates leave untouched fields unknown, so re-read the row
        // for the cache instead of merging locally.
        if self.cache.exists(table) {
            match self.storage_by_id(&entity, pool, id).await? {
                Some(row) => {
                    self.cache
                        .set(table, id, Value::Object(row.into_map()))
                        .await
                }
                None => self.cache.remove(table, &[id]).await,
            }
        }

        self.publish(
            table,
            EventKind::UpdateById,
            EventPayload::Entity(record),
            false,
        );
        Ok(affected)
    }

    async fn update(&self, table: &str, mut record: Record, query: &Query) -> Result<u64, AppError> {
        let entity = self.entity(table)?;
        self.handler.update_fill(&mut record);
        let condition = serde_json::to_value(query).unwrap_or(Value::Null);
        self.publish(
            table,
            EventKind::Update,
            EventPayload::EntityWithCondition(record.clone(), condition.clone()),
            true,
        );

        let ctx = DsContext::new();
        let _scope = ctx.enter(self.router.binding(table));
        let pool = self.router.pool(&ctx);

        let compiled = sql::compile(query)?;
        let q = sql::builder::update_where(&entity, &record, &compiled);
        let affected = Self::execute(pool, &q).await?;

        self.rescan_cache(&entity, pool).await?;
        self.publish(
            table,
            EventKind::Update,
            EventPayload::EntityWithCondition(record, condition),
            false,
        );
        Ok(affected)
    }

    async fn select_by_id(&self, table: &str, id: i64) -> Result<Option<Record>, AppError> {
        let mut rows = self.select_batch_ids(table, &[id]).await?;
        Ok(rows.pop())
    }

    async fn select_batch_ids(&self, table: &str, ids: &[i64]) -> Result<Vec<Record>, AppError> {
        let entity = self.entity(table)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        // Cached tables answer from the region alone; ids without a cached
        // row are dropped, matching the single-id read path.
        if self.cache.exists(table) {
            let found = self.cache.get_many(table, ids).await;
            let records = ids
                .iter()
                .filter_map(|id| found.get(id))
                .filter_map(|v| match v {
                    Value::Object(map) => Some(Record::from_map(map.clone())),
                    _ => None,
                })
                .collect();
            return Ok(records);
        }

        let query = Query::new().condition(
            crate::query::Condition::new("id")
                .operator(crate::query::Operator::In)
                .params(ids.iter().map(|id| Value::from(*id)).collect()),
        );

        let ctx = DsContext::new();
        let _scope = ctx.enter(self.router.binding(table));
        let pool = self.router.pool(&ctx);
        let compiled = sql::compile(&query)?;
        let q = sql::builder::select(&entity, &compiled, true, None, None);
        Self::fetch_all(&entity, pool, &q).await
    }

    async fn select_by_map(
        &self,
        table: &str,
        entity_map: &Map<String, Value>,
    ) -> Result<Vec<Record>, AppError> {
        let entity = self.entity(table)?;

        if self.cache.exists(table) {
            let filter = storage_map(entity_map);
            let records = self
                .cache
                .entries(table)
                .await
                .into_iter()
                .filter(|(_, row)| matches_map(row, &filter))
                .filter_map(|(_, row)| match row {
                    Value::Object(map) => Some(Record::from_map(map)),
                    _ => None,
                })
                .collect();
            return Ok(records);
        }

        let ctx = DsContext::new();
        let _scope = ctx.enter(self.router.binding(table));
        let pool = self.router.pool(&ctx);
        let compiled = sql::compile(&map_query(entity_map))?;
        let q = sql::builder::select(&entity, &compiled, true, None, None);
        Self::fetch_all(&entity, pool, &q).await
    }

    async fn select_one_by_map(
        &self,
        table: &str,
        entity_map: &Map<String, Value>,
        strict: bool,
    ) -> Result<Option<Record>, AppError> {
        let rows = self.select_by_map(table, entity_map).await?;
        self.first_or_strict(table, rows, strict)
    }

    async fn select_one(
        &self,
        table: &str,
        query: &Query,
        strict: bool,
    ) -> Result<Option<Record>, AppError> {
        let rows = self.select_list(table, query).await?;
        self.first_or_strict(table, rows, strict)
    }

    async fn exists(&self, table: &str, query: &Query) -> Result<bool, AppError> {
        Ok(self.select_count(table, query).await? > 0)
    }

    async fn select_count(&self, table: &str, query: &Query) -> Result<i64, AppError> {
        let entity = self.entity(table)?;
        let ctx = DsContext::new();
        let _scope = ctx.enter(self.router.binding(table));
        let pool = self.router.pool(&ctx);
        let compiled = sql::compile(query)?;
        let q = sql::builder::count(&entity, &compiled, true);
        Self::fetch_count(pool, &q).await
    }

    async fn select_count_by_map(
        &self,
        table: &str,
        entity_map: &Map<String, Value>,
    ) -> Result<i64, AppError> {
        self.select_count(table, &map_query(entity_map)).await
    }

    async fn select_list(&self, table: &str, query: &Query) -> Result<Vec<Record>, AppError> {
        let entity = self.entity(table)?;
        let ctx = DsContext::new();
        let _scope = ctx.enter(self.router.binding(table));
        let pool = self.router.pool(&ctx);
        let compiled = sql::compile(query)?;
        let q = sql::builder::select(&entity, &compiled, true, None, None);
        Self::fetch_all(&entity, pool, &q).await
    }

    async fn select_page(
        &self,
        table: &str,
        query: &Query,
        page_num: u64,
        page_size: u64,
    ) -> Result<(Vec<Record>, i64), AppError> {
        let entity = self.entity(table)?;
        let ctx = DsContext::new();
        let _scope = ctx.enter(self.router.binding(table));
        let pool = self.router.pool(&ctx);
        let compiled = sql::compile(query)?;
        let offset = page_offset(page_num, page_size)?;

        let total = Self::fetch_count(pool, &sql::builder::count(&entity, &compiled, true)).await?;

        let q = sql::builder::select(&entity, &compiled, true, Some(page_size), Some(offset));
        let rows = Self::fetch_all(&entity, pool, &q).await?;
        Ok((rows, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::test_descriptor;
    use crate::id::SnowflakeIdGenerator;
    use crate::repository::handler::DefaultRepositoryHandler;
    use serde_json::json;
    use sqlx::postgres::PgPoolOptions;
    use std::sync::Mutex;

    /// Repository over a lazily-connecting pool at an address that refuses
    /// connections, so every storage call fails while everything ahead of it
    /// still runs.
    fn unreachable_repo(events: EventBus) -> BaseRepository {
        let mut registry = TypeRegistry::new();
        registry.register(test_descriptor("user", &[("city", "text")]));
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect_lazy("postgres://nobody@127.0.0.1:1/nodb")
            .unwrap();
        BaseRepository::new(
            Arc::new(registry),
            DatasourceRouter::single(pool),
            RegionCache::disabled(),
            events,
            Arc::new(DefaultRepositoryHandler::new(Arc::new(
                SnowflakeIdGenerator::new(1),
            ))),
        )
    }

    fn recording_bus() -> (EventBus, Arc<Mutex<Vec<(EventKind, bool)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let bus = EventBus::new().subscribe(Arc::new(move |e: &EntityEvent| {
            sink.lock().unwrap().push((e.kind, e.before));
        }));
        (bus, seen)
    }

    #[tokio::test]
    async fn storage_failure_keeps_before_event_and_skips_after() {
        let (bus, seen) = recording_bus();
        let repo = unreachable_repo(bus);

        let mut record = Record::new();
        record.set("city", json!("Pune"));
        let err = repo.insert("user", record).await.unwrap_err();
        assert!(matches!(err, AppError::Db(_)));

        // The before event is delivered ahead of the storage call; the after
        // event never fires on a failed mutation.
        assert_eq!(&*seen.lock().unwrap(), &[(EventKind::Insert, true)]);
    }

    #[tokio::test]
    async fn failed_conditional_delete_skips_after_event() {
        let (bus, seen) = recording_bus();
        let repo = unreachable_repo(bus);

        let query = Query::new().eq("city", "Pune");
        assert!(repo.delete("user", &query).await.is_err());
        assert_eq!(&*seen.lock().unwrap(), &[(EventKind::Delete, true)]);
    }

    #[tokio::test]
    async fn update_without_id_publishes_nothing() {
        let (bus, seen) = recording_bus();
        let repo = unreachable_repo(bus);

        let mut record = Record::new();
        record.set("city", json!("Pune"));
        let err = repo.update_by_id("user", record).await.unwrap_err();
        assert!(matches!(err, AppError::MissingId(_)));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn page_bounds_fail_before_any_storage_call() {
        let (bus, _) = recording_bus();
        let repo = unreachable_repo(bus);

        // A Db error here would mean the pool was hit first.
        let err = repo
            .select_page("user", &Query::new(), u64::MAX, 1000)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn map_matching_handles_null_and_equality() {
        let row = json!({"id": 1, "city": "Pune", "note": null});
        let mut filter = Map::new();
        filter.insert("city".into(), json!("Pune"));
        assert!(matches_map(&row, &filter));

        filter.insert("note".into(), Value::Null);
        assert!(matches_map(&row, &filter));

        filter.insert("missing".into(), Value::Null);
        assert!(matches_map(&row, &filter));

        filter.insert("city".into(), json!("Delhi"));
        assert!(!matches_map(&row, &filter));
    }

    #[test]
    fn page_offset_is_checked() {
        assert_eq!(page_offset(1, 20).unwrap(), 0);
        assert_eq!(page_offset(0, 20).unwrap(), 0);
        assert_eq!(page_offset(3, 50).unwrap(), 100);
        assert!(matches!(
            page_offset(u64::MAX, 1000),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn storage_map_converts_keys() {
        let mut entity = Map::new();
        entity.insert("userName".into(), json!("a"));
        let converted = storage_map(&entity);
        assert!(converted.contains_key("user_name"));
    }
}
