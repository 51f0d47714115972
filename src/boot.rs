//! Boot sequence: connect the configured datasources, discover their schemas,
//! assemble the repository stack and warm the cache regions.

use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::RegionCache;
use crate::catalog;
use crate::config::Settings;
use crate::datasource::DatasourceRouter;
use crate::descriptor::TypeRegistry;
use crate::error::AppError;
use crate::events::EventBus;
use crate::id::SnowflakeIdGenerator;
use crate::query::Query;
use crate::repository::{
    BaseRepository, DataPermissionHandler, DefaultRepositoryHandler, NoopPermissionHandler,
    PermissionRepository, Repository,
};
use crate::state::AppState;

/// Build the full application state with default events and no permissions.
pub async fn initialize(settings: &Settings) -> Result<AppState, AppError> {
    initialize_with(settings, EventBus::new(), Arc::new(NoopPermissionHandler)).await
}

/// Build the full application state with caller-supplied event subscribers and
/// permission handling.
pub async fn initialize_with(
    settings: &Settings,
    events: EventBus,
    permissions: Arc<dyn DataPermissionHandler>,
) -> Result<AppState, AppError> {
    let mut pools: HashMap<String, PgPool> = HashMap::new();
    for (name, url) in &settings.datasources {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .connect(url)
            .await?;
        pools.insert(name.clone(), pool);
    }

    let (descriptors, bindings) =
        catalog::discover_all(&pools, &settings.default_datasource).await?;

    let mut registry = TypeRegistry::new();
    for descriptor in descriptors.into_values() {
        registry.register(descriptor);
    }
    let registry = Arc::new(registry);
    tracing::info!(tables = registry.len(), "type registry ready");

    let router = DatasourceRouter::new(settings.default_datasource.clone(), pools, bindings);

    let mut cached_tables = Vec::new();
    for table in &settings.cached_tables {
        if registry.resolve(table).is_ok() {
            cached_tables.push(table.clone());
        } else {
            tracing::warn!(table = %table, "cached table not found in any datasource, skipping");
        }
    }
    let cache = RegionCache::new(cached_tables.iter().cloned(), settings.cache_capacity);

    let ids = Arc::new(SnowflakeIdGenerator::new(settings.worker_id));
    let handler = Arc::new(DefaultRepositoryHandler::new(ids));
    let base = BaseRepository::new(registry.clone(), router.clone(), cache, events, handler);

    warm_cache(&base, &cached_tables).await?;

    let repository: Arc<dyn Repository> = Arc::new(PermissionRepository::new(base, permissions));
    Ok(AppState {
        repository,
        registry,
        router,
    })
}

/// Load every live row of the cached tables into their regions, so reads can
/// be answered from memory from the first request on.
async fn warm_cache(base: &BaseRepository, tables: &[String]) -> Result<(), AppError> {
    for table in tables {
        let rows = base.select_list(table, &Query::new()).await?;
        let entries: Vec<(i64, Value)> = rows
            .into_iter()
            .filter_map(|r| {
                let id = r.id()?;
                Some((id, Value::Object(r.into_map())))
            })
            .collect();
        tracing::info!(table = %table, rows = entries.len(), "cache warmed");
        base.cache().set_many(table, entries).await;
    }
    Ok(())
}
