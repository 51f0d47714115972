//! Per-table cache regions kept consistent with writes by the repository.
//!
//! A region existing for a table is the activation signal; tables without a
//! region pass straight through to storage. Every operation is infallible and
//! degrades to a no-op when the region is missing.

use moka::future::Cache;
use serde_json::Value;
use std::collections::HashMap;

/// One moka cache per configured table, keyed by record id, holding full row
/// snapshots.
#[derive(Clone, Debug)]
pub struct RegionCache {
    regions: HashMap<String, Cache<i64, Value>>,
}

impl RegionCache {
    pub const DEFAULT_CAPACITY: u64 = 10_000;

    /// Build regions for the given tables. An empty list disables caching
    /// entirely.
    pub fn new<I, S>(tables: I, capacity: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let regions = tables
            .into_iter()
            .map(|t| (t.into(), Cache::new(capacity)))
            .collect();
        RegionCache { regions }
    }

    pub fn disabled() -> Self {
        RegionCache {
            regions: HashMap::new(),
        }
    }

    /// Whether caching is active for a table.
    pub fn exists(&self, table: &str) -> bool {
        self.regions.contains_key(table)
    }

    pub fn exists_key(&self, table: &str, id: i64) -> bool {
        self.regions
            .get(table)
            .map(|r| r.contains_key(&id))
            .unwrap_or(false)
    }

    pub async fn get(&self, table: &str, id: i64) -> Option<Value> {
        match self.regions.get(table) {
            Some(region) => region.get(&id).await,
            None => None,
        }
    }

    /// Batch fetch; missing ids are absent from the result.
    pub async fn get_many(&self, table: &str, ids: &[i64]) -> HashMap<i64, Value> {
        let mut out = HashMap::new();
        if let Some(region) = self.regions.get(table) {
            for id in ids {
                if let Some(value) = region.get(id).await {
                    out.insert(*id, value);
                }
            }
        }
        out
    }

    /// Snapshot of every cached row in the region.
    pub async fn entries(&self, table: &str) -> Vec<(i64, Value)> {
        match self.regions.get(table) {
            Some(region) => {
                region.run_pending_tasks().await;
                region.iter().map(|(k, v)| (*k, v)).collect()
            }
            None => Vec::new(),
        }
    }

    pub async fn set(&self, table: &str, id: i64, value: Value) {
        if let Some(region) = self.regions.get(table) {
            region.insert(id, value).await;
        }
    }

    /// Bulk rebuild after a table-wide mutation.
    pub async fn set_many(&self, table: &str, entries: Vec<(i64, Value)>) {
        if let Some(region) = self.regions.get(table) {
            for (id, value) in entries {
                region.insert(id, value).await;
            }
        }
    }

    pub async fn remove(&self, table: &str, ids: &[i64]) {
        if let Some(region) = self.regions.get(table) {
            for id in ids {
                region.invalidate(id).await;
            }
        }
    }

    pub async fn clear(&self, table: &str) {
        if let Some(region) = self.regions.get(table) {
            region.invalidate_all();
            region.run_pending_tasks().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn missing_region_degrades_to_no_op() {
        let cache = RegionCache::new(["user"], 100);
        assert!(!cache.exists("order"));
        cache.set("order", 1, json!({"id": 1})).await;
        assert_eq!(cache.get("order", 1).await, None);
        assert!(cache.get_many("order", &[1, 2]).await.is_empty());
        cache.remove("order", &[1]).await;
        cache.clear("order").await;
    }

    #[tokio::test]
    async fn round_trip_and_batch_get() {
        let cache = RegionCache::new(["user"], 100);
        cache.set("user", 1, json!({"id": 1, "username": "a"})).await;
        cache.set("user", 2, json!({"id": 2})).await;
        assert!(cache.exists_key("user", 1));
        let many = cache.get_many("user", &[1, 2, 3]).await;
        assert_eq!(many.len(), 2);
        assert!(!many.contains_key(&3));
        assert_eq!(many[&1]["username"], json!("a"));
    }

    #[tokio::test]
    async fn clear_then_rebuild() {
        let cache = RegionCache::new(["user"], 100);
        cache.set("user", 1, json!({"id": 1})).await;
        cache.clear("user").await;
        assert_eq!(cache.get("user", 1).await, None);
        cache
            .set_many("user", vec![(2, json!({"id": 2})), (3, json!({"id": 3}))])
            .await;
        assert!(cache.exists_key("user", 2));
        assert_eq!(cache.entries("user").await.len(), 2);
    }
}
