//! Environment-driven settings.
//!
//! A single-datasource deployment only needs `DATABASE_URL`. Multiple
//! datasources are declared with `DATASOURCES=name1,name2` plus one
//! `DATASOURCE_<NAME>_URL` per name; the first listed name is the default.

use std::collections::HashMap;

use crate::cache::RegionCache;
use crate::error::AppError;
use crate::id::MAX_WORKER_ID;

#[derive(Clone, Debug)]
pub struct Settings {
    /// Datasource name -> connection URL. Always contains `default_datasource`.
    pub datasources: HashMap<String, String>,
    pub default_datasource: String,
    pub max_connections: u32,
    /// Tables served from an in-process cache region.
    pub cached_tables: Vec<String>,
    pub cache_capacity: u64,
    pub worker_id: u16,
    pub bind_addr: String,
}

impl Settings {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let mut datasources = HashMap::new();
        let default_datasource;

        match std::env::var("DATASOURCES") {
            Ok(names) => {
                let names: Vec<String> = names
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
                if names.is_empty() {
                    return Err(AppError::Config("DATASOURCES is empty".into()));
                }
                for name in &names {
                    let var = format!("DATASOURCE_{}_URL", name.to_uppercase());
                    let url = std::env::var(&var)
                        .map_err(|_| AppError::Config(format!("{} is not set", var)))?;
                    datasources.insert(name.clone(), url);
                }
                default_datasource = names[0].clone();
            }
            Err(_) => {
                let url = std::env::var("DATABASE_URL").map_err(|_| {
                    AppError::Config("DATABASE_URL or DATASOURCES must be set".into())
                })?;
                datasources.insert("default".to_string(), url);
                default_datasource = "default".to_string();
            }
        }

        let max_connections = parse_var("MAX_CONNECTIONS", 5)?;
        let cache_capacity = parse_var("CACHE_CAPACITY", RegionCache::DEFAULT_CAPACITY)?;
        let worker_id = parse_var("WORKER_ID", 0)?;
        check_worker_id(worker_id)?;

        let cached_tables = std::env::var("CACHED_TABLES")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

        Ok(Settings {
            datasources,
            default_datasource,
            max_connections,
            cached_tables,
            cache_capacity,
            worker_id,
            bind_addr,
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, AppError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| AppError::Config(format!("{} is not a valid value: {}", name, raw))),
        Err(_) => Ok(default),
    }
}

/// An out-of-range worker id would silently collide after clamping, so it is
/// rejected at configuration time.
fn check_worker_id(worker_id: u16) -> Result<(), AppError> {
    if worker_id > MAX_WORKER_ID {
        return Err(AppError::Config(format!(
            "WORKER_ID must be between 0 and {}, got {}",
            MAX_WORKER_ID, worker_id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_id_range_is_enforced() {
        assert!(check_worker_id(0).is_ok());
        assert!(check_worker_id(MAX_WORKER_ID).is_ok());

        let err = check_worker_id(64).unwrap_err().to_string();
        assert!(err.contains("WORKER_ID"));
        assert!(err.contains("63"));
    }
}
