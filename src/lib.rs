//! Tabular SDK: schema-driven generic data-access library.
//!
//! At boot the library inspects every table of the configured PostgreSQL
//! datasources and builds an immutable registry of table descriptors. From then
//! on it serves generic CRUD and query operations against any table by name,
//! with uniform primary-key generation, optimistic version tokens, soft
//! deletion, per-table caching and before/after mutation events.

pub mod boot;
pub mod cache;
pub mod case;
pub mod catalog;
pub mod config;
pub mod datasource;
pub mod descriptor;
pub mod error;
pub mod events;
pub mod handlers;
pub mod id;
pub mod query;
pub mod record;
pub mod repository;
pub mod request;
pub mod response;
pub mod routes;
pub mod sql;
pub mod state;

pub use boot::{initialize, initialize_with};
pub use cache::RegionCache;
pub use config::Settings;
pub use datasource::{DatasourceRouter, DsContext};
pub use descriptor::{ColumnDescriptor, EntityType, SemanticType, TableDescriptor, TypeRegistry};
pub use error::AppError;
pub use events::{EntityEvent, EventBus, EventKind, EventPayload, EventSubscriber};
pub use id::{IdGenerator, SnowflakeIdGenerator};
pub use query::{Condition, Connect, Operator, Query, Sort};
pub use record::Record;
pub use repository::{
    BaseRepository, DataPermissionHandler, DefaultRepositoryHandler, NoopPermissionHandler,
    PermissionRepository, Repository, RepositoryHandler,
};
pub use response::{ApiResult, Page, PageResult};
pub use routes::{common_routes, common_routes_with_ready, repository_routes};
pub use state::AppState;
