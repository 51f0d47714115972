//! Shared application state for all routes. Built once by `initialize` and
//! cloned per handler.

use std::sync::Arc;

use crate::datasource::DatasourceRouter;
use crate::descriptor::TypeRegistry;
use crate::repository::Repository;

#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn Repository>,
    pub registry: Arc<TypeRegistry>,
    pub router: DatasourceRouter,
}
