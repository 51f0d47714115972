//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::response::ApiResult;

#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed query structure, bad column names, out-of-range pagination.
    /// The message aggregates every violation joined by "; ".
    #[error("{0}")]
    Validation(String),
    /// Unknown table name: no descriptor was registered at boot.
    #[error("descriptor not found for table '{0}'")]
    DescriptorNotFound(String),
    /// update_by_id called with an entity that has no id.
    #[error("entity for table '{0}' has no id")]
    MissingId(String),
    /// select_one in strict mode matched more than one row.
    #[error("expected one result from '{table}' but found {count}")]
    TooManyResults { table: String, count: usize },
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("config: {0}")]
    Config(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::Validation(_) | AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, 400),
            AppError::DescriptorNotFound(_) | AppError::MissingId(_) => {
                (StatusCode::BAD_REQUEST, 400)
            }
            AppError::TooManyResults { .. } => (StatusCode::INTERNAL_SERVER_ERROR, 500),
            AppError::Db(_) | AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, 500),
        };
        let body: ApiResult<serde_json::Value> = ApiResult {
            code,
            message: self.to_string(),
            data: None,
        };
        (status, Json(body)).into_response()
    }
}
