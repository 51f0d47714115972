//! Route construction: common service routes plus the generic repository API.

use axum::{extract::State, routing::get, routing::post, Json, Router};
use serde::Serialize;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::repo;
use crate::state::AppState;

/// Request bodies above this size are rejected before deserialization.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyBody {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    database: Option<&'static str>,
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody { status: "ok" })
}

async fn ready(
    State(state): State<AppState>,
) -> Result<Json<ReadyBody>, (axum::http::StatusCode, Json<ReadyBody>)> {
    if sqlx::query("SELECT 1")
        .fetch_optional(state.router.default_pool())
        .await
        .is_err()
    {
        return Err((
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyBody {
                status: "degraded",
                database: Some("unavailable"),
            }),
        ));
    }
    Ok(Json(ReadyBody {
        status: "ok",
        database: Some("ok"),
    }))
}

async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Common routes (no state): GET /health, GET /version.
pub fn common_routes() -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
}

/// Common routes including readiness with a database check.
pub fn common_routes_with_ready(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/version", get(version))
        .with_state(state)
}

/// The generic data API, mounted under `/tabular`. Every operation is a POST
/// with the table name as the trailing path segment.
pub fn repository_routes(state: AppState) -> Router {
    Router::new()
        .route("/tabular/insert/:table", post(repo::insert))
        .route("/tabular/deleteById/:table", post(repo::delete_by_id))
        .route("/tabular/deleteByMap/:table", post(repo::delete_by_map))
        .route("/tabular/delete/:table", post(repo::delete))
        .route(
            "/tabular/deleteBatchIds/:table",
            post(repo::delete_batch_ids),
        )
        .route("/tabular/updateById/:table", post(repo::update_by_id))
        .route("/tabular/update/:table", post(repo::update))
        .route("/tabular/selectById/:table", post(repo::select_by_id))
        .route(
            "/tabular/selectBatchIds/:table",
            post(repo::select_batch_ids),
        )
        .route("/tabular/selectByMap/:table", post(repo::select_by_map))
        .route(
            "/tabular/selectOneByMap/:table",
            post(repo::select_one_by_map),
        )
        .route("/tabular/selectOne/:table", post(repo::select_one))
        .route("/tabular/exists/:table", post(repo::exists))
        .route("/tabular/selectCount/:table", post(repo::select_count))
        .route(
            "/tabular/selectCountByMap/:table",
            post(repo::select_count_by_map),
        )
        .route("/tabular/selectList/:table", post(repo::select_list))
        .route("/tabular/selectPage/:table", post(repo::select_page))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}
