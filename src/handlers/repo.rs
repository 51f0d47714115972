//! Generic repository handlers. Every endpoint is a POST with the table name
//! as the trailing path segment; bodies and responses use camelCase field
//! naming, converted to storage naming at this boundary.

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{Map, Value};

use crate::case::{object_keys_to_camel_case, object_keys_to_snake_case};
use crate::error::AppError;
use crate::query::{valid_column_name, Query};
use crate::record::Record;
use crate::request::{BaseRequest, MapRequest, PageRequest};
use crate::response::{ApiResult, Page, PageResult};
use crate::state::AppState;

fn check_table(table: &str) -> Result<(), AppError> {
    if valid_column_name(table) {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!(
            "invalid table name '{}'",
            table
        )))
    }
}

fn to_record(mut entity: Map<String, Value>) -> Record {
    object_keys_to_snake_case(&mut entity);
    Record::from_map(entity)
}

fn to_wire(record: Record) -> Value {
    let mut map = record.into_map();
    object_keys_to_camel_case(&mut map);
    Value::Object(map)
}

fn to_wire_list(records: Vec<Record>) -> Vec<Value> {
    records.into_iter().map(to_wire).collect()
}

pub async fn insert(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Json(request): Json<BaseRequest<Map<String, Value>>>,
) -> Result<Json<ApiResult<i64>>, AppError> {
    check_table(&table)?;
    let inserted = state
        .repository
        .insert(&table, to_record(request.param))
        .await?;
    let id = inserted
        .id()
        .ok_or_else(|| AppError::MissingId(table.clone()))?;
    Ok(Json(ApiResult::success(id)))
}

pub async fn delete_by_id(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Json(request): Json<BaseRequest<i64>>,
) -> Result<Json<ApiResult<u64>>, AppError> {
    check_table(&table)?;
    let affected = state.repository.delete_by_id(&table, request.param).await?;
    Ok(Json(ApiResult::success(affected)))
}

pub async fn delete_by_map(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Json(request): Json<BaseRequest<Map<String, Value>>>,
) -> Result<Json<ApiResult<u64>>, AppError> {
    check_table(&table)?;
    let affected = state.repository.delete_by_map(&table, &request.param).await?;
    Ok(Json(ApiResult::success(affected)))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Json(request): Json<BaseRequest<Query>>,
) -> Result<Json<ApiResult<u64>>, AppError> {
    check_table(&table)?;
    let affected = state.repository.delete(&table, &request.param).await?;
    Ok(Json(ApiResult::success(affected)))
}

pub async fn delete_batch_ids(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Json(request): Json<BaseRequest<Vec<i64>>>,
) -> Result<Json<ApiResult<u64>>, AppError> {
    check_table(&table)?;
    let affected = state
        .repository
        .delete_batch_ids(&table, &request.param)
        .await?;
    Ok(Json(ApiResult::success(affected)))
}

pub async fn update_by_id(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Json(request): Json<BaseRequest<Map<String, Value>>>,
) -> Result<Json<ApiResult<u64>>, AppError> {
    check_table(&table)?;
    let affected = state
        .repository
        .update_by_id(&table, to_record(request.param))
        .await?;
    Ok(Json(ApiResult::success(affected)))
}

pub async fn update(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Json(request): Json<MapRequest<Query>>,
) -> Result<Json<ApiResult<u64>>, AppError> {
    check_table(&table)?;
    let affected = state
        .repository
        .update(&table, to_record(request.entity), &request.param)
        .await?;
    Ok(Json(ApiResult::success(affected)))
}

pub async fn select_by_id(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Json(request): Json<BaseRequest<i64>>,
) -> Result<Json<ApiResult<Value>>, AppError> {
    check_table(&table)?;
    let row = state.repository.select_by_id(&table, request.param).await?;
    Ok(Json(ApiResult::success(
        row.map(to_wire).unwrap_or(Value::Null),
    )))
}

pub async fn select_batch_ids(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Json(request): Json<BaseRequest<Vec<i64>>>,
) -> Result<Json<ApiResult<Vec<Value>>>, AppError> {
    check_table(&table)?;
    let rows = state
        .repository
        .select_batch_ids(&table, &request.param)
        .await?;
    Ok(Json(ApiResult::success(to_wire_list(rows))))
}

pub async fn select_by_map(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Json(request): Json<BaseRequest<Map<String, Value>>>,
) -> Result<Json<ApiResult<Vec<Value>>>, AppError> {
    check_table(&table)?;
    let rows = state.repository.select_by_map(&table, &request.param).await?;
    Ok(Json(ApiResult::success(to_wire_list(rows))))
}

pub async fn select_one_by_map(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Json(request): Json<BaseRequest<Map<String, Value>>>,
) -> Result<Json<ApiResult<Value>>, AppError> {
    check_table(&table)?;
    let row = state
        .repository
        .select_one_by_map(&table, &request.param, true)
        .await?;
    Ok(Json(ApiResult::success(
        row.map(to_wire).unwrap_or(Value::Null),
    )))
}

pub async fn select_one(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Json(request): Json<BaseRequest<Query>>,
) -> Result<Json<ApiResult<Value>>, AppError> {
    check_table(&table)?;
    let row = state
        .repository
        .select_one(&table, &request.param, true)
        .await?;
    Ok(Json(ApiResult::success(
        row.map(to_wire).unwrap_or(Value::Null),
    )))
}

pub async fn exists(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Json(request): Json<BaseRequest<Query>>,
) -> Result<Json<ApiResult<bool>>, AppError> {
    check_table(&table)?;
    let found = state.repository.exists(&table, &request.param).await?;
    Ok(Json(ApiResult::success(found)))
}

pub async fn select_count(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Json(request): Json<BaseRequest<Query>>,
) -> Result<Json<ApiResult<i64>>, AppError> {
    check_table(&table)?;
    let count = state.repository.select_count(&table, &request.param).await?;
    Ok(Json(ApiResult::success(count)))
}

pub async fn select_count_by_map(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Json(request): Json<BaseRequest<Map<String, Value>>>,
) -> Result<Json<ApiResult<i64>>, AppError> {
    check_table(&table)?;
    let count = state
        .repository
        .select_count_by_map(&table, &request.param)
        .await?;
    Ok(Json(ApiResult::success(count)))
}

pub async fn select_list(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Json(request): Json<BaseRequest<Query>>,
) -> Result<Json<ApiResult<Vec<Value>>>, AppError> {
    check_table(&table)?;
    let rows = state.repository.select_list(&table, &request.param).await?;
    Ok(Json(ApiResult::success(to_wire_list(rows))))
}

pub async fn select_page(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Json(request): Json<PageRequest<Query>>,
) -> Result<Json<PageResult<Vec<Value>>>, AppError> {
    check_table(&table)?;
    request.validate()?;
    let (rows, total) = state
        .repository
        .select_page(&table, &request.param, request.page_num, request.page_size)
        .await?;
    let page = Page {
        page_size: request.page_size,
        current_page: request.page_num,
        total: total.max(0) as u64,
    };
    Ok(Json(PageResult::success(to_wire_list(rows), page)))
}
