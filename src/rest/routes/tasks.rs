// rest/routes/tasks.rs — task REST routes, thin bridges to the task service.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ApiError;
use crate::model::TaskPayload;
use crate::rest::Envelope;
use crate::tasks;
use crate::AppContext;

pub async fn list(
    State(ctx): State<Arc<AppContext>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Envelope>, ApiError> {
    let outcome = tasks::list(ctx.store.as_ref(), &params).await?;
    Ok(Envelope::ok(outcome.into_value()))
}

pub async fn fetch(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Envelope>, ApiError> {
    let doc = tasks::get(ctx.store.as_ref(), &id, &params).await?;
    Ok(Envelope::ok(Value::Object(doc)))
}

pub async fn create(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Envelope>), ApiError> {
    let task = tasks::create(ctx.store.as_ref(), TaskPayload::from_value(body)).await?;
    Ok(Envelope::created(Value::Object(task.to_doc())))
}

pub async fn replace(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Envelope>, ApiError> {
    let task = tasks::replace(ctx.store.as_ref(), &id, TaskPayload::from_value(body)).await?;
    Ok(Envelope::ok(Value::Object(task.to_doc())))
}

pub async fn remove(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
) -> Result<Json<Envelope>, ApiError> {
    tasks::delete(ctx.store.as_ref(), &id).await?;
    Ok(Envelope::no_content())
}
