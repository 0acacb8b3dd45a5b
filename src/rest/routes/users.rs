// rest/routes/users.rs — user REST routes, thin bridges to the user service.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ApiError;
use crate::model::UserPayload;
use crate::rest::Envelope;
use crate::users;
use crate::AppContext;

pub async fn list(
    State(ctx): State<Arc<AppContext>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Envelope>, ApiError> {
    let outcome = users::list(ctx.store.as_ref(), &params).await?;
    Ok(Envelope::ok(outcome.into_value()))
}

pub async fn fetch(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Envelope>, ApiError> {
    let doc = users::get(ctx.store.as_ref(), &id, &params).await?;
    Ok(Envelope::ok(Value::Object(doc)))
}

pub async fn create(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Envelope>), ApiError> {
    let user = users::create(ctx.store.as_ref(), UserPayload::from_value(body)).await?;
    Ok(Envelope::created(Value::Object(user.to_doc())))
}

pub async fn replace(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Envelope>, ApiError> {
    let user = users::replace(ctx.store.as_ref(), &id, UserPayload::from_value(body)).await?;
    Ok(Envelope::ok(Value::Object(user.to_doc())))
}

pub async fn remove(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
) -> Result<Json<Envelope>, ApiError> {
    users::delete(ctx.store.as_ref(), &id).await?;
    Ok(Envelope::no_content())
}
