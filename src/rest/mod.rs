// rest/mod.rs — public REST API server.
//
// Axum HTTP server bridging REST calls to the task/user services.
//
// Endpoints:
//   GET    /api/health
//   GET    /api/tasks          POST /api/tasks
//   GET    /api/tasks/{id}     PUT  /api/tasks/{id}    DELETE /api/tasks/{id}
//   GET    /api/users          POST /api/users
//   GET    /api/users/{id}     PUT  /api/users/{id}    DELETE /api/users/{id}

pub mod routes;

use anyhow::Result;
use axum::{
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::AppContext;

/// The uniform response envelope: every operation yields a message and a
/// data payload (null on failure and on delete).
#[derive(Debug, Serialize)]
pub struct Envelope {
    pub message: &'static str,
    pub data: Value,
}

impl Envelope {
    pub fn ok(data: Value) -> Json<Self> {
        Json(Self { message: "OK", data })
    }

    pub fn created(data: Value) -> (StatusCode, Json<Self>) {
        (
            StatusCode::CREATED,
            Json(Self {
                message: "Created",
                data,
            }),
        )
    }

    pub fn no_content() -> Json<Self> {
        Json(Self {
            message: "No Content",
            data: Value::Null,
        })
    }
}

pub async fn serve(ctx: Arc<AppContext>) -> Result<()> {
    let bind = format!("{}:{}", ctx.config.bind_address, ctx.config.port);
    let addr: SocketAddr = bind.parse()?;

    let router = build_router(ctx);

    info!("REST API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn build_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/api/health", get(routes::health::health))
        .route(
            "/api/tasks",
            get(routes::tasks::list).post(routes::tasks::create),
        )
        .route(
            "/api/tasks/{id}",
            get(routes::tasks::fetch)
                .put(routes::tasks::replace)
                .delete(routes::tasks::remove),
        )
        .route(
            "/api/users",
            get(routes::users::list).post(routes::users::create),
        )
        .route(
            "/api/users/{id}",
            get(routes::users::fetch)
                .put(routes::users::replace)
                .delete(routes::users::remove),
        )
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received");
    }
}
