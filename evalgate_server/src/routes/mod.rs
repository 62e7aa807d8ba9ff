use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::AppState;

mod auth;
mod evaluations;

/// Builds the service's router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .merge(auth::router())
        .merge(evaluations::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health(State(app_name): State<Arc<str>>) -> Json<Value> {
    Json(json!({ "status": "ok", "service": &*app_name }))
}
