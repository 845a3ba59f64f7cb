//! Routes of the id service.
//!
//! - `POST /generator/ids` - issue one id.
//! - `GET /generator/ids/{id}` - decode any id.
//! - `GET /health` - whether this instance currently holds a slot.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use gendora::{IdGenerator, Metadata};
use serde::Serialize;
use serde_json::{Value, json};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::server::service::error::ApiError;

/// State shared by every request.
///
/// The generator is type-erased so the router does not depend on the store
/// or clock the binary was configured with.
#[derive(Clone)]
pub struct AppState {
    generator: Arc<dyn IdGenerator>,
}

impl AppState {
    pub fn new(generator: Arc<dyn IdGenerator>) -> Self {
        Self { generator }
    }
}

#[derive(Debug, Serialize)]
pub struct GeneratedId {
    /// Decimal string; JSON numbers lose precision above 2^53.
    pub id: String,
    pub metadata: Metadata,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/generator/ids", post(generate_id))
        .route("/generator/ids/{id}", get(get_metadata))
        .route("/health", get(health))
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        )
        .with_state(state)
}

async fn generate_id(State(state): State<AppState>) -> Result<Json<GeneratedId>, ApiError> {
    let id = state.generator.generate()?;
    Ok(Json(GeneratedId {
        id: id.to_string(),
        metadata: id.metadata(),
    }))
}

async fn get_metadata(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Metadata>, ApiError> {
    let raw = id.parse::<u64>().map_err(|_| ApiError::InvalidId { id })?;
    Ok(Json(state.generator.metadata(raw)))
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.generator.current_slot() {
        Some(slot) => (
            StatusCode::OK,
            Json(json!({ "status": "serving", "slot": slot })),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "not_serving" })),
        ),
    }
}
