//! API Router and Application State
//!
//! Minimal ingest surface: the messaging client posts events here and the
//! account layer reports tenant deletions.

mod error;

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

pub use error::{ApiError, ApiResult, ErrorResponse};

use crate::engine::{EventEngine, InboundEvent};
use crate::events;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<EventEngine>,
}

impl AppState {
    #[must_use]
    pub const fn new(engine: Arc<EventEngine>) -> Self {
        Self { engine }
    }
}

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/events", post(ingest_event))
        .route("/tenants/{id}/session", delete(evict_session))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    cached_previews: usize,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        cached_previews: state.engine.previewer().cache().len(),
    })
}

#[derive(Serialize)]
struct Accepted {
    accepted: bool,
}

/// Accept an event for asynchronous dispatch.
async fn ingest_event(
    State(state): State<AppState>,
    Json(event): Json<InboundEvent>,
) -> ApiResult<(StatusCode, Json<Accepted>)> {
    if event.tenant_id.trim().is_empty() {
        return Err(ApiError::Validation("tenant_id is required".into()));
    }
    if !events::is_valid_event_type(&event.kind) {
        return Err(ApiError::UnknownEventType(event.kind));
    }
    if !events::is_active_event_type(&event.kind) {
        debug!(kind = %event.kind, "Accepted event kind the client does not emit yet");
    }

    let engine = Arc::clone(&state.engine);
    tokio::spawn(async move {
        let handle = tokio::spawn(async move { engine.handle(event).await });
        match handle.await {
            Ok(outcome) => debug!(?outcome, "Event dispatched"),
            Err(e) => error!("Event dispatch task panicked: {}", e),
        }
    });

    Ok((StatusCode::ACCEPTED, Json(Accepted { accepted: true })))
}

/// Drop a deleted tenant's runtime state.
async fn evict_session(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> ApiResult<StatusCode> {
    if state.engine.tenant_deleted(&tenant_id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("session for tenant {tenant_id}")))
    }
}
