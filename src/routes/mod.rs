//! HTTP routes
//!
//! - `POST /show/`: metadata report as JSON
//! - `POST /clean/`: cleaned copy as an attachment
//! - `GET /healthz`: liveness, dependency status goes to the log

pub mod clean;
pub mod health;
pub mod show;
mod upload;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// `sandbox` defaults to on for both upload endpoints
fn default_sandbox() -> bool {
    true
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = state.config().storage.max_upload_size;

    Router::new()
        .route("/show/", post(show::show))
        .route("/show", post(show::show))
        .route("/clean/", post(clean::clean))
        .route("/clean", post(clean::clean))
        .route("/healthz", get(health::healthz))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
