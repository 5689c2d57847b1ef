use axum::{routing::get, routing::post, Router};

use crate::app_state::AppState;

pub mod generate;
pub mod health;
pub mod metrics;

/// Job and health endpoints. The metrics route and middleware are added by the binary.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/generate", post(generate::generate))
        .with_state(state)
}
