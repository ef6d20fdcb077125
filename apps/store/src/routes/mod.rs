pub mod health;
pub mod proxy;

use axum::{
    routing::{any, get},
    Router,
};

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Everything under /api/ belongs to the backend
        .route("/api/*path", any(proxy::forward_handler))
        .with_state(state)
}
