//! Router

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers::{analyze_handler, chat_handler, get_session, health_check, list_tools};
use crate::state::AppState;

/// Build the application router
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health & info
        .route("/health", get(health_check))
        .route("/api/tools", get(list_tools))

        // Agent API
        .route("/api/chat", post(chat_handler))
        .route("/api/analyze", post(analyze_handler))
        .route("/api/sessions/{id}", get(get_session))

        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
