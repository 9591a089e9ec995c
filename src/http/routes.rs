use super::handlers;
use super::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    let settings = state.settings.clone();

    let router = Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Uploads
        .route("/upload-frame", post(handlers::upload_frame))
        .route("/upload-audio", post(handlers::upload_audio))
        // Assembly
        .route("/finalize", post(handlers::finalize))
        // Session queries
        .route(
            "/sessions/:stream_id/status",
            get(handlers::get_session_status),
        )
        .layer(DefaultBodyLimit::max(settings.max_upload_bytes));

    let router = match settings.cors_origin.as_deref().map(HeaderValue::from_str) {
        Some(Ok(origin)) => router.layer(
            CorsLayer::new()
                .allow_origin(origin)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(tower_http::cors::Any),
        ),
        Some(Err(e)) => {
            warn!("Ignoring invalid CORS origin: {}", e);
            router
        }
        None => router,
    };

    router
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
