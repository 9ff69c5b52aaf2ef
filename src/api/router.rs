//! API router.
//!
//! Returns a composable `Router` with all routes nested under `/api/`.
//! CORS is wide open because the browser frontend is served from a
//! different origin during development.
//!
//! NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::endpoints;
use crate::api::types::ApiContext;
use crate::imaging::MAX_IMAGE_BYTES;

/// Multipart framing overhead on top of the image size cap.
const BODY_LIMIT_SLACK: usize = 1024 * 1024;

/// Build the API router with all endpoints under `/api/`.
pub fn api_router(ctx: ApiContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let routes = Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/analyze-image", post(endpoints::analyze::analyze))
        .route("/chat/send", post(endpoints::chat::send))
        .route("/chat/conversations", get(endpoints::chat::conversations))
        .route(
            "/chat/conversations/:id",
            get(endpoints::chat::conversation),
        )
        .with_state(ctx);

    Router::new()
        .nest("/api", routes)
        .layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES + BODY_LIMIT_SLACK))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
