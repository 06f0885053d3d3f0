use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
};
use tower_http::services::ServeDir;

use memoir_media::storage::PUBLIC_PREFIX;
use memoir_media::{MAX_FILE_SIZE, MAX_FILES};

use crate::auth::{self, AppState};
use crate::middleware::require_auth;
use crate::{photos, stats, stories};

/// Room for a full photo batch plus the text fields and multipart framing.
const MAX_BODY_BYTES: usize = MAX_FILES * MAX_FILE_SIZE as usize + 1024 * 1024;

/// Build the application router: authenticated JSON API under `/api`,
/// stored photos under `/uploads`, and a health probe.
pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/user", get(auth::current_user))
        .route(
            "/api/stories",
            get(stories::list_stories).post(stories::create_story),
        )
        .route(
            "/api/stories/{id}",
            get(stories::get_story)
                .patch(stories::update_story)
                .delete(stories::delete_story),
        )
        .route("/api/photos/{id}", delete(photos::delete_photo))
        .route("/api/stats", get(stats::get_stats))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state.clone());

    Router::new()
        .merge(api_routes)
        .nest_service(
            PUBLIC_PREFIX,
            ServeDir::new(state.ingestor.store().asset_dir()),
        )
        .route("/health", get(health))
}

async fn health() -> &'static str {
    "ok"
}
