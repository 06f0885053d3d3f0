use std::sync::Arc;

use axum::{Extension, Json, extract::State, response::IntoResponse};
use tracing::info;

use memoir_db::Database;
use memoir_media::Ingestor;
use memoir_types::api::Claims;
use memoir_types::models::UpsertUser;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub ingestor: Ingestor,
    pub jwt_secret: String,
}

impl AppStateInner {
    /// Run a repository call on the blocking pool.
    pub async fn db_call<F, T>(self: &Arc<Self>, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Database) -> memoir_db::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let state = self.clone();
        let result = tokio::task::spawn_blocking(move || f(&state.db)).await?;
        Ok(result?)
    }
}

/// POST /api/auth/login — the identity token has already been verified by
/// the auth middleware; record (or refresh) the user it describes.
pub async fn login(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let upsert = UpsertUser {
        id: claims.sub,
        email: claims.email,
        first_name: claims.first_name,
        last_name: claims.last_name,
        profile_image_url: claims.profile_image_url,
    };

    let user = state.db_call(move |db| db.upsert_user(&upsert)).await?;
    info!("User {} logged in", user.id);

    Ok(Json(user))
}

/// GET /api/auth/user
pub async fn current_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db_call(move |db| db.get_user(&claims.sub))
        .await?
        .ok_or(ApiError::NotFound("user"))?;

    Ok(Json(user))
}
