use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use tracing::info;

use memoir_media::asset_name;
use memoir_types::api::{Claims, DeleteResponse};

use crate::auth::AppState;
use crate::error::ApiError;

/// DELETE /api/photos/{id} — only photos of the caller's own stories.
pub async fn delete_photo(
    State(state): State<AppState>,
    Path(photo_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let photo = state
        .db_call(move |db| db.take_photo(&photo_id, &claims.sub))
        .await?
        .ok_or(ApiError::NotFound("photo"))?;

    if let Some(name) = asset_name(&photo.url) {
        state.ingestor.discard(&[name.to_string()]).await;
    }
    info!("Deleted photo {} from story {}", photo.id, photo.story_id);

    Ok(Json(DeleteResponse { success: true }))
}
