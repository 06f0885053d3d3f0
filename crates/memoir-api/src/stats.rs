use axum::{Extension, Json, extract::State, response::IntoResponse};

use memoir_types::api::Claims;

use crate::auth::AppState;
use crate::error::ApiError;

/// GET /api/stats
pub async fn get_stats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let stats = state
        .db_call(move |db| db.get_user_stats(&claims.sub))
        .await?;
    Ok(Json(stats))
}
