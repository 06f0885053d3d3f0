use axum::{
    Extension, Json,
    extract::{
        Multipart, Path, Query, State,
        multipart::Field,
        rejection::JsonRejection,
    },
    http::StatusCode,
    response::IntoResponse,
};
use tokio::{fs::File, io::AsyncWriteExt};
use tracing::{info, warn};

use memoir_db::StoryFilter;
use memoir_media::{
    IngestError, MAX_FILE_SIZE, MAX_FILES, Upload, asset_name, discard_spooled,
    storage::remove_quietly,
};
use memoir_types::api::{Claims, DeleteResponse, NewStory, StoryListQuery, StoryPatch};

use crate::auth::AppState;
use crate::error::ApiError;

/// Multipart part name carrying photo files.
const PHOTO_FIELD: &str = "photos";

/// GET /api/stories?search=&tags=a,b
pub async fn list_stories(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<StoryListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = StoryFilter::new(query.search.clone(), query.tag_list());
    let stories = state
        .db_call(move |db| db.list_stories(&claims.sub, &filter))
        .await?;
    Ok(Json(stories))
}

/// GET /api/stories/{id}
pub async fn get_story(
    State(state): State<AppState>,
    Path(story_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let story = state
        .db_call(move |db| db.get_story_with_photos(&story_id, &claims.sub))
        .await?
        .ok_or(ApiError::NotFound("story"))?;
    Ok(Json(story))
}

/// Text fields and spooled photo parts of a create-story form.
#[derive(Default)]
struct StoryForm {
    title: String,
    content: String,
    tags: Option<String>,
    uploads: Vec<Upload>,
}

/// POST /api/stories — multipart form with `title`, `content`, `tags`
/// (comma-separated) and up to ten `photos` parts.
///
/// Photos are ingested before anything is written to the database, and the
/// story is inserted together with its photo rows in one transaction, so a
/// rejected batch leaves no story behind.
pub async fn create_story(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut form = StoryForm::default();
    if let Err(e) = read_form(&state, multipart, &mut form).await {
        discard_spooled(&form.uploads).await;
        return Err(e);
    }

    let new_story = match NewStory::from_form(&form.title, &form.content, form.tags.as_deref())
        .normalized()
    {
        Ok(story) => story,
        Err(msg) => {
            discard_spooled(&form.uploads).await;
            return Err(ApiError::Validation(msg.to_string()));
        }
    };

    let photos = state.ingestor.ingest(form.uploads).await?;
    let asset_names: Vec<String> = photos
        .iter()
        .filter_map(|p| asset_name(&p.url).map(str::to_string))
        .collect();

    let user_id = claims.sub.clone();
    let created = state
        .db_call(move |db| db.create_story_with_photos(&user_id, &new_story, &photos))
        .await;

    let created = match created {
        Ok(created) => created,
        Err(e) => {
            warn!("Story insert failed, removing {} stored photo(s)", asset_names.len());
            state.ingestor.discard(&asset_names).await;
            return Err(e);
        }
    };

    info!(
        "Story {} created by {} with {} photo(s)",
        created.story.id,
        claims.sub,
        created.photos.len()
    );

    Ok((StatusCode::CREATED, Json(created)))
}

async fn read_form(
    state: &AppState,
    mut multipart: Multipart,
    form: &mut StoryForm,
) -> Result<(), ApiError> {
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "title" => form.title = field.text().await?,
            "content" => form.content = field.text().await?,
            "tags" => form.tags = Some(field.text().await?),
            PHOTO_FIELD => {
                let index = form.uploads.len();
                if index == MAX_FILES {
                    return Err(IngestError::TooManyFiles { count: index + 1 }.into());
                }
                let mime_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let (temp_path, file) = state
                    .ingestor
                    .store()
                    .open_spool()
                    .await
                    .map_err(|e| ApiError::Internal(e.into()))?;
                match spool_field(field, file, index).await {
                    Ok(size) => form.uploads.push(Upload {
                        temp_path,
                        mime_type,
                        size,
                    }),
                    Err(e) => {
                        if let Err(rm) = remove_quietly(&temp_path).await {
                            warn!("Failed to remove spool file {}: {}", temp_path.display(), rm);
                        }
                        return Err(e);
                    }
                }
            }
            other => warn!("Ignoring unexpected form field '{}'", other),
        }
    }
    Ok(())
}

/// Copies one photo part to its spool file chunk by chunk, stopping as soon
/// as the part grows past the per-file limit.
async fn spool_field(mut field: Field<'_>, mut file: File, index: usize) -> Result<u64, ApiError> {
    let mut size = 0u64;
    while let Some(chunk) = field.chunk().await? {
        size += chunk.len() as u64;
        if size > MAX_FILE_SIZE {
            return Err(IngestError::FileTooLarge { index, size }.into());
        }
        file.write_all(&chunk)
            .await
            .map_err(|e| ApiError::Internal(e.into()))?;
    }
    file.flush()
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;
    Ok(size)
}

/// PATCH /api/stories/{id} — any subset of title, content and tags.
pub async fn update_story(
    State(state): State<AppState>,
    Path(story_id): Path<String>,
    Extension(claims): Extension<Claims>,
    patch: Result<Json<StoryPatch>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(patch) = patch?;
    let story = state
        .db_call(move |db| {
            if db.update_story(&story_id, &claims.sub, &patch)?.is_none() {
                return Ok(None);
            }
            db.get_story_with_photos(&story_id, &claims.sub)
        })
        .await?
        .ok_or(ApiError::NotFound("story"))?;

    Ok(Json(story))
}

/// DELETE /api/stories/{id} — removes the story, its photo rows and their
/// stored assets.
pub async fn delete_story(
    State(state): State<AppState>,
    Path(story_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let id = story_id.clone();
    let removed = state
        .db_call(move |db| {
            let Some(story) = db.get_story_with_photos(&id, &claims.sub)? else {
                return Ok(None);
            };
            if !db.delete_story(&id, &claims.sub)? {
                return Ok(None);
            }
            Ok(Some(story.photos))
        })
        .await?
        .ok_or(ApiError::NotFound("story"))?;

    let asset_names: Vec<String> = removed
        .iter()
        .filter_map(|p| asset_name(&p.url).map(str::to_string))
        .collect();
    state.ingestor.discard(&asset_names).await;
    info!("Deleted story {} ({} photo(s))", story_id, removed.len());

    Ok(Json(DeleteResponse { success: true }))
}
