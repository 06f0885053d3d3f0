//! Database row types. These map directly to SQLite rows and stay distinct
//! from the memoir-types API models.
use chrono::{DateTime, Utc};
use rusqlite::Row;

use memoir_types::models::{Photo, Story, User};

use crate::DbError;

pub struct UserRow {
    pub id: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub profile_image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct StoryRow {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub content: String,
    /// JSON array of strings.
    pub tags: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct PhotoRow {
    pub id: String,
    pub story_id: String,
    pub url: String,
    pub caption: Option<String>,
    pub sort_order: i64,
    pub created_at: DateTime<Utc>,
}

pub(crate) const USER_COLUMNS: &str =
    "id, email, first_name, last_name, profile_image_url, created_at, updated_at";
pub(crate) const STORY_COLUMNS: &str = "id, user_id, title, content, tags, created_at, updated_at";
pub(crate) const PHOTO_COLUMNS: &str = "id, story_id, url, caption, sort_order, created_at";

impl UserRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            email: row.get(1)?,
            first_name: row.get(2)?,
            last_name: row.get(3)?,
            profile_image_url: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }
}

impl StoryRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            content: row.get(3)?,
            tags: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }
}

impl PhotoRow {
    /// Reads a photo starting at column `offset`, so the same mapping serves
    /// both plain photo queries and joined story listings.
    pub(crate) fn from_row_at(row: &Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(offset)?,
            story_id: row.get(offset + 1)?,
            url: row.get(offset + 2)?,
            caption: row.get(offset + 3)?,
            sort_order: row.get(offset + 4)?,
            created_at: row.get(offset + 5)?,
        })
    }
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            profile_image_url: row.profile_image_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl TryFrom<StoryRow> for Story {
    type Error = DbError;

    fn try_from(row: StoryRow) -> Result<Self, Self::Error> {
        Ok(Story {
            tags: serde_json::from_str(&row.tags)?,
            id: row.id,
            user_id: row.user_id,
            title: row.title,
            content: row.content,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl From<PhotoRow> for Photo {
    fn from(row: PhotoRow) -> Self {
        Photo {
            id: row.id,
            story_id: row.story_id,
            url: row.url,
            caption: row.caption,
            order: row.sort_order,
            created_at: row.created_at,
        }
    }
}
