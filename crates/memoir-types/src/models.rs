use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub profile_image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Identity as reported by the auth provider at login.
/// `None` fields leave the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct UpsertUser {
    pub id: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub profile_image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    pub id: String,
    pub story_id: String,
    pub url: String,
    pub caption: Option<String>,
    pub order: i64,
    pub created_at: DateTime<Utc>,
}

/// A photo ready to be attached to a story. `order` is only a hint;
/// the repository assigns the final position from the batch index.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPhoto {
    pub url: String,
    pub caption: Option<String>,
    pub order: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryWithPhotos {
    #[serde(flatten)]
    pub story: Story,
    pub photos: Vec<Photo>,
}

/// List entry: the story, its lowest-ordered photo (if any) and a photo count.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorySummary {
    #[serde(flatten)]
    pub story: Story,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_photo: Option<Photo>,
    pub photo_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total_stories: i64,
    pub total_photos: i64,
    pub unique_tags: Vec<String>,
}
