use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, ToSql, params, params_from_iter};
use uuid::Uuid;

use memoir_types::api::{NewStory, StoryPatch};
use memoir_types::models::{
    NewPhoto, Photo, Story, StorySummary, StoryWithPhotos, UpsertUser, User, UserStats,
};

use crate::filter::StoryFilter;
use crate::models::{PHOTO_COLUMNS, PhotoRow, STORY_COLUMNS, StoryRow, USER_COLUMNS, UserRow};
use crate::{Database, DbError, Result};

impl Database {
    // -- Users --

    /// Insert or refresh a user from identity-provider data. Non-null
    /// incoming fields overwrite the stored ones.
    pub fn upsert_user(&self, user: &UpsertUser) -> Result<User> {
        let now = Utc::now();
        self.with_conn(|conn| {
            let row = conn.query_row(
                &format!(
                    "INSERT INTO users (id, email, first_name, last_name, profile_image_url, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                     ON CONFLICT(id) DO UPDATE SET
                        email = COALESCE(excluded.email, users.email),
                        first_name = COALESCE(excluded.first_name, users.first_name),
                        last_name = COALESCE(excluded.last_name, users.last_name),
                        profile_image_url = COALESCE(excluded.profile_image_url, users.profile_image_url),
                        updated_at = excluded.updated_at
                     RETURNING {USER_COLUMNS}"
                ),
                params![
                    user.id,
                    user.email,
                    user.first_name,
                    user.last_name,
                    user.profile_image_url,
                    now
                ],
                UserRow::from_row,
            )?;
            Ok(row.into())
        })
    }

    pub fn get_user(&self, id: &str) -> Result<Option<User>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                    [id],
                    UserRow::from_row,
                )
                .optional()?;
            Ok(row.map(User::from))
        })
    }

    // -- Stories --

    pub fn create_story(&self, user_id: &str, story: &NewStory) -> Result<Story> {
        let story = validate_new_story(story)?;
        self.with_conn(|conn| insert_story(conn, user_id, &story))
    }

    /// Create a story and attach its photo batch atomically: either both the
    /// story and every photo are committed, or nothing is.
    pub fn create_story_with_photos(
        &self,
        user_id: &str,
        story: &NewStory,
        photos: &[NewPhoto],
    ) -> Result<StoryWithPhotos> {
        let story = validate_new_story(story)?;
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let story = insert_story(&tx, user_id, &story)?;
            let photos = insert_photos(&tx, &story.id, photos)?;
            tx.commit()?;
            Ok(StoryWithPhotos { story, photos })
        })
    }

    /// All stories owned by `user_id` that pass `filter`, newest first, each
    /// with its lowest-ordered photo and a photo count.
    pub fn list_stories(&self, user_id: &str, filter: &StoryFilter) -> Result<Vec<StorySummary>> {
        let predicate = filter.to_predicate(user_id);
        self.with_conn(|conn| {
            // The first photo is picked by a correlated subquery on minimum
            // order; stories without photos yield NULL columns.
            let sql = format!(
                "SELECT s.id, s.user_id, s.title, s.content, s.tags, s.created_at, s.updated_at,
                        (SELECT COUNT(*) FROM photos c WHERE c.story_id = s.id),
                        fp.id, fp.story_id, fp.url, fp.caption, fp.sort_order, fp.created_at
                 FROM stories s
                 LEFT JOIN photos fp ON fp.id = (
                     SELECT p.id FROM photos p
                     WHERE p.story_id = s.id
                     ORDER BY p.sort_order ASC, p.created_at ASC, p.id ASC
                     LIMIT 1
                 )
                 WHERE {}
                 ORDER BY s.created_at DESC, s.rowid DESC",
                predicate.sql
            );

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(predicate.params.iter()), |row| {
                    let story = StoryRow::from_row(row)?;
                    let photo_count: i64 = row.get(7)?;
                    let has_photo = row.get::<_, Option<String>>(8)?.is_some();
                    let first_photo = if has_photo {
                        Some(PhotoRow::from_row_at(row, 8)?)
                    } else {
                        None
                    };
                    Ok((story, photo_count, first_photo))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(story, photo_count, first_photo)| -> Result<StorySummary> {
                    Ok(StorySummary {
                        story: story.try_into()?,
                        first_photo: first_photo.map(Photo::from),
                        photo_count,
                    })
                })
                .collect()
        })
    }

    /// Returns `None` both when the story does not exist and when it belongs
    /// to someone else.
    pub fn get_story_with_photos(&self, id: &str, user_id: &str) -> Result<Option<StoryWithPhotos>> {
        self.with_conn(|conn| {
            let Some(story) = query_owned_story(conn, id, user_id)? else {
                return Ok(None);
            };
            let photos = query_photos(conn, id)?;
            Ok(Some(StoryWithPhotos { story, photos }))
        })
    }

    pub fn update_story(&self, id: &str, user_id: &str, patch: &StoryPatch) -> Result<Option<Story>> {
        let patch = validate_patch(patch)?;
        let now = Utc::now();

        let mut sets = vec!["updated_at = ?1".to_string()];
        let mut values: Vec<Box<dyn ToSql>> = vec![Box::new(now)];
        if let Some(title) = patch.title {
            values.push(Box::new(title));
            sets.push(format!("title = ?{}", values.len()));
        }
        if let Some(content) = patch.content {
            values.push(Box::new(content));
            sets.push(format!("content = ?{}", values.len()));
        }
        if let Some(tags) = patch.tags {
            values.push(Box::new(serde_json::to_string(&tags)?));
            sets.push(format!("tags = ?{}", values.len()));
        }
        values.push(Box::new(id.to_string()));
        let id_idx = values.len();
        values.push(Box::new(user_id.to_string()));
        let user_idx = values.len();

        let sql = format!(
            "UPDATE stories SET {} WHERE id = ?{id_idx} AND user_id = ?{user_idx} RETURNING {STORY_COLUMNS}",
            sets.join(", ")
        );

        self.with_conn(|conn| {
            let row = conn
                .query_row(&sql, params_from_iter(values.iter()), StoryRow::from_row)
                .optional()?;
            row.map(Story::try_from).transpose()
        })
    }

    /// Deletes the story and, through the foreign key cascade, its photos.
    pub fn delete_story(&self, id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM stories WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )?;
            Ok(n > 0)
        })
    }

    // -- Photos --

    /// Attach photos to a story. Positions are taken from the batch index,
    /// starting at 0; any `order` on the input is ignored.
    pub fn add_photos_to_story(&self, story_id: &str, photos: &[NewPhoto]) -> Result<Vec<Photo>> {
        if photos.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let created = insert_photos(&tx, story_id, photos)?;
            tx.commit()?;
            Ok(created)
        })
    }

    /// Photos have no owner column; ownership is resolved through the story.
    pub fn delete_photo(&self, id: &str, user_id: &str) -> Result<bool> {
        Ok(self.take_photo(id, user_id)?.is_some())
    }

    /// Delete a photo of an owned story and return the removed row, so the
    /// caller can release the stored asset.
    pub fn take_photo(&self, id: &str, user_id: &str) -> Result<Option<Photo>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!(
                        "DELETE FROM photos
                         WHERE id = ?1
                           AND story_id IN (SELECT id FROM stories WHERE user_id = ?2)
                         RETURNING {PHOTO_COLUMNS}"
                    ),
                    params![id, user_id],
                    |row| PhotoRow::from_row_at(row, 0),
                )
                .optional()?;
            Ok(row.map(Photo::from))
        })
    }

    // -- Stats --

    pub fn get_user_stats(&self, user_id: &str) -> Result<UserStats> {
        self.with_conn(|conn| {
            let total_stories: i64 = conn.query_row(
                "SELECT COUNT(*) FROM stories WHERE user_id = ?1",
                [user_id],
                |row| row.get(0),
            )?;

            let total_photos: i64 = conn.query_row(
                "SELECT COUNT(*) FROM photos p
                 JOIN stories s ON p.story_id = s.id
                 WHERE s.user_id = ?1",
                [user_id],
                |row| row.get(0),
            )?;

            let mut stmt = conn.prepare(
                "SELECT DISTINCT t.value
                 FROM stories s, json_each(s.tags) t
                 WHERE s.user_id = ?1
                 ORDER BY t.value",
            )?;
            let unique_tags = stmt
                .query_map([user_id], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(UserStats {
                total_stories,
                total_photos,
                unique_tags,
            })
        })
    }
}

fn validate_new_story(story: &NewStory) -> Result<NewStory> {
    story
        .normalized()
        .map_err(|msg| DbError::Validation(msg.to_string()))
}

fn validate_patch(patch: &StoryPatch) -> Result<StoryPatch> {
    patch
        .normalized()
        .map_err(|msg| DbError::Validation(msg.to_string()))
}

fn insert_story(conn: &Connection, user_id: &str, story: &NewStory) -> Result<Story> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now();
    conn.execute(
        "INSERT INTO stories (id, user_id, title, content, tags, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![
            id,
            user_id,
            story.title,
            story.content,
            serde_json::to_string(&story.tags)?,
            now
        ],
    )?;

    Ok(Story {
        id,
        user_id: user_id.to_string(),
        title: story.title.clone(),
        content: story.content.clone(),
        tags: story.tags.clone(),
        created_at: now,
        updated_at: now,
    })
}

fn insert_photos(conn: &Connection, story_id: &str, photos: &[NewPhoto]) -> Result<Vec<Photo>> {
    let now = Utc::now();
    let mut stmt = conn.prepare(
        "INSERT INTO photos (id, story_id, url, caption, sort_order, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;

    let mut created = Vec::with_capacity(photos.len());
    for (index, photo) in photos.iter().enumerate() {
        let id = Uuid::new_v4().to_string();
        let order = index as i64;
        stmt.execute(params![id, story_id, photo.url, photo.caption, order, now])?;
        created.push(Photo {
            id,
            story_id: story_id.to_string(),
            url: photo.url.clone(),
            caption: photo.caption.clone(),
            order,
            created_at: now,
        });
    }
    Ok(created)
}

fn query_owned_story(conn: &Connection, id: &str, user_id: &str) -> Result<Option<Story>> {
    let row = conn
        .query_row(
            &format!("SELECT {STORY_COLUMNS} FROM stories WHERE id = ?1 AND user_id = ?2"),
            params![id, user_id],
            StoryRow::from_row,
        )
        .optional()?;
    row.map(Story::try_from).transpose()
}

fn query_photos(conn: &Connection, story_id: &str) -> Result<Vec<Photo>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PHOTO_COLUMNS} FROM photos WHERE story_id = ?1 ORDER BY sort_order ASC, id ASC"
    ))?;
    let rows = stmt
        .query_map([story_id], |row| PhotoRow::from_row_at(row, 0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows.into_iter().map(Photo::from).collect())
}
