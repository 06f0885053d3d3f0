use serde::{Deserialize, Deserializer, Serialize};

// -- JWT Claims --

/// Claims carried by identity tokens. `sub` is the stable user id; the
/// profile fields are optional and only used for upsert-on-login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub profile_image_url: Option<String>,
    pub exp: usize,
}

// -- Stories --

/// Story creation input as received; `normalized` applies the field rules.
#[derive(Debug, Clone, Default)]
pub struct NewStory {
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
}

impl NewStory {
    /// Build from raw form values. `tags` is a comma-separated list.
    pub fn from_form(title: &str, content: &str, tags: Option<&str>) -> Self {
        Self {
            title: title.to_string(),
            content: content.to_string(),
            tags: tags.map(split_tags).unwrap_or_default(),
        }
    }

    /// Trimmed copy with blank tags dropped. Fails if the title or content
    /// is empty.
    pub fn normalized(&self) -> Result<Self, &'static str> {
        let title = self.title.trim();
        let content = self.content.trim();
        if title.is_empty() {
            return Err("title is required");
        }
        if content.is_empty() {
            return Err("content is required");
        }
        Ok(Self {
            title: title.to_string(),
            content: content.to_string(),
            tags: clean_tags(&self.tags),
        })
    }
}

/// Partial update; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoryPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "deserialize_tags")]
    pub tags: Option<Vec<String>>,
}

impl StoryPatch {
    /// Same rules as `NewStory::normalized`, applied to the supplied fields.
    pub fn normalized(&self) -> Result<Self, &'static str> {
        let title = self.title.as_deref().map(str::trim);
        let content = self.content.as_deref().map(str::trim);
        if title == Some("") {
            return Err("title must not be empty");
        }
        if content == Some("") {
            return Err("content must not be empty");
        }
        Ok(Self {
            title: title.map(str::to_string),
            content: content.map(str::to_string),
            tags: self.tags.as_deref().map(clean_tags),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct StoryListQuery {
    pub search: Option<String>,
    pub tags: Option<String>,
}

impl StoryListQuery {
    pub fn tag_list(&self) -> Vec<String> {
        self.tags.as_deref().map(split_tags).unwrap_or_default()
    }
}

// -- Responses --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
}

/// Split a comma-separated tag string, trimming each entry and dropping blanks.
pub fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn clean_tags<S: AsRef<str>>(tags: &[S]) -> Vec<String> {
    tags.iter()
        .map(|t| t.as_ref().trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TagsInput {
    List(Vec<String>),
    Csv(String),
}

fn deserialize_tags<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let input = Option::<TagsInput>::deserialize(deserializer)?;
    Ok(input.map(|tags| match tags {
        TagsInput::List(list) => clean_tags(&list),
        TagsInput::Csv(raw) => split_tags(&raw),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_tags_trims_and_drops_blanks() {
        assert_eq!(split_tags(" travel, food ,,  "), vec!["travel", "food"]);
        assert!(split_tags("").is_empty());
    }

    #[test]
    fn patch_accepts_list_or_csv_tags() {
        let p: StoryPatch = serde_json::from_str(r#"{"tags": ["a", " b "]}"#).unwrap();
        assert_eq!(p.tags, Some(vec!["a".to_string(), "b".to_string()]));

        let p: StoryPatch = serde_json::from_str(r#"{"tags": "x, y"}"#).unwrap();
        assert_eq!(p.tags, Some(vec!["x".to_string(), "y".to_string()]));

        let p: StoryPatch = serde_json::from_str(r#"{"title": "New"}"#).unwrap();
        assert!(p.tags.is_none());
        assert_eq!(p.title.as_deref(), Some("New"));
    }

    #[test]
    fn new_story_requires_title_and_content() {
        let story = NewStory::from_form(" Trip ", "Day one", Some("a, ,b"));
        let normalized = story.normalized().unwrap();
        assert_eq!(normalized.title, "Trip");
        assert_eq!(normalized.tags, vec!["a", "b"]);

        assert!(NewStory::from_form("", "c", None).normalized().is_err());
        assert!(NewStory::from_form("t", "   ", None).normalized().is_err());
    }

    #[test]
    fn patch_rejects_unknown_fields() {
        assert!(serde_json::from_str::<StoryPatch>(r#"{"userId": "u2"}"#).is_err());
    }
}
