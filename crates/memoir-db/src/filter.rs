use rusqlite::types::Value;

/// Optional narrowing applied on top of the ownership scope when listing
/// stories.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoryFilter {
    /// Case-insensitive substring matched against title or content.
    pub search: Option<String>,
    /// Keep stories sharing at least one of these tags.
    pub tags: Vec<String>,
}

impl StoryFilter {
    /// Normalizes raw query input: an empty search is no search, and tag
    /// entries are trimmed with blanks dropped.
    pub fn new(search: Option<String>, tags: Vec<String>) -> Self {
        Self {
            search: search.filter(|s| !s.is_empty()),
            tags: tags
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    /// Compose `ownership AND search? AND tag-overlap?` into a single WHERE
    /// expression over the `s` (stories) alias, with positional parameters.
    pub(crate) fn to_predicate(&self, user_id: &str) -> Predicate {
        let mut clauses = vec!["s.user_id = ?1".to_string()];
        let mut params = vec![Value::Text(user_id.to_string())];

        if let Some(search) = &self.search {
            params.push(Value::Text(search.clone()));
            let n = params.len();
            clauses.push(format!(
                "(contains_ci(s.title, ?{n}) OR contains_ci(s.content, ?{n}))"
            ));
        }

        if !self.tags.is_empty() {
            let placeholders: Vec<String> = self
                .tags
                .iter()
                .map(|tag| {
                    params.push(Value::Text(tag.clone()));
                    format!("?{}", params.len())
                })
                .collect();
            clauses.push(format!(
                "EXISTS (SELECT 1 FROM json_each(s.tags) t WHERE t.value IN ({}))",
                placeholders.join(", ")
            ));
        }

        Predicate {
            sql: clauses.join(" AND "),
            params,
        }
    }
}

pub(crate) struct Predicate {
    pub sql: String,
    pub params: Vec<Value>,
}
