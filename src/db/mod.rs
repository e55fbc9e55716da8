//! Document persistence.
//!
//! Resources are stored as JSON documents grouped by collection. The store owns
//! identity (`id`) and the `createdAt`/`updatedAt` timestamps; everything else is
//! whatever the resource serializes. Two backends implement [`DocumentStore`]:
//! Postgres (a single JSONB table) and an in-process map used by tests and by
//! local runs without `DATABASE_URL`.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

pub mod memory;
pub mod postgres;
pub mod repository;

pub use memory::MemoryStore;
pub use postgres::PgDocumentStore;
pub use repository::{Document, Repository};

pub type JsonObject = Map<String, Value>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("`{0}` is not a valid identifier")]
    InvalidId(String),

    #[error("duplicate value for unique field `{field}`")]
    Duplicate { field: String },

    #[error("stored document could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("document is not a JSON object")]
    NotAnObject,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A single predicate over a document. Paths are dotted (`mood.value`).
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq { path: &'static str, value: Value },
    /// The array at `path` contains `value`.
    Contains { path: &'static str, value: Value },
    /// The timestamp at `path` falls inside the (inclusive) bounds.
    Range {
        path: &'static str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    },
    /// At least one whitespace-separated term appears in one of `fields`.
    Text {
        fields: &'static [&'static str],
        terms: String,
    },
}

/// Conjunction of conditions. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, path: &'static str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq {
            path,
            value: value.into(),
        });
        self
    }

    /// Equality only when the value is present; absent inputs add no constraint.
    pub fn eq_opt<V: Into<Value>>(self, path: &'static str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.eq(path, v),
            None => self,
        }
    }

    pub fn contains_opt<V: Into<Value>>(mut self, path: &'static str, value: Option<V>) -> Self {
        if let Some(v) = value {
            self.conditions.push(Condition::Contains {
                path,
                value: v.into(),
            });
        }
        self
    }

    pub fn range(
        mut self,
        path: &'static str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        if from.is_some() || to.is_some() {
            self.conditions.push(Condition::Range { path, from, to });
        }
        self
    }

    pub fn text_opt(mut self, fields: &'static [&'static str], terms: Option<&str>) -> Self {
        if let Some(terms) = terms.map(str::trim).filter(|t| !t.is_empty()) {
            self.conditions.push(Condition::Text {
                fields,
                terms: terms.to_string(),
            });
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub path: &'static str,
    pub descending: bool,
}

impl SortKey {
    pub const fn asc(path: &'static str) -> Self {
        Self {
            path,
            descending: false,
        }
    }

    pub const fn desc(path: &'static str) -> Self {
        Self {
            path,
            descending: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FindQuery {
    pub filter: Filter,
    pub sort: Vec<SortKey>,
    pub skip: u64,
    pub limit: Option<u64>,
}

impl FindQuery {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    pub fn sort(mut self, keys: &[SortKey]) -> Self {
        self.sort = keys.to_vec();
        self
    }

    pub fn window(mut self, skip: u64, limit: u64) -> Self {
        self.skip = skip;
        self.limit = Some(limit);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    fn backend_tag(&self) -> &'static str;

    async fn insert(&self, collection: &str, doc: JsonObject) -> StoreResult<Value>;

    async fn find_by_id(&self, collection: &str, id: &str) -> StoreResult<Option<Value>>;

    async fn find(&self, collection: &str, query: &FindQuery) -> StoreResult<Vec<Value>>;

    async fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64>;

    /// Merge `changes` over the top-level fields of the document and return the
    /// post-update document, or `None` when the id matches nothing.
    async fn update_by_id(
        &self,
        collection: &str,
        id: &str,
        changes: JsonObject,
    ) -> StoreResult<Option<Value>>;

    async fn delete_by_id(&self, collection: &str, id: &str) -> StoreResult<bool>;

    async fn ping(&self) -> StoreResult<()>;
}

/// Timestamps are stored as fixed-width RFC 3339 strings so they order
/// lexicographically.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `serialize_with` helper for stored timestamp fields.
pub fn ser_timestamp<S: serde::Serializer>(at: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format_timestamp(*at))
}

pub fn ser_opt_timestamp<S: serde::Serializer>(
    at: &Option<DateTime<Utc>>,
    s: S,
) -> Result<S::Ok, S::Error> {
    match at {
        Some(at) => s.serialize_str(&format_timestamp(*at)),
        None => s.serialize_none(),
    }
}

pub(crate) fn parse_id(id: &str) -> StoreResult<uuid::Uuid> {
    uuid::Uuid::parse_str(id).map_err(|_| StoreError::InvalidId(id.to_string()))
}

/// Split a search string into lower-cased alphanumeric terms.
pub(crate) fn search_terms(raw: &str) -> Vec<String> {
    raw.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_builders_skip_absent_values() {
        let filter = Filter::new()
            .eq_opt::<String>("type", None)
            .contains_opt::<String>("tags", None)
            .range("timestamp", None, None)
            .text_opt(&["title"], Some("   "));
        assert!(filter.conditions.is_empty());
    }

    #[test]
    fn test_search_terms_split_and_lowercase() {
        assert_eq!(search_terms("Panic, ATTACK tips!"), vec!["panic", "attack", "tips"]);
        assert!(search_terms("  --  ").is_empty());
    }

    #[test]
    fn test_parse_id_rejects_malformed() {
        assert!(matches!(parse_id("not-an-id"), Err(StoreError::InvalidId(_))));
        assert!(parse_id(&uuid::Uuid::new_v4().to_string()).is_ok());
    }
}
