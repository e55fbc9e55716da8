use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::db::{ser_timestamp, Document, SortKey};
use crate::models::Difficulty;
use crate::validation::{known_variant, Choice};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LearningType {
    Article,
    Video,
    Infographic,
    Quiz,
    Animation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningContent {
    pub id: Uuid,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: LearningType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub content: String,
    pub difficulty: Difficulty,
    pub estimated_time: u16,
    #[serde(default)]
    pub tags: Vec<String>,
    pub is_interactive: bool,
    pub read_count: u64,
    pub average_rating: f64,
    #[serde(serialize_with = "ser_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "ser_timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl Document for LearningContent {
    const COLLECTION: &'static str = "learning_content";
    const LABEL: &'static str = "Content";
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateContentRequest {
    #[validate(
        required(message = "Title is required"),
        length(max = 200, message = "Title cannot exceed 200 characters")
    )]
    pub title: Option<String>,

    #[serde(rename = "type")]
    #[validate(required(message = "Content type is required"), custom(function = "known_variant"))]
    pub kind: Option<Choice<LearningType>>,

    #[validate(length(max = 50, message = "Category cannot exceed 50 characters"))]
    pub category: Option<String>,

    #[validate(
        required(message = "Content is required"),
        length(min = 50, message = "Content must be at least 50 characters")
    )]
    pub content: Option<String>,

    #[validate(required(message = "Difficulty is required"), custom(function = "known_variant"))]
    pub difficulty: Option<Choice<Difficulty>>,

    #[validate(
        required(message = "Estimated time is required"),
        range(min = 1, max = 120, message = "Estimated time must be between 1 and 120 minutes")
    )]
    pub estimated_time: Option<u16>,

    pub tags: Option<Vec<String>>,

    pub is_interactive: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLearningContent {
    pub title: String,
    #[serde(rename = "type")]
    pub kind: LearningType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub content: String,
    pub difficulty: Difficulty,
    pub estimated_time: u16,
    pub tags: Vec<String>,
    pub is_interactive: bool,
    pub read_count: u64,
    pub average_rating: f64,
}

impl CreateContentRequest {
    pub fn into_new(self) -> Option<NewLearningContent> {
        Some(NewLearningContent {
            title: self.title?,
            kind: self.kind?.known()?,
            category: self.category,
            content: self.content?,
            difficulty: self.difficulty?.known()?,
            estimated_time: self.estimated_time?,
            tags: self.tags.unwrap_or_default(),
            is_interactive: self.is_interactive.unwrap_or(false),
            read_count: 0,
            average_rating: 0.0,
        })
    }
}

/// Partial update. The read counter and rating are not writable here.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateContentRequest {
    #[validate(length(max = 200, message = "Title cannot exceed 200 characters"))]
    pub title: Option<String>,

    #[serde(rename = "type")]
    #[validate(custom(function = "known_variant"))]
    pub kind: Option<Choice<LearningType>>,

    #[validate(length(max = 50, message = "Category cannot exceed 50 characters"))]
    pub category: Option<String>,

    #[validate(length(min = 50, message = "Content must be at least 50 characters"))]
    pub content: Option<String>,

    #[validate(custom(function = "known_variant"))]
    pub difficulty: Option<Choice<Difficulty>>,

    #[validate(range(min = 1, max = 120, message = "Estimated time must be between 1 and 120 minutes"))]
    pub estimated_time: Option<u16>,

    pub tags: Option<Vec<String>>,

    pub is_interactive: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<LearningType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_time: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_interactive: Option<bool>,
}

impl From<UpdateContentRequest> for ContentPatch {
    fn from(req: UpdateContentRequest) -> Self {
        Self {
            title: req.title,
            kind: req.kind.and_then(Choice::known),
            category: req.category,
            content: req.content,
            difficulty: req.difficulty.and_then(Choice::known),
            estimated_time: req.estimated_time,
            tags: req.tags,
            is_interactive: req.is_interactive,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContentSort {
    #[default]
    Newest,
    Oldest,
    MostRead,
    HighestRated,
}

impl ContentSort {
    pub fn keys(self) -> &'static [SortKey] {
        const NEWEST: &[SortKey] = &[SortKey::desc("createdAt")];
        const OLDEST: &[SortKey] = &[SortKey::asc("createdAt")];
        const MOST_READ: &[SortKey] = &[SortKey::desc("readCount")];
        const HIGHEST_RATED: &[SortKey] = &[SortKey::desc("averageRating")];
        match self {
            ContentSort::Newest => NEWEST,
            ContentSort::Oldest => OLDEST,
            ContentSort::MostRead => MOST_READ,
            ContentSort::HighestRated => HIGHEST_RATED,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentQuery {
    #[serde(rename = "type")]
    pub kind: Option<LearningType>,
    pub category: Option<String>,
    pub difficulty: Option<Difficulty>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
    #[serde(default)]
    pub sort: ContentSort,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadRequest {
    #[validate(range(min = 0, message = "Time spent cannot be negative"))]
    pub time_spent: Option<i64>,

    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: Option<u8>,

    #[validate(length(max = 1000, message = "Notes cannot exceed 1000 characters"))]
    pub notes: Option<String>,
}

/// Echo of a read event. Nothing is persisted.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub content_id: String,
    pub time_spent: Option<i64>,
    pub rating: Option<u8>,
    pub notes: Option<String>,
    #[serde(serialize_with = "ser_timestamp")]
    pub read_at: DateTime<Utc>,
}

impl ReadReceipt {
    pub fn new(content_id: String, req: MarkReadRequest, read_at: DateTime<Utc>) -> Self {
        Self {
            content_id,
            time_spent: req.time_spent,
            rating: req.rating,
            notes: req.notes,
            read_at,
        }
    }
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingHistory {
    pub history: Vec<ReadReceipt>,
    pub total_read: u64,
    pub total_time_spent: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body() -> serde_json::Value {
        json!({
            "title": "Grounding techniques",
            "type": "article",
            "content": "Name five things you can see, four you can touch, three you can hear.",
            "difficulty": "beginner",
            "estimatedTime": 5
        })
    }

    #[test]
    fn test_create_defaults_counters() {
        let req: CreateContentRequest = serde_json::from_value(body()).unwrap();
        assert!(req.validate().is_ok());
        let new = serde_json::to_value(req.into_new().unwrap()).unwrap();
        assert_eq!(new["readCount"], 0);
        assert_eq!(new["averageRating"], 0.0);
        assert_eq!(new["isInteractive"], false);
        assert!(new.get("category").is_none());
    }

    #[test]
    fn test_short_content_rejected() {
        let mut b = body();
        b["content"] = json!("too short");
        b["type"] = json!("podcast");
        let req: CreateContentRequest = serde_json::from_value(b).unwrap();
        let v = crate::validation::violations(&req.validate().unwrap_err());
        assert_eq!(v.len(), 2);
        assert_eq!(v[0].message, "Content must be at least 50 characters");
        assert_eq!(v[1].message, "`podcast` is not a valid enum value for path `type`.");
    }

    #[test]
    fn test_sort_parsing_and_keys() {
        let q: ContentQuery = serde_json::from_value(json!({ "sort": "most_read" })).unwrap();
        assert_eq!(q.sort, ContentSort::MostRead);
        assert_eq!(q.sort.keys(), &[SortKey::desc("readCount")]);

        let q: ContentQuery = serde_json::from_value(json!({})).unwrap();
        assert_eq!(q.sort.keys(), &[SortKey::desc("createdAt")]);
    }

    #[test]
    fn test_read_rating_bounds() {
        let req: MarkReadRequest = serde_json::from_value(json!({ "rating": 6 })).unwrap();
        assert!(req.validate().is_err());
        let req: MarkReadRequest =
            serde_json::from_value(json!({ "timeSpent": 120, "rating": 4 })).unwrap();
        assert!(req.validate().is_ok());
    }
}
