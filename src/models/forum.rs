use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::db::{ser_timestamp, Document};
use crate::validation::{known_variant, non_empty, Choice};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ForumCategory {
    General,
    Anxiety,
    Depression,
    Recovery,
    Crisis,
    Tips,
    Success,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub id: Uuid,
    pub content: String,
    pub author: Uuid,
    pub is_anonymous: bool,
    pub likes: u64,
    #[serde(serialize_with = "ser_timestamp")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForumPost {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub author: Uuid,
    pub category: ForumCategory,
    #[serde(default)]
    pub tags: Vec<String>,
    pub is_anonymous: bool,
    pub likes: u64,
    /// Insertion order.
    #[serde(default)]
    pub replies: Vec<Reply>,
    #[serde(serialize_with = "ser_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "ser_timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl Document for ForumPost {
    const COLLECTION: &'static str = "forum_posts";
    const LABEL: &'static str = "Post";
}

/// Fields covered by forum search.
pub const SEARCH_FIELDS: &[&str] = &["title", "content"];

impl ForumPost {
    pub fn is_author(&self, user_id: Uuid) -> bool {
        self.author == user_id
    }

    pub fn add_reply(&mut self, author: Uuid, content: String, is_anonymous: bool, now: DateTime<Utc>) {
        self.replies.push(Reply {
            id: Uuid::new_v4(),
            content,
            author,
            is_anonymous,
            likes: 0,
            created_at: now,
        });
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyView {
    pub id: Uuid,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<Uuid>,
    pub is_anonymous: bool,
    pub likes: u64,
    #[serde(serialize_with = "ser_timestamp")]
    pub created_at: DateTime<Utc>,
}

impl From<Reply> for ReplyView {
    fn from(r: Reply) -> Self {
        Self {
            id: r.id,
            content: r.content,
            author: (!r.is_anonymous).then_some(r.author),
            is_anonymous: r.is_anonymous,
            likes: r.likes,
            created_at: r.created_at,
        }
    }
}

/// A post as returned to clients; anonymous authors are withheld.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForumPostView {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<Uuid>,
    pub category: ForumCategory,
    pub tags: Vec<String>,
    pub is_anonymous: bool,
    pub likes: u64,
    pub replies: Vec<ReplyView>,
    #[serde(serialize_with = "ser_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "ser_timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl From<ForumPost> for ForumPostView {
    fn from(p: ForumPost) -> Self {
        Self {
            id: p.id,
            title: p.title,
            content: p.content,
            author: (!p.is_anonymous).then_some(p.author),
            category: p.category,
            tags: p.tags,
            is_anonymous: p.is_anonymous,
            likes: p.likes,
            replies: p.replies.into_iter().map(ReplyView::from).collect(),
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest {
    #[validate(
        required(message = "Title is required"),
        length(max = 200, message = "Title cannot exceed 200 characters")
    )]
    pub title: Option<String>,

    #[validate(
        required(message = "Content is required"),
        length(max = 5000, message = "Content cannot exceed 5000 characters")
    )]
    pub content: Option<String>,

    #[validate(required(message = "Category is required"), custom(function = "known_variant"))]
    pub category: Option<Choice<ForumCategory>>,

    pub tags: Option<Vec<String>>,

    pub is_anonymous: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewForumPost {
    pub title: String,
    pub content: String,
    pub author: Uuid,
    pub category: ForumCategory,
    pub tags: Vec<String>,
    pub is_anonymous: bool,
    pub likes: u64,
    pub replies: Vec<Reply>,
}

impl CreatePostRequest {
    pub fn into_new(self, author: Uuid) -> Option<NewForumPost> {
        Some(NewForumPost {
            title: self.title?,
            content: self.content?,
            author,
            category: self.category?.known()?,
            tags: self.tags.unwrap_or_default(),
            is_anonymous: self.is_anonymous.unwrap_or(false),
            likes: 0,
            replies: Vec::new(),
        })
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePostRequest {
    #[validate(length(max = 200, message = "Title cannot exceed 200 characters"))]
    pub title: Option<String>,

    #[validate(length(max = 5000, message = "Content cannot exceed 5000 characters"))]
    pub content: Option<String>,

    #[validate(custom(function = "known_variant"))]
    pub category: Option<Choice<ForumCategory>>,

    pub tags: Option<Vec<String>>,

    pub is_anonymous: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<ForumCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_anonymous: Option<bool>,
}

impl From<UpdatePostRequest> for PostPatch {
    fn from(req: UpdatePostRequest) -> Self {
        Self {
            title: req.title,
            content: req.content,
            category: req.category.and_then(Choice::known),
            tags: req.tags,
            is_anonymous: req.is_anonymous,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateReplyRequest {
    #[validate(
        required(message = "Reply content is required"),
        custom(function = "non_empty", message = "Reply content is required"),
        length(max = 2000, message = "Reply cannot exceed 2000 characters")
    )]
    pub content: Option<String>,

    pub is_anonymous: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForumQuery {
    pub category: Option<ForumCategory>,
    pub tag: Option<String>,
    pub search: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn post(anonymous: bool) -> ForumPost {
        let now = Utc::now();
        ForumPost {
            id: Uuid::new_v4(),
            title: "First week without panic attacks".into(),
            content: "Small wins count.".into(),
            author: Uuid::new_v4(),
            category: ForumCategory::Success,
            tags: vec!["panic".into()],
            is_anonymous: anonymous,
            likes: 0,
            replies: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_anonymous_author_is_withheld() {
        let json = serde_json::to_value(ForumPostView::from(post(true))).unwrap();
        assert!(json.get("author").is_none());
        assert_eq!(json["isAnonymous"], true);

        let p = post(false);
        let author = p.author;
        let json = serde_json::to_value(ForumPostView::from(p)).unwrap();
        assert_eq!(json["author"], author.to_string());
    }

    #[test]
    fn test_replies_keep_insertion_order_and_mask_independently() {
        let mut p = post(false);
        let now = Utc::now();
        p.add_reply(Uuid::new_v4(), "Proud of you".into(), false, now);
        p.add_reply(Uuid::new_v4(), "Same here".into(), true, now);
        let view = ForumPostView::from(p);
        assert_eq!(view.replies[0].content, "Proud of you");
        assert!(view.replies[0].author.is_some());
        assert!(view.replies[1].author.is_none());
    }

    #[test]
    fn test_create_validation() {
        let req: CreatePostRequest = serde_json::from_value(json!({
            "title": "t".repeat(201),
            "content": "hello",
            "category": "random"
        }))
        .unwrap();
        let v = crate::validation::violations(&req.validate().unwrap_err());
        let fields: Vec<_> = v.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["category", "title"]);
        assert_eq!(v[1].message, "Title cannot exceed 200 characters");
    }

    #[test]
    fn test_reply_length() {
        let req: CreateReplyRequest =
            serde_json::from_value(json!({ "content": "x".repeat(2001) })).unwrap();
        assert!(req.validate().is_err());
        let req: CreateReplyRequest = serde_json::from_value(json!({})).unwrap();
        let v = crate::validation::violations(&req.validate().unwrap_err());
        assert_eq!(v[0].message, "Reply content is required");
    }

    #[test]
    fn test_empty_reply_is_required_not_too_long() {
        let req: CreateReplyRequest = serde_json::from_value(json!({ "content": "" })).unwrap();
        let v = crate::validation::violations(&req.validate().unwrap_err());
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].field, "content");
        assert_eq!(v[0].message, "Reply content is required");
    }
}
