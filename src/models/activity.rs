use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::db::{ser_timestamp, Document};
use crate::models::Difficulty;
use crate::validation::{known_variant, Choice};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActivityType {
    Meditation,
    Breathing,
    Journaling,
    Exercise,
    Learning,
    Movement,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Button,
    Slider,
    Input,
    Timer,
}

/// Current value of an interactive element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ElementValue {
    Boolean(bool),
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InteractiveElement {
    #[serde(rename = "type")]
    pub kind: ElementType,
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<ElementValue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityContent {
    #[serde(default)]
    pub instructions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default)]
    pub interactive_elements: Vec<InteractiveElement>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: ActivityType,
    pub duration: u16,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub content: ActivityContent,
    pub points: u16,
    #[serde(default)]
    pub tags: Vec<String>,
    pub is_active: bool,
    #[serde(serialize_with = "ser_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "ser_timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl Document for Activity {
    const COLLECTION: &'static str = "activities";
    const LABEL: &'static str = "Activity";
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct InteractiveElementInput {
    #[serde(rename = "type")]
    #[validate(required(message = "Element type is required"), custom(function = "known_variant"))]
    pub kind: Option<Choice<ElementType>>,

    #[validate(required(message = "Element id is required"))]
    pub id: Option<String>,

    #[validate(required(message = "Element label is required"))]
    pub label: Option<String>,

    pub value: Option<ElementValue>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ActivityContentInput {
    #[serde(default)]
    pub instructions: Vec<String>,
    pub audio_url: Option<String>,
    pub video_url: Option<String>,
    #[serde(default)]
    #[validate(nested)]
    pub interactive_elements: Vec<InteractiveElementInput>,
}

impl ActivityContentInput {
    fn into_content(self) -> Option<ActivityContent> {
        let interactive_elements = self
            .interactive_elements
            .into_iter()
            .map(|e| {
                Some(InteractiveElement {
                    kind: e.kind?.known()?,
                    id: e.id?,
                    label: e.label?,
                    value: e.value,
                })
            })
            .collect::<Option<Vec<_>>>()?;
        Some(ActivityContent {
            instructions: self.instructions,
            audio_url: self.audio_url,
            video_url: self.video_url,
            interactive_elements,
        })
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateActivityRequest {
    #[validate(
        required(message = "Title is required"),
        length(max = 100, message = "Title cannot exceed 100 characters")
    )]
    pub title: Option<String>,

    #[validate(
        required(message = "Description is required"),
        length(max = 500, message = "Description cannot exceed 500 characters")
    )]
    pub description: Option<String>,

    #[serde(rename = "type")]
    #[validate(required(message = "Activity type is required"), custom(function = "known_variant"))]
    pub kind: Option<Choice<ActivityType>>,

    #[validate(
        required(message = "Duration is required"),
        range(min = 1, max = 300, message = "Duration must be between 1 and 300 minutes")
    )]
    pub duration: Option<u16>,

    #[validate(required(message = "Difficulty is required"), custom(function = "known_variant"))]
    pub difficulty: Option<Choice<Difficulty>>,

    #[validate(nested)]
    pub content: Option<ActivityContentInput>,

    #[validate(range(min = 0, max = 1000, message = "Points must be between 0 and 1000"))]
    pub points: Option<u16>,

    pub tags: Option<Vec<String>>,

    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewActivity {
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: ActivityType,
    pub duration: u16,
    pub difficulty: Difficulty,
    pub content: ActivityContent,
    pub points: u16,
    pub tags: Vec<String>,
    pub is_active: bool,
}

impl CreateActivityRequest {
    pub fn into_new(self) -> Option<NewActivity> {
        let content = match self.content {
            Some(input) => input.into_content()?,
            None => ActivityContent::default(),
        };
        Some(NewActivity {
            title: self.title?,
            description: self.description?,
            kind: self.kind?.known()?,
            duration: self.duration?,
            difficulty: self.difficulty?.known()?,
            content,
            points: self.points.unwrap_or(0),
            tags: self.tags.unwrap_or_default(),
            is_active: self.is_active.unwrap_or(true),
        })
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateActivityRequest {
    #[validate(length(max = 100, message = "Title cannot exceed 100 characters"))]
    pub title: Option<String>,

    #[validate(length(max = 500, message = "Description cannot exceed 500 characters"))]
    pub description: Option<String>,

    #[serde(rename = "type")]
    #[validate(custom(function = "known_variant"))]
    pub kind: Option<Choice<ActivityType>>,

    #[validate(range(min = 1, max = 300, message = "Duration must be between 1 and 300 minutes"))]
    pub duration: Option<u16>,

    #[validate(custom(function = "known_variant"))]
    pub difficulty: Option<Choice<Difficulty>>,

    #[validate(nested)]
    pub content: Option<ActivityContentInput>,

    #[validate(range(min = 0, max = 1000, message = "Points must be between 0 and 1000"))]
    pub points: Option<u16>,

    pub tags: Option<Vec<String>>,

    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<ActivityType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<ActivityContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

impl UpdateActivityRequest {
    pub fn into_patch(self) -> Option<ActivityPatch> {
        let content = match self.content {
            Some(input) => Some(input.into_content()?),
            None => None,
        };
        Some(ActivityPatch {
            title: self.title,
            description: self.description,
            kind: self.kind.and_then(Choice::known),
            duration: self.duration,
            difficulty: self.difficulty.and_then(Choice::known),
            content,
            points: self.points,
            tags: self.tags,
            is_active: self.is_active,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityQuery {
    #[serde(rename = "type")]
    pub kind: Option<ActivityType>,
    pub difficulty: Option<Difficulty>,
    pub tag: Option<String>,
    pub is_active: Option<bool>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body() -> serde_json::Value {
        json!({
            "title": "Box breathing",
            "description": "Four counts in, hold, four out, hold.",
            "type": "breathing",
            "duration": 5,
            "difficulty": "beginner",
            "content": {
                "instructions": ["Inhale for four", "Hold for four"],
                "interactiveElements": [
                    { "type": "timer", "id": "t1", "label": "Cycle", "value": 4 }
                ]
            }
        })
    }

    #[test]
    fn test_create_applies_defaults() {
        let req: CreateActivityRequest = serde_json::from_value(body()).unwrap();
        assert!(req.validate().is_ok());
        let new = req.into_new().unwrap();
        assert!(new.is_active);
        assert_eq!(new.points, 0);
        assert_eq!(new.content.interactive_elements[0].kind, ElementType::Timer);
        assert_eq!(
            new.content.interactive_elements[0].value,
            Some(ElementValue::Number(4.0))
        );
    }

    #[test]
    fn test_title_and_duration_bounds() {
        let mut b = body();
        b["title"] = json!("x".repeat(101));
        b["duration"] = json!(301);
        let req: CreateActivityRequest = serde_json::from_value(b).unwrap();
        let v = crate::validation::violations(&req.validate().unwrap_err());
        let messages: Vec<_> = v.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "Duration must be between 1 and 300 minutes",
                "Title cannot exceed 100 characters"
            ]
        );
    }

    #[test]
    fn test_unknown_element_type_reported_with_path() {
        let mut b = body();
        b["content"]["interactiveElements"][0]["type"] = json!("knob");
        let req: CreateActivityRequest = serde_json::from_value(b).unwrap();
        let v = crate::validation::violations(&req.validate().unwrap_err());
        assert_eq!(v[0].field, "content.interactiveElements.0.type");
    }

    #[test]
    fn test_patch_serializes_only_supplied_fields() {
        let req: UpdateActivityRequest =
            serde_json::from_value(json!({ "points": 50, "difficulty": "advanced" })).unwrap();
        assert!(req.validate().is_ok());
        let patch = serde_json::to_value(req.into_patch().unwrap()).unwrap();
        assert_eq!(patch, json!({ "points": 50, "difficulty": "advanced" }));
    }
}
