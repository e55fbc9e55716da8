use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::db::{ser_opt_timestamp, ser_timestamp, Document};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct Mood {
    #[validate(range(min = 1, max = 5, message = "Mood value must be between 1 and 5"))]
    pub value: u8,
    pub emoji: String,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct Emotion {
    #[validate(length(min = 1, message = "Emotion name is required"))]
    pub name: String,
    #[validate(range(min = 1, max = 10))]
    pub intensity: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoodEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub mood: Mood,
    pub intensity: u8,
    #[serde(default)]
    pub emotions: Vec<Emotion>,
    #[serde(default)]
    pub triggers: Vec<String>,
    pub notes: Option<String>,
    #[serde(serialize_with = "ser_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub sleep_hours: Option<f64>,
    pub stress_level: Option<u8>,
    pub energy_level: Option<u8>,
    pub is_private: bool,
    #[serde(serialize_with = "ser_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "ser_timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl Document for MoodEntry {
    const COLLECTION: &'static str = "mood_entries";
    const LABEL: &'static str = "Mood entry";
}

impl MoodEntry {
    /// Calendar date (UTC) of the entry's timestamp.
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// A mood entry as returned to clients, with its derived `date`.
#[derive(Debug, Serialize)]
pub struct MoodEntryView {
    #[serde(flatten)]
    pub entry: MoodEntry,
    pub date: NaiveDate,
}

impl From<MoodEntry> for MoodEntryView {
    fn from(entry: MoodEntry) -> Self {
        let date = entry.date();
        Self { entry, date }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateMoodEntryRequest {
    #[validate(required(message = "Mood is required"), nested)]
    pub mood: Option<Mood>,

    #[validate(required(message = "Intensity is required"), range(min = 1, max = 10))]
    pub intensity: Option<u8>,

    #[validate(nested)]
    pub emotions: Option<Vec<Emotion>>,

    pub triggers: Option<Vec<String>>,

    #[validate(length(max = 1000, message = "Notes cannot exceed 1000 characters"))]
    pub notes: Option<String>,

    pub timestamp: Option<DateTime<Utc>>,

    #[validate(range(min = 0.0, max = 24.0, message = "Sleep hours must be between 0 and 24"))]
    pub sleep_hours: Option<f64>,

    #[validate(range(min = 1, max = 10))]
    pub stress_level: Option<u8>,

    #[validate(range(min = 1, max = 10))]
    pub energy_level: Option<u8>,

    pub is_private: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMoodEntry {
    pub user_id: Uuid,
    pub mood: Mood,
    pub intensity: u8,
    pub emotions: Vec<Emotion>,
    pub triggers: Vec<String>,
    pub notes: Option<String>,
    #[serde(serialize_with = "ser_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub sleep_hours: Option<f64>,
    pub stress_level: Option<u8>,
    pub energy_level: Option<u8>,
    pub is_private: bool,
}

impl CreateMoodEntryRequest {
    /// Apply defaults. Returns `None` only if required fields are missing, which
    /// validation has already ruled out.
    pub fn into_new(self, user_id: Uuid, now: DateTime<Utc>) -> Option<NewMoodEntry> {
        Some(NewMoodEntry {
            user_id,
            mood: self.mood?,
            intensity: self.intensity?,
            emotions: self.emotions.unwrap_or_default(),
            triggers: self.triggers.unwrap_or_default(),
            notes: self.notes,
            timestamp: self.timestamp.unwrap_or(now),
            sleep_hours: self.sleep_hours,
            stress_level: self.stress_level,
            energy_level: self.energy_level,
            is_private: self.is_private.unwrap_or(true),
        })
    }
}

/// Partial update; only supplied fields are validated and written.
#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMoodEntryRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub mood: Option<Mood>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, max = 10))]
    pub intensity: Option<u8>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub emotions: Option<Vec<Emotion>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub triggers: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 1000, message = "Notes cannot exceed 1000 characters"))]
    pub notes: Option<String>,

    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "ser_opt_timestamp"
    )]
    pub timestamp: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.0, max = 24.0, message = "Sleep hours must be between 0 and 24"))]
    pub sleep_hours: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, max = 10))]
    pub stress_level: Option<u8>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, max = 10))]
    pub energy_level: Option<u8>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_private: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoodQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub mood: Option<u8>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct MoodStatsQuery {
    pub days: Option<u32>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct NamedCount {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MoodStats {
    pub days: u32,
    pub total_entries: usize,
    pub average_mood: Option<f64>,
    pub average_intensity: Option<f64>,
    pub average_sleep_hours: Option<f64>,
    pub average_stress_level: Option<f64>,
    pub average_energy_level: Option<f64>,
    pub top_emotions: Vec<NamedCount>,
    pub top_triggers: Vec<NamedCount>,
}

fn average<I: Iterator<Item = f64>>(values: I) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| (sum / n as f64 * 100.0).round() / 100.0)
}

/// Most frequent names first; ties broken alphabetically.
fn top_counts<'a, I: Iterator<Item = &'a str>>(names: I, take: usize) -> Vec<NamedCount> {
    let mut counts: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    for name in names {
        *counts.entry(name.to_lowercase()).or_default() += 1;
    }
    let mut counts: Vec<NamedCount> = counts
        .into_iter()
        .map(|(name, count)| NamedCount { name, count })
        .collect();
    counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    counts.truncate(take);
    counts
}

impl MoodStats {
    pub fn from_entries(days: u32, entries: &[MoodEntry]) -> Self {
        Self {
            days,
            total_entries: entries.len(),
            average_mood: average(entries.iter().map(|e| f64::from(e.mood.value))),
            average_intensity: average(entries.iter().map(|e| f64::from(e.intensity))),
            average_sleep_hours: average(entries.iter().filter_map(|e| e.sleep_hours)),
            average_stress_level: average(
                entries.iter().filter_map(|e| e.stress_level.map(f64::from)),
            ),
            average_energy_level: average(
                entries.iter().filter_map(|e| e.energy_level.map(f64::from)),
            ),
            top_emotions: top_counts(
                entries
                    .iter()
                    .flat_map(|e| e.emotions.iter().map(|em| em.name.as_str())),
                5,
            ),
            top_triggers: top_counts(
                entries.iter().flat_map(|e| e.triggers.iter().map(String::as_str)),
                5,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(value: u8, intensity: u8, emotions: &[&str], at: DateTime<Utc>) -> MoodEntry {
        MoodEntry {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            mood: Mood {
                value,
                emoji: "🙂".into(),
                label: "Okay".into(),
            },
            intensity,
            emotions: emotions
                .iter()
                .map(|n| Emotion {
                    name: n.to_string(),
                    intensity: 5,
                    category: None,
                })
                .collect(),
            triggers: vec!["work".into()],
            notes: None,
            timestamp: at,
            sleep_hours: Some(7.5),
            stress_level: None,
            energy_level: Some(6),
            is_private: true,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_date_is_utc_calendar_date() {
        let at = Utc.with_ymd_and_hms(2026, 3, 14, 23, 59, 0).unwrap();
        let view = MoodEntryView::from(entry(3, 7, &[], at));
        assert_eq!(view.date, NaiveDate::from_ymd_opt(2026, 3, 14).unwrap());

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["date"], "2026-03-14");
        assert_eq!(json["timestamp"], "2026-03-14T23:59:00.000Z");
        assert_eq!(json["isPrivate"], true);
    }

    #[test]
    fn test_create_defaults() {
        let req: CreateMoodEntryRequest = serde_json::from_value(serde_json::json!({
            "mood": { "value": 3, "emoji": "😐", "label": "Neutral" },
            "intensity": 7
        }))
        .unwrap();
        assert!(req.validate().is_ok());
        let now = Utc::now();
        let new = req.into_new(Uuid::new_v4(), now).unwrap();
        assert!(new.is_private);
        assert_eq!(new.timestamp, now);
        assert!(new.emotions.is_empty());
    }

    #[test]
    fn test_create_rejects_out_of_range_intensity() {
        let req: CreateMoodEntryRequest = serde_json::from_value(serde_json::json!({
            "mood": { "value": 3, "emoji": "😐", "label": "Neutral" },
            "intensity": 11
        }))
        .unwrap();
        let v = crate::validation::violations(&req.validate().unwrap_err());
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].field, "intensity");
        assert!(v[0].message.contains("intensity"));
    }

    #[test]
    fn test_nested_mood_value_checked() {
        let req: CreateMoodEntryRequest = serde_json::from_value(serde_json::json!({
            "mood": { "value": 6, "emoji": "🤩", "label": "Great" },
            "intensity": 5,
            "sleepHours": 25.0
        }))
        .unwrap();
        let v = crate::validation::violations(&req.validate().unwrap_err());
        let fields: Vec<_> = v.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["mood.value", "sleepHours"]);
        assert_eq!(v[0].message, "Mood value must be between 1 and 5");
    }

    #[test]
    fn test_partial_update_checks_only_supplied_fields() {
        let ok: UpdateMoodEntryRequest =
            serde_json::from_value(serde_json::json!({ "notes": "better today" })).unwrap();
        assert!(ok.validate().is_ok());
        let patch = serde_json::to_value(&ok).unwrap();
        assert_eq!(patch, serde_json::json!({ "notes": "better today" }));

        let bad: UpdateMoodEntryRequest =
            serde_json::from_value(serde_json::json!({ "stressLevel": 0 })).unwrap();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_stats() {
        let at = Utc::now();
        let entries = vec![
            entry(2, 4, &["Anxious", "tired"], at),
            entry(4, 8, &["anxious"], at),
            entry(3, 6, &["calm"], at),
        ];
        let stats = MoodStats::from_entries(30, &entries);
        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.average_mood, Some(3.0));
        assert_eq!(stats.average_intensity, Some(6.0));
        assert_eq!(stats.average_stress_level, None);
        assert_eq!(stats.average_sleep_hours, Some(7.5));
        assert_eq!(
            stats.top_emotions[0],
            NamedCount {
                name: "anxious".into(),
                count: 2
            }
        );
        assert_eq!(stats.top_triggers[0].count, 3);
    }

    #[test]
    fn test_stats_empty() {
        let stats = MoodStats::from_entries(7, &[]);
        assert_eq!(stats.total_entries, 0);
        assert_eq!(stats.average_mood, None);
        assert!(stats.top_emotions.is_empty());
    }
}
