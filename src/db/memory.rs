use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::{
    format_timestamp, parse_id, search_terms, Condition, DocumentStore, Filter, FindQuery,
    JsonObject, SortKey, StoreError, StoreResult,
};

/// In-process document store. Collections keep insertion order.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<JsonObject>>>,
    unique: HashMap<String, Vec<String>>,
    clock: Mutex<Option<DateTime<Utc>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a top-level field whose values must be unique within `collection`.
    pub fn with_unique(mut self, collection: &str, field: &str) -> Self {
        self.unique
            .entry(collection.to_string())
            .or_default()
            .push(field.to_string());
        self
    }

    /// Strictly increasing write timestamps at stored (millisecond) precision,
    /// so several documents landing in the same millisecond still order by recency.
    async fn next_timestamp(&self) -> String {
        let mut last = self.clock.lock().await;
        let mut now = Utc::now().trunc_subsecs(3);
        if let Some(prev) = *last {
            if now <= prev {
                now = prev + Duration::milliseconds(1);
            }
        }
        *last = Some(now);
        format_timestamp(now)
    }

    fn check_unique(
        &self,
        collection: &str,
        docs: &[JsonObject],
        candidate: &JsonObject,
        skip_id: Option<&str>,
    ) -> StoreResult<()> {
        let Some(fields) = self.unique.get(collection) else {
            return Ok(());
        };
        for field in fields {
            let Some(value) = candidate.get(field) else {
                continue;
            };
            let taken = docs.iter().any(|doc| {
                doc.get("id").and_then(Value::as_str) != skip_id && doc.get(field) == Some(value)
            });
            if taken {
                return Err(StoreError::Duplicate {
                    field: field.clone(),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn backend_tag(&self) -> &'static str {
        "memory"
    }

    async fn insert(&self, collection: &str, mut doc: JsonObject) -> StoreResult<Value> {
        let now = self.next_timestamp().await;
        doc.insert("id".into(), Value::String(Uuid::new_v4().to_string()));
        doc.insert("createdAt".into(), Value::String(now.clone()));
        doc.insert("updatedAt".into(), Value::String(now));

        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();
        self.check_unique(collection, docs, &doc, None)?;
        docs.push(doc.clone());
        Ok(Value::Object(doc))
    }

    async fn find_by_id(&self, collection: &str, id: &str) -> StoreResult<Option<Value>> {
        parse_id(id)?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|doc| has_id(doc, id)))
            .cloned()
            .map(Value::Object))
    }

    async fn find(&self, collection: &str, query: &FindQuery) -> StoreResult<Vec<Value>> {
        let collections = self.collections.read().await;
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut matched: Vec<(usize, &JsonObject)> = docs
            .iter()
            .enumerate()
            .filter(|(_, doc)| matches_filter(doc, &query.filter))
            .collect();
        if !query.sort.is_empty() {
            // Ties fall back to insertion order, reversed under a descending lead key.
            let newest_first = query.sort[0].descending;
            matched.sort_by(|(ia, a), (ib, b)| {
                compare_docs(a, b, &query.sort).then_with(|| {
                    if newest_first {
                        ib.cmp(ia)
                    } else {
                        ia.cmp(ib)
                    }
                })
            });
        }

        let skip = usize::try_from(query.skip).unwrap_or(usize::MAX);
        let limit = query
            .limit
            .map(|l| usize::try_from(l).unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX);
        Ok(matched
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|(_, doc)| Value::Object(doc.clone()))
            .collect())
    }

    async fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        let collections = self.collections.read().await;
        let count = collections
            .get(collection)
            .map(|docs| docs.iter().filter(|doc| matches_filter(doc, filter)).count())
            .unwrap_or(0);
        Ok(count as u64)
    }

    async fn update_by_id(
        &self,
        collection: &str,
        id: &str,
        changes: JsonObject,
    ) -> StoreResult<Option<Value>> {
        parse_id(id)?;
        let now = self.next_timestamp().await;
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(None);
        };
        let Some(index) = docs.iter().position(|doc| has_id(doc, id)) else {
            return Ok(None);
        };

        let mut merged = docs[index].clone();
        for (key, value) in changes {
            if matches!(key.as_str(), "id" | "createdAt") {
                continue;
            }
            merged.insert(key, value);
        }
        merged.insert("updatedAt".into(), Value::String(now));
        self.check_unique(collection, docs, &merged, Some(id))?;

        docs[index] = merged.clone();
        Ok(Some(Value::Object(merged)))
    }

    async fn delete_by_id(&self, collection: &str, id: &str) -> StoreResult<bool> {
        parse_id(id)?;
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(false);
        };
        let before = docs.len();
        docs.retain(|doc| !has_id(doc, id));
        Ok(docs.len() != before)
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

fn has_id(doc: &JsonObject, id: &str) -> bool {
    doc.get("id")
        .and_then(Value::as_str)
        .map(|stored| stored.eq_ignore_ascii_case(id))
        .unwrap_or(false)
}

fn lookup<'a>(doc: &'a JsonObject, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn matches_filter(doc: &JsonObject, filter: &Filter) -> bool {
    filter.conditions.iter().all(|c| matches_condition(doc, c))
}

fn matches_condition(doc: &JsonObject, condition: &Condition) -> bool {
    match condition {
        Condition::Eq { path, value } => lookup(doc, path)
            .map(|v| values_equal(v, value))
            .unwrap_or(false),
        Condition::Contains { path, value } => lookup(doc, path)
            .and_then(Value::as_array)
            .map(|items| items.iter().any(|item| values_equal(item, value)))
            .unwrap_or(false),
        Condition::Range { path, from, to } => {
            let Some(at) = lookup(doc, path)
                .and_then(Value::as_str)
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc))
            else {
                return false;
            };
            from.map_or(true, |from| at >= from) && to.map_or(true, |to| at <= to)
        }
        Condition::Text { fields, terms } => {
            let terms = search_terms(terms);
            let haystack: String = fields
                .iter()
                .filter_map(|f| lookup(doc, f).and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase();
            terms.iter().any(|term| haystack.contains(term.as_str()))
        }
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

fn compare_docs(a: &JsonObject, b: &JsonObject, keys: &[SortKey]) -> Ordering {
    for key in keys {
        let ord = compare_values(lookup(a, key.path), lookup(b, key.path));
        let ord = if key.descending { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> JsonObject {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        for (title, reads, tags) in [
            ("Breathing basics", 5, vec!["calm"]),
            ("Sleep hygiene", 12, vec!["sleep", "calm"]),
            ("Grounding for panic", 1, vec!["anxiety"]),
        ] {
            store
                .insert(
                    "content",
                    object(json!({ "title": title, "readCount": reads, "tags": tags })),
                )
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_insert_assigns_identity_and_timestamps() {
        let store = MemoryStore::new();
        let doc = store.insert("things", object(json!({ "a": 1 }))).await.unwrap();
        assert!(Uuid::parse_str(doc["id"].as_str().unwrap()).is_ok());
        assert_eq!(doc["createdAt"], doc["updatedAt"]);
    }

    #[tokio::test]
    async fn test_timestamps_strictly_increase() {
        let store = MemoryStore::new();
        let a = store.insert("things", JsonObject::new()).await.unwrap();
        let b = store.insert("things", JsonObject::new()).await.unwrap();
        assert!(b["createdAt"].as_str().unwrap() > a["createdAt"].as_str().unwrap());
    }

    #[tokio::test]
    async fn test_same_millisecond_inserts_sort_newest_first() {
        let store = MemoryStore::new();
        for n in 1..=6 {
            store
                .insert("things", object(json!({ "n": n })))
                .await
                .unwrap();
        }

        let newest = FindQuery::new(Filter::new()).sort(&[SortKey::desc("createdAt")]);
        let docs = store.find("things", &newest).await.unwrap();
        let order: Vec<_> = docs.iter().map(|d| d["n"].as_i64().unwrap()).collect();
        assert_eq!(order, vec![6, 5, 4, 3, 2, 1]);

        let stamps: Vec<_> = docs.iter().map(|d| d["createdAt"].as_str().unwrap()).collect();
        let mut unique = stamps.clone();
        unique.dedup();
        assert_eq!(unique.len(), stamps.len());
    }

    #[tokio::test]
    async fn test_ties_follow_insertion_order_per_direction() {
        let store = MemoryStore::new();
        for n in 1..=3 {
            store
                .insert("things", object(json!({ "n": n, "rank": 0 })))
                .await
                .unwrap();
        }

        let desc = FindQuery::new(Filter::new()).sort(&[SortKey::desc("rank")]);
        let docs = store.find("things", &desc).await.unwrap();
        let order: Vec<_> = docs.iter().map(|d| d["n"].as_i64().unwrap()).collect();
        assert_eq!(order, vec![3, 2, 1]);

        let asc = FindQuery::new(Filter::new()).sort(&[SortKey::asc("rank")]);
        let docs = store.find("things", &asc).await.unwrap();
        let order: Vec<_> = docs.iter().map(|d| d["n"].as_i64().unwrap()).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_filter_contains_and_sort() {
        let store = seeded().await;
        let query = FindQuery::new(Filter::new().contains_opt("tags", Some("calm")))
            .sort(&[SortKey::desc("readCount")]);
        let docs = store.find("content", &query).await.unwrap();
        let titles: Vec<_> = docs.iter().map(|d| d["title"].as_str().unwrap()).collect();
        assert_eq!(titles, vec!["Sleep hygiene", "Breathing basics"]);
        assert_eq!(store.count("content", &query.filter).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_text_search_matches_any_term() {
        let store = seeded().await;
        let filter = Filter::new().text_opt(&["title", "content"], Some("panic sleep"));
        assert_eq!(store.count("content", &filter).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_window_skips_and_limits() {
        let store = seeded().await;
        let query = FindQuery::new(Filter::new())
            .sort(&[SortKey::asc("createdAt")])
            .window(1, 1);
        let docs = store.find("content", &query).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["title"], "Sleep hygiene");
    }

    #[tokio::test]
    async fn test_update_merges_and_returns_new_state() {
        let store = seeded().await;
        let first = store
            .find("content", &FindQuery::default().limit(1))
            .await
            .unwrap()
            .remove(0);
        let id = first["id"].as_str().unwrap();
        let updated = store
            .update_by_id("content", id, object(json!({ "readCount": 99, "id": "spoofed" })))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated["readCount"], 99);
        assert_eq!(updated["title"], first["title"]);
        assert_eq!(updated["id"], first["id"]);
        assert_ne!(updated["updatedAt"], first["updatedAt"]);
    }

    #[tokio::test]
    async fn test_unique_field_rejected() {
        let store = MemoryStore::new().with_unique("users", "email");
        store
            .insert("users", object(json!({ "email": "a@b.com" })))
            .await
            .unwrap();
        let err = store
            .insert("users", object(json!({ "email": "a@b.com" })))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { ref field } if field == "email"));
    }

    #[tokio::test]
    async fn test_malformed_and_missing_ids() {
        let store = seeded().await;
        assert!(matches!(
            store.find_by_id("content", "abc").await,
            Err(StoreError::InvalidId(_))
        ));
        let missing = Uuid::new_v4().to_string();
        assert!(store.find_by_id("content", &missing).await.unwrap().is_none());
        assert!(!store.delete_by_id("content", &missing).await.unwrap());
    }

    #[tokio::test]
    async fn test_range_on_nested_timestamp() {
        let store = MemoryStore::new();
        store
            .insert("moods", object(json!({ "timestamp": "2026-03-01T10:00:00.000Z" })))
            .await
            .unwrap();
        store
            .insert("moods", object(json!({ "timestamp": "2026-03-05T10:00:00.000Z" })))
            .await
            .unwrap();
        let from = DateTime::parse_from_rfc3339("2026-03-02T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let filter = Filter::new().range("timestamp", Some(from), None);
        assert_eq!(store.count("moods", &filter).await.unwrap(), 1);
    }
}
