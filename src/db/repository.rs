use std::marker::PhantomData;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use super::{DocumentStore, Filter, FindQuery, JsonObject, SortKey, StoreError, StoreResult};
use crate::error::{AppError, AppResult};
use crate::pagination::{PageWindow, Pagination};

/// A resource kind persisted as documents in one collection.
pub trait Document: Serialize + DeserializeOwned + Send + Sync + 'static {
    const COLLECTION: &'static str;
    /// Human label used in "<Label> not found" responses.
    const LABEL: &'static str;
}

/// Typed access to one collection of a shared [`DocumentStore`].
pub struct Repository<T> {
    store: Arc<dyn DocumentStore>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            _marker: PhantomData,
        }
    }
}

fn to_object<V: Serialize>(value: &V) -> StoreResult<JsonObject> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        _ => Err(StoreError::NotAnObject),
    }
}

impl<T: Document> Repository<T> {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            _marker: PhantomData,
        }
    }

    pub fn not_found() -> AppError {
        AppError::NotFound(format!("{} not found", T::LABEL))
    }

    pub async fn create<N: Serialize + Sync>(&self, new: &N) -> StoreResult<T> {
        let doc = self.store.insert(T::COLLECTION, to_object(new)?).await?;
        Ok(serde_json::from_value(doc)?)
    }

    pub async fn find_by_id(&self, id: &str) -> StoreResult<Option<T>> {
        match self.store.find_by_id(T::COLLECTION, id).await? {
            Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
            None => Ok(None),
        }
    }

    /// Fetch by id or fail with the resource's 404.
    pub async fn get(&self, id: &str) -> AppResult<T> {
        self.find_by_id(id).await?.ok_or_else(Self::not_found)
    }

    pub async fn find(&self, query: &FindQuery) -> StoreResult<Vec<T>> {
        self.store
            .find(T::COLLECTION, query)
            .await?
            .into_iter()
            .map(|doc| serde_json::from_value(doc).map_err(StoreError::from))
            .collect()
    }

    pub async fn find_one(&self, filter: Filter) -> StoreResult<Option<T>> {
        let mut found = self.find(&FindQuery::new(filter).limit(1)).await?;
        Ok(found.pop())
    }

    pub async fn count(&self, filter: &Filter) -> StoreResult<u64> {
        self.store.count(T::COLLECTION, filter).await
    }

    /// One page of matches plus pagination computed from an independent count.
    pub async fn page(
        &self,
        filter: Filter,
        sort: &[SortKey],
        window: PageWindow,
    ) -> StoreResult<(Vec<T>, Pagination)> {
        let total = self.count(&filter).await?;
        let query = FindQuery::new(filter)
            .sort(sort)
            .window(window.skip(), window.limit);
        let items = self.find(&query).await?;
        let pagination = Pagination::new(window, items.len(), total);
        Ok((items, pagination))
    }

    /// Apply the serialized fields of `patch` and return the post-update record.
    pub async fn update<P: Serialize + Sync>(&self, id: &str, patch: &P) -> StoreResult<Option<T>> {
        match self.store.update_by_id(T::COLLECTION, id, to_object(patch)?).await? {
            Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
            None => Ok(None),
        }
    }

    /// Persist the whole record back over itself (read-modify-write paths).
    pub async fn replace(&self, id: &str, record: &T) -> StoreResult<Option<T>> {
        self.update(id, record).await
    }

    pub async fn delete(&self, id: &str) -> StoreResult<bool> {
        self.store.delete_by_id(T::COLLECTION, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct Note {
        #[serde(default)]
        id: String,
        body: String,
        #[serde(default)]
        stars: u32,
    }

    impl Document for Note {
        const COLLECTION: &'static str = "notes";
        const LABEL: &'static str = "Note";
    }

    fn repo() -> Repository<Note> {
        Repository::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_create_and_get_round_trip() {
        let notes = repo();
        let created = notes
            .create(&serde_json::json!({ "body": "breathe", "stars": 2 }))
            .await
            .unwrap();
        let fetched = notes.get(&created.id).await.unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn test_get_missing_is_labelled_not_found() {
        let err = repo().get(&uuid::Uuid::new_v4().to_string()).await.unwrap_err();
        assert_eq!(err.to_string(), "Note not found");
    }

    #[tokio::test]
    async fn test_page_counts_independently_of_window() {
        let notes = repo();
        for i in 0..7 {
            notes
                .create(&serde_json::json!({ "body": format!("n{i}"), "stars": i }))
                .await
                .unwrap();
        }
        let (items, pagination) = notes
            .page(Filter::new(), &[SortKey::desc("stars")], PageWindow::new(Some(2), Some(3)))
            .await
            .unwrap();
        let stars: Vec<_> = items.iter().map(|n| n.stars).collect();
        assert_eq!(stars, vec![3, 2, 1]);
        assert_eq!(pagination.total_content, 7);
        assert_eq!(pagination.total_pages, 3);
        assert!(pagination.has_next);
    }
}
