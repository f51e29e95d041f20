//! Request log persistence backends.

use std::sync::Arc;

use dashmap::DashMap;

use super::entry::{RequestId, RequestLogEntry, RequestLogFilter};
use super::RequestLogResult;

/// Trait for request log persistence backends.
///
/// Writes are per-request-id and naturally partitioned; the backend is not
/// required to serialize writes across different ids.
#[async_trait::async_trait]
pub trait RequestLogStore: Send + Sync {
    fn name(&self) -> &str;

    async fn insert(&self, entry: &RequestLogEntry) -> RequestLogResult<()>;

    async fn load(&self, id: RequestId) -> RequestLogResult<Option<RequestLogEntry>>;

    async fn save(&self, entry: &RequestLogEntry) -> RequestLogResult<()>;

    async fn search(&self, filter: &RequestLogFilter) -> RequestLogResult<Vec<RequestLogEntry>>;
}

/// In-memory request log (for testing and single-instance deployments).
#[derive(Debug, Default)]
pub struct MemoryRequestLogStore {
    entries: DashMap<RequestId, RequestLogEntry>,
}

impl MemoryRequestLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[async_trait::async_trait]
impl RequestLogStore for MemoryRequestLogStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn insert(&self, entry: &RequestLogEntry) -> RequestLogResult<()> {
        self.entries.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn load(&self, id: RequestId) -> RequestLogResult<Option<RequestLogEntry>> {
        Ok(self.entries.get(&id).map(|e| e.value().clone()))
    }

    async fn save(&self, entry: &RequestLogEntry) -> RequestLogResult<()> {
        self.entries.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn search(&self, filter: &RequestLogFilter) -> RequestLogResult<Vec<RequestLogEntry>> {
        let mut matched: Vec<RequestLogEntry> = self
            .entries
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        matched.sort_by_key(|e| e.created_at);
        Ok(matched)
    }
}

/// Store factory for creating backends.
pub struct RequestLogStoreFactory;

impl RequestLogStoreFactory {
    pub fn memory() -> Arc<dyn RequestLogStore> {
        Arc::new(MemoryRequestLogStore::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request_log::entry::{RequestStart, RequestStatus};

    #[tokio::test]
    async fn test_insert_load_save_round_trip() {
        let store = MemoryRequestLogStore::new();
        let entry = RequestLogEntry::started(RequestId::new(), RequestStart::default());

        store.insert(&entry).await.unwrap();
        let mut loaded = store.load(entry.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, RequestStatus::Started);

        loaded.finish_success(Default::default());
        store.save(&loaded).await.unwrap();

        let reloaded = store.load(entry.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, RequestStatus::Success);
        assert_eq!(store.count(), 1);
    }

    #[tokio::test]
    async fn test_load_absent_is_none() {
        let store = MemoryRequestLogStore::new();
        assert!(store.load(RequestId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_search_filters_and_sorts() {
        let store = MemoryRequestLogStore::new();
        for _ in 0..3 {
            let mut entry = RequestLogEntry::started(RequestId::new(), RequestStart::default());
            entry.finish_success(Default::default());
            store.insert(&entry).await.unwrap();
        }
        let open = RequestLogEntry::started(RequestId::new(), RequestStart::default());
        store.insert(&open).await.unwrap();

        let finished = store
            .search(&RequestLogFilter {
                status: Some(RequestStatus::Success),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(finished.len(), 3);
        assert!(finished.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    }
}
