//! Request log state machine.

use std::sync::Arc;

use super::entry::{
    RequestCompletion, RequestFailure, RequestId, RequestLogEntry, RequestLogFilter, RequestStart,
};
use super::store::RequestLogStore;
use super::{RequestLogError, RequestLogResult};

/// Drives each log row through Started → Success | Failed.
#[derive(Clone)]
pub struct RequestLogRecorder {
    store: Arc<dyn RequestLogStore>,
}

impl RequestLogRecorder {
    pub fn new(store: Arc<dyn RequestLogStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn RequestLogStore> {
        &self.store
    }

    /// Persist a Started row and return its id, generating one if absent.
    pub async fn start(
        &self,
        id: Option<RequestId>,
        start: RequestStart,
    ) -> RequestLogResult<RequestId> {
        let id = id.unwrap_or_default();
        let entry = RequestLogEntry::started(id, start);
        self.store.insert(&entry).await?;
        Ok(id)
    }

    pub async fn mark_success(
        &self,
        id: RequestId,
        completion: RequestCompletion,
    ) -> RequestLogResult<()> {
        let mut entry = self.load_open(id).await?;
        entry.finish_success(completion);
        self.store.save(&entry).await
    }

    pub async fn mark_fail(&self, id: RequestId, failure: RequestFailure) -> RequestLogResult<()> {
        let mut entry = self.load_open(id).await?;
        entry.finish_failure(failure);
        self.store.save(&entry).await
    }

    pub async fn find(&self, id: RequestId) -> RequestLogResult<Option<RequestLogEntry>> {
        self.store.load(id).await
    }

    pub async fn search(&self, filter: &RequestLogFilter) -> RequestLogResult<Vec<RequestLogEntry>> {
        self.store.search(filter).await
    }

    async fn load_open(&self, id: RequestId) -> RequestLogResult<RequestLogEntry> {
        let entry = self
            .store
            .load(id)
            .await?
            .ok_or(RequestLogError::NotFound { id })?;
        if entry.status.is_terminal() {
            return Err(RequestLogError::AlreadyTerminal { id });
        }
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request_log::entry::RequestStatus;
    use crate::request_log::store::MemoryRequestLogStore;

    fn recorder() -> RequestLogRecorder {
        RequestLogRecorder::new(Arc::new(MemoryRequestLogStore::new()))
    }

    #[tokio::test]
    async fn test_start_persists_started_row() {
        let recorder = recorder();
        let id = recorder.start(None, RequestStart::default()).await.unwrap();
        let entry = recorder.find(id).await.unwrap().unwrap();
        assert_eq!(entry.status, RequestStatus::Started);
    }

    #[tokio::test]
    async fn test_start_honors_caller_supplied_id() {
        let recorder = recorder();
        let supplied = RequestId::new();
        let id = recorder
            .start(Some(supplied), RequestStart::default())
            .await
            .unwrap();
        assert_eq!(id, supplied);
    }

    #[tokio::test]
    async fn test_mark_fail_unknown_id_is_not_found() {
        let recorder = recorder();
        let err = recorder
            .mark_fail(
                RequestId::new(),
                RequestFailure {
                    completion: RequestCompletion::default(),
                    error_code: "TIMEOUT".to_string(),
                    error_message: "timed out".to_string(),
                    fail_reason: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RequestLogError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_second_terminal_transition_rejected() {
        let recorder = recorder();
        let id = recorder.start(None, RequestStart::default()).await.unwrap();

        recorder
            .mark_success(id, RequestCompletion::default())
            .await
            .unwrap();

        let err = recorder
            .mark_fail(
                id,
                RequestFailure {
                    completion: RequestCompletion::default(),
                    error_code: "TIMEOUT".to_string(),
                    error_message: "late failure".to_string(),
                    fail_reason: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RequestLogError::AlreadyTerminal { .. }));

        // The terminal row is untouched by the rejected transition.
        let entry = recorder.find(id).await.unwrap().unwrap();
        assert_eq!(entry.status, RequestStatus::Success);
        assert!(entry.error_code.is_none());
    }
}
