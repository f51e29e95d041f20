//! Off-path request log writes.
//!
//! Log persistence is adjacent to the call, not transactional with it: a
//! bounded queue and a single worker task keep store latency and store
//! failures away from the provider-call path. Overflow drops the write with a
//! warning rather than applying backpressure to the caller.

use tokio::sync::{mpsc, oneshot};

use super::entry::{RequestCompletion, RequestFailure, RequestId, RequestStart};
use super::recorder::RequestLogRecorder;

pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

enum LogCommand {
    Start {
        id: RequestId,
        start: RequestStart,
    },
    Success {
        id: RequestId,
        completion: RequestCompletion,
    },
    Fail {
        id: RequestId,
        failure: RequestFailure,
    },
    Flush {
        ack: oneshot::Sender<()>,
    },
}

/// Handle for enqueueing log writes; cheap to clone.
#[derive(Clone)]
pub struct RequestLogWriter {
    tx: mpsc::Sender<LogCommand>,
}

impl RequestLogWriter {
    /// Spawn the worker task and return the writer handle.
    pub fn spawn(recorder: RequestLogRecorder, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    LogCommand::Start { id, start } => {
                        if let Err(err) = recorder.start(Some(id), start).await {
                            tracing::warn!(request_id = %id, error = %err, "request log start failed");
                        }
                    }
                    LogCommand::Success { id, completion } => {
                        if let Err(err) = recorder.mark_success(id, completion).await {
                            tracing::warn!(request_id = %id, error = %err, "request log success write failed");
                        }
                    }
                    LogCommand::Fail { id, failure } => {
                        if let Err(err) = recorder.mark_fail(id, failure).await {
                            tracing::warn!(request_id = %id, error = %err, "request log failure write failed");
                        }
                    }
                    LogCommand::Flush { ack } => {
                        let _ = ack.send(());
                    }
                }
            }
        });
        Self { tx }
    }

    /// Enqueue a Started row and return its id immediately.
    pub fn start(&self, start: RequestStart) -> RequestId {
        let id = RequestId::new();
        self.enqueue(LogCommand::Start { id, start });
        id
    }

    pub fn mark_success(&self, id: RequestId, completion: RequestCompletion) {
        self.enqueue(LogCommand::Success { id, completion });
    }

    pub fn mark_fail(&self, id: RequestId, failure: RequestFailure) {
        self.enqueue(LogCommand::Fail { id, failure });
    }

    /// Wait until every write enqueued before this call has been applied.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(LogCommand::Flush { ack }).await.is_ok() {
            let _ = done.await;
        }
    }

    fn enqueue(&self, command: LogCommand) {
        if self.tx.try_send(command).is_err() {
            tracing::warn!("request log queue full or closed, dropping write");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::request_log::entry::RequestStatus;
    use crate::request_log::store::{MemoryRequestLogStore, RequestLogStore};

    #[tokio::test]
    async fn test_writes_flow_through_queue() {
        let store = Arc::new(MemoryRequestLogStore::new());
        let writer = RequestLogWriter::spawn(
            RequestLogRecorder::new(Arc::clone(&store) as Arc<dyn RequestLogStore>),
            16,
        );

        let id = writer.start(RequestStart::default());
        writer.mark_success(id, RequestCompletion::default());
        writer.flush().await;

        let recorder = RequestLogRecorder::new(store);
        let entry = recorder.find(id).await.unwrap().unwrap();
        assert_eq!(entry.status, RequestStatus::Success);
    }

    #[tokio::test]
    async fn test_mark_on_unknown_id_does_not_panic_worker() {
        let store = Arc::new(MemoryRequestLogStore::new());
        let writer = RequestLogWriter::spawn(
            RequestLogRecorder::new(Arc::clone(&store) as Arc<dyn RequestLogStore>),
            16,
        );

        // Never started: the worker warns and keeps going.
        writer.mark_success(RequestId::new(), RequestCompletion::default());
        writer.flush().await;

        let id = writer.start(RequestStart::default());
        writer.flush().await;
        let recorder = RequestLogRecorder::new(store);
        assert!(recorder.find(id).await.unwrap().is_some());
    }
}
