//! Auditable per-call request logs.

pub mod entry;
pub mod recorder;
pub mod store;
#[cfg(feature = "postgres")]
pub mod store_postgres;
pub mod writer;

pub use entry::{
    CallCost, CallUsage, RagMetrics, RequestCompletion, RequestFailure, RequestId, RequestLogEntry,
    RequestLogFilter, RequestStart, RequestStatus,
};
pub use recorder::RequestLogRecorder;
pub use store::{MemoryRequestLogStore, RequestLogStore, RequestLogStoreFactory};
#[cfg(feature = "postgres")]
pub use store_postgres::PostgresRequestLogStore;
pub use writer::{DEFAULT_QUEUE_CAPACITY, RequestLogWriter};

use thiserror::Error;

/// Errors from the request log subsystem.
#[derive(Error, Debug)]
pub enum RequestLogError {
    #[error("request log entry not found: {id}")]
    NotFound { id: RequestId },

    #[error("request {id} is already terminal")]
    AlreadyTerminal { id: RequestId },

    #[error("storage error: {message}")]
    Storage { message: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type RequestLogResult<T> = Result<T, RequestLogError>;
