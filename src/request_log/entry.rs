//! Request log row and its value objects.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a single call attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for RequestId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle state of a logged request.
///
/// `Started` transitions exactly once to `Success` or `Failed`; the terminal
/// states accept no further transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Started,
    Success,
    Failed,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Success | RequestStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Started => "STARTED",
            RequestStatus::Success => "SUCCESS",
            RequestStatus::Failed => "FAILED",
        }
    }
}

/// Retrieval-augmentation metrics for one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagMetrics {
    pub top_k: u32,
    pub similarity_threshold: f64,
    pub latency_ms: u64,
    pub chunk_count: u32,
    pub context_bytes: u64,
    pub truncated: bool,
    pub context_hash: Option<String>,
}

/// Model and token accounting for one call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallUsage {
    pub provider: String,
    pub model_requested: String,
    pub model_used: String,
    pub failover: bool,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

/// Cost figure with its audit lineage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallCost {
    pub amount: Decimal,
    pub currency: String,
    pub pricing_version: String,
}

/// Context captured when a request is started.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequestStart {
    pub trace_id: String,
    pub org_id: String,
    pub workspace_id: String,
    pub api_key_id: String,
    pub api_key_prefix: String,
    pub path: String,
    pub method: String,
    pub prompt_key: Option<String>,
    pub rag_enabled: bool,
}

/// Outcome fields shared by both terminal transitions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RequestCompletion {
    pub usage: Option<CallUsage>,
    pub cost: Option<CallCost>,
    pub rag: Option<RagMetrics>,
    pub http_status: Option<u16>,
    pub latency_ms: u64,
}

/// Terminal failure update: the shared outcome fields plus error detail.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestFailure {
    pub completion: RequestCompletion,
    pub error_code: String,
    pub error_message: String,
    pub fail_reason: Option<String>,
}

/// One row per call attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestLogEntry {
    pub id: RequestId,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub latency_ms: Option<u64>,

    pub trace_id: String,
    pub org_id: String,
    pub workspace_id: String,
    pub api_key_id: String,
    pub api_key_prefix: String,
    pub path: String,
    pub method: String,
    pub prompt_key: Option<String>,
    pub rag_enabled: bool,

    pub usage: Option<CallUsage>,
    pub cost: Option<CallCost>,
    pub rag: Option<RagMetrics>,
    pub http_status: Option<u16>,

    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub fail_reason: Option<String>,
}

impl RequestLogEntry {
    pub fn started(id: RequestId, start: RequestStart) -> Self {
        Self {
            id,
            status: RequestStatus::Started,
            created_at: Utc::now(),
            finished_at: None,
            latency_ms: None,
            trace_id: start.trace_id,
            org_id: start.org_id,
            workspace_id: start.workspace_id,
            api_key_id: start.api_key_id,
            api_key_prefix: start.api_key_prefix,
            path: start.path,
            method: start.method,
            prompt_key: start.prompt_key,
            rag_enabled: start.rag_enabled,
            usage: None,
            cost: None,
            rag: None,
            http_status: None,
            error_code: None,
            error_message: None,
            fail_reason: None,
        }
    }

    // One fill path for both terminal transitions, so success and failure
    // rows always carry the same usage/cost/RAG shape.
    fn apply_completion(&mut self, completion: RequestCompletion) {
        self.usage = completion.usage;
        self.cost = completion.cost;
        self.rag = completion.rag;
        self.http_status = completion.http_status;
        self.latency_ms = Some(completion.latency_ms);
        self.finished_at = Some(Utc::now());
    }

    pub fn finish_success(&mut self, completion: RequestCompletion) {
        self.apply_completion(completion);
        self.status = RequestStatus::Success;
    }

    pub fn finish_failure(&mut self, failure: RequestFailure) {
        self.apply_completion(failure.completion);
        self.error_code = Some(failure.error_code);
        self.error_message = Some(failure.error_message);
        self.fail_reason = failure.fail_reason;
        self.status = RequestStatus::Failed;
    }
}

/// Filter for the operational search surface.
#[derive(Debug, Clone, Default)]
pub struct RequestLogFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub status: Option<RequestStatus>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub rag_enabled: Option<bool>,
    pub error_code: Option<String>,
}

impl RequestLogFilter {
    pub fn matches(&self, entry: &RequestLogEntry) -> bool {
        if let Some(from) = self.from
            && entry.created_at < from
        {
            return false;
        }
        if let Some(to) = self.to
            && entry.created_at > to
        {
            return false;
        }
        if let Some(status) = self.status
            && entry.status != status
        {
            return false;
        }
        if let Some(provider) = &self.provider
            && entry.usage.as_ref().map(|u| u.provider.as_str()) != Some(provider.as_str())
        {
            return false;
        }
        if let Some(model) = &self.model
            && entry.usage.as_ref().map(|u| u.model_used.as_str()) != Some(model.as_str())
        {
            return false;
        }
        if let Some(rag_enabled) = self.rag_enabled
            && entry.rag_enabled != rag_enabled
        {
            return false;
        }
        if let Some(error_code) = &self.error_code
            && entry.error_code.as_deref() != Some(error_code.as_str())
        {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn sample_completion() -> RequestCompletion {
        RequestCompletion {
            usage: Some(CallUsage {
                provider: "openai".to_string(),
                model_requested: "gpt-4-turbo".to_string(),
                model_used: "gpt-4-turbo".to_string(),
                failover: false,
                input_tokens: 900,
                output_tokens: 100,
                total_tokens: 1000,
            }),
            cost: Some(CallCost {
                amount: dec!(0.012),
                currency: "USD".to_string(),
                pricing_version: "2025-06".to_string(),
            }),
            rag: None,
            http_status: Some(200),
            latency_ms: 840,
        }
    }

    #[test]
    fn test_start_yields_started_row() {
        let entry = RequestLogEntry::started(RequestId::new(), RequestStart::default());
        assert_eq!(entry.status, RequestStatus::Started);
        assert!(!entry.status.is_terminal());
        assert!(entry.finished_at.is_none());
        assert!(entry.usage.is_none());
    }

    #[test]
    fn test_success_and_failure_share_fill() {
        let mut success = RequestLogEntry::started(RequestId::new(), RequestStart::default());
        success.finish_success(sample_completion());

        let mut failed = RequestLogEntry::started(RequestId::new(), RequestStart::default());
        failed.finish_failure(RequestFailure {
            completion: sample_completion(),
            error_code: "UPSTREAM_ERROR".to_string(),
            error_message: "bad gateway".to_string(),
            fail_reason: Some("provider outage".to_string()),
        });

        assert_eq!(success.usage, failed.usage);
        assert_eq!(success.cost, failed.cost);
        assert_eq!(success.http_status, failed.http_status);
        assert_eq!(success.latency_ms, failed.latency_ms);

        assert_eq!(success.status, RequestStatus::Success);
        assert!(success.error_code.is_none());
        assert_eq!(failed.status, RequestStatus::Failed);
        assert_eq!(failed.error_code.as_deref(), Some("UPSTREAM_ERROR"));
    }

    #[test]
    fn test_filter_matches_on_fields() {
        let mut entry = RequestLogEntry::started(RequestId::new(), RequestStart::default());
        entry.finish_success(sample_completion());

        let matching = RequestLogFilter {
            status: Some(RequestStatus::Success),
            provider: Some("openai".to_string()),
            model: Some("gpt-4-turbo".to_string()),
            ..Default::default()
        };
        assert!(matching.matches(&entry));

        let wrong_provider = RequestLogFilter {
            provider: Some("anthropic".to_string()),
            ..Default::default()
        };
        assert!(!wrong_provider.matches(&entry));

        let wrong_status = RequestLogFilter {
            status: Some(RequestStatus::Failed),
            ..Default::default()
        };
        assert!(!wrong_status.matches(&entry));
    }
}
