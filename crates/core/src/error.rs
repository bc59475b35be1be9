// crates/core/src/error.rs
use thiserror::Error;

/// Errors raised while validating or grouping a single message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    #[error("message_content is not a string")]
    InvalidContent,

    #[error("direction must be to_company or to_client")]
    InvalidDirection,

    #[error("social_create_time missing or unparseable as ISO-8601")]
    InvalidTimestamp,

    #[error("content matches the configured auto-reply sentence")]
    Autoresponse,
}

/// Errors surfaced by the LLM adapter (C5).
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("response was not valid JSON: {0}")]
    InvalidJson(String),

    #[error("response array length {got} did not match batch size {expected}")]
    LengthMismatch { expected: usize, got: usize },

    #[error("response item failed schema validation: {0}")]
    SchemaViolation(String),

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("provider not configured: {0}")]
    NotConfigured(String),
}

impl LlmError {
    /// Transient failures are worth retrying with backoff (§4.6): network
    /// errors, 5xx responses, and rate-limiting. Everything else (bad JSON,
    /// wrong shape) is resolved by a fallback substitution instead, per
    /// §4.5's parsing contract.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Request(e) => e.is_timeout() || e.is_connect(),
            LlmError::Http { status, .. } => *status >= 500 || *status == 429,
            LlmError::Timeout(_) => true,
            LlmError::InvalidJson(_)
            | LlmError::LengthMismatch { .. }
            | LlmError::SchemaViolation(_)
            | LlmError::NotConfigured(_) => false,
        }
    }
}

/// Top-level error type for core domain operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("llm adapter error: {0}")]
    Llm(#[from] LlmError),

    #[error("invalid configuration: {0}")]
    Config(String),
}
