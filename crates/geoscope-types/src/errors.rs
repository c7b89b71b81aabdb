//! Error types for the geoscope audit system.

use thiserror::Error;

/// Workspace-wide result alias.
pub type Result<T> = std::result::Result<T, AuditError>;

/// Errors surfaced by the audit pipeline and its collaborators.
///
/// The `kind()` string is stable and appears in persisted audit records and
/// progress events; the retryability split drives the job manager's backoff
/// policy.
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("canceled")]
    Canceled,

    #[error("timeout after {seconds}s: {operation}")]
    Timeout { operation: String, seconds: u64 },

    #[error("ssrf_blocked: {host} resolves to a non-routable address")]
    SsrfBlocked { host: String },

    #[error("network error: {message}")]
    Network { message: String },

    #[error("http client error: status {status}")]
    Http4xx { status: u16 },

    #[error("http server error: status {status}")]
    Http5xx { status: u16 },

    #[error("rate limited by {service}")]
    RateLimited { service: String },

    #[error("parse error: {message}")]
    Parse { message: String },

    #[error("llm_unavailable: {message}")]
    LlmUnavailable { message: String },

    #[error("invalid config: {message}")]
    InvalidConfig { message: String },

    #[error("audit {id} not found")]
    NotFound { id: i64 },

    #[error("conflict: {message}")]
    Conflict { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl AuditError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, seconds: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            seconds,
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn from_status(status: u16) -> Self {
        match status {
            429 => Self::RateLimited {
                service: "http".to_string(),
            },
            400..=499 => Self::Http4xx { status },
            _ => Self::Http5xx { status },
        }
    }

    /// Stable machine-readable kind, used in logs and persisted errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Canceled => "canceled",
            Self::Timeout { .. } => "timeout",
            Self::SsrfBlocked { .. } => "ssrf_blocked",
            Self::Network { .. } => "network",
            Self::Http4xx { .. } => "http_4xx",
            Self::Http5xx { .. } => "http_5xx",
            Self::RateLimited { .. } => "rate_limited",
            Self::Parse { .. } => "parse_error",
            Self::LlmUnavailable { .. } => "llm_unavailable",
            Self::InvalidConfig { .. } => "invalid_config",
            Self::NotFound { .. } => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::Internal { .. } => "internal",
        }
    }

    /// Infrastructure failures are retried with backoff; logical failures
    /// are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::Network { .. }
                | Self::Http5xx { .. }
                | Self::RateLimited { .. }
        )
    }
}

impl From<url::ParseError> for AuditError {
    fn from(e: url::ParseError) -> Self {
        Self::InvalidConfig {
            message: format!("invalid url: {}", e),
        }
    }
}

impl From<serde_json::Error> for AuditError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse {
            message: e.to_string(),
        }
    }
}
