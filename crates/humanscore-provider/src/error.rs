use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    RateLimit,
    ServerError,
    Timeout,
    AuthError,
    InvalidRequest,
    Unknown,
}

impl ProviderErrorKind {
    pub fn from_status(status: StatusCode) -> Self {
        match status.as_u16() {
            429 => Self::RateLimit,
            401 | 403 => Self::AuthError,
            400 | 422 => Self::InvalidRequest,
            500..=599 => Self::ServerError,
            _ => Self::Unknown,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimit | Self::ServerError | Self::Timeout)
    }
}

/// Everything that can go wrong talking to a provider. All variants are
/// transport-level; a 200 with empty text is an `Ok` response.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} api error (timeout): request timed out after {ms}ms", ms = .after.as_millis())]
    Timeout { provider: String, after: Duration },

    #[error("{provider} api error (connect): {message}")]
    Connect { provider: String, message: String },

    #[error("{provider} api error ({status}): {message}")]
    Status {
        provider: String,
        status: StatusCode,
        kind: ProviderErrorKind,
        message: String,
    },

    #[error("{provider} api error (decode): {message}")]
    Decode { provider: String, message: String },

    #[error("{provider} api error (transport): {message}")]
    Transport { provider: String, message: String },

    #[error("{provider} credential is not configured")]
    MissingCredential { provider: String },

    #[error("provider not found: {0}")]
    NotRegistered(String),
}

impl ProviderError {
    pub fn kind(&self) -> ProviderErrorKind {
        match self {
            Self::Timeout { .. } => ProviderErrorKind::Timeout,
            Self::Status { kind, .. } => *kind,
            Self::Connect { .. } => ProviderErrorKind::ServerError,
            Self::MissingCredential { .. } => ProviderErrorKind::AuthError,
            _ => ProviderErrorKind::Unknown,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    pub(crate) fn from_reqwest(provider: &str, err: reqwest::Error, after: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                provider: provider.to_string(),
                after,
            }
        } else if err.is_connect() {
            Self::Connect {
                provider: provider.to_string(),
                message: err.to_string(),
            }
        } else if err.is_decode() {
            Self::Decode {
                provider: provider.to_string(),
                message: err.to_string(),
            }
        } else {
            Self::Transport {
                provider: provider.to_string(),
                message: err.to_string(),
            }
        }
    }

    pub(crate) fn from_status(provider: &str, status: StatusCode, detail: Option<String>) -> Self {
        Self::Status {
            provider: provider.to_string(),
            status,
            kind: ProviderErrorKind::from_status(status),
            message: detail.unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("unexpected status")
                    .to_string()
            }),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_kind_classification() {
        assert_eq!(
            ProviderErrorKind::from_status(StatusCode::TOO_MANY_REQUESTS),
            ProviderErrorKind::RateLimit
        );
        assert_eq!(
            ProviderErrorKind::from_status(StatusCode::INTERNAL_SERVER_ERROR),
            ProviderErrorKind::ServerError
        );
        assert_eq!(
            ProviderErrorKind::from_status(StatusCode::UNAUTHORIZED),
            ProviderErrorKind::AuthError
        );
        assert_eq!(
            ProviderErrorKind::from_status(StatusCode::BAD_REQUEST),
            ProviderErrorKind::InvalidRequest
        );
        assert!(ProviderErrorKind::RateLimit.is_retryable());
        assert!(ProviderErrorKind::Timeout.is_retryable());
        assert!(!ProviderErrorKind::AuthError.is_retryable());
    }

    #[test]
    fn status_error_without_detail_uses_reason() {
        let err = ProviderError::from_status("openai", StatusCode::BAD_GATEWAY, None);
        let text = err.to_string();
        assert!(text.contains("502"));
        assert!(text.contains("Bad Gateway"));
        assert!(err.is_retryable());
    }

    #[test]
    fn timeout_error_reports_duration() {
        let err = ProviderError::Timeout {
            provider: "anthropic".into(),
            after: Duration::from_millis(1500),
        };
        assert_eq!(
            err.to_string(),
            "anthropic api error (timeout): request timed out after 1500ms"
        );
        assert_eq!(err.kind(), ProviderErrorKind::Timeout);
    }
}
