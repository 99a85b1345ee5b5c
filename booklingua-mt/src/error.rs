use booklingua::{DocumentError, SelectionError, StoreError, TransitionError};
use std::time::Duration;

/// Errors raised by translation providers
///
/// Every variant is either transient (worth retrying) or permanent; see
/// [`MtError::is_transient`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MtError {
    /// Provider misconfiguration (missing key, bad URL, bad parameter)
    #[error("configuration error: {0}")]
    Config(String),
    /// Credentials were rejected (401/403)
    #[error("authentication failed ({status}): {message}")]
    Auth { status: u16, message: String },
    /// The request itself is wrong and will not succeed on retry (4xx)
    #[error("request rejected ({status}): {message}")]
    InvalidRequest { status: u16, message: String },
    /// Rate limited (429), with the server's retry hint when it sent one
    #[error("rate limited{}", .retry_after.map(|d| format!(", retry after {:?}", d)).unwrap_or_default())]
    RateLimited { retry_after: Option<Duration> },
    /// The request or the upstream model timed out
    #[error("request timed out")]
    Timeout,
    /// Connection-level failure
    #[error("network error: {0}")]
    Network(String),
    /// Server side failure (5xx)
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },
    /// The reply could not be understood
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl MtError {
    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MtError::RateLimited { .. }
                | MtError::Timeout
                | MtError::Network(_)
                | MtError::Server { .. }
                | MtError::InvalidResponse(_)
        )
    }

    /// Server-provided delay before the next attempt
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            MtError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for MtError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            MtError::Timeout
        } else if err.is_decode() {
            MtError::InvalidResponse(err.to_string())
        } else if err.is_builder() {
            MtError::Config(err.to_string())
        } else {
            MtError::Network(err.to_string())
        }
    }
}

/// Result type for translation provider calls
pub type MtResult<T> = Result<T, MtError>;

/// Errors that abort a pipeline run
///
/// Failures of a single unit are not errors at this level; they are recorded
/// on the unit and reported in the run summary.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error("state machine defect: {0}")]
    Transition(#[from] TransitionError),
}

impl From<MtError> for PipelineError {
    fn from(err: MtError) -> Self {
        PipelineError::Config(err.to_string())
    }
}

/// Result type for pipeline runs
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(MtError::Timeout.is_transient());
        assert!(MtError::RateLimited { retry_after: None }.is_transient());
        assert!(MtError::Network("reset".into()).is_transient());
        assert!(
            MtError::Server {
                status: 503,
                message: "busy".into()
            }
            .is_transient()
        );
        assert!(MtError::InvalidResponse("empty".into()).is_transient());
    }

    #[test]
    fn test_permanent_classification() {
        assert!(!MtError::Config("no key".into()).is_transient());
        assert!(
            !MtError::Auth {
                status: 401,
                message: "bad key".into()
            }
            .is_transient()
        );
        assert!(
            !MtError::InvalidRequest {
                status: 400,
                message: "bad".into()
            }
            .is_transient()
        );
    }

    #[test]
    fn test_rate_limit_display() {
        let err = MtError::RateLimited {
            retry_after: Some(Duration::from_secs(3)),
        };
        assert_eq!(err.to_string(), "rate limited, retry after 3s");
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
        assert_eq!(
            MtError::RateLimited { retry_after: None }.to_string(),
            "rate limited"
        );
    }
}
