//! Error types for the labelscout pipeline.

use std::time::Duration;

use thiserror::Error;

use crate::utils::retry::Retryable;

/// Errors raised by the remote API clients (search, detail, vision).
///
/// Clients only classify; the retry policy lives in the orchestrator.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transient error: {0}")]
    Transient(String),

    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("call timed out after {0:?}")]
    Timeout(Duration),
}

impl ClientError {
    /// Classify a reqwest transport error.
    pub fn from_transport(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ClientError::Transient(format!("timeout: {e}"))
        } else if e.is_decode() {
            ClientError::Rejected(format!("undecodable response: {e}"))
        } else {
            ClientError::Transient(e.to_string())
        }
    }

    /// Map a non-success HTTP status onto the client taxonomy.
    ///
    /// The vision client overrides 400 and 404, whose meaning differs there.
    pub fn from_status(
        status: reqwest::StatusCode,
        retry_after: Option<Duration>,
        body: &str,
    ) -> Self {
        let message = format!("status {}: {}", status, truncate_body(body));
        match status.as_u16() {
            429 => ClientError::RateLimited {
                message,
                retry_after,
            },
            401 | 403 => ClientError::Unauthorized(message),
            404 => ClientError::NotFound(message),
            500..=599 => ClientError::Transient(message),
            _ => ClientError::Rejected(message),
        }
    }

    /// True when the error invalidates the whole run rather than one item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ClientError::Unauthorized(_))
    }
}

impl Retryable for ClientError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Transient(_) | ClientError::RateLimited { .. } | ClientError::Timeout(_)
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            ClientError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

fn truncate_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= 200 {
        trimmed.to_string()
    } else {
        let head: String = trimmed.chars().take(200).collect();
        format!("{head}...")
    }
}

/// Errors related to configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    #[error("path error: {0}")]
    PathError(String),

    #[error("missing {0}")]
    MissingKey(&'static str),

    #[error("keywords file error: {0}")]
    Keywords(String),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Errors related to the checkpoint store.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint store at {path} is unreadable or corrupt: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("checkpoint IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("checkpoint database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("checkpoint lock poisoned")]
    Poisoned,
}

/// Errors related to the local output file.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("output IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("output file {0} has an unexpected header")]
    HeaderMismatch(String),
}

/// Errors raised while publishing the output file to a remote sink.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("local file not found: {0}")]
    MissingFile(String),

    #[error("publish IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("publish request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("storage service error: {0}")]
    ServiceError(String),

    #[error("invalid storage response: {0}")]
    InvalidResponse(String),
}

/// Errors that abort a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("output error: {0}")]
    Output(#[from] OutputError),

    #[error("remote API refused credentials: {0}")]
    Unauthorized(String),

    #[error("illegal state transition for {id}: {from} -> {to}")]
    IllegalTransition {
        id: String,
        from: &'static str,
        to: &'static str,
    },
}

/// Application-level errors that wrap domain errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            ClientError::from_status(StatusCode::TOO_MANY_REQUESTS, None, ""),
            ClientError::RateLimited { .. }
        ));
        assert!(matches!(
            ClientError::from_status(StatusCode::BAD_GATEWAY, None, ""),
            ClientError::Transient(_)
        ));
        assert!(matches!(
            ClientError::from_status(StatusCode::UNAUTHORIZED, None, ""),
            ClientError::Unauthorized(_)
        ));
        assert!(matches!(
            ClientError::from_status(StatusCode::NOT_FOUND, None, ""),
            ClientError::NotFound(_)
        ));
        assert!(matches!(
            ClientError::from_status(StatusCode::UNPROCESSABLE_ENTITY, None, ""),
            ClientError::Rejected(_)
        ));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ClientError::Transient("reset".into()).is_retryable());
        assert!(ClientError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(
            ClientError::RateLimited {
                message: "slow down".into(),
                retry_after: Some(Duration::from_secs(2)),
            }
            .is_retryable()
        );
        assert!(!ClientError::NotFound("gone".into()).is_retryable());
        assert!(!ClientError::Extraction("garbage".into()).is_retryable());
        assert!(!ClientError::Unauthorized("bad key".into()).is_retryable());
    }

    #[test]
    fn test_retry_after_hint() {
        let err = ClientError::RateLimited {
            message: "slow down".into(),
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
        assert_eq!(ClientError::Transient("x".into()).retry_after(), None);
    }

    #[test]
    fn test_long_body_is_truncated() {
        let body = "x".repeat(500);
        let err = ClientError::from_status(StatusCode::INTERNAL_SERVER_ERROR, None, &body);
        assert!(err.to_string().len() < 300);
    }
}
