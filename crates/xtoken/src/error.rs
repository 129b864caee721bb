use std::fmt;
use std::time::Duration;

use reqwest::StatusCode;

/// Result type for request-level operations.
pub type Result<T> = std::result::Result<T, Error>;

/// One of the three negotiation stages, in protocol order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Guest,
    Flow,
    OAuth,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Guest => "guest",
            Stage::Flow => "flow",
            Stage::OAuth => "oauth",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A malformed egress endpoint address.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("endpoint address is empty")]
    Empty,

    #[error("invalid endpoint `{input}`: {reason}")]
    Invalid { input: String, reason: String },

    #[error("endpoint `{input}` has no port")]
    MissingPort { input: String },

    #[error("failed to build client for `{input}`: {source}")]
    Client {
        input: String,
        #[source]
        source: reqwest::Error,
    },
}

impl EndpointError {
    pub fn invalid(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

/// Coarse classification of a stage failure, used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Decode,
    Shape,
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::Transport => "transport",
            ErrorKind::Decode => "decode",
            ErrorKind::Shape => "shape",
            ErrorKind::Cancelled => "cancelled",
        })
    }
}

/// Why a single stage did not produce its value.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("transport error: {source}")]
    Transport {
        #[from]
        source: reqwest::Error,
    },

    #[error("response is not valid JSON (HTTP {status}): {source}")]
    Decode {
        status: StatusCode,
        #[source]
        source: serde_json::Error,
    },

    #[error("unexpected response shape at `{path}`: expected {expected}")]
    Shape { path: String, expected: &'static str },

    #[error("cancelled")]
    Cancelled,
}

impl StageError {
    pub fn shape(path: impl Into<String>, expected: &'static str) -> Self {
        Self::Shape {
            path: path.into(),
            expected,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport { .. } => ErrorKind::Transport,
            Self::Decode { .. } => ErrorKind::Decode,
            Self::Shape { .. } => ErrorKind::Shape,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Terminal failure of one endpoint's attempt. Never retried.
#[derive(Debug, thiserror::Error)]
pub enum AttemptError {
    #[error(transparent)]
    Endpoint(#[from] EndpointError),

    #[error("{stage} stage failed: {cause}")]
    Stage {
        stage: Stage,
        #[source]
        cause: StageError,
    },
}

impl AttemptError {
    pub fn stage(stage: Stage, cause: StageError) -> Self {
        Self::Stage { stage, cause }
    }

    /// The stage that failed, if the attempt got as far as issuing requests.
    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            Self::Endpoint(_) => None,
            Self::Stage { stage, .. } => Some(*stage),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Stage { cause, .. } if cause.is_cancelled())
    }
}

/// A race that produced no credentials.
#[derive(Debug, thiserror::Error)]
pub enum RaceError {
    #[error("no egress endpoints to race")]
    NoEndpoints,

    #[error("all {attempts} egress endpoints failed")]
    Exhausted { attempts: usize },

    #[error("no endpoint finished within {0:?}")]
    DeadlineElapsed(Duration),
}

/// Failure to load the egress endpoint list.
#[derive(Debug, thiserror::Error)]
pub enum ProxyListError {
    #[error("proxy list source unreachable: {source}")]
    Unreachable {
        #[from]
        source: reqwest::Error,
    },

    #[error("proxy list request failed with HTTP {status} for {url}")]
    HttpStatus { status: StatusCode, url: String },

    #[error("invalid proxy list URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Errors fatal to one external credential request.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    ProxyList(#[from] ProxyListError),

    #[error(transparent)]
    Race(#[from] RaceError),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Race(RaceError::DeadlineElapsed(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_and_names() {
        assert!(Stage::Guest < Stage::Flow);
        assert!(Stage::Flow < Stage::OAuth);
        let names: Vec<_> = [Stage::Guest, Stage::Flow, Stage::OAuth]
            .iter()
            .map(Stage::as_str)
            .collect();
        assert_eq!(names, ["guest", "flow", "oauth"]);
    }

    #[test]
    fn test_stage_error_kind() {
        assert_eq!(
            StageError::shape("/guest_token", "string").kind(),
            ErrorKind::Shape
        );
        assert_eq!(StageError::Cancelled.kind(), ErrorKind::Cancelled);
        assert!(StageError::Cancelled.is_cancelled());
    }

    #[test]
    fn test_attempt_error_stage() {
        let err = AttemptError::stage(Stage::Flow, StageError::Cancelled);
        assert_eq!(err.failed_stage(), Some(Stage::Flow));
        assert!(err.is_cancelled());
        assert_eq!(err.to_string(), "flow stage failed: cancelled");

        let err = AttemptError::from(EndpointError::Empty);
        assert_eq!(err.failed_stage(), None);
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_shape_error_message_names_path() {
        let err = StageError::shape("/subtasks/0/open_account/oauth_token", "string");
        assert_eq!(
            err.to_string(),
            "unexpected response shape at `/subtasks/0/open_account/oauth_token`: expected string"
        );
    }

    #[test]
    fn test_timeout_classification() {
        let err = Error::from(RaceError::DeadlineElapsed(Duration::from_secs(10)));
        assert!(err.is_timeout());
        assert!(!Error::from(RaceError::NoEndpoints).is_timeout());
    }
}
