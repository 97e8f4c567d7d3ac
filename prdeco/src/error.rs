use reqwest::{Method, StatusCode};
use thiserror::Error;

/// Coarse classification used by callers to decide how to report a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Transport,
    ContractViolation,
}

#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid credentials, unresolvable repository, unsupported setup.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{method} {url} returned HTTP {status}: {body}")]
    Status {
        method: Method,
        url: String,
        status: StatusCode,
        body: String,
    },

    #[error("{method} {url} failed")]
    Request {
        method: Method,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("malformed response from {url}: {reason}")]
    MalformedResponse { url: String, reason: String },

    #[error("pagination starting at {url} exceeded {limit} pages")]
    PageLimit { url: String, limit: usize },

    /// Analysis output does not satisfy what a platform requires.
    #[error("contract violation: {0}")]
    ContractViolation(String),

    /// Single failure signal returned by an orchestrator run.
    #[error("{platform} decoration failed: {source}")]
    Decoration {
        platform: &'static str,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration(_) => ErrorKind::Configuration,
            Error::ContractViolation(_) => ErrorKind::ContractViolation,
            Error::Status { .. }
            | Error::Request { .. }
            | Error::MalformedResponse { .. }
            | Error::PageLimit { .. } => ErrorKind::Transport,
            Error::Decoration { source, .. } => source.kind(),
        }
    }

    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }

    pub(crate) fn contract(message: impl Into<String>) -> Self {
        Error::ContractViolation(message.into())
    }

    /// HTTP status of a transport failure, if the remote answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Status { status, .. } => Some(*status),
            Error::Decoration { source, .. } => source.status(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
