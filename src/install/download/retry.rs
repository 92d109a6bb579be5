//! Transient vs. permanent network failures

use reqwest::StatusCode;

/// Outcome of a single failed network attempt.
#[derive(Debug)]
pub(crate) enum Failure {
    /// Worth another attempt: connection errors, timeouts, 5xx.
    Transient(String),
    /// Retrying cannot help: 4xx, malformed payloads, local I/O.
    Permanent(String),
}

impl Failure {
    pub(crate) fn from_reqwest(err: &reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_status(status);
        }
        if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
            Failure::Transient(err.to_string())
        } else {
            Failure::Permanent(err.to_string())
        }
    }

    pub(crate) fn from_status(status: StatusCode) -> Self {
        let msg = format!("HTTP {status}");
        if status.is_server_error() {
            Failure::Transient(msg)
        } else {
            Failure::Permanent(msg)
        }
    }

    pub(crate) fn is_transient(&self) -> bool {
        matches!(self, Failure::Transient(_))
    }

    pub(crate) fn message(&self) -> &str {
        match self {
            Failure::Transient(msg) | Failure::Permanent(msg) => msg,
        }
    }
}
