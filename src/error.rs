//! Error types for workload sync.
//!
//! Only configuration problems are fatal. Everything the remote workspace
//! does wrong is carried as data (`ApiFailure`, `SyncFailure`) so a single
//! bad entry never takes down a poll cycle.

use std::fmt;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// A failed call against the workspace API.
///
/// `status` is `None` when no HTTP response came back at all (connect error,
/// timeout, undecodable body).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}: {message}", status_label(.status))]
pub struct ApiFailure {
    pub status: Option<u16>,
    pub message: String,
}

impl ApiFailure {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }
}

fn status_label(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!("HTTP {code}"),
        None => "transport error".to_string(),
    }
}

/// Which step of reconciling an entry went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// A query or point-read came back non-2xx.
    Fetch,
    /// No workload summary record matches the schedule's client.
    NotFound,
    /// Appending to the parent task's child relation failed.
    ParentUpdate,
    /// Appending to the workload summary's relation failed.
    LinkUpdate,
    /// Flipping the schedule's flag failed after the link was written.
    FlagUpdate,
}

impl FailureKind {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Fetch => "FETCH_FAILED",
            Self::NotFound => "NOT_FOUND",
            Self::ParentUpdate => "PARENT_UPDATE_FAILED",
            Self::LinkUpdate => "UPDATE_FAILED",
            Self::FlagUpdate => "FLAG_UPDATE_FAILED",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Per-entry failure value reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} ({}): {message}", status_label(.status))]
pub struct SyncFailure {
    pub kind: FailureKind,
    pub status: Option<u16>,
    pub message: String,
}

impl SyncFailure {
    pub fn from_api(kind: FailureKind, failure: ApiFailure) -> Self {
        Self {
            kind,
            status: failure.status,
            message: failure.message,
        }
    }

    pub fn not_found(client_id: &str) -> Self {
        Self {
            kind: FailureKind::NotFound,
            status: None,
            message: format!("no workload summary record for client {client_id}"),
        }
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(FailureKind::LinkUpdate.code(), "UPDATE_FAILED");
        assert_eq!(FailureKind::FlagUpdate.code(), "FLAG_UPDATE_FAILED");
        assert_eq!(FailureKind::NotFound.code(), "NOT_FOUND");
    }

    #[test]
    fn sync_failure_keeps_api_status() {
        let failure = SyncFailure::from_api(
            FailureKind::LinkUpdate,
            ApiFailure::http(500, "Internal Server Error"),
        );
        assert_eq!(failure.status, Some(500));
        assert_eq!(failure.code(), "UPDATE_FAILED");
        assert_eq!(
            failure.to_string(),
            "UPDATE_FAILED (HTTP 500): Internal Server Error"
        );
    }

    #[test]
    fn transport_failure_has_no_status() {
        let failure = ApiFailure::transport("connection refused");
        assert_eq!(failure.status, None);
        assert_eq!(failure.to_string(), "transport error: connection refused");
    }
}
