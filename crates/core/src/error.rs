// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy shared across the registry and the daemon.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Classified errors surfaced by registry and lifecycle operations.
///
/// `Display` renders the human-readable form written to the daemon's
/// stderr; [`Error::as_json`] renders the machine-readable form used in
/// structured responses.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("subprocess failure: {0}")]
    Subprocess(#[from] SubprocessFailure),
    /// The slot's advisory lock is held elsewhere. Callers that probe
    /// slots treat this as a skip, not a failure.
    #[error("instance slot {0} is locked by another process")]
    Contention(u32),
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
    #[error("internal error: {0}")]
    Internal(String),
}

/// How a child process failed to produce a clean exit.
#[derive(Debug, Error)]
pub enum SubprocessFailure {
    #[error("exited with code {code}")]
    ExitCode { code: i32 },
    #[error("killed by signal {signal}")]
    Signaled { signal: i32 },
    #[error("timed out after {0:?}")]
    TimedOut(std::time::Duration),
    #[error("lost track of subprocess pid")]
    LostPid,
}

impl Error {
    /// Stable kind tag for the machine-readable rendering.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidArgument(_) => "invalid_argument",
            Error::NotFound(_) => "not_found",
            Error::AlreadyExists(_) => "already_exists",
            Error::Io(_) => "io",
            Error::PermissionDenied(_) => "permission_denied",
            Error::Subprocess(_) => "subprocess_failure",
            Error::Contention(_) => "contention",
            Error::SchemaMismatch(_) => "schema_mismatch",
            Error::Internal(_) => "internal",
        }
    }

    /// Machine-readable rendering: `{"kind": …, "message": …}`.
    pub fn as_json(&self) -> serde_json::Value {
        serde_json::json!({
            "kind": self.kind(),
            "message": self.to_string(),
        })
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
