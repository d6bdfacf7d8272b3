// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Boundary error codes.
//
// Only argument and storage problems cross the command boundary, each with a
// stable code the host matches on. The message is for logs and developers,
// never for branching.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;
use trustkit_core::error::TrustKitError;

/// Stable error code reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// A required argument was missing or had the wrong type.
    InvalidArgs,
    /// Persistence, keystore or encryption failure inside the secure store.
    StorageError,
    /// The host has no live UI context for screen protection.
    NoActivity,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgs => "INVALID_ARGS",
            Self::StorageError => "STORAGE_ERROR",
            Self::NoActivity => "NO_ACTIVITY",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error as the host sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryError {
    pub code: ErrorCode,
    pub message: String,
}

impl BoundaryError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Map a storage-path error to its boundary form.
///
/// Argument errors keep their message. Storage failures (see
/// `TrustKitError::is_storage_failure`) report what failed. Anything else
/// should have been absorbed below the boundary; it still answers
/// `STORAGE_ERROR`, but with no detail, so an authentication failure can
/// never be told apart from any other failed operation.
pub fn storage_error(err: &TrustKitError) -> BoundaryError {
    match err {
        TrustKitError::InvalidArgument(detail) => {
            BoundaryError::new(ErrorCode::InvalidArgs, detail.clone())
        }
        TrustKitError::Keystore(detail) => BoundaryError::new(
            ErrorCode::StorageError,
            format!("master key unavailable: {detail}"),
        ),
        TrustKitError::PlatformUnavailable => BoundaryError::new(
            ErrorCode::StorageError,
            "secure storage is not available on this platform",
        ),
        other if other.is_storage_failure() => {
            BoundaryError::new(ErrorCode::StorageError, other.to_string())
        }
        other => {
            warn!(error = %other, "unexpected error at the storage boundary");
            BoundaryError::new(ErrorCode::StorageError, "storage operation failed")
        }
    }
}

/// Map a screen-protection error to its boundary form.
///
/// Whatever went wrong, the host can only act on it by attaching a UI
/// context and retrying.
pub fn screen_error(err: &TrustKitError) -> BoundaryError {
    BoundaryError::new(ErrorCode::NoActivity, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable_strings() {
        assert_eq!(ErrorCode::InvalidArgs.to_string(), "INVALID_ARGS");
        assert_eq!(
            serde_json::to_string(&ErrorCode::StorageError).unwrap(),
            "\"STORAGE_ERROR\""
        );
        assert_eq!(
            serde_json::to_string(&ErrorCode::NoActivity).unwrap(),
            format!("\"{}\"", ErrorCode::NoActivity.as_str())
        );
    }

    #[test]
    fn argument_errors_keep_their_message() {
        let err = storage_error(&TrustKitError::InvalidArgument("missing key".into()));
        assert_eq!(err, BoundaryError::new(ErrorCode::InvalidArgs, "missing key"));
    }

    #[test]
    fn everything_else_is_a_storage_error() {
        for err in [
            TrustKitError::Storage("disk full".into()),
            TrustKitError::Keystore("wiped".into()),
            TrustKitError::Encryption("rng".into()),
            TrustKitError::PlatformUnavailable,
        ] {
            assert_eq!(storage_error(&err).code, ErrorCode::StorageError);
        }
    }

    #[test]
    fn absorbed_errors_cross_without_detail() {
        for err in [
            TrustKitError::Authentication,
            TrustKitError::Probe("module scan".into()),
        ] {
            assert!(!err.is_storage_failure());
            assert_eq!(
                storage_error(&err),
                BoundaryError::new(ErrorCode::StorageError, "storage operation failed")
            );
        }
    }

    #[test]
    fn storage_failures_report_what_failed() {
        let err = TrustKitError::Storage("disk full".into());
        assert!(err.is_storage_failure());
        assert!(storage_error(&err).message.contains("disk full"));
    }

    #[test]
    fn screen_failures_are_no_activity() {
        let err = screen_error(&TrustKitError::Bridge("activity destroyed".into()));
        assert_eq!(err.code, ErrorCode::NoActivity);
        assert!(err.message.contains("activity destroyed"));
    }
}
