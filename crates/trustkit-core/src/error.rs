// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for TrustKit.

use thiserror::Error;

/// Top-level error type for all TrustKit operations.
#[derive(Debug, Error)]
pub enum TrustKitError {
    // -- Boundary errors --
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // -- Signal evaluation --
    /// A probe failed internally. Probes convert this into a negative
    /// signal; it never reaches a verdict caller.
    #[error("probe failed: {0}")]
    Probe(String),

    // -- Keys and cryptography --
    #[error("keystore error: {0}")]
    Keystore(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    /// The AEAD tag did not verify. The Secure Store reports this as an
    /// absent entry, so it is deliberately free of detail.
    #[error("authentication failed")]
    Authentication,

    // -- Storage / persistence --
    #[error("storage error: {0}")]
    Storage(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // -- Platform bridge --
    #[error("platform bridge error: {0}")]
    Bridge(String),

    #[error("feature not available on this platform")]
    PlatformUnavailable,
}

impl TrustKitError {
    /// Whether this is a failure of the storage path itself (persistence,
    /// keystore, encryption or the platform beneath them).
    ///
    /// Keystore and encryption failures happen inside a storage operation,
    /// so the caller sees them as a failed write rather than a new code.
    /// `Authentication` and `Probe` are folded away before any boundary and
    /// are not storage failures.
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            Self::Storage(_)
                | Self::Keystore(_)
                | Self::Encryption(_)
                | Self::Io(_)
                | Self::Serialization(_)
                | Self::Bridge(_)
                | Self::PlatformUnavailable
        )
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, TrustKitError>;
