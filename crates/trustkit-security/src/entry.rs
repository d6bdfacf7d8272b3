// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Encrypted entries and their row identifiers.
//
// Logical keys never reach the database. Each one is hashed with SHA-256
// under a domain prefix; the hex digest is the row id and also the AEAD
// associated data, so a sealed value moved to another row fails to open.

use sha2::{Digest, Sha256};
use trustkit_bridge::TAG_LEN;

const ROW_DOMAIN: &[u8] = b"trustkit.entry.v1\0";

/// Nonce prefix length of a sealed value.
pub const NONCE_LEN: usize = 12;

/// Compute the row id for a logical key.
pub fn row_id(logical_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ROW_DOMAIN);
    hasher.update(logical_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// A sealed value as persisted: `nonce(12) || ciphertext || tag(16)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedEntry {
    pub row_id: String,
    pub sealed: Vec<u8>,
}

impl EncryptedEntry {
    pub fn new(row_id: impl Into<String>, sealed: Vec<u8>) -> Self {
        Self {
            row_id: row_id.into(),
            sealed,
        }
    }

    /// Whether the blob is long enough to hold a nonce and a tag.
    pub fn is_well_formed(&self) -> bool {
        self.sealed.len() >= NONCE_LEN + TAG_LEN
    }

    /// Length of the encrypted payload, excluding nonce and tag.
    pub fn payload_len(&self) -> usize {
        self.sealed.len().saturating_sub(NONCE_LEN + TAG_LEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_id_is_stable_hex() {
        let id = row_id("token");
        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(id, row_id("token"));
        assert_ne!(id, row_id("Token"));
    }

    #[test]
    fn row_id_is_domain_separated() {
        let plain = hex::encode(Sha256::digest(b"token"));
        assert_ne!(row_id("token"), plain);
    }

    #[test]
    fn well_formed_needs_nonce_and_tag() {
        assert!(!EncryptedEntry::new("r", vec![0; 27]).is_well_formed());
        let empty_payload = EncryptedEntry::new("r", vec![0; 28]);
        assert!(empty_payload.is_well_formed());
        assert_eq!(empty_payload.payload_len(), 0);
    }
}
