// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// AES-256-GCM sealing for keystores that hold key material in-process
// (iOS Keychain-held keys, desktop software keystore).
//
// Wire layout: nonce (12) || ciphertext || tag (16). The nonce is drawn from
// the OS CSPRNG for every call.

use ring::aead::{AES_256_GCM, Aad, LessSafeKey, NONCE_LEN, Nonce, UnboundKey};
use ring::rand::{SecureRandom, SystemRandom};
use trustkit_core::error::{Result, TrustKitError};

/// Raw key length for AES-256.
pub const KEY_LEN: usize = 32;

/// Authentication tag length appended by GCM.
pub const TAG_LEN: usize = 16;

/// A loaded AES-256-GCM key. Never exposes its bytes.
pub(crate) struct SealingKey {
    key: LessSafeKey,
}

impl SealingKey {
    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let unbound = UnboundKey::new(&AES_256_GCM, bytes)
            .map_err(|_| TrustKitError::Keystore("invalid AES-256 key length".into()))?;
        Ok(Self {
            key: LessSafeKey::new(unbound),
        })
    }

    pub(crate) fn seal(&self, rng: &SystemRandom, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rng.fill(&mut nonce_bytes)
            .map_err(|_| TrustKitError::Encryption("nonce generation failed".into()))?;

        let mut in_out = plaintext.to_vec();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::from(aad),
                &mut in_out,
            )
            .map_err(|_| TrustKitError::Encryption("AES-GCM seal failed".into()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + in_out.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&in_out);
        Ok(sealed)
    }

    pub(crate) fn open(&self, aad: &[u8], sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < NONCE_LEN + TAG_LEN {
            return Err(TrustKitError::Authentication);
        }
        let (nonce_bytes, body) = sealed.split_at(NONCE_LEN);
        let nonce =
            Nonce::try_assume_unique_for_key(nonce_bytes).map_err(|_| TrustKitError::Authentication)?;

        let mut in_out = body.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::from(aad), &mut in_out)
            .map_err(|_| TrustKitError::Authentication)?;
        Ok(plaintext.to_vec())
    }
}

/// Fresh random key material.
pub(crate) fn generate_key_bytes(rng: &SystemRandom) -> Result<[u8; KEY_LEN]> {
    let mut bytes = [0u8; KEY_LEN];
    rng.fill(&mut bytes)
        .map_err(|_| TrustKitError::Keystore("key generation failed".into()))?;
    Ok(bytes)
}
