// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Key Manager: idempotent, race-safe master key acquisition.
//
// The hardware keystore owns the key material; this type only caches the
// handle per alias and serialises first-time creation, so concurrent first
// callers in this process observe exactly one key generation. Bridges keep
// no cache of their own; this is the only one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, instrument};
use trustkit_bridge::traits::HardwareKeystore;
use trustkit_core::error::{Result, TrustKitError};
use trustkit_core::types::KeyHandle;

/// Caches master-key handles in front of a hardware keystore.
pub struct KeyManager<K: ?Sized> {
    keystore: Arc<K>,
    handles: Mutex<HashMap<String, KeyHandle>>,
}

impl<K> KeyManager<K>
where
    K: ?Sized + HardwareKeystore + Send + Sync,
{
    pub fn new(keystore: Arc<K>) -> Self {
        Self {
            keystore,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Return the key stored under `alias`, creating it on first use.
    ///
    /// The cache lock is held across the keystore call, so at most one
    /// caller per process ever asks the keystore to create a given alias.
    #[instrument(skip(self))]
    pub fn get_or_create_key(&self, alias: &str) -> Result<KeyHandle> {
        let mut handles = self
            .handles
            .lock()
            .map_err(|_| TrustKitError::Keystore("key manager lock poisoned".into()))?;

        if let Some(handle) = handles.get(alias) {
            debug!("master key handle reused");
            return Ok(handle.clone());
        }

        let handle = self.keystore.get_or_create_key(alias)?;
        info!(key_id = handle.key_id(), "master key acquired");
        handles.insert(alias.to_owned(), handle.clone());
        Ok(handle)
    }

    /// Encrypt under `key`, binding `aad` into the tag.
    pub fn encrypt(&self, key: &KeyHandle, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        self.keystore.seal(key, aad, plaintext)
    }

    /// Decrypt and authenticate. Tampering yields `TrustKitError::Authentication`.
    pub fn decrypt(&self, key: &KeyHandle, aad: &[u8], sealed: &[u8]) -> Result<Vec<u8>> {
        self.keystore.open(key, aad, sealed)
    }
}
