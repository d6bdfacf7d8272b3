// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Software-only keystore for desktop and CI builds.
//
// WARNING: this keystore provides NO hardware binding. Key material lives in
// process memory and, for the file-backed variant, in a 0600 key file under
// the app data directory. Anyone who can read that file can decrypt the store.
// Mobile builds use the platform keystore instead.

use std::collections::HashMap;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ring::rand::SystemRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use trustkit_core::error::{Result, TrustKitError};
use trustkit_core::types::KeyHandle;

use crate::sealing::{KEY_LEN, SealingKey, generate_key_bytes};
use crate::traits::HardwareKeystore;

/// On-disk representation of one key.
#[derive(Serialize, Deserialize)]
struct KeyFile {
    key_id: String,
    material: String,
}

struct LoadedKey {
    handle: KeyHandle,
    key: SealingKey,
}

/// AES-256-GCM keystore without hardware protection.
pub struct SoftwareKeystore {
    /// Directory holding `<alias>.key` files, or `None` for memory-only keys.
    dir: Option<PathBuf>,
    keys: Mutex<HashMap<String, LoadedKey>>,
    rng: SystemRandom,
}

impl SoftwareKeystore {
    /// Keystore whose keys persist as files under `dir`.
    pub fn file_backed(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        warn!(
            dir = %dir.display(),
            "SoftwareKeystore: NO HARDWARE BINDING: key material stored on disk"
        );
        Self {
            dir: Some(dir),
            keys: Mutex::new(HashMap::new()),
            rng: SystemRandom::new(),
        }
    }

    /// Keystore whose keys vanish with the process.
    pub fn ephemeral() -> Self {
        Self {
            dir: None,
            keys: Mutex::new(HashMap::new()),
            rng: SystemRandom::new(),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, LoadedKey>>> {
        self.keys
            .lock()
            .map_err(|_| TrustKitError::Keystore("keystore lock poisoned".into()))
    }

    /// Read the key for `alias` from disk, or create the file if it does not
    /// exist. `create_new` makes a concurrent creator in another process lose
    /// the race cleanly; the loser then reads the winner's file.
    fn load_or_create_file(&self, dir: &Path, alias: &str) -> Result<(String, [u8; KEY_LEN])> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.key", hex::encode(alias.as_bytes())));

        if let Some(found) = read_key_file(&path)? {
            debug!(alias, "software key loaded from disk");
            return Ok(found);
        }

        let key_id = uuid::Uuid::new_v4().to_string();
        let material = generate_key_bytes(&self.rng)?;
        let body = serde_json::to_vec(&KeyFile {
            key_id: key_id.clone(),
            material: hex::encode(material),
        })?;

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        match options.open(&path) {
            Ok(mut file) => {
                file.write_all(&body)?;
                file.sync_all()?;
                info!(alias, "software key created");
                Ok((key_id, material))
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => read_key_file(&path)?
                .ok_or_else(|| TrustKitError::Keystore("key file vanished during creation".into())),
            Err(e) => Err(e.into()),
        }
    }
}

fn read_key_file(path: &Path) -> Result<Option<(String, [u8; KEY_LEN])>> {
    let body = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let file: KeyFile = serde_json::from_slice(&body)?;
    let bytes = hex::decode(&file.material)
        .map_err(|e| TrustKitError::Keystore(format!("corrupt key file: {e}")))?;
    let material: [u8; KEY_LEN] = bytes
        .try_into()
        .map_err(|_| TrustKitError::Keystore("corrupt key file: wrong key length".into()))?;
    Ok(Some((file.key_id, material)))
}

impl HardwareKeystore for SoftwareKeystore {
    #[instrument(skip(self))]
    fn get_or_create_key(&self, alias: &str) -> Result<KeyHandle> {
        let mut keys = self.lock()?;
        if let Some(loaded) = keys.get(alias) {
            return Ok(loaded.handle.clone());
        }

        let (key_id, material) = match &self.dir {
            Some(dir) => self.load_or_create_file(dir, alias)?,
            None => {
                info!(alias, "ephemeral software key created");
                (uuid::Uuid::new_v4().to_string(), generate_key_bytes(&self.rng)?)
            }
        };

        let handle = KeyHandle::new(alias, key_id);
        keys.insert(
            alias.to_owned(),
            LoadedKey {
                handle: handle.clone(),
                key: SealingKey::from_bytes(&material)?,
            },
        );
        Ok(handle)
    }

    fn seal(&self, key: &KeyHandle, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        let keys = self.lock()?;
        let loaded = keys
            .get(key.alias())
            .filter(|k| k.handle == *key)
            .ok_or_else(|| TrustKitError::Keystore(format!("unknown key {}", key.alias())))?;
        loaded.key.seal(&self.rng, aad, plaintext)
    }

    fn open(&self, key: &KeyHandle, aad: &[u8], sealed: &[u8]) -> Result<Vec<u8>> {
        let keys = self.lock()?;
        // A handle from an older key generation can never authenticate.
        let loaded = keys
            .get(key.alias())
            .filter(|k| k.handle == *key)
            .ok_or(TrustKitError::Authentication)?;
        loaded.key.open(aad, sealed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_alias_same_handle() {
        let ks = SoftwareKeystore::ephemeral();
        let a = ks.get_or_create_key("master").unwrap();
        let b = ks.get_or_create_key("master").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, ks.get_or_create_key("other").unwrap());
    }

    #[test]
    fn file_backed_key_survives_restart() {
        let dir = tempfile::tempdir().unwrap();

        let first = SoftwareKeystore::file_backed(dir.path());
        let handle = first.get_or_create_key("master").unwrap();
        let sealed = first.seal(&handle, b"row", b"token").unwrap();
        drop(first);

        let second = SoftwareKeystore::file_backed(dir.path());
        let reopened = second.get_or_create_key("master").unwrap();
        assert_eq!(handle, reopened);
        assert_eq!(second.open(&reopened, b"row", &sealed).unwrap(), b"token");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let ks = SoftwareKeystore::file_backed(dir.path());
        ks.get_or_create_key("master").unwrap();

        let entry = std::fs::read_dir(dir.path()).unwrap().next().unwrap().unwrap();
        let mode = entry.metadata().unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn wiped_keystore_cannot_open_old_entries() {
        let dir = tempfile::tempdir().unwrap();
        let ks = SoftwareKeystore::file_backed(dir.path());
        let old = ks.get_or_create_key("master").unwrap();
        let sealed = ks.seal(&old, b"", b"v").unwrap();
        drop(ks);

        // Simulate a keystore wipe: the key file disappears.
        for entry in std::fs::read_dir(dir.path()).unwrap() {
            std::fs::remove_file(entry.unwrap().path()).unwrap();
        }

        let fresh = SoftwareKeystore::file_backed(dir.path());
        let new = fresh.get_or_create_key("master").unwrap();
        assert_ne!(old, new);
        assert!(matches!(
            fresh.open(&new, b"", &sealed),
            Err(TrustKitError::Authentication)
        ));
        assert!(matches!(
            fresh.open(&old, b"", &sealed),
            Err(TrustKitError::Authentication)
        ));
    }
}
