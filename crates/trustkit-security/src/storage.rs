// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Secure Store: encrypted key/value persistence under a hardware-held key.
//
// Construction is cheap. The master key and the backing store are acquired
// on the first operation (or an explicit `init`), exactly once even when
// several threads arrive together. A failed initialisation is not cached;
// the next operation retries it.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};

use tracing::{debug, info, instrument, warn};
use trustkit_bridge::PlatformBridge;
use trustkit_bridge::traits::HardwareKeystore;
use trustkit_core::TrustConfig;
use trustkit_core::error::{Result, TrustKitError};
use trustkit_core::types::KeyHandle;

use crate::entry::{EncryptedEntry, row_id};
use crate::keys::KeyManager;
use crate::persistence::{EntryPersistence, MemoryEntryStore, SqliteEntryStore};

/// Opens the backing store on first use.
pub type Opener = Box<dyn Fn() -> Result<Box<dyn EntryPersistence>> + Send + Sync>;

struct StoreState {
    key: KeyHandle,
    entries: Box<dyn EntryPersistence>,
}

/// Encrypted string/byte store. Values are sealed with AES-256-GCM under the
/// master key; the row id of each entry is bound in as associated data.
pub struct SecureStore<K: ?Sized = dyn PlatformBridge> {
    keys: KeyManager<K>,
    alias: String,
    opener: Opener,
    state: OnceLock<StoreState>,
    init_lock: Mutex<()>,
}

impl SecureStore<dyn PlatformBridge> {
    /// Store backed by SQLite in the platform's private data directory,
    /// keyed by the platform keystore.
    pub fn for_platform(bridge: Arc<dyn PlatformBridge>, config: &TrustConfig) -> Self {
        let file = format!("{}.db", config.store_name);
        let dirs = bridge.clone();
        let opener: Opener = Box::new(move || {
            let path: PathBuf = dirs.data_dir()?.join(&file);
            Ok(Box::new(SqliteEntryStore::open(path)?) as Box<dyn EntryPersistence>)
        });
        Self::with_opener(bridge, &config.key_alias, opener)
    }
}

impl<K> SecureStore<K>
where
    K: ?Sized + HardwareKeystore + Send + Sync,
{
    pub fn with_opener(keystore: Arc<K>, alias: &str, opener: Opener) -> Self {
        Self {
            keys: KeyManager::new(keystore),
            alias: alias.to_owned(),
            opener,
            state: OnceLock::new(),
            init_lock: Mutex::new(()),
        }
    }

    /// Store whose entries live only as long as the process.
    pub fn in_memory(keystore: Arc<K>, alias: &str) -> Self {
        Self::with_opener(
            keystore,
            alias,
            Box::new(|| Ok(Box::new(MemoryEntryStore::new()) as Box<dyn EntryPersistence>)),
        )
    }

    /// Acquire the master key and open the backing store now.
    pub fn init(&self) -> Result<()> {
        self.state().map(|_| ())
    }

    pub fn is_initialized(&self) -> bool {
        self.state.get().is_some()
    }

    fn state(&self) -> Result<&StoreState> {
        if let Some(state) = self.state.get() {
            return Ok(state);
        }

        let _guard = self
            .init_lock
            .lock()
            .map_err(|_| TrustKitError::Storage("store init lock poisoned".into()))?;
        if let Some(state) = self.state.get() {
            return Ok(state);
        }

        let key = self.keys.get_or_create_key(&self.alias)?;
        let entries = (self.opener)()?;
        info!(alias = %self.alias, "secure store initialised");
        Ok(self.state.get_or_init(|| StoreState { key, entries }))
    }

    /// Encrypt `value` and persist it under `key`, replacing any previous
    /// value.
    #[instrument(level = "debug", skip(self, value), fields(len = value.len()))]
    pub fn write(&self, key: &str, value: &[u8]) -> Result<()> {
        let state = self.state()?;
        let id = row_id(key);
        let sealed = self.keys.encrypt(&state.key, id.as_bytes(), value)?;
        state.entries.put(&EncryptedEntry::new(id, sealed))?;
        debug!("entry written");
        Ok(())
    }

    /// Decrypt the value stored under `key`.
    ///
    /// Absent, truncated or tampered entries, and entries sealed under a key
    /// that no longer exists, all read as `None`.
    #[instrument(level = "debug", skip(self))]
    pub fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let state = self.state()?;
        let id = row_id(key);
        let Some(entry) = state.entries.get(&id)? else {
            return Ok(None);
        };
        if !entry.is_well_formed() {
            warn!("stored entry is truncated; treating as absent");
            return Ok(None);
        }

        match self.keys.decrypt(&state.key, id.as_bytes(), &entry.sealed) {
            Ok(plaintext) => Ok(Some(plaintext)),
            Err(TrustKitError::Authentication) => {
                warn!("stored entry failed authentication; treating as absent");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// `read` for values written as text.
    pub fn read_string(&self, key: &str) -> Result<Option<String>> {
        self.read(key)?
            .map(|bytes| {
                String::from_utf8(bytes)
                    .map_err(|_| TrustKitError::Storage("stored value is not UTF-8".into()))
            })
            .transpose()
    }

    /// Remove `key`. Removing a missing key succeeds.
    #[instrument(level = "debug", skip(self))]
    pub fn delete(&self, key: &str) -> Result<()> {
        self.state()?.entries.remove(&row_id(key))
    }

    /// Remove every entry. The master key is kept.
    #[instrument(skip_all)]
    pub fn delete_all(&self) -> Result<()> {
        self.state()?.entries.clear()?;
        info!("secure store cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use trustkit_bridge::software::SoftwareKeystore;
    use trustkit_bridge::stub::StubBridge;

    const ALIAS: &str = "master";

    fn shared_rows() -> (Arc<MemoryEntryStore>, Opener) {
        let rows = Arc::new(MemoryEntryStore::new());
        let handle = rows.clone();
        let opener: Opener =
            Box::new(move || Ok(Box::new(handle.clone()) as Box<dyn EntryPersistence>));
        (rows, opener)
    }

    fn store() -> SecureStore<SoftwareKeystore> {
        SecureStore::in_memory(Arc::new(SoftwareKeystore::ephemeral()), ALIAS)
    }

    #[test]
    fn write_then_read() {
        let s = store();
        s.write("token", b"abc123").unwrap();
        assert_eq!(s.read("token").unwrap().as_deref(), Some(&b"abc123"[..]));
        assert_eq!(s.read_string("token").unwrap().as_deref(), Some("abc123"));
    }

    #[test]
    fn missing_key_reads_none() {
        assert_eq!(store().read("nope").unwrap(), None);
    }

    #[test]
    fn last_write_wins() {
        let s = store();
        s.write("k", b"first").unwrap();
        s.write("k", b"second").unwrap();
        assert_eq!(s.read_string("k").unwrap().as_deref(), Some("second"));
    }

    #[test]
    fn empty_value_round_trips() {
        let s = store();
        s.write("k", b"").unwrap();
        assert_eq!(s.read("k").unwrap(), Some(Vec::new()));
    }

    #[test]
    fn delete_removes_and_missing_delete_succeeds() {
        let s = store();
        s.write("a", b"1").unwrap();
        s.write("b", b"2").unwrap();
        s.delete("a").unwrap();
        s.delete("a").unwrap();
        s.delete("never-written").unwrap();
        assert_eq!(s.read("a").unwrap(), None);
        assert_eq!(s.read_string("b").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn delete_all_clears_every_entry() {
        let s = store();
        for i in 0..5 {
            s.write(&format!("k{i}"), b"v").unwrap();
        }
        s.delete_all().unwrap();
        for i in 0..5 {
            assert_eq!(s.read(&format!("k{i}")).unwrap(), None);
        }
        s.write("k0", b"again").unwrap();
        assert_eq!(s.read_string("k0").unwrap().as_deref(), Some("again"));
    }

    #[test]
    fn rows_hold_only_ciphertext_under_hashed_ids() {
        let (rows, opener) = shared_rows();
        let s = SecureStore::with_opener(Arc::new(SoftwareKeystore::ephemeral()), ALIAS, opener);
        s.write("token", b"super-secret").unwrap();

        assert!(rows.get("token").unwrap().is_none());
        let entry = rows.get(&row_id("token")).unwrap().unwrap();
        assert!(
            !entry
                .sealed
                .windows(b"super-secret".len())
                .any(|w| w == b"super-secret")
        );
        assert_eq!(entry.payload_len(), b"super-secret".len());
    }

    #[test]
    fn tampered_entry_reads_none() {
        let (rows, opener) = shared_rows();
        let s = SecureStore::with_opener(Arc::new(SoftwareKeystore::ephemeral()), ALIAS, opener);
        s.write("k", b"value").unwrap();

        let mut entry = rows.get(&row_id("k")).unwrap().unwrap();
        let last = entry.sealed.len() - 1;
        entry.sealed[last] ^= 0x01;
        rows.put(&entry).unwrap();
        assert_eq!(s.read("k").unwrap(), None);

        rows.put(&EncryptedEntry::new(row_id("k"), vec![0; 5])).unwrap();
        assert_eq!(s.read("k").unwrap(), None);
    }

    #[test]
    fn entry_moved_to_another_row_reads_none() {
        let (rows, opener) = shared_rows();
        let s = SecureStore::with_opener(Arc::new(SoftwareKeystore::ephemeral()), ALIAS, opener);
        s.write("a", b"alpha").unwrap();

        let moved = rows.get(&row_id("a")).unwrap().unwrap();
        rows.put(&EncryptedEntry::new(row_id("b"), moved.sealed)).unwrap();
        assert_eq!(s.read("b").unwrap(), None);
        assert_eq!(s.read_string("a").unwrap().as_deref(), Some("alpha"));
    }

    #[test]
    fn entries_from_a_wiped_key_read_none() {
        let (rows, opener) = shared_rows();
        let before = SecureStore::with_opener(Arc::new(SoftwareKeystore::ephemeral()), ALIAS, opener);
        before.write("k", b"value").unwrap();

        let handle = rows.clone();
        let after = SecureStore::with_opener(
            Arc::new(SoftwareKeystore::ephemeral()),
            ALIAS,
            Box::new(move || Ok(Box::new(handle.clone()) as Box<dyn EntryPersistence>)),
        );
        assert_eq!(after.read("k").unwrap(), None);
        after.write("k", b"fresh").unwrap();
        assert_eq!(after.read_string("k").unwrap().as_deref(), Some("fresh"));
    }

    #[test]
    fn initialises_lazily_and_once() {
        const THREADS: usize = 12;
        let opened = Arc::new(AtomicUsize::new(0));
        let counter = opened.clone();
        let s = SecureStore::with_opener(
            Arc::new(SoftwareKeystore::ephemeral()),
            ALIAS,
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(MemoryEntryStore::new()) as Box<dyn EntryPersistence>)
            }),
        );
        assert!(!s.is_initialized());
        assert_eq!(opened.load(Ordering::SeqCst), 0);

        let barrier = Barrier::new(THREADS);
        std::thread::scope(|scope| {
            for i in 0..THREADS {
                let (s, barrier) = (&s, &barrier);
                scope.spawn(move || {
                    barrier.wait();
                    s.write(&format!("k{i}"), b"v").unwrap();
                });
            }
        });

        assert!(s.is_initialized());
        assert_eq!(opened.load(Ordering::SeqCst), 1);
        for i in 0..THREADS {
            assert!(s.read(&format!("k{i}")).unwrap().is_some());
        }
    }

    #[test]
    fn failed_init_is_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let s = SecureStore::with_opener(
            Arc::new(SoftwareKeystore::ephemeral()),
            ALIAS,
            Box::new(move || {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Err(TrustKitError::Storage("disk not mounted".into()));
                }
                Ok(Box::new(MemoryEntryStore::new()) as Box<dyn EntryPersistence>)
            }),
        );

        let err = s.write("k", b"v").unwrap_err();
        assert!(err.is_storage_failure());
        assert!(!s.is_initialized());

        s.write("k", b"v").unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    struct BrokenDisk;

    impl EntryPersistence for BrokenDisk {
        fn get(&self, _row_id: &str) -> Result<Option<EncryptedEntry>> {
            Err(TrustKitError::Storage("read failed".into()))
        }
        fn put(&self, _entry: &EncryptedEntry) -> Result<()> {
            Err(TrustKitError::Storage("disk full".into()))
        }
        fn remove(&self, _row_id: &str) -> Result<()> {
            Err(TrustKitError::Storage("read-only".into()))
        }
        fn clear(&self) -> Result<()> {
            Err(TrustKitError::Storage("read-only".into()))
        }
        fn len(&self) -> Result<usize> {
            Ok(0)
        }
    }

    #[test]
    fn persistence_failures_surface_as_storage_errors() {
        let s = SecureStore::with_opener(
            Arc::new(SoftwareKeystore::ephemeral()),
            ALIAS,
            Box::new(|| Ok(Box::new(BrokenDisk) as Box<dyn EntryPersistence>)),
        );
        assert!(s.write("k", b"v").unwrap_err().is_storage_failure());
        assert!(s.read("k").unwrap_err().is_storage_failure());
        assert!(s.delete("k").unwrap_err().is_storage_failure());
        assert!(s.delete_all().unwrap_err().is_storage_failure());
    }

    #[test]
    fn platform_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrustConfig::default();
        {
            let bridge: Arc<dyn PlatformBridge> =
                Arc::new(StubBridge::with_data_dir(dir.path().to_path_buf()));
            let s = SecureStore::for_platform(bridge, &config);
            s.write("session", b"xyz").unwrap();
        }

        assert!(dir.path().join("trustkit_secure_store.db").exists());
        let bridge: Arc<dyn PlatformBridge> =
            Arc::new(StubBridge::with_data_dir(dir.path().to_path_buf()));
        let s = SecureStore::for_platform(bridge, &config);
        assert_eq!(s.read_string("session").unwrap().as_deref(), Some("xyz"));
    }
}
