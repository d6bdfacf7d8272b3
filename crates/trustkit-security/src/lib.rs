// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// trustkit-security: encrypted storage under a hardware-held master key.
//
// The key manager fronts the platform keystore, entries are sealed with
// AES-256-GCM inside the keystore boundary, and only row-id hashes and
// ciphertext are ever persisted.

pub mod entry;
pub mod keys;
pub mod persistence;
pub mod storage;

pub use entry::{EncryptedEntry, row_id};
pub use keys::KeyManager;
pub use persistence::{EntryPersistence, MemoryEntryStore, SqliteEntryStore};
pub use storage::SecureStore;
