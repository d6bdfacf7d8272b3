// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Runtime configuration.
//
// Everything here tunes the trust checks and the secure store without
// touching decision logic. Denylist fields only ever *extend* the compiled-in
// lists; a host cannot use configuration to silence a built-in signal.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Storefront identifiers accepted by the integrity check out of the box.
pub const DEFAULT_TRUSTED_INSTALLERS: &[&str] = &[
    "com.android.vending",  // Google Play Store
    "com.amazon.venezia",   // Amazon App Store
    "com.huawei.appmarket", // Huawei AppGallery
];

/// Settings shared by the detection engine, integrity verifier and store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustConfig {
    /// Alias of the master key in the hardware keystore.
    pub key_alias: String,
    /// File stem of the persisted store inside the app data directory.
    pub store_name: String,
    /// Installer identities treated as legitimate distribution channels.
    pub trusted_installers: Vec<String>,
    /// Additional filesystem paths whose existence indicates root/jailbreak.
    pub extra_root_paths: Vec<String>,
    /// Additional package identifiers of root-management apps.
    pub extra_root_packages: Vec<String>,
    /// Additional loaded-module name fragments (matched case-insensitively).
    pub extra_module_markers: Vec<String>,
    /// Directory that must not be writable from inside the sandbox.
    pub writable_probe_dir: String,
    /// URL whose scheme belongs to a jailbreak package manager.
    pub url_scheme_probe: String,
}

impl Default for TrustConfig {
    fn default() -> Self {
        let writable_probe_dir = if cfg!(target_os = "ios") {
            "/private"
        } else {
            "/system"
        };

        Self {
            key_alias: "trustkit_master_key".into(),
            store_name: "trustkit_secure_store".into(),
            trusted_installers: DEFAULT_TRUSTED_INSTALLERS
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
            extra_root_paths: Vec::new(),
            extra_root_packages: Vec::new(),
            extra_module_markers: Vec::new(),
            writable_probe_dir: writable_probe_dir.into(),
            url_scheme_probe: "cydia://package/com.example.package".into(),
        }
    }
}

impl TrustConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load configuration from `path`, or return the defaults when the file
    /// does not exist. A file that exists but does not parse is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(json) => Self::from_json(&json),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether `installer` is on the storefront allow-list.
    pub fn is_trusted_installer(&self, installer: &str) -> bool {
        self.trusted_installers.iter().any(|i| i == installer)
    }
}
