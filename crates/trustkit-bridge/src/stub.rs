// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Desktop/CI bridge for builds where native mobile APIs are unavailable.
//
// Answers what `std` can answer (paths, `/proc` on Linux, a writable probe)
// and backs the keystore with the software implementation. Mobile-only
// queries return `PlatformUnavailable` and are left out of the capability
// set, so no probe ever calls them.

use std::path::PathBuf;

use trustkit_core::error::{Result, TrustKitError};
use trustkit_core::types::KeyHandle;

use crate::host;
use crate::software::SoftwareKeystore;
use crate::traits::*;

/// Bridge returned on non-mobile platforms.
pub struct StubBridge {
    data_dir: PathBuf,
    keystore: SoftwareKeystore,
}

impl StubBridge {
    /// Bridge rooted at the conventional per-user data directory.
    pub fn new() -> Self {
        Self::with_data_dir(default_data_dir())
    }

    /// Bridge rooted at `dir`; keys are kept in `<dir>/keys`.
    pub fn with_data_dir(dir: impl Into<PathBuf>) -> Self {
        let data_dir = dir.into();
        let keystore = SoftwareKeystore::file_backed(data_dir.join("keys"));
        Self { data_dir, keystore }
    }
}

impl Default for StubBridge {
    fn default() -> Self {
        Self::new()
    }
}

const STUB_CAPABILITIES: CapabilitySet = {
    let base = CapabilitySet::empty()
        .with(Capability::FileSystem)
        .with(Capability::WritableProbe)
        .with(Capability::HardwareKeystore);
    if cfg!(target_os = "linux") {
        base.with(Capability::LoadedModules).with(Capability::TraceFlag)
    } else {
        base
    }
};

impl PlatformBridge for StubBridge {
    fn platform_name(&self) -> &str {
        "Desktop (stub)"
    }

    fn platform_kind(&self) -> PlatformKind {
        PlatformKind::Desktop
    }

    fn capabilities(&self) -> CapabilitySet {
        STUB_CAPABILITIES
    }
}

impl DeviceFilesystem for StubBridge {
    fn file_exists(&self, path: &str) -> bool {
        host::file_exists(path)
    }
}

impl PackageRegistry for StubBridge {
    fn is_package_installed(&self, _package: &str) -> Result<bool> {
        Err(TrustKitError::PlatformUnavailable)
    }
}

impl BuildInfo for StubBridge {
    fn build_tags(&self) -> Result<Option<String>> {
        Err(TrustKitError::PlatformUnavailable)
    }
}

impl ProcessInspector for StubBridge {
    fn is_traced(&self) -> Result<bool> {
        #[cfg(target_os = "linux")]
        {
            host::proc_is_traced()
        }
        #[cfg(not(target_os = "linux"))]
        {
            Err(TrustKitError::PlatformUnavailable)
        }
    }

    fn loaded_modules(&self) -> Result<Vec<String>> {
        #[cfg(target_os = "linux")]
        {
            host::proc_loaded_modules()
        }
        #[cfg(not(target_os = "linux"))]
        {
            Err(TrustKitError::PlatformUnavailable)
        }
    }
}

impl AppProvenance for StubBridge {
    fn installer_identity(&self) -> Result<Option<String>> {
        Err(TrustKitError::PlatformUnavailable)
    }

    fn has_provisioning_profile(&self) -> Result<bool> {
        Err(TrustKitError::PlatformUnavailable)
    }

    fn is_debuggable_build(&self) -> Result<bool> {
        Err(TrustKitError::PlatformUnavailable)
    }
}

impl SandboxProbe for StubBridge {
    fn try_privileged_operation(&self) -> Result<bool> {
        Err(TrustKitError::PlatformUnavailable)
    }

    fn probe_writable(&self, dir: &str) -> Result<bool> {
        host::probe_writable(dir)
    }
}

impl UrlSchemeRegistry for StubBridge {
    fn can_open_url(&self, _url: &str) -> Result<bool> {
        Err(TrustKitError::PlatformUnavailable)
    }
}

impl HardwareKeystore for StubBridge {
    fn get_or_create_key(&self, alias: &str) -> Result<KeyHandle> {
        self.keystore.get_or_create_key(alias)
    }

    fn seal(&self, key: &KeyHandle, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        self.keystore.seal(key, aad, plaintext)
    }

    fn open(&self, key: &KeyHandle, aad: &[u8], sealed: &[u8]) -> Result<Vec<u8>> {
        self.keystore.open(key, aad, sealed)
    }
}

impl AppStorage for StubBridge {
    fn data_dir(&self) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(self.data_dir.clone())
    }
}

/// `$XDG_DATA_HOME/trustkit`, then `~/.local/share/trustkit`, then a
/// temp-dir fallback.
fn default_data_dir() -> PathBuf {
    let base = if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        PathBuf::from(xdg)
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".local").join("share")
    } else {
        std::env::temp_dir()
    };
    base.join("trustkit")
}
