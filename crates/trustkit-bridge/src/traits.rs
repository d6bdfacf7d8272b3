// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Platform-agnostic trait definitions for native capabilities.
//
// The trust checks and the secure store only ever talk to the platform
// through these traits. Platforms that lack a query return
// `TrustKitError::PlatformUnavailable` and leave the matching `Capability`
// out of their `CapabilitySet`, so the probe is never scheduled.

use std::path::PathBuf;

use trustkit_core::error::Result;
use trustkit_core::types::KeyHandle;

/// Unified bridge that groups all native capabilities.
pub trait PlatformBridge:
    DeviceFilesystem
    + PackageRegistry
    + BuildInfo
    + ProcessInspector
    + AppProvenance
    + SandboxProbe
    + UrlSchemeRegistry
    + HardwareKeystore
    + AppStorage
    + Send
    + Sync
{
    /// Human-readable platform name (e.g. "iOS", "Android").
    fn platform_name(&self) -> &str;

    /// Which platform family this bridge runs on. Selects the denylists.
    fn platform_kind(&self) -> PlatformKind;

    /// The queries this platform can answer. Resolved once, when the bridge
    /// is constructed; callers build their probe lists from it.
    fn capabilities(&self) -> CapabilitySet;
}

/// Platform family, used to pick the compiled-in denylists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformKind {
    Android,
    Ios,
    Desktop,
}

/// One native query a platform may or may not support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Capability {
    FileSystem = 1 << 0,
    PackageRegistry = 1 << 1,
    BuildTags = 1 << 2,
    LoadedModules = 1 << 3,
    TraceFlag = 1 << 4,
    PrivilegedProbe = 1 << 5,
    WritableProbe = 1 << 6,
    UrlSchemes = 1 << 7,
    InstallerIdentity = 1 << 8,
    ProvisioningProfile = 1 << 9,
    DebuggableFlag = 1 << 10,
    HardwareKeystore = 1 << 11,
}

/// Fixed set of capabilities reported by a bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CapabilitySet(u16);

impl CapabilitySet {
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Builder-style insert, usable in `const` context.
    pub const fn with(self, capability: Capability) -> Self {
        Self(self.0 | capability as u16)
    }

    pub fn from_slice(capabilities: &[Capability]) -> Self {
        capabilities
            .iter()
            .fold(Self::empty(), |set, c| set.with(*c))
    }

    pub const fn contains(self, capability: Capability) -> bool {
        self.0 & capability as u16 != 0
    }
}

/// Filesystem existence checks.
pub trait DeviceFilesystem {
    /// Whether anything exists at `path`. Inaccessible paths count as absent.
    fn file_exists(&self, path: &str) -> bool;
}

/// Installed-package registry.
pub trait PackageRegistry {
    /// Whether `package` resolves in the registry. "Not found" is `Ok(false)`.
    fn is_package_installed(&self, package: &str) -> Result<bool>;
}

/// OS build metadata.
pub trait BuildInfo {
    /// The build tag / signing marker string, if the OS exposes one.
    fn build_tags(&self) -> Result<Option<String>>;
}

/// Introspection of the running process.
pub trait ProcessInspector {
    /// Whether the OS reports a tracer attached to this process.
    fn is_traced(&self) -> Result<bool>;

    /// Names or paths of every module currently mapped into the process.
    fn loaded_modules(&self) -> Result<Vec<String>>;
}

/// Where this binary came from and how it was built.
pub trait AppProvenance {
    /// Identifier of the storefront that installed the app. `Ok(None)` when
    /// the OS reports no installer (sideloaded, adb, debug run).
    fn installer_identity(&self) -> Result<Option<String>>;

    /// Whether a pre-release provisioning profile is embedded in the bundle.
    fn has_provisioning_profile(&self) -> Result<bool>;

    /// Whether the app was built with the debuggable flag.
    fn is_debuggable_build(&self) -> Result<bool>;
}

/// Operations the sandbox is expected to forbid.
pub trait SandboxProbe {
    /// Attempt a privileged operation (process duplication). Returns
    /// `Ok(true)` if it succeeded, after tearing down any side effect, and
    /// `Ok(false)` if the OS denied permission.
    fn try_privileged_operation(&self) -> Result<bool>;

    /// Create and remove a uniquely named file under `dir`. `Ok(true)` means
    /// the directory was writable.
    fn probe_writable(&self, dir: &str) -> Result<bool>;
}

/// Registered URL handlers.
pub trait UrlSchemeRegistry {
    /// Whether the OS reports a handler for `url`. Hosts that have not
    /// declared the scheme as queryable always get `Ok(false)`.
    fn can_open_url(&self, url: &str) -> Result<bool>;
}

/// Hardware-backed symmetric key store.
///
/// Keys are AES-256-GCM and never leave the implementation; callers only
/// see a [`KeyHandle`]. Sealed output is `nonce || ciphertext || tag`.
pub trait HardwareKeystore {
    /// Return the key stored under `alias`, generating and persisting it
    /// first if none exists.
    fn get_or_create_key(&self, alias: &str) -> Result<KeyHandle>;

    /// Encrypt `plaintext` under `key` with a fresh random nonce, binding
    /// `aad` into the tag.
    fn seal(&self, key: &KeyHandle, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Decrypt and authenticate. Any tag mismatch, truncation or stale key
    /// yields `TrustKitError::Authentication`.
    fn open(&self, key: &KeyHandle, aad: &[u8], sealed: &[u8]) -> Result<Vec<u8>>;
}

/// Private per-app storage location.
pub trait AppStorage {
    /// Directory for the app's private files, created if needed.
    fn data_dir(&self) -> Result<PathBuf>;
}

/// Screen capture suppression. Needs a live UI context, so hosts register
/// it separately from the bridge.
pub trait ScreenProtection: Send + Sync {
    fn set_protected(&self, enabled: bool) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_set_membership() {
        let set = CapabilitySet::from_slice(&[Capability::FileSystem, Capability::TraceFlag]);
        assert!(set.contains(Capability::FileSystem));
        assert!(set.contains(Capability::TraceFlag));
        assert!(!set.contains(Capability::UrlSchemes));
        assert!(!CapabilitySet::empty().contains(Capability::FileSystem));
    }
}
