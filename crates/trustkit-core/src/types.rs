// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for TrustKit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What part of the platform a signal inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalCategory {
    Filesystem,
    PackageRegistry,
    BuildProvenance,
    LoadedModule,
    DebuggerState,
    PrivilegeProbe,
    WritableProbe,
    UrlScheme,
}

/// Identifier of one independent boolean check.
///
/// The set is fixed at build time; which of them actually run on a device
/// depends on the capabilities its platform bridge reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalId {
    /// A known su binary or jailbreak artefact exists on disk.
    RootPaths,
    /// A root-management app is installed.
    RootPackages,
    /// The OS build is signed with test keys.
    TestKeys,
    /// A hooking / injection library is mapped into this process.
    SuspiciousModules,
    /// The process was allowed to fork.
    ForkAllowed,
    /// A file could be created in a directory that should be read-only.
    WritableSystemPath,
    /// A jailbreak package manager registered its URL scheme.
    JailbreakUrlScheme,
    /// A tracer is attached to this process.
    DebuggerAttached,
    /// The application was built with the debuggable flag.
    DebuggableBuild,
    /// The installing storefront is unknown or not on the allow-list.
    UntrustedInstaller,
    /// An embedded pre-release provisioning profile is present.
    ProvisioningProfile,
}

impl SignalId {
    /// The category this signal belongs to.
    pub fn category(self) -> SignalCategory {
        match self {
            Self::RootPaths => SignalCategory::Filesystem,
            Self::RootPackages => SignalCategory::PackageRegistry,
            Self::TestKeys | Self::UntrustedInstaller | Self::ProvisioningProfile => {
                SignalCategory::BuildProvenance
            }
            Self::SuspiciousModules => SignalCategory::LoadedModule,
            Self::ForkAllowed => SignalCategory::PrivilegeProbe,
            Self::WritableSystemPath => SignalCategory::WritableProbe,
            Self::JailbreakUrlScheme => SignalCategory::UrlScheme,
            Self::DebuggerAttached | Self::DebuggableBuild => SignalCategory::DebuggerState,
        }
    }

    /// Stable snake_case name, as used in diagnostics output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RootPaths => "root_paths",
            Self::RootPackages => "root_packages",
            Self::TestKeys => "test_keys",
            Self::SuspiciousModules => "suspicious_modules",
            Self::ForkAllowed => "fork_allowed",
            Self::WritableSystemPath => "writable_system_path",
            Self::JailbreakUrlScheme => "jailbreak_url_scheme",
            Self::DebuggerAttached => "debugger_attached",
            Self::DebuggableBuild => "debuggable_build",
            Self::UntrustedInstaller => "untrusted_installer",
            Self::ProvisioningProfile => "provisioning_profile",
        }
    }
}

impl std::fmt::Display for SignalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Combined outcome of a set of signals.
///
/// `signals` lists the checks that drove the outcome: for a compromise
/// verdict the signals that fired, for an integrity verdict the sub-checks
/// that failed. Never persisted; recomputed on every call.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Verdict {
    pub value: bool,
    pub signals: Vec<SignalId>,
}

impl Verdict {
    pub fn new(value: bool, signals: Vec<SignalId>) -> Self {
        Self { value, signals }
    }

    /// Whether `signal` contributed to this verdict.
    pub fn involves(&self, signal: SignalId) -> bool {
        self.signals.contains(&signal)
    }
}

/// Opaque reference to a master key held by a platform keystore.
///
/// Carries no key material. Two handles are equal exactly when they refer
/// to the same key generation under the same alias.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyHandle {
    alias: String,
    key_id: String,
}

impl KeyHandle {
    /// Build a handle. Only keystore implementations should call this;
    /// `key_id` is whatever the keystore uses to tell key generations apart.
    pub fn new(alias: impl Into<String>, key_id: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            key_id: key_id.into(),
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }
}

/// Snapshot of every verdict for one device, as printed by diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceReport {
    pub platform: String,
    pub generated_at: DateTime<Utc>,
    pub compromised: Verdict,
    pub integrity: Verdict,
    pub formal_release: Verdict,
}
