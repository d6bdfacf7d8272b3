// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Signal probes: the compiled-in denylists and the boolean checks built on
// the capability layer.
//
// A probe never fails. Any error from the bridge is logged and turned into
// the probe's documented fallback, which is "did not fire" for every probe
// except the installer check (an unknown installer is untrusted).

use std::sync::Arc;

use tracing::{debug, warn};
use trustkit_bridge::{Capability, PlatformBridge, PlatformKind};
use trustkit_core::error::Result;
use trustkit_core::{SignalId, TrustConfig};

/// su binaries and root-manager APKs.
pub const ANDROID_ROOT_PATHS: &[&str] = &[
    "/system/app/Superuser.apk",
    "/sbin/su",
    "/system/bin/su",
    "/system/xbin/su",
    "/data/local/xbin/su",
    "/data/local/bin/su",
    "/system/sd/xbin/su",
    "/system/bin/failsafe/su",
    "/data/local/su",
    "/su/bin/su",
];

/// Root-management apps.
pub const ROOT_PACKAGES: &[&str] = &[
    "com.noshufou.android.su",
    "com.noshufou.android.su.elite",
    "eu.chainfire.supersu",
    "com.koushikdutta.superuser",
    "com.thirdparty.superuser",
    "com.yellowes.su",
    "com.topjohnwu.magisk",
];

/// Build-tag substring of an OS image signed with the AOSP test keys.
pub const TEST_KEYS_MARKER: &str = "test-keys";

/// Jailbreak artefacts: package managers, substrate, shells and tooling
/// absent from a stock iOS image.
pub const IOS_JAILBREAK_PATHS: &[&str] = &[
    "/Applications/Cydia.app",
    "/Library/MobileSubstrate/MobileSubstrate.dylib",
    "/bin/bash",
    "/usr/sbin/sshd",
    "/etc/apt",
    "/private/var/lib/apt/",
    "/usr/bin/ssh",
    "/private/var/lib/cydia",
    "/private/var/stash",
    "/usr/libexec/sftp-server",
    "/var/cache/apt",
    "/var/lib/apt",
    "/usr/sbin/frida-server",
    "/usr/bin/cycript",
    "/usr/local/bin/cycript",
    "/usr/lib/libcycript.dylib",
];

/// Hooking and injection libraries. Matched as case-insensitive substrings
/// of loaded module names.
pub const SUSPICIOUS_MODULES: &[&str] = &[
    "SubstrateLoader.dylib",
    "SSLKillSwitch2.dylib",
    "SSLKillSwitch.dylib",
    "MobileSubstrate.dylib",
    "TweakInject.dylib",
    "CydiaSubstrate",
    "cynject",
    "CustomWidgetIcons",
    "FridaGadget",
    "frida-agent",
    "libcycript",
];

/// What a probe asks the bridge.
#[derive(Debug, Clone)]
enum Check {
    AnyPathExists(Vec<String>),
    AnyPackageInstalled(Vec<String>),
    BuildTagContains(&'static str),
    /// Markers are stored lowercased.
    AnyModuleMatches(Vec<String>),
    PrivilegedOperation,
    DirWritable(String),
    UrlHandled(String),
    Traced,
    Debuggable,
    InstallerUntrusted(Arc<TrustConfig>),
    ProvisioningProfile,
}

/// One signal: an identifier plus the check that decides whether it fired.
#[derive(Debug, Clone)]
pub struct Probe {
    id: SignalId,
    check: Check,
}

impl Probe {
    pub fn id(&self) -> SignalId {
        self.id
    }

    /// Whether the signal fired. Errors are absorbed here.
    pub fn fires(&self, bridge: &dyn PlatformBridge) -> bool {
        let fired = match self.evaluate(bridge) {
            Ok(fired) => fired,
            Err(e) if matches!(self.check, Check::InstallerUntrusted(_)) => {
                warn!(signal = %self.id, error = %e, "installer query failed; treating as untrusted");
                true
            }
            Err(e) => {
                warn!(signal = %self.id, error = %e, "probe failed; counting as negative");
                false
            }
        };
        debug!(signal = %self.id, fired, "probe evaluated");
        fired
    }

    fn evaluate(&self, bridge: &dyn PlatformBridge) -> Result<bool> {
        match &self.check {
            Check::AnyPathExists(paths) => Ok(paths.iter().any(|p| bridge.file_exists(p))),
            Check::AnyPackageInstalled(packages) => {
                // A failing lookup for one package must not hide a later hit.
                let mut last_err = None;
                for package in packages {
                    match bridge.is_package_installed(package) {
                        Ok(true) => return Ok(true),
                        Ok(false) => {}
                        Err(e) => last_err = Some(e),
                    }
                }
                last_err.map_or(Ok(false), Err)
            }
            Check::BuildTagContains(marker) => Ok(bridge
                .build_tags()?
                .is_some_and(|tags| tags.contains(*marker))),
            Check::AnyModuleMatches(markers) => Ok(bridge.loaded_modules()?.iter().any(|module| {
                let module = module.to_lowercase();
                markers.iter().any(|m| module.contains(m.as_str()))
            })),
            Check::PrivilegedOperation => bridge.try_privileged_operation(),
            Check::DirWritable(dir) => bridge.probe_writable(dir),
            Check::UrlHandled(url) => bridge.can_open_url(url),
            Check::Traced => bridge.is_traced(),
            Check::Debuggable => bridge.is_debuggable_build(),
            Check::InstallerUntrusted(config) => Ok(!bridge
                .installer_identity()?
                .is_some_and(|installer| config.is_trusted_installer(&installer))),
            Check::ProvisioningProfile => bridge.has_provisioning_profile(),
        }
    }
}

fn with_extras(base: &[&str], extras: &[String]) -> Vec<String> {
    base.iter()
        .map(|s| (*s).to_owned())
        .chain(extras.iter().cloned())
        .collect()
}

/// Root/jailbreak probes this bridge can run, in evaluation order (cheap
/// filesystem checks first, the process-duplication probe last).
pub fn compromise_probes(bridge: &dyn PlatformBridge, config: &TrustConfig) -> Vec<Probe> {
    let caps = bridge.capabilities();
    let root_paths = match bridge.platform_kind() {
        PlatformKind::Ios => IOS_JAILBREAK_PATHS,
        PlatformKind::Android | PlatformKind::Desktop => ANDROID_ROOT_PATHS,
    };

    let candidates = [
        (
            Capability::FileSystem,
            SignalId::RootPaths,
            Check::AnyPathExists(with_extras(root_paths, &config.extra_root_paths)),
        ),
        (
            Capability::BuildTags,
            SignalId::TestKeys,
            Check::BuildTagContains(TEST_KEYS_MARKER),
        ),
        (
            Capability::PackageRegistry,
            SignalId::RootPackages,
            Check::AnyPackageInstalled(with_extras(ROOT_PACKAGES, &config.extra_root_packages)),
        ),
        (
            Capability::LoadedModules,
            SignalId::SuspiciousModules,
            Check::AnyModuleMatches(
                with_extras(SUSPICIOUS_MODULES, &config.extra_module_markers)
                    .into_iter()
                    .map(|m| m.to_lowercase())
                    .collect(),
            ),
        ),
        (
            Capability::UrlSchemes,
            SignalId::JailbreakUrlScheme,
            Check::UrlHandled(config.url_scheme_probe.clone()),
        ),
        (
            Capability::WritableProbe,
            SignalId::WritableSystemPath,
            Check::DirWritable(config.writable_probe_dir.clone()),
        ),
        (
            Capability::PrivilegedProbe,
            SignalId::ForkAllowed,
            Check::PrivilegedOperation,
        ),
    ];

    candidates
        .into_iter()
        .filter(|(cap, _, _)| caps.contains(*cap))
        .map(|(_, id, check)| Probe { id, check })
        .collect()
}

/// Sub-checks of the standard integrity tier. Each is phrased as the failure
/// signal; the tier passes when none fires.
pub fn integrity_probes(bridge: &dyn PlatformBridge, config: &TrustConfig) -> Vec<Probe> {
    let caps = bridge.capabilities();
    let candidates = [
        (Capability::TraceFlag, SignalId::DebuggerAttached, Check::Traced),
        (
            Capability::DebuggableFlag,
            SignalId::DebuggableBuild,
            Check::Debuggable,
        ),
        (
            Capability::BuildTags,
            SignalId::TestKeys,
            Check::BuildTagContains(TEST_KEYS_MARKER),
        ),
        (
            Capability::InstallerIdentity,
            SignalId::UntrustedInstaller,
            Check::InstallerUntrusted(Arc::new(config.clone())),
        ),
    ];

    candidates
        .into_iter()
        .filter(|(cap, _, _)| caps.contains(*cap))
        .map(|(_, id, check)| Probe { id, check })
        .collect()
}

/// Extra sub-checks of the strict (formal release) tier.
pub fn release_probes(bridge: &dyn PlatformBridge) -> Vec<Probe> {
    if bridge.capabilities().contains(Capability::ProvisioningProfile) {
        vec![Probe {
            id: SignalId::ProvisioningProfile,
            check: Check::ProvisioningProfile,
        }]
    } else {
        Vec::new()
    }
}
