// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scriptable platform bridge for unit tests.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use trustkit_bridge::traits::*;
use trustkit_core::error::{Result, TrustKitError};
use trustkit_core::types::KeyHandle;

/// A bridge query that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    Packages,
    BuildTags,
    Modules,
    Traced,
    Privileged,
    Writable,
    Url,
    Installer,
    Provisioning,
    Debuggable,
}

pub struct FakeBridge {
    kind: PlatformKind,
    caps: CapabilitySet,
    paths: HashSet<String>,
    packages: HashSet<String>,
    package_errors: HashSet<String>,
    build_tags: Option<String>,
    modules: Vec<String>,
    traced: bool,
    fork_allowed: bool,
    writable: bool,
    url_handled: bool,
    installer: Option<String>,
    provisioning: bool,
    debuggable: bool,
    failing: Vec<Query>,
    calls: AtomicUsize,
}

impl FakeBridge {
    fn new(kind: PlatformKind, caps: &[Capability]) -> Self {
        Self {
            kind,
            caps: CapabilitySet::from_slice(caps),
            paths: HashSet::new(),
            packages: HashSet::new(),
            package_errors: HashSet::new(),
            build_tags: None,
            modules: Vec::new(),
            traced: false,
            fork_allowed: false,
            writable: false,
            url_handled: false,
            installer: None,
            provisioning: false,
            debuggable: false,
            failing: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn android() -> Self {
        Self::new(
            PlatformKind::Android,
            &[
                Capability::FileSystem,
                Capability::PackageRegistry,
                Capability::BuildTags,
                Capability::LoadedModules,
                Capability::TraceFlag,
                Capability::WritableProbe,
                Capability::InstallerIdentity,
                Capability::DebuggableFlag,
            ],
        )
    }

    pub fn ios() -> Self {
        Self::new(
            PlatformKind::Ios,
            &[
                Capability::FileSystem,
                Capability::LoadedModules,
                Capability::TraceFlag,
                Capability::PrivilegedProbe,
                Capability::WritableProbe,
                Capability::UrlSchemes,
                Capability::ProvisioningProfile,
            ],
        )
    }

    pub fn with_capabilities(mut self, caps: CapabilitySet) -> Self {
        self.caps = caps;
        self
    }

    pub fn with_path(mut self, path: &str) -> Self {
        self.paths.insert(path.into());
        self
    }

    pub fn with_package(mut self, package: &str) -> Self {
        self.packages.insert(package.into());
        self
    }

    pub fn with_package_error(mut self, package: &str) -> Self {
        self.package_errors.insert(package.into());
        self
    }

    pub fn with_build_tags(mut self, tags: &str) -> Self {
        self.build_tags = Some(tags.into());
        self
    }

    pub fn with_module(mut self, module: &str) -> Self {
        self.modules.push(module.into());
        self
    }

    pub fn with_installer(mut self, installer: &str) -> Self {
        self.installer = Some(installer.into());
        self
    }

    pub fn traced(mut self, on: bool) -> Self {
        self.traced = on;
        self
    }

    pub fn fork_allowed(mut self, on: bool) -> Self {
        self.fork_allowed = on;
        self
    }

    pub fn writable(mut self, on: bool) -> Self {
        self.writable = on;
        self
    }

    pub fn url_handled(mut self, on: bool) -> Self {
        self.url_handled = on;
        self
    }

    pub fn provisioning(mut self, on: bool) -> Self {
        self.provisioning = on;
        self
    }

    pub fn debuggable(mut self, on: bool) -> Self {
        self.debuggable = on;
        self
    }

    pub fn failing(mut self, query: Query) -> Self {
        self.failing.push(query);
        self
    }

    /// Number of bridge queries answered so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn answer<T>(&self, query: Query, value: T) -> Result<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(&query) {
            return Err(TrustKitError::Probe(format!("injected {query:?} failure")));
        }
        Ok(value)
    }
}

impl PlatformBridge for FakeBridge {
    fn platform_name(&self) -> &str {
        "Fake"
    }

    fn platform_kind(&self) -> PlatformKind {
        self.kind
    }

    fn capabilities(&self) -> CapabilitySet {
        self.caps
    }
}

impl DeviceFilesystem for FakeBridge {
    fn file_exists(&self, path: &str) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.paths.contains(path)
    }
}

impl PackageRegistry for FakeBridge {
    fn is_package_installed(&self, package: &str) -> Result<bool> {
        if self.package_errors.contains(package) {
            return Err(TrustKitError::Bridge(format!("lookup of {package} failed")));
        }
        self.answer(Query::Packages, self.packages.contains(package))
    }
}

impl BuildInfo for FakeBridge {
    fn build_tags(&self) -> Result<Option<String>> {
        self.answer(Query::BuildTags, self.build_tags.clone())
    }
}

impl ProcessInspector for FakeBridge {
    fn is_traced(&self) -> Result<bool> {
        self.answer(Query::Traced, self.traced)
    }

    fn loaded_modules(&self) -> Result<Vec<String>> {
        self.answer(Query::Modules, self.modules.clone())
    }
}

impl AppProvenance for FakeBridge {
    fn installer_identity(&self) -> Result<Option<String>> {
        self.answer(Query::Installer, self.installer.clone())
    }

    fn has_provisioning_profile(&self) -> Result<bool> {
        self.answer(Query::Provisioning, self.provisioning)
    }

    fn is_debuggable_build(&self) -> Result<bool> {
        self.answer(Query::Debuggable, self.debuggable)
    }
}

impl SandboxProbe for FakeBridge {
    fn try_privileged_operation(&self) -> Result<bool> {
        self.answer(Query::Privileged, self.fork_allowed)
    }

    fn probe_writable(&self, _dir: &str) -> Result<bool> {
        self.answer(Query::Writable, self.writable)
    }
}

impl UrlSchemeRegistry for FakeBridge {
    fn can_open_url(&self, _url: &str) -> Result<bool> {
        self.answer(Query::Url, self.url_handled)
    }
}

impl HardwareKeystore for FakeBridge {
    fn get_or_create_key(&self, _alias: &str) -> Result<KeyHandle> {
        Err(TrustKitError::PlatformUnavailable)
    }

    fn seal(&self, _key: &KeyHandle, _aad: &[u8], _plaintext: &[u8]) -> Result<Vec<u8>> {
        Err(TrustKitError::PlatformUnavailable)
    }

    fn open(&self, _key: &KeyHandle, _aad: &[u8], _sealed: &[u8]) -> Result<Vec<u8>> {
        Err(TrustKitError::PlatformUnavailable)
    }
}

impl AppStorage for FakeBridge {
    fn data_dir(&self) -> Result<PathBuf> {
        Err(TrustKitError::PlatformUnavailable)
    }
}
