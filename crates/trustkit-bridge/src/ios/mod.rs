// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// iOS platform bridge via objc2 and libc.
//
// Requires compilation with the iOS SDK (Xcode). Process state comes from
// `sysctl` and the dyld image list, bundle queries from `NSBundle`, and key
// material from the Keychain (Security.framework). None of the queries here
// touch UIKit views, so no method requires the main thread.
//
// ## Unsafe code
//
// 1. Toll-free bridging (`nsstr_as_obj`, `nsdata_as_obj`, `dict_as_cf`):
//    NSString/CFString, NSData/CFData and NSDictionary/CFDictionary share a
//    layout, so the pointer casts are sound.
// 2. Objective-C message sends (`msg_send!`) to well-known selectors.
// 3. C FFI: Security.framework, dyld, `sysctl`, `fork`.

#![cfg(target_os = "ios")]

use std::collections::HashMap;
use std::ffi::{CStr, c_char, c_void};
use std::path::PathBuf;
use std::sync::Mutex;

use objc2::rc::Retained;
use objc2::runtime::{AnyObject, Bool};
use objc2::{class, msg_send};
use objc2_foundation::{NSBundle, NSData, NSDictionary, NSString, NSURL};
use ring::rand::{SecureRandom, SystemRandom};
use tracing::{debug, info, instrument, warn};
use trustkit_core::error::{Result, TrustKitError};
use trustkit_core::types::KeyHandle;

use crate::host;
use crate::sealing::{KEY_LEN, SealingKey, generate_key_bytes};
use crate::traits::*;

// ---------------------------------------------------------------------------
// Security.framework FFI (keychain)
// ---------------------------------------------------------------------------

const ERR_SEC_SUCCESS: i32 = 0;
const ERR_SEC_ITEM_NOT_FOUND: i32 = -25300;
const ERR_SEC_DUPLICATE_ITEM: i32 = -25299;

#[link(name = "Security", kind = "framework")]
unsafe extern "C" {
    fn SecItemAdd(attributes: *const c_void, result: *mut *const c_void) -> i32;
    fn SecItemCopyMatching(query: *const c_void, result: *mut *const c_void) -> i32;
}

// `CFStringRef` globals, toll-free bridged with `NSString *`.
#[link(name = "Security", kind = "framework")]
unsafe extern "C" {
    static kSecClass: &'static NSString;
    static kSecClassGenericPassword: &'static NSString;
    static kSecAttrAccount: &'static NSString;
    static kSecAttrService: &'static NSString;
    static kSecAttrAccessible: &'static NSString;
    static kSecAttrAccessibleWhenUnlockedThisDeviceOnly: &'static NSString;
    static kSecValueData: &'static NSString;
    static kSecReturnData: &'static NSString;
    static kSecMatchLimit: &'static NSString;
    static kSecMatchLimitOne: &'static NSString;
}

/// Keychain service under which all TrustKit keys are stored.
const KEYCHAIN_SERVICE: &str = "org.hyperpolymath.trustkit";

/// Keychain blob: random key id followed by the AES-256 key.
const KEY_ID_LEN: usize = 16;

// ---------------------------------------------------------------------------
// dyld / kernel
// ---------------------------------------------------------------------------

unsafe extern "C" {
    fn _dyld_image_count() -> u32;
    fn _dyld_get_image_name(image_index: u32) -> *const c_char;
}

/// `P_TRACED` from `<sys/proc.h>`.
const P_TRACED: i32 = 0x0000_0800;

const IOS_CAPABILITIES: CapabilitySet = CapabilitySet::empty()
    .with(Capability::FileSystem)
    .with(Capability::LoadedModules)
    .with(Capability::TraceFlag)
    .with(Capability::PrivilegedProbe)
    .with(Capability::WritableProbe)
    .with(Capability::UrlSchemes)
    .with(Capability::ProvisioningProfile)
    .with(Capability::HardwareKeystore);

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Cast `NSDictionary` to a `*const c_void` for Security.framework calls.
fn dict_as_cf(dict: &NSDictionary<NSString, AnyObject>) -> *const c_void {
    dict as *const NSDictionary<NSString, AnyObject> as *const c_void
}

/// SAFETY: NSString is an NSObject subclass; same pointer, same layout.
unsafe fn nsstr_as_obj(s: &NSString) -> &AnyObject {
    unsafe { &*(s as *const NSString as *const AnyObject) }
}

/// SAFETY: NSData is an NSObject subclass; same pointer, same layout.
unsafe fn nsdata_as_obj(d: &NSData) -> &AnyObject {
    unsafe { &*(d as *const NSData as *const AnyObject) }
}

struct LoadedKey {
    handle: KeyHandle,
    key: SealingKey,
}

/// iOS implementation of the TrustKit capability layer.
pub struct IosBridge {
    keys: Mutex<HashMap<String, LoadedKey>>,
    rng: SystemRandom,
}

impl IosBridge {
    pub fn new() -> Self {
        Self {
            keys: Mutex::new(HashMap::new()),
            rng: SystemRandom::new(),
        }
    }

    fn lock_keys(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, LoadedKey>>> {
        self.keys
            .lock()
            .map_err(|_| TrustKitError::Keystore("key cache lock poisoned".into()))
    }

    fn loaded<'a>(
        keys: &'a HashMap<String, LoadedKey>,
        handle: &KeyHandle,
    ) -> Option<&'a LoadedKey> {
        keys.get(handle.alias()).filter(|k| k.handle == *handle)
    }
}

impl Default for IosBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformBridge for IosBridge {
    fn platform_name(&self) -> &str {
        "iOS"
    }

    fn platform_kind(&self) -> PlatformKind {
        PlatformKind::Ios
    }

    fn capabilities(&self) -> CapabilitySet {
        IOS_CAPABILITIES
    }
}

impl DeviceFilesystem for IosBridge {
    fn file_exists(&self, path: &str) -> bool {
        host::file_exists(path)
    }
}

impl PackageRegistry for IosBridge {
    fn is_package_installed(&self, _package: &str) -> Result<bool> {
        Err(TrustKitError::PlatformUnavailable)
    }
}

impl BuildInfo for IosBridge {
    fn build_tags(&self) -> Result<Option<String>> {
        Err(TrustKitError::PlatformUnavailable)
    }
}

// ---------------------------------------------------------------------------
// ProcessInspector: sysctl(KERN_PROC_PID), dyld image list
// ---------------------------------------------------------------------------

impl ProcessInspector for IosBridge {
    fn is_traced(&self) -> Result<bool> {
        // SAFETY: kinfo_proc is plain old data; all-zero is a valid value.
        let mut info: libc::kinfo_proc = unsafe { std::mem::zeroed() };
        let mut size = std::mem::size_of::<libc::kinfo_proc>();
        // SAFETY: getpid has no preconditions.
        let pid = unsafe { libc::getpid() };
        let mut mib = [libc::CTL_KERN, libc::KERN_PROC, libc::KERN_PROC_PID, pid];

        // SAFETY: `mib` and `info` are valid for the lengths passed.
        let rc = unsafe {
            libc::sysctl(
                mib.as_mut_ptr(),
                mib.len() as libc::c_uint,
                (&mut info as *mut libc::kinfo_proc).cast(),
                &mut size,
                std::ptr::null_mut(),
                0,
            )
        };
        if rc != 0 {
            return Err(TrustKitError::Probe(format!(
                "sysctl(KERN_PROC_PID): {}",
                std::io::Error::last_os_error()
            )));
        }
        Ok(info.kp_proc.p_flag & P_TRACED != 0)
    }

    fn loaded_modules(&self) -> Result<Vec<String>> {
        // SAFETY: dyld calls with in-range indices; returned names are
        // NUL-terminated and owned by dyld.
        let count = unsafe { _dyld_image_count() };
        let mut modules = Vec::with_capacity(count as usize);
        for i in 0..count {
            let name = unsafe { _dyld_get_image_name(i) };
            if name.is_null() {
                continue;
            }
            let name = unsafe { CStr::from_ptr(name) };
            modules.push(name.to_string_lossy().into_owned());
        }
        Ok(modules)
    }
}

// ---------------------------------------------------------------------------
// AppProvenance: embedded.mobileprovision
// ---------------------------------------------------------------------------

impl AppProvenance for IosBridge {
    fn installer_identity(&self) -> Result<Option<String>> {
        Err(TrustKitError::PlatformUnavailable)
    }

    /// Development and TestFlight bundles carry `embedded.mobileprovision`;
    /// App Store bundles do not.
    fn has_provisioning_profile(&self) -> Result<bool> {
        let name = NSString::from_str("embedded");
        let ext = NSString::from_str("mobileprovision");
        // SAFETY: NSBundle class and instance methods are thread-safe.
        let path = unsafe { NSBundle::mainBundle().pathForResource_ofType(Some(&name), Some(&ext)) };
        Ok(path.is_some_and(|p| host::file_exists(&p.to_string())))
    }

    fn is_debuggable_build(&self) -> Result<bool> {
        Err(TrustKitError::PlatformUnavailable)
    }
}

// ---------------------------------------------------------------------------
// SandboxProbe: fork(), writable system paths
// ---------------------------------------------------------------------------

impl SandboxProbe for IosBridge {
    /// A sandboxed app cannot fork. If the fork succeeds the child exits
    /// immediately and the parent reaps it.
    fn try_privileged_operation(&self) -> Result<bool> {
        // SAFETY: the child only calls the async-signal-safe `_exit`.
        let pid = unsafe { libc::fork() };
        match pid {
            0 => unsafe { libc::_exit(0) },
            p if p > 0 => {
                let mut status = 0;
                // SAFETY: `p` is our own child.
                unsafe {
                    libc::kill(p, libc::SIGTERM);
                    libc::waitpid(p, &mut status, 0);
                }
                warn!("fork() succeeded inside the sandbox");
                Ok(true)
            }
            _ => {
                debug!(error = %std::io::Error::last_os_error(), "fork() denied");
                Ok(false)
            }
        }
    }

    fn probe_writable(&self, dir: &str) -> Result<bool> {
        host::probe_writable(dir)
    }
}

// ---------------------------------------------------------------------------
// UrlSchemeRegistry: UIApplication canOpenURL:
// ---------------------------------------------------------------------------

impl UrlSchemeRegistry for IosBridge {
    /// Only meaningful when the host's `Info.plist` lists the scheme under
    /// `LSApplicationQueriesSchemes`; otherwise iOS always answers `false`.
    fn can_open_url(&self, url: &str) -> Result<bool> {
        let ns_url = NSString::from_str(url);
        // SAFETY: URLWithString returns nil for malformed input.
        let Some(url) = (unsafe { NSURL::URLWithString(&ns_url) }) else {
            return Ok(false);
        };

        // SAFETY: msg_send to well-known UIApplication selectors. canOpenURL:
        // does not present UI.
        let app: Option<Retained<AnyObject>> =
            unsafe { msg_send![class!(UIApplication), sharedApplication] };
        let Some(app) = app else {
            return Err(TrustKitError::Bridge("UIApplication not initialised".into()));
        };
        let can_open: Bool = unsafe { msg_send![&app, canOpenURL: &*url] };
        Ok(can_open.as_bool())
    }
}

// ---------------------------------------------------------------------------
// HardwareKeystore: Keychain generic password, this-device-only
// ---------------------------------------------------------------------------

impl IosBridge {
    /// Fetch the raw blob for `alias`. `Ok(None)` if no item exists.
    fn keychain_load(&self, alias: &str) -> Result<Option<Vec<u8>>> {
        let ns_account = NSString::from_str(alias);
        let ns_service = NSString::from_str(KEYCHAIN_SERVICE);

        // kCFBooleanTrue is toll-free bridged with `[NSNumber numberWithBool:YES]`.
        // SAFETY: NSNumber class method returning a retained object.
        let cf_true: Retained<AnyObject> =
            unsafe { msg_send![class!(NSNumber), numberWithBool: Bool::YES] };

        // SAFETY: Security.framework constants are valid for process lifetime.
        let keys: Vec<&NSString> = unsafe {
            vec![
                kSecClass,
                kSecAttrAccount,
                kSecAttrService,
                kSecReturnData,
                kSecMatchLimit,
            ]
        };
        // SAFETY: toll-free bridge casts.
        let values: Vec<&AnyObject> = unsafe {
            vec![
                nsstr_as_obj(kSecClassGenericPassword),
                nsstr_as_obj(&ns_account),
                nsstr_as_obj(&ns_service),
                &*cf_true,
                nsstr_as_obj(kSecMatchLimitOne),
            ]
        };
        let dict = NSDictionary::from_slices(&keys, &values);

        let mut result: *const c_void = std::ptr::null();
        // SAFETY: on success `result` receives a +1 CFData.
        let status = unsafe { SecItemCopyMatching(dict_as_cf(&dict), &mut result) };

        match status {
            ERR_SEC_SUCCESS => {
                if result.is_null() {
                    return Ok(None);
                }
                // SAFETY: CFData and NSData are toll-free bridged.
                let ns_data: &NSData = unsafe { &*(result as *const NSData) };
                let bytes = ns_data.to_vec();
                // SAFETY: balance the +1 retain from SecItemCopyMatching.
                unsafe {
                    let _: () = msg_send![result as *const AnyObject, release];
                }
                Ok(Some(bytes))
            }
            ERR_SEC_ITEM_NOT_FOUND => Ok(None),
            code => Err(TrustKitError::Keystore(format!(
                "SecItemCopyMatching failed with OSStatus {code}"
            ))),
        }
    }

    /// Add a new item. Returns `false` if another caller created it first.
    fn keychain_add(&self, alias: &str, blob: &[u8]) -> Result<bool> {
        let ns_account = NSString::from_str(alias);
        let ns_service = NSString::from_str(KEYCHAIN_SERVICE);
        let ns_data = NSData::with_bytes(blob);

        // SAFETY: Security.framework constants are valid for process lifetime.
        let keys: Vec<&NSString> = unsafe {
            vec![
                kSecClass,
                kSecAttrAccount,
                kSecAttrService,
                kSecAttrAccessible,
                kSecValueData,
            ]
        };
        // SAFETY: toll-free bridge casts.
        let values: Vec<&AnyObject> = unsafe {
            vec![
                nsstr_as_obj(kSecClassGenericPassword),
                nsstr_as_obj(&ns_account),
                nsstr_as_obj(&ns_service),
                nsstr_as_obj(kSecAttrAccessibleWhenUnlockedThisDeviceOnly),
                nsdata_as_obj(&ns_data),
            ]
        };
        let dict = NSDictionary::from_slices(&keys, &values);

        // SAFETY: SecItemAdd with a toll-free bridged dictionary.
        let status = unsafe { SecItemAdd(dict_as_cf(&dict), std::ptr::null_mut()) };
        match status {
            ERR_SEC_SUCCESS => Ok(true),
            ERR_SEC_DUPLICATE_ITEM => Ok(false),
            code => Err(TrustKitError::Keystore(format!(
                "SecItemAdd failed with OSStatus {code}"
            ))),
        }
    }
}

fn split_blob(blob: &[u8]) -> Result<(String, &[u8])> {
    if blob.len() != KEY_ID_LEN + KEY_LEN {
        return Err(TrustKitError::Keystore(format!(
            "keychain item has unexpected length {}",
            blob.len()
        )));
    }
    let (id, material) = blob.split_at(KEY_ID_LEN);
    Ok((hex::encode(id), material))
}

impl HardwareKeystore for IosBridge {
    #[instrument(skip(self))]
    fn get_or_create_key(&self, alias: &str) -> Result<KeyHandle> {
        let mut keys = self.lock_keys()?;
        if let Some(loaded) = keys.get(alias) {
            return Ok(loaded.handle.clone());
        }

        let blob = match self.keychain_load(alias)? {
            Some(blob) => blob,
            None => {
                let mut blob = vec![0u8; KEY_ID_LEN];
                self.rng
                    .fill(&mut blob)
                    .map_err(|_| TrustKitError::Keystore("key id generation failed".into()))?;
                blob.extend_from_slice(&generate_key_bytes(&self.rng)?);

                if self.keychain_add(alias, &blob)? {
                    info!(alias, "Keychain key created");
                    blob
                } else {
                    self.keychain_load(alias)?.ok_or_else(|| {
                        TrustKitError::Keystore(format!("key {alias} vanished during creation"))
                    })?
                }
            }
        };

        let (key_id, material) = split_blob(&blob)?;
        let handle = KeyHandle::new(alias, key_id);
        keys.insert(
            alias.to_owned(),
            LoadedKey {
                handle: handle.clone(),
                key: SealingKey::from_bytes(material)?,
            },
        );
        Ok(handle)
    }

    fn seal(&self, key: &KeyHandle, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        let keys = self.lock_keys()?;
        let loaded = Self::loaded(&keys, key)
            .ok_or_else(|| TrustKitError::Keystore(format!("unknown key {}", key.alias())))?;
        loaded.key.seal(&self.rng, aad, plaintext)
    }

    fn open(&self, key: &KeyHandle, aad: &[u8], sealed: &[u8]) -> Result<Vec<u8>> {
        let keys = self.lock_keys()?;
        let loaded = Self::loaded(&keys, key).ok_or(TrustKitError::Authentication)?;
        loaded.key.open(aad, sealed)
    }
}

impl AppStorage for IosBridge {
    /// `$HOME/Library/Application Support` inside the app container.
    fn data_dir(&self) -> Result<PathBuf> {
        let home = std::env::var("HOME")
            .map_err(|_| TrustKitError::Bridge("HOME is not set in the app container".into()))?;
        let dir = PathBuf::from(home).join("Library").join("Application Support");
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}
