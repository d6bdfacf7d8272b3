// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Android platform bridge via JNI.
//
// Requires the Android NDK and targets `aarch64-linux-android` or
// `armv7-linux-androideabi`. Package, build and provenance queries go through
// the Android SDK via JNI; process state is read from `/proc/self`. Keys live
// in the `AndroidKeyStore` provider and never enter this process.
//
// Every JNI call that can throw is checked. A pending Java exception is
// always cleared before the next JNI call so the VM is never left in an
// exception state.

#![cfg(target_os = "android")]

use std::path::PathBuf;
use std::sync::OnceLock;

use jni::objects::{JByteArray, JObject, JString, JValue};
use jni::{AttachGuard, JNIEnv, JavaVM};
use tracing::{debug, info, instrument, warn};
use trustkit_core::error::{Result, TrustKitError};
use trustkit_core::types::KeyHandle;

use crate::host;
use crate::sealing::TAG_LEN;
use crate::traits::*;

const KEYSTORE_PROVIDER: &str = "AndroidKeyStore";
const TRANSFORMATION: &str = "AES/GCM/NoPadding";

const GCM_IV_LEN: usize = 12;
const GCM_TAG_BITS: i32 = 128;

const ENCRYPT_MODE: i32 = 1;
const DECRYPT_MODE: i32 = 2;

/// `KeyProperties.PURPOSE_ENCRYPT | KeyProperties.PURPOSE_DECRYPT`.
const PURPOSE_ENCRYPT_DECRYPT: i32 = 3;

/// `ApplicationInfo.FLAG_DEBUGGABLE`.
const FLAG_DEBUGGABLE: i32 = 2;

/// First SDK level with `PackageManager.getInstallSourceInfo` (Android 11).
const INSTALL_SOURCE_INFO_SDK: i32 = 30;

const NAME_NOT_FOUND: &str = "android/content/pm/PackageManager$NameNotFoundException";
const AEAD_BAD_TAG: &str = "javax/crypto/AEADBadTagException";

const ANDROID_CAPABILITIES: CapabilitySet = CapabilitySet::empty()
    .with(Capability::FileSystem)
    .with(Capability::PackageRegistry)
    .with(Capability::BuildTags)
    .with(Capability::LoadedModules)
    .with(Capability::TraceFlag)
    .with(Capability::WritableProbe)
    .with(Capability::InstallerIdentity)
    .with(Capability::DebuggableFlag)
    .with(Capability::HardwareKeystore);

// ---------------------------------------------------------------------------
// JNI bootstrap helpers
// ---------------------------------------------------------------------------

static JAVA_VM: OnceLock<JavaVM> = OnceLock::new();

/// The process-wide `JavaVM`, taken from the NDK glue on first use.
fn java_vm() -> Result<&'static JavaVM> {
    if let Some(vm) = JAVA_VM.get() {
        return Ok(vm);
    }
    let ctx = ndk_context::android_context();
    // SAFETY: `ctx.vm()` returns the `JavaVM*` set by the NDK glue code.
    // The pointer is valid for the lifetime of the process.
    let vm = unsafe { JavaVM::from_raw(ctx.vm().cast()) }
        .map_err(|e| TrustKitError::Bridge(format!("failed to obtain JavaVM: {e}")))?;
    Ok(JAVA_VM.get_or_init(|| vm))
}

/// Attach the current thread for the duration of one bridge call. Local
/// references are released when the guard drops.
fn jni_env() -> Result<AttachGuard<'static>> {
    java_vm()?
        .attach_current_thread()
        .map_err(|e| TrustKitError::Bridge(format!("failed to attach JNI thread: {e}")))
}

/// The hosting `Context` (Activity or Application).
fn app_context() -> Result<JObject<'static>> {
    let ptr = ndk_context::android_context().context();
    if ptr.is_null() {
        return Err(TrustKitError::Bridge(
            "Android context is null; native activity not initialised".into(),
        ));
    }
    // SAFETY: the NDK guarantees this pointer is a valid global jobject for
    // the hosting context.
    Ok(unsafe { JObject::from_raw(ptr.cast()) })
}

/// Map a JNI failure into `TrustKitError::Bridge`, clearing any pending
/// Java exception first.
fn jni_err(env: &mut JNIEnv<'_>, context: &str, e: jni::errors::Error) -> TrustKitError {
    if env.exception_check().unwrap_or(false) {
        let _ = env.exception_describe();
        let _ = env.exception_clear();
    }
    TrustKitError::Bridge(format!("{context}: {e}"))
}

/// Clear the pending exception and report whether it is an instance of
/// `class`.
fn exception_is(env: &mut JNIEnv<'_>, class: &str) -> bool {
    if !env.exception_check().unwrap_or(false) {
        return false;
    }
    let thrown = env.exception_occurred();
    let _ = env.exception_clear();
    match thrown {
        Ok(ex) => env.is_instance_of(&ex, class).unwrap_or(false),
        Err(_) => false,
    }
}

fn new_string<'l>(env: &mut JNIEnv<'l>, value: &str) -> Result<JString<'l>> {
    env.new_string(value)
        .map_err(|e| jni_err(env, "new_string", e))
}

/// Convert a possibly-null `java.lang.String` reference.
fn rust_string(env: &mut JNIEnv<'_>, obj: JObject<'_>) -> Result<Option<String>> {
    if obj.is_null() {
        return Ok(None);
    }
    let s = JString::from(obj);
    let value: String = env
        .get_string(&s)
        .map_err(|e| jni_err(env, "get_string", e))?
        .into();
    Ok(Some(value))
}

fn byte_vec(env: &mut JNIEnv<'_>, obj: JObject<'_>) -> Result<Vec<u8>> {
    let array = JByteArray::from(obj);
    env.convert_byte_array(&array)
        .map_err(|e| jni_err(env, "convert_byte_array", e))
}

fn package_manager<'l>(env: &mut JNIEnv<'l>, ctx: &JObject<'_>) -> Result<JObject<'l>> {
    env.call_method(
        ctx,
        "getPackageManager",
        "()Landroid/content/pm/PackageManager;",
        &[],
    )
    .and_then(|v| v.l())
    .map_err(|e| jni_err(env, "getPackageManager", e))
}

fn own_package_name<'l>(env: &mut JNIEnv<'l>, ctx: &JObject<'_>) -> Result<JObject<'l>> {
    env.call_method(ctx, "getPackageName", "()Ljava/lang/String;", &[])
        .and_then(|v| v.l())
        .map_err(|e| jni_err(env, "getPackageName", e))
}

// ---------------------------------------------------------------------------
// AndroidKeyStore helpers
// ---------------------------------------------------------------------------

fn load_keystore<'l>(env: &mut JNIEnv<'l>) -> Result<JObject<'l>> {
    let provider = new_string(env, KEYSTORE_PROVIDER)?;
    let keystore = env
        .call_static_method(
            "java/security/KeyStore",
            "getInstance",
            "(Ljava/lang/String;)Ljava/security/KeyStore;",
            &[JValue::Object(&provider)],
        )
        .and_then(|v| v.l())
        .map_err(|e| jni_err(env, "KeyStore.getInstance", e))?;

    env.call_method(
        &keystore,
        "load",
        "(Ljava/security/KeyStore$LoadStoreParameter;)V",
        &[JValue::Object(&JObject::null())],
    )
    .map_err(|e| jni_err(env, "KeyStore.load", e))?;
    Ok(keystore)
}

/// The secret key for `alias` and its creation time in millis, if present.
fn current_key<'l>(
    env: &mut JNIEnv<'l>,
    keystore: &JObject<'_>,
    alias: &str,
) -> Result<Option<(JObject<'l>, String)>> {
    let j_alias = new_string(env, alias)?;
    let present = env
        .call_method(
            keystore,
            "containsAlias",
            "(Ljava/lang/String;)Z",
            &[JValue::Object(&j_alias)],
        )
        .and_then(|v| v.z())
        .map_err(|e| jni_err(env, "KeyStore.containsAlias", e))?;
    if !present {
        return Ok(None);
    }

    let key = env
        .call_method(
            keystore,
            "getKey",
            "(Ljava/lang/String;[C)Ljava/security/Key;",
            &[JValue::Object(&j_alias), JValue::Object(&JObject::null())],
        )
        .and_then(|v| v.l())
        .map_err(|e| jni_err(env, "KeyStore.getKey", e))?;
    if key.is_null() {
        return Ok(None);
    }

    let created = env
        .call_method(
            keystore,
            "getCreationDate",
            "(Ljava/lang/String;)Ljava/util/Date;",
            &[JValue::Object(&j_alias)],
        )
        .and_then(|v| v.l())
        .map_err(|e| jni_err(env, "KeyStore.getCreationDate", e))?;
    let millis = env
        .call_method(&created, "getTime", "()J", &[])
        .and_then(|v| v.j())
        .map_err(|e| jni_err(env, "Date.getTime", e))?;

    Ok(Some((key, millis.to_string())))
}

/// Generate a non-exportable AES-256-GCM key under `alias`.
fn generate_key(env: &mut JNIEnv<'_>, alias: &str) -> Result<()> {
    let algorithm = new_string(env, "AES")?;
    let provider = new_string(env, KEYSTORE_PROVIDER)?;
    let key_gen = env
        .call_static_method(
            "javax/crypto/KeyGenerator",
            "getInstance",
            "(Ljava/lang/String;Ljava/lang/String;)Ljavax/crypto/KeyGenerator;",
            &[JValue::Object(&algorithm), JValue::Object(&provider)],
        )
        .and_then(|v| v.l())
        .map_err(|e| jni_err(env, "KeyGenerator.getInstance", e))?;

    let j_alias = new_string(env, alias)?;
    let builder = env
        .new_object(
            "android/security/keystore/KeyGenParameterSpec$Builder",
            "(Ljava/lang/String;I)V",
            &[JValue::Object(&j_alias), JValue::Int(PURPOSE_ENCRYPT_DECRYPT)],
        )
        .map_err(|e| jni_err(env, "KeyGenParameterSpec.Builder", e))?;

    const BUILDER: &str = "Landroid/security/keystore/KeyGenParameterSpec$Builder;";

    env.call_method(
        &builder,
        "setKeySize",
        format!("(I){BUILDER}"),
        &[JValue::Int(256)],
    )
    .map_err(|e| jni_err(env, "setKeySize", e))?;

    let gcm = new_string(env, "GCM")?;
    let block_modes = env
        .new_object_array(1, "java/lang/String", &gcm)
        .map_err(|e| jni_err(env, "new_object_array", e))?;
    env.call_method(
        &builder,
        "setBlockModes",
        format!("([Ljava/lang/String;){BUILDER}"),
        &[JValue::Object(&block_modes)],
    )
    .map_err(|e| jni_err(env, "setBlockModes", e))?;

    let no_padding = new_string(env, "NoPadding")?;
    let paddings = env
        .new_object_array(1, "java/lang/String", &no_padding)
        .map_err(|e| jni_err(env, "new_object_array", e))?;
    env.call_method(
        &builder,
        "setEncryptionPaddings",
        format!("([Ljava/lang/String;){BUILDER}"),
        &[JValue::Object(&paddings)],
    )
    .map_err(|e| jni_err(env, "setEncryptionPaddings", e))?;

    let spec = env
        .call_method(
            &builder,
            "build",
            "()Landroid/security/keystore/KeyGenParameterSpec;",
            &[],
        )
        .and_then(|v| v.l())
        .map_err(|e| jni_err(env, "KeyGenParameterSpec.build", e))?;

    env.call_method(
        &key_gen,
        "init",
        "(Ljava/security/spec/AlgorithmParameterSpec;)V",
        &[JValue::Object(&spec)],
    )
    .map_err(|e| jni_err(env, "KeyGenerator.init", e))?;
    env.call_method(&key_gen, "generateKey", "()Ljavax/crypto/SecretKey;", &[])
        .map_err(|e| jni_err(env, "KeyGenerator.generateKey", e))?;

    info!(alias, "AES-256-GCM key generated in AndroidKeyStore");
    Ok(())
}

fn new_cipher<'l>(env: &mut JNIEnv<'l>) -> Result<JObject<'l>> {
    let transformation = new_string(env, TRANSFORMATION)?;
    env.call_static_method(
        "javax/crypto/Cipher",
        "getInstance",
        "(Ljava/lang/String;)Ljavax/crypto/Cipher;",
        &[JValue::Object(&transformation)],
    )
    .and_then(|v| v.l())
    .map_err(|e| jni_err(env, "Cipher.getInstance", e))
}

fn update_aad(env: &mut JNIEnv<'_>, cipher: &JObject<'_>, aad: &[u8]) -> Result<()> {
    let j_aad = env
        .byte_array_from_slice(aad)
        .map_err(|e| jni_err(env, "byte_array_from_slice", e))?;
    env.call_method(cipher, "updateAAD", "([B)V", &[JValue::Object(&j_aad)])
        .map_err(|e| jni_err(env, "Cipher.updateAAD", e))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Bridge struct
// ---------------------------------------------------------------------------

/// Android implementation of the TrustKit capability layer.
pub struct AndroidBridge {
    /// `Build.VERSION.SDK_INT`, read once; selects the installer query.
    sdk_int: i32,
}

impl AndroidBridge {
    pub fn new() -> Self {
        let sdk_int = read_sdk_int().unwrap_or_else(|e| {
            warn!(error = %e, "could not read SDK_INT; using legacy installer query");
            0
        });
        debug!(sdk_int, "Android bridge initialised");
        Self { sdk_int }
    }
}

impl Default for AndroidBridge {
    fn default() -> Self {
        Self::new()
    }
}

fn read_sdk_int() -> Result<i32> {
    let mut guard = jni_env()?;
    let env = &mut *guard;
    env.get_static_field("android/os/Build$VERSION", "SDK_INT", "I")
        .and_then(|v| v.i())
        .map_err(|e| jni_err(env, "Build.VERSION.SDK_INT", e))
}

impl PlatformBridge for AndroidBridge {
    fn platform_name(&self) -> &str {
        "Android"
    }

    fn platform_kind(&self) -> PlatformKind {
        PlatformKind::Android
    }

    fn capabilities(&self) -> CapabilitySet {
        ANDROID_CAPABILITIES
    }
}

impl DeviceFilesystem for AndroidBridge {
    fn file_exists(&self, path: &str) -> bool {
        host::file_exists(path)
    }
}

// ---------------------------------------------------------------------------
// PackageRegistry / BuildInfo: android.content.pm.PackageManager, android.os.Build
// ---------------------------------------------------------------------------

impl PackageRegistry for AndroidBridge {
    fn is_package_installed(&self, package: &str) -> Result<bool> {
        let mut guard = jni_env()?;
        let env = &mut *guard;
        let ctx = app_context()?;
        let pm = package_manager(env, &ctx)?;
        let name = new_string(env, package)?;

        match env.call_method(
            &pm,
            "getPackageInfo",
            "(Ljava/lang/String;I)Landroid/content/pm/PackageInfo;",
            &[JValue::Object(&name), JValue::Int(0)],
        ) {
            Ok(_) => Ok(true),
            Err(jni::errors::Error::JavaException) if exception_is(env, NAME_NOT_FOUND) => {
                Ok(false)
            }
            Err(e) => Err(jni_err(env, "getPackageInfo", e)),
        }
    }
}

impl BuildInfo for AndroidBridge {
    fn build_tags(&self) -> Result<Option<String>> {
        let mut guard = jni_env()?;
        let env = &mut *guard;
        let tags = env
            .get_static_field("android/os/Build", "TAGS", "Ljava/lang/String;")
            .and_then(|v| v.l())
            .map_err(|e| jni_err(env, "Build.TAGS", e))?;
        rust_string(env, tags)
    }
}

impl ProcessInspector for AndroidBridge {
    fn is_traced(&self) -> Result<bool> {
        host::proc_is_traced()
    }

    fn loaded_modules(&self) -> Result<Vec<String>> {
        host::proc_loaded_modules()
    }
}

// ---------------------------------------------------------------------------
// AppProvenance: installer and ApplicationInfo flags
// ---------------------------------------------------------------------------

impl AppProvenance for AndroidBridge {
    fn installer_identity(&self) -> Result<Option<String>> {
        let mut guard = jni_env()?;
        let env = &mut *guard;
        let ctx = app_context()?;
        let pm = package_manager(env, &ctx)?;
        let own = own_package_name(env, &ctx)?;

        let installer = if self.sdk_int >= INSTALL_SOURCE_INFO_SDK {
            let info = env
                .call_method(
                    &pm,
                    "getInstallSourceInfo",
                    "(Ljava/lang/String;)Landroid/content/pm/InstallSourceInfo;",
                    &[JValue::Object(&own)],
                )
                .and_then(|v| v.l())
                .map_err(|e| jni_err(env, "getInstallSourceInfo", e))?;
            env.call_method(&info, "getInstallingPackageName", "()Ljava/lang/String;", &[])
                .and_then(|v| v.l())
                .map_err(|e| jni_err(env, "getInstallingPackageName", e))?
        } else {
            env.call_method(
                &pm,
                "getInstallerPackageName",
                "(Ljava/lang/String;)Ljava/lang/String;",
                &[JValue::Object(&own)],
            )
            .and_then(|v| v.l())
            .map_err(|e| jni_err(env, "getInstallerPackageName", e))?
        };

        let installer = rust_string(env, installer)?;
        debug!(installer = ?installer, "Android: installer resolved");
        Ok(installer)
    }

    fn has_provisioning_profile(&self) -> Result<bool> {
        Err(TrustKitError::PlatformUnavailable)
    }

    fn is_debuggable_build(&self) -> Result<bool> {
        let mut guard = jni_env()?;
        let env = &mut *guard;
        let ctx = app_context()?;
        let info = env
            .call_method(
                &ctx,
                "getApplicationInfo",
                "()Landroid/content/pm/ApplicationInfo;",
                &[],
            )
            .and_then(|v| v.l())
            .map_err(|e| jni_err(env, "getApplicationInfo", e))?;
        let flags = env
            .get_field(&info, "flags", "I")
            .and_then(|v| v.i())
            .map_err(|e| jni_err(env, "ApplicationInfo.flags", e))?;
        Ok(flags & FLAG_DEBUGGABLE != 0)
    }
}

impl SandboxProbe for AndroidBridge {
    fn try_privileged_operation(&self) -> Result<bool> {
        Err(TrustKitError::PlatformUnavailable)
    }

    fn probe_writable(&self, dir: &str) -> Result<bool> {
        host::probe_writable(dir)
    }
}

impl UrlSchemeRegistry for AndroidBridge {
    fn can_open_url(&self, _url: &str) -> Result<bool> {
        Err(TrustKitError::PlatformUnavailable)
    }
}

// ---------------------------------------------------------------------------
// HardwareKeystore: AndroidKeyStore, AES/GCM/NoPadding
// ---------------------------------------------------------------------------

impl HardwareKeystore for AndroidBridge {
    /// Resolve `alias` in AndroidKeyStore, generating it on first use.
    /// Callers cache the handle; every call here is a keystore round trip.
    #[instrument(skip(self))]
    fn get_or_create_key(&self, alias: &str) -> Result<KeyHandle> {
        let mut guard = jni_env()?;
        let env = &mut *guard;
        let keystore = load_keystore(env)?;

        let (_, key_id) = match current_key(env, &keystore, alias)? {
            Some(found) => found,
            None => {
                generate_key(env, alias)?;
                current_key(env, &keystore, alias)?.ok_or_else(|| {
                    TrustKitError::Keystore(format!("key {alias} missing after generation"))
                })?
            }
        };

        Ok(KeyHandle::new(alias, key_id))
    }

    fn seal(&self, key: &KeyHandle, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut guard = jni_env()?;
        let env = &mut *guard;
        let keystore = load_keystore(env)?;
        let secret = match current_key(env, &keystore, key.alias())? {
            Some((secret, id)) if id == key.key_id() => secret,
            _ => {
                return Err(TrustKitError::Keystore(format!(
                    "key {} is no longer present",
                    key.alias()
                )));
            }
        };

        let cipher = new_cipher(env)?;
        env.call_method(
            &cipher,
            "init",
            "(ILjava/security/Key;)V",
            &[JValue::Int(ENCRYPT_MODE), JValue::Object(&secret)],
        )
        .map_err(|e| jni_err(env, "Cipher.init", e))?;
        update_aad(env, &cipher, aad)?;

        let iv = env
            .call_method(&cipher, "getIV", "()[B", &[])
            .and_then(|v| v.l())
            .map_err(|e| jni_err(env, "Cipher.getIV", e))?;
        let iv = byte_vec(env, iv)?;
        if iv.len() != GCM_IV_LEN {
            return Err(TrustKitError::Encryption(format!(
                "unexpected GCM IV length {}",
                iv.len()
            )));
        }

        let input = env
            .byte_array_from_slice(plaintext)
            .map_err(|e| jni_err(env, "byte_array_from_slice", e))?;
        let output = env
            .call_method(&cipher, "doFinal", "([B)[B", &[JValue::Object(&input)])
            .and_then(|v| v.l())
            .map_err(|e| jni_err(env, "Cipher.doFinal", e))?;
        let body = byte_vec(env, output)?;

        let mut sealed = Vec::with_capacity(iv.len() + body.len());
        sealed.extend_from_slice(&iv);
        sealed.extend_from_slice(&body);
        Ok(sealed)
    }

    fn open(&self, key: &KeyHandle, aad: &[u8], sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < GCM_IV_LEN + TAG_LEN {
            return Err(TrustKitError::Authentication);
        }

        let mut guard = jni_env()?;
        let env = &mut *guard;
        let keystore = load_keystore(env)?;
        let secret = match current_key(env, &keystore, key.alias())? {
            Some((secret, id)) if id == key.key_id() => secret,
            _ => return Err(TrustKitError::Authentication),
        };

        let (iv, body) = sealed.split_at(GCM_IV_LEN);
        let j_iv = env
            .byte_array_from_slice(iv)
            .map_err(|e| jni_err(env, "byte_array_from_slice", e))?;
        let spec = env
            .new_object(
                "javax/crypto/spec/GCMParameterSpec",
                "(I[B)V",
                &[JValue::Int(GCM_TAG_BITS), JValue::Object(&j_iv)],
            )
            .map_err(|e| jni_err(env, "GCMParameterSpec", e))?;

        let cipher = new_cipher(env)?;
        env.call_method(
            &cipher,
            "init",
            "(ILjava/security/Key;Ljava/security/spec/AlgorithmParameterSpec;)V",
            &[
                JValue::Int(DECRYPT_MODE),
                JValue::Object(&secret),
                JValue::Object(&spec),
            ],
        )
        .map_err(|e| jni_err(env, "Cipher.init", e))?;
        update_aad(env, &cipher, aad)?;

        let input = env
            .byte_array_from_slice(body)
            .map_err(|e| jni_err(env, "byte_array_from_slice", e))?;
        let output = match env.call_method(&cipher, "doFinal", "([B)[B", &[JValue::Object(&input)])
        {
            Ok(v) => v.l().map_err(|e| jni_err(env, "Cipher.doFinal", e))?,
            Err(jni::errors::Error::JavaException) if exception_is(env, AEAD_BAD_TAG) => {
                return Err(TrustKitError::Authentication);
            }
            Err(e) => return Err(jni_err(env, "Cipher.doFinal", e)),
        };
        byte_vec(env, output)
    }
}

impl AppStorage for AndroidBridge {
    fn data_dir(&self) -> Result<PathBuf> {
        let mut guard = jni_env()?;
        let env = &mut *guard;
        let ctx = app_context()?;
        let files_dir = env
            .call_method(&ctx, "getFilesDir", "()Ljava/io/File;", &[])
            .and_then(|v| v.l())
            .map_err(|e| jni_err(env, "getFilesDir", e))?;
        let path = env
            .call_method(&files_dir, "getAbsolutePath", "()Ljava/lang/String;", &[])
            .and_then(|v| v.l())
            .map_err(|e| jni_err(env, "File.getAbsolutePath", e))?;
        let path = rust_string(env, path)?
            .ok_or_else(|| TrustKitError::Bridge("getFilesDir returned null".into()))?;

        let dir = PathBuf::from(path);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}
