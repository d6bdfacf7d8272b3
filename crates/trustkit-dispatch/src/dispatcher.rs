// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Dispatcher: routes host method calls to the trust checks and the store.
//
// Method names are `<channel>#<operation>` and are part of the host
// contract, so they are matched literally.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};
use trustkit_bridge::{PlatformBridge, ScreenProtection, platform_bridge};
use trustkit_core::error::{Result, TrustKitError};
use trustkit_core::{DeviceReport, TrustConfig};
use trustkit_detect::{DetectionEngine, IntegrityVerifier};
use trustkit_security::SecureStore;

use crate::codes::{BoundaryError, ErrorCode, screen_error, storage_error};

/// A call from the host: method name plus a JSON object of arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub arguments: Value,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, arguments: Value) -> Self {
        Self {
            method: method.into(),
            arguments,
        }
    }

    /// A call that takes no arguments.
    pub fn bare(method: impl Into<String>) -> Self {
        Self::new(method, Value::Null)
    }

    /// String argument `name`, or `InvalidArgument` when it is absent or not
    /// a string.
    fn string_arg(&self, name: &str) -> Result<&str> {
        self.arguments
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| TrustKitError::InvalidArgument(format!("missing {name}")))
    }
}

/// What the host receives back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MethodResult {
    Success { value: Value },
    Error { code: ErrorCode, message: String },
    NotImplemented,
}

impl MethodResult {
    pub fn success(value: impl Into<Value>) -> Self {
        Self::Success {
            value: value.into(),
        }
    }

    pub fn void() -> Self {
        Self::success(Value::Null)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Error { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<BoundaryError> for MethodResult {
    fn from(err: BoundaryError) -> Self {
        Self::Error {
            code: err.code,
            message: err.message,
        }
    }
}

/// Owns one detection engine, integrity verifier and secure store, all on
/// the same platform bridge.
pub struct Dispatcher {
    platform: String,
    engine: DetectionEngine,
    integrity: IntegrityVerifier,
    store: SecureStore,
    screen: Option<Arc<dyn ScreenProtection>>,
}

impl Dispatcher {
    pub fn new(bridge: Arc<dyn PlatformBridge>, config: &TrustConfig) -> Self {
        let platform = bridge.platform_name().to_owned();
        let engine = DetectionEngine::new(bridge.clone(), config);
        let integrity = IntegrityVerifier::new(bridge.clone(), config);
        let store = SecureStore::for_platform(bridge, config);
        info!(%platform, "dispatcher ready");
        Self {
            platform,
            engine,
            integrity,
            store,
            screen: None,
        }
    }

    /// Dispatcher on the bridge for the target operating system.
    pub fn for_host(config: &TrustConfig) -> Self {
        Self::new(Arc::from(platform_bridge()), config)
    }

    /// Register the host's screen protection. Without one, `screenshot#…`
    /// calls answer `NO_ACTIVITY`.
    pub fn with_screen_protection(mut self, screen: Arc<dyn ScreenProtection>) -> Self {
        self.screen = Some(screen);
        self
    }

    pub fn store(&self) -> &SecureStore {
        &self.store
    }

    /// Handle one call on the current thread.
    #[instrument(skip_all, fields(method = %call.method))]
    pub fn handle(&self, call: &MethodCall) -> MethodResult {
        debug!("dispatching");
        match call.method.as_str() {
            "root#isDeviceRooted" => MethodResult::success(self.engine.is_compromised()),
            "integrity#isValid" => MethodResult::success(self.integrity.is_valid()),
            "integrity#isFormalReleaseBuild" => {
                MethodResult::success(self.integrity.is_formal_release_build())
            }
            "storage#write" => self.storage_write(call),
            "storage#read" => self.storage_read(call),
            "storage#delete" => self.storage_delete(call),
            "storage#deleteAll" => self.store.delete_all().map_or_else(
                |e| storage_error(&e).into(),
                |()| MethodResult::void(),
            ),
            "screenshot#enable" => self.set_screen_protection(true),
            "screenshot#disable" => self.set_screen_protection(false),
            _ => {
                warn!("unknown method");
                MethodResult::NotImplemented
            }
        }
    }

    /// Handle one call on a blocking worker so the caller's thread (often a
    /// UI thread) never waits on the keystore or the disk.
    pub async fn handle_blocking(self: Arc<Self>, call: MethodCall) -> MethodResult {
        let method = call.method.clone();
        match tokio::task::spawn_blocking(move || self.handle(&call)).await {
            Ok(result) => result,
            Err(e) => {
                error!(%method, "dispatch worker failed: {e}");
                BoundaryError::new(ErrorCode::StorageError, format!("{method} did not complete"))
                    .into()
            }
        }
    }

    /// Evaluate every check with its fired signals.
    pub fn report(&self) -> DeviceReport {
        DeviceReport {
            platform: self.platform.clone(),
            generated_at: Utc::now(),
            compromised: self.engine.evaluate(),
            integrity: self.integrity.evaluate(),
            formal_release: self.integrity.evaluate_formal_release(),
        }
    }

    fn storage_write(&self, call: &MethodCall) -> MethodResult {
        let written = call.string_arg("key").and_then(|key| {
            let value = call.string_arg("value")?;
            self.store.write(key, value.as_bytes())
        });
        written.map_or_else(|e| storage_error(&e).into(), |()| MethodResult::void())
    }

    fn storage_read(&self, call: &MethodCall) -> MethodResult {
        let read = call
            .string_arg("key")
            .and_then(|key| self.store.read_string(key));
        match read {
            Ok(Some(value)) => MethodResult::success(value),
            Ok(None) => MethodResult::void(),
            Err(e) => storage_error(&e).into(),
        }
    }

    fn storage_delete(&self, call: &MethodCall) -> MethodResult {
        let deleted = call
            .string_arg("key")
            .and_then(|key| self.store.delete(key));
        deleted.map_or_else(|e| storage_error(&e).into(), |()| MethodResult::void())
    }

    fn set_screen_protection(&self, enabled: bool) -> MethodResult {
        let Some(screen) = &self.screen else {
            return BoundaryError::new(
                ErrorCode::NoActivity,
                "screen protection needs an attached UI context",
            )
            .into();
        };
        match screen.set_protected(enabled) {
            Ok(()) => MethodResult::void(),
            Err(e) => screen_error(&e).into(),
        }
    }
}
