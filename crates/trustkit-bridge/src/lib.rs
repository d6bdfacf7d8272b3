// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// TrustKit capability layer.
//
// Every native query the trust checks and the secure store need is expressed
// as a trait in `traits`. Each platform module implements those traits and
// declares, once, which of them it can answer. Callers never branch on the
// platform themselves.

pub mod traits;

mod host;
mod sealing;
pub mod software;

#[cfg(target_os = "ios")]
pub mod ios;

#[cfg(target_os = "android")]
pub mod android;

#[cfg(not(any(target_os = "ios", target_os = "android")))]
pub mod stub;

pub use sealing::{KEY_LEN, TAG_LEN};
pub use traits::{Capability, CapabilitySet, PlatformBridge, PlatformKind, ScreenProtection};

/// Bridge implementation for the target operating system.
pub fn platform_bridge() -> Box<dyn PlatformBridge> {
    #[cfg(target_os = "ios")]
    {
        Box::new(ios::IosBridge::new())
    }
    #[cfg(target_os = "android")]
    {
        Box::new(android::AndroidBridge::new())
    }
    #[cfg(not(any(target_os = "ios", target_os = "android")))]
    {
        Box::new(stub::StubBridge::new())
    }
}
