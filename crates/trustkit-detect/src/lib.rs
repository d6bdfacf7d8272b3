// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Device trust evaluation for TrustKit.
//
// Root/jailbreak detection (`DetectionEngine`, OR semantics) and binary
// integrity (`IntegrityVerifier`, AND semantics), both built from the signal
// probes in `probes`. Verdicts are recomputed on every call and never cached.

pub mod engine;
pub mod integrity;
pub mod probes;

#[cfg(test)]
mod fake;

pub use engine::DetectionEngine;
pub use integrity::IntegrityVerifier;
pub use probes::Probe;
