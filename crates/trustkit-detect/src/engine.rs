// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Detection Engine: OR over the root/jailbreak probes.

use std::sync::Arc;

use tracing::{info, instrument};
use trustkit_bridge::PlatformBridge;
use trustkit_core::{SignalId, TrustConfig, Verdict};

use crate::probes::{Probe, compromise_probes};

/// Decides whether the device OS is root/jailbreak compromised.
///
/// Any single fired signal is conclusive. No fired signal only means that
/// no known signal fired; it is never proof of a clean device. The engine
/// holds no mutable state and may be shared across threads.
pub struct DetectionEngine {
    bridge: Arc<dyn PlatformBridge>,
    probes: Vec<Probe>,
}

impl DetectionEngine {
    /// Resolve the probe list from the bridge's capabilities.
    pub fn new(bridge: Arc<dyn PlatformBridge>, config: &TrustConfig) -> Self {
        let probes = compromise_probes(bridge.as_ref(), config);
        info!(
            platform = bridge.platform_name(),
            probes = probes.len(),
            "detection engine ready"
        );
        Self { bridge, probes }
    }

    /// The signals this engine evaluates, in order.
    pub fn signals(&self) -> Vec<SignalId> {
        self.probes.iter().map(Probe::id).collect()
    }

    /// OR of all probes, stopping at the first one that fires.
    #[instrument(skip_all)]
    pub fn is_compromised(&self) -> bool {
        self.probes.iter().any(|p| p.fires(self.bridge.as_ref()))
    }

    /// Evaluate every probe and report which fired.
    #[instrument(skip_all)]
    pub fn evaluate(&self) -> Verdict {
        let fired: Vec<SignalId> = self
            .probes
            .iter()
            .filter(|p| p.fires(self.bridge.as_ref()))
            .map(Probe::id)
            .collect();
        Verdict::new(!fired.is_empty(), fired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeBridge, Query};
    use proptest::prelude::*;

    fn engine_for(bridge: FakeBridge) -> (Arc<FakeBridge>, DetectionEngine) {
        let bridge = Arc::new(bridge);
        let engine = DetectionEngine::new(bridge.clone(), &TrustConfig::default());
        (bridge, engine)
    }

    #[test]
    fn clean_device_is_not_compromised() {
        let (_, engine) = engine_for(FakeBridge::android().with_build_tags("release-keys"));
        assert!(!engine.is_compromised());
        assert_eq!(engine.evaluate(), Verdict::new(false, vec![]));
    }

    #[test]
    fn flipping_one_probe_flips_the_verdict() {
        // pathExists / packagePresent / testKeys all false.
        let (_, clean) = engine_for(FakeBridge::android().with_build_tags("release-keys"));
        assert!(!clean.is_compromised());

        let (_, rooted) = engine_for(
            FakeBridge::android()
                .with_build_tags("release-keys")
                .with_path("/system/xbin/su"),
        );
        assert!(rooted.is_compromised());
        assert_eq!(rooted.evaluate().signals, vec![SignalId::RootPaths]);
    }

    #[test]
    fn stops_at_first_fired_probe() {
        let (bridge, engine) = engine_for(FakeBridge::android().with_path("/sbin/su"));
        assert!(engine.is_compromised());
        let short_circuit = bridge.call_count();

        let (bridge, engine) = engine_for(FakeBridge::android().with_path("/sbin/su"));
        assert!(engine.evaluate().value);
        assert!(bridge.call_count() > short_circuit);
    }

    #[test]
    fn erroring_probe_does_not_abort_evaluation() {
        let (_, engine) = engine_for(
            FakeBridge::ios()
                .failing(Query::Modules)
                .failing(Query::Url)
                .fork_allowed(true),
        );
        assert!(engine.is_compromised());
        assert_eq!(engine.evaluate().signals, vec![SignalId::ForkAllowed]);
    }

    #[test]
    fn ios_signals_cover_the_sandbox_probes() {
        let (_, engine) = engine_for(FakeBridge::ios());
        assert_eq!(
            engine.signals(),
            vec![
                SignalId::RootPaths,
                SignalId::SuspiciousModules,
                SignalId::JailbreakUrlScheme,
                SignalId::WritableSystemPath,
                SignalId::ForkAllowed,
            ]
        );
    }

    #[test]
    fn safe_to_share_between_threads() {
        let (_, engine) = engine_for(FakeBridge::ios().writable(true));
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| assert!(engine.is_compromised()));
            }
        });
    }

    proptest! {
        /// The verdict is the OR of the individual probes, and a probe that
        /// errors contributes false whatever its underlying answer.
        #[test]
        fn verdict_is_or_of_probes(
            path in any::<bool>(),
            module in any::<bool>(),
            url in any::<bool>(),
            writable in any::<bool>(),
            fork in any::<bool>(),
            url_errors in any::<bool>(),
        ) {
            let mut bridge = FakeBridge::ios()
                .url_handled(url)
                .writable(writable)
                .fork_allowed(fork);
            if path {
                bridge = bridge.with_path("/etc/apt");
            }
            if module {
                bridge = bridge.with_module("/usr/lib/frida-agent.dylib");
            }
            if url_errors {
                bridge = bridge.failing(Query::Url);
            }

            let expected = [path, module, url && !url_errors, writable, fork];
            let (_, engine) = engine_for(bridge);

            prop_assert_eq!(engine.is_compromised(), expected.iter().any(|b| *b));
            let verdict = engine.evaluate();
            prop_assert_eq!(verdict.value, expected.iter().any(|b| *b));
            prop_assert_eq!(verdict.signals.len(), expected.iter().filter(|b| **b).count());
        }
    }
}
