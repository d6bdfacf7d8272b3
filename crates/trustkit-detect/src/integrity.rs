// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Integrity Verifier: AND over the provenance sub-checks.
//
// Two tiers. The standard tier passes when no debugger is attached, the app
// is not a debuggable build, the OS image carries no test-key signing marker
// and the installer is on the allow-list (each only where the platform can
// answer it). The strict tier additionally
// rejects bundles that embed a pre-release provisioning profile, which
// separates a public store release from a beta channel.

use std::sync::Arc;

use tracing::{info, instrument};
use trustkit_bridge::PlatformBridge;
use trustkit_core::{SignalId, TrustConfig, Verdict};

use crate::probes::{Probe, integrity_probes, release_probes};

pub struct IntegrityVerifier {
    bridge: Arc<dyn PlatformBridge>,
    standard: Vec<Probe>,
    strict: Vec<Probe>,
}

impl IntegrityVerifier {
    pub fn new(bridge: Arc<dyn PlatformBridge>, config: &TrustConfig) -> Self {
        let standard = integrity_probes(bridge.as_ref(), config);
        let strict = release_probes(bridge.as_ref());
        info!(
            platform = bridge.platform_name(),
            standard = standard.len(),
            strict = strict.len(),
            "integrity verifier ready"
        );
        Self {
            bridge,
            standard,
            strict,
        }
    }

    /// True iff every standard sub-check passes.
    #[instrument(skip_all)]
    pub fn is_valid(&self) -> bool {
        !self.standard.iter().any(|p| p.fires(self.bridge.as_ref()))
    }

    /// True iff the standard tier passes and no provisioning profile is
    /// embedded.
    #[instrument(skip_all)]
    pub fn is_formal_release_build(&self) -> bool {
        self.is_valid() && !self.strict.iter().any(|p| p.fires(self.bridge.as_ref()))
    }

    /// Standard tier with the failing sub-checks listed.
    pub fn evaluate(&self) -> Verdict {
        self.failing(self.standard.iter())
    }

    /// Strict tier with the failing sub-checks listed.
    pub fn evaluate_formal_release(&self) -> Verdict {
        self.failing(self.standard.iter().chain(&self.strict))
    }

    fn failing<'a>(&self, probes: impl Iterator<Item = &'a Probe>) -> Verdict {
        let failed: Vec<SignalId> = probes
            .filter(|p| p.fires(self.bridge.as_ref()))
            .map(Probe::id)
            .collect();
        Verdict::new(failed.is_empty(), failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeBridge, Query};
    use proptest::prelude::*;

    fn verifier(bridge: FakeBridge) -> IntegrityVerifier {
        IntegrityVerifier::new(Arc::new(bridge), &TrustConfig::default())
    }

    fn play_store() -> FakeBridge {
        FakeBridge::android().with_installer("com.android.vending")
    }

    #[test]
    fn store_install_without_debugger_is_valid() {
        let v = verifier(play_store());
        assert!(v.is_valid());
        assert_eq!(v.evaluate(), Verdict::new(true, vec![]));
    }

    #[test]
    fn sideloaded_build_is_invalid() {
        let v = verifier(FakeBridge::android().with_installer("com.android.shell"));
        assert!(!v.is_valid());
        assert_eq!(v.evaluate().signals, vec![SignalId::UntrustedInstaller]);
    }

    #[test]
    fn debuggable_build_is_invalid() {
        let v = verifier(play_store().debuggable(true));
        assert!(!v.is_valid());
        assert!(v.evaluate().involves(SignalId::DebuggableBuild));
    }

    #[test]
    fn test_key_image_is_invalid_even_from_the_store() {
        let v = verifier(play_store().with_build_tags("release,test-keys"));
        assert!(!v.is_valid());
        assert_eq!(v.evaluate().signals, vec![SignalId::TestKeys]);

        assert!(verifier(play_store().with_build_tags("release-keys")).is_valid());
    }

    #[test]
    fn failed_build_tag_query_does_not_fail_integrity() {
        assert!(verifier(play_store().failing(Query::BuildTags)).is_valid());
    }

    #[test]
    fn failed_trace_query_counts_as_no_debugger() {
        let v = verifier(play_store().failing(Query::Traced));
        assert!(v.is_valid());
    }

    #[test]
    fn ios_valid_only_checks_the_debugger() {
        assert!(verifier(FakeBridge::ios()).is_valid());
        assert!(verifier(FakeBridge::ios().provisioning(true)).is_valid());
        assert!(!verifier(FakeBridge::ios().traced(true)).is_valid());
    }

    #[test]
    fn testflight_build_is_valid_but_not_formal_release() {
        let v = verifier(FakeBridge::ios().provisioning(true));
        assert!(v.is_valid());
        assert!(!v.is_formal_release_build());
        assert_eq!(
            v.evaluate_formal_release().signals,
            vec![SignalId::ProvisioningProfile]
        );

        let store = verifier(FakeBridge::ios());
        assert!(store.is_formal_release_build());
    }

    #[test]
    fn failed_profile_query_does_not_block_release() {
        let v = verifier(FakeBridge::ios().failing(Query::Provisioning));
        assert!(v.is_formal_release_build());
    }

    proptest! {
        /// Every sub-check must pass; failing any one fails the verdict.
        #[test]
        fn verdict_is_and_of_subchecks(
            traced in any::<bool>(),
            debuggable in any::<bool>(),
            test_keys in any::<bool>(),
            trusted in any::<bool>(),
        ) {
            let installer = if trusted { "com.amazon.venezia" } else { "org.fdroid.fdroid" };
            let tags = if test_keys { "release,test-keys" } else { "release-keys" };
            let v = verifier(
                FakeBridge::android()
                    .traced(traced)
                    .debuggable(debuggable)
                    .with_build_tags(tags)
                    .with_installer(installer),
            );

            let expected = !traced && !debuggable && !test_keys && trusted;
            prop_assert_eq!(v.is_valid(), expected);
            prop_assert_eq!(v.evaluate().value, expected);
            prop_assert_eq!(
                v.evaluate().signals.len(),
                [traced, debuggable, test_keys, !trusted].iter().filter(|b| **b).count()
            );
        }

        #[test]
        fn strict_tier_implies_standard_tier(traced in any::<bool>(), profile in any::<bool>()) {
            let v = verifier(FakeBridge::ios().traced(traced).provisioning(profile));
            prop_assert_eq!(v.is_formal_release_build(), !traced && !profile);
            if v.is_formal_release_build() {
                prop_assert!(v.is_valid());
            }
        }
    }
}
