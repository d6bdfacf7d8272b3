// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// trustkit-doctor: print this host's trust verdicts as JSON.
//
// Usage: trustkit-doctor [CONFIG.json]

use std::process::ExitCode;

use trustkit_core::TrustConfig;
use trustkit_dispatch::Dispatcher;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => match TrustConfig::load(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(%path, "could not load configuration: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => TrustConfig::default(),
    };

    let report = Dispatcher::for_host(&config).report();
    match serde_json::to_string_pretty(&report) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("could not serialise report: {e}");
            ExitCode::FAILURE
        }
    }
}
