// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Host queries that plain `std` can answer on every platform, shared by the
// per-platform bridges. Linux and Android expose process state through
// `/proc`; the parsers take the file contents so they can be tested anywhere.

use std::io::ErrorKind;
use std::path::Path;

use trustkit_core::error::{Result, TrustKitError};

pub(crate) fn file_exists(path: &str) -> bool {
    Path::new(path).exists()
}

/// Create then delete `<dir>/jailbreak_test_<uuid>`.
///
/// Creating the file is the whole test; nothing is written into it. A
/// directory that refuses the create is the expected, healthy case and
/// yields `Ok(false)`. If the create succeeds but the cleanup fails the probe
/// still reports `true`; the stray file is logged.
pub(crate) fn probe_writable(dir: &str) -> Result<bool> {
    let path = Path::new(dir).join(format!("jailbreak_test_{}", uuid::Uuid::new_v4()));

    let file = match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
    {
        Ok(f) => f,
        Err(e)
            if matches!(
                e.kind(),
                ErrorKind::PermissionDenied | ErrorKind::NotFound | ErrorKind::ReadOnlyFilesystem
            ) =>
        {
            return Ok(false);
        }
        Err(e) => return Err(TrustKitError::Probe(format!("writable probe: {e}"))),
    };
    drop(file);

    if let Err(e) = std::fs::remove_file(&path) {
        tracing::warn!(path = %path.display(), error = %e, "writable probe left its file behind");
    }
    Ok(true)
}

/// Whether `/proc/<pid>/status` content names a non-zero `TracerPid`.
pub(crate) fn tracer_attached(status: &str) -> bool {
    status
        .lines()
        .find_map(|line| line.strip_prefix("TracerPid:"))
        .and_then(|rest| rest.trim().parse::<u32>().ok())
        .is_some_and(|pid| pid != 0)
}

/// Distinct mapped file paths from `/proc/<pid>/maps` content.
pub(crate) fn mapped_modules(maps: &str) -> Vec<String> {
    let mut modules: Vec<String> = maps
        .lines()
        // address perms offset dev inode pathname
        .filter_map(|line| line.split_whitespace().nth(5))
        .filter(|path| path.starts_with('/'))
        .map(str::to_owned)
        .collect();
    modules.sort();
    modules.dedup();
    modules
}

#[cfg(any(target_os = "linux", target_os = "android"))]
pub(crate) fn proc_is_traced() -> Result<bool> {
    let status = std::fs::read_to_string("/proc/self/status")?;
    Ok(tracer_attached(&status))
}

#[cfg(any(target_os = "linux", target_os = "android"))]
pub(crate) fn proc_loaded_modules() -> Result<Vec<String>> {
    let maps = std::fs::read_to_string("/proc/self/maps")?;
    Ok(mapped_modules(&maps))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracer_pid_parsing() {
        let clean = "Name:\tapp\nState:\tS (sleeping)\nTracerPid:\t0\nUid:\t1000\n";
        let traced = "Name:\tapp\nTracerPid:\t4242\n";
        assert!(!tracer_attached(clean));
        assert!(tracer_attached(traced));
        assert!(!tracer_attached("Name:\tapp\n"));
    }

    #[test]
    fn maps_parsing_keeps_unique_paths() {
        let maps = "\
7f000000-7f001000 r-xp 00000000 fd:01 123 /usr/lib/libc.so.6
7f001000-7f002000 r--p 00001000 fd:01 123 /usr/lib/libc.so.6
7f002000-7f003000 rw-p 00000000 00:00 0
7f003000-7f004000 r-xp 00000000 fd:01 456 /data/local/tmp/frida-agent-64.so
7ffd0000-7ffd1000 rw-p 00000000 00:00 0 [stack]
";
        let modules = mapped_modules(maps);
        assert_eq!(
            modules,
            vec![
                "/data/local/tmp/frida-agent-64.so".to_string(),
                "/usr/lib/libc.so.6".to_string()
            ]
        );
    }

    #[test]
    fn writable_probe_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let writable = probe_writable(dir.path().to_str().unwrap()).unwrap();
        assert!(writable);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn writable_probe_is_repeatable_and_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let dir_str = dir.path().to_str().unwrap();
        std::fs::write(dir.path().join("keep.txt"), b"x").unwrap();
        for _ in 0..3 {
            assert!(probe_writable(dir_str).unwrap());
        }
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["keep.txt".to_string()]);
    }

    #[test]
    fn writable_probe_missing_dir_is_negative() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(!probe_writable(missing.to_str().unwrap()).unwrap());
    }
}
