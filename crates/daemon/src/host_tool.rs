// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resolves helper binary names inside a host-artifacts directory.
//!
//! Different device builds ship the same operation under different
//! basenames, so each operation probes a precedence list under the
//! artifacts' `bin/` directory. Artifacts directories do not change while
//! the daemon runs, so results are memoized per `(path, op)`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;
use vdm_core::{Error, Result};

/// Candidate basenames, newest spelling first.
const STATUS_CANDIDATES: &[&str] = &["cvd_internal_status", "cvd_status", "status"];
const STOP_CANDIDATES: &[&str] = &["cvd_internal_stop", "cvd_stop", "stop"];

#[derive(Default)]
pub struct HostToolTargetManager {
    memo: Mutex<HashMap<(PathBuf, String), String>>,
}

impl HostToolTargetManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the basename implementing `op` under `<artifacts>/bin/`.
    pub fn exec_base_name(&self, artifacts_path: &Path, op: &str) -> Result<String> {
        let key = (artifacts_path.to_path_buf(), op.to_string());
        if let Some(hit) = self.memo.lock().get(&key) {
            return Ok(hit.clone());
        }

        let bin_dir = artifacts_path.join("bin");
        for candidate in candidates_for(op)? {
            let path = bin_dir.join(candidate);
            if is_executable(&path) {
                debug!(op, binary = *candidate, "resolved host tool");
                self.memo.lock().insert(key, candidate.to_string());
                return Ok(candidate.to_string());
            }
        }
        Err(Error::NotFound(format!("no \"{op}\" binary under \"{}\"", bin_dir.display())))
    }
}

fn candidates_for(op: &str) -> Result<&'static [&'static str]> {
    match op {
        "status" => Ok(STATUS_CANDIDATES),
        "stop" => Ok(STOP_CANDIDATES),
        other => Err(Error::NotFound(format!("unknown host tool operation \"{other}\""))),
    }
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata().map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0).unwrap_or(false)
}

#[cfg(test)]
#[path = "host_tool_tests.rs"]
mod tests;
