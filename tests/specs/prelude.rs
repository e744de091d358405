// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for the scenario specs.

use std::os::unix::fs::PermissionsExt;
use std::path::Path;

pub use std::sync::Arc;

pub use tempfile::tempdir;
pub use vdm_core::{Credential, Query, QueryField};
pub use vdm_daemon::{
    CreationAnalyzerParam, GroupCreationInfo, InstanceManager, LockFileManager, PerInstanceInfo,
    StatusCode,
};

pub const UID: u32 = 1000;
pub const OTHER_UID: u32 = 1001;

pub fn new_manager(run_dir: &Path) -> InstanceManager {
    InstanceManager::new(Arc::new(LockFileManager::new(run_dir, 10)))
}

pub fn credential(uid: u32) -> Credential {
    Credential { uid, gid: uid, pid: 4242 }
}

/// Writes a fake helper under `<artifacts>/bin/` with the executable bit.
pub fn install_helper(artifacts: &Path, basename: &str, script: &str) {
    let bin_dir = artifacts.join("bin");
    std::fs::create_dir_all(&bin_dir).unwrap();
    let path = bin_dir.join(basename);
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

/// Selector args plus a shell environment pointing at the scratch dirs.
pub fn selector_param(args: &[&str], home: &Path, artifacts: &Path) -> CreationAnalyzerParam {
    let mut envs = std::collections::HashMap::new();
    envs.insert("HOME".to_string(), home.display().to_string());
    envs.insert("ANDROID_HOST_OUT".to_string(), artifacts.display().to_string());
    CreationAnalyzerParam { args: args.iter().map(|s| s.to_string()).collect(), envs }
}
