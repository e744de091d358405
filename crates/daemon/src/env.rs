// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Well-known names shared with the device build artifacts.
//!
//! These literals are an external contract: helper binaries and peer
//! daemons look them up by exactly these spellings.

use std::path::{Path, PathBuf};

/// Env var carrying the instance id into helper binaries.
pub const CUTTLEFISH_INSTANCE_ENV: &str = "CUTTLEFISH_INSTANCE";
/// Env var carrying the group config path into helper binaries.
pub const CUTTLEFISH_CONFIG_FILE_ENV: &str = "CUTTLEFISH_CONFIG_FILE";

/// Env vars the launcher leaves behind for path resolution.
pub const HOST_OUT_ENV: &str = "ANDROID_HOST_OUT";
pub const PRODUCT_OUT_ENV: &str = "ANDROID_PRODUCT_OUT";

/// Lock directory under the run dir, shared by all daemons on the host.
pub const LOCK_DIR_NAME: &str = "cvd_locks";
/// Ephemeral runtime directory inside a group's home.
pub const RUNTIME_DIR_NAME: &str = "cuttlefish_runtime";
/// Config symlink name inside a group's home.
pub const CONFIG_LINK_NAME: &str = ".cuttlefish_config.json";

/// Group name used when the invocation names none.
pub const DEFAULT_GROUP_NAME: &str = "cvd";
/// Historical slot-count default; the lock manager parameterizes it.
pub const DEFAULT_MAX_SLOTS: u32 = 10;

/// Path of a group's config symlink.
pub fn config_file_path(home_dir: &Path) -> PathBuf {
    home_dir.join(CONFIG_LINK_NAME)
}

/// Run directory holding the lock files, shared by every daemon the
/// user runs on this host.
///
/// The runtime dir is already uid-scoped (`/run/user/<uid>`); the
/// fallback carries the uid itself so two users' daemons never share a
/// slot namespace.
pub fn default_run_dir(uid: u32) -> PathBuf {
    dirs::runtime_dir()
        .map(|dir| dir.join("vdm"))
        .unwrap_or_else(|| std::env::temp_dir().join(format!("vdm-{uid}")))
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
