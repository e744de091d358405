// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registry snapshots for daemon restart.
//!
//! A snapshot captures every user's registry dump in one versioned JSON
//! file. Lock files are deliberately not part of it: slot markers live in
//! the lock directory and are re-read on demand after a restart.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use vdm_core::{Error, Result};

use crate::manager::InstanceManager;

/// Current snapshot schema version
pub const CURRENT_SNAPSHOT_VERSION: u32 = 1;

const MAX_BAK_FILES: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Schema version for migrations
    #[serde(rename = "v")]
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub users: Vec<UserSnapshot>,
}

/// One user's registry dump.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub uid: u32,
    pub db: serde_json::Value,
}

/// Writes the full registry to `path`, rotating previous snapshots into
/// `.bak` files and renaming a temp file into place so readers never see
/// a torn write.
pub fn save_snapshot(path: &Path, manager: &InstanceManager) -> Result<()> {
    let snapshot = Snapshot {
        version: CURRENT_SNAPSHOT_VERSION,
        created_at: Utc::now(),
        users: manager.serialize_all()?,
    };
    let bytes =
        serde_json::to_vec_pretty(&snapshot).map_err(|e| Error::Internal(e.to_string()))?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    if path.exists() {
        fs::rename(path, rotate_bak_path(path))?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, &bytes)?;
    fs::rename(&tmp, path)?;
    info!(path = %path.display(), users = snapshot.users.len(), "registry snapshot written");
    Ok(())
}

/// Loads a snapshot, or `None` when no snapshot exists yet.
pub fn load_snapshot(path: &Path) -> Result<Option<Snapshot>> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(path)?;
    let snapshot: Snapshot =
        serde_json::from_slice(&bytes).map_err(|e| Error::SchemaMismatch(e.to_string()))?;
    if snapshot.version != CURRENT_SNAPSHOT_VERSION {
        return Err(Error::SchemaMismatch(format!(
            "snapshot version {} is not supported (current {})",
            snapshot.version, CURRENT_SNAPSHOT_VERSION
        )));
    }
    Ok(Some(snapshot))
}

/// Picks the next backup path, keeping at most [`MAX_BAK_FILES`] of
/// `.bak`, `.bak.2`, `.bak.3` and shifting older ones up.
fn rotate_bak_path(path: &Path) -> PathBuf {
    let bak = |n: u32| {
        if n == 1 {
            path.with_extension("bak")
        } else {
            path.with_extension(format!("bak.{n}"))
        }
    };
    if bak(MAX_BAK_FILES).exists() {
        let _ = fs::remove_file(bak(MAX_BAK_FILES));
    }
    for n in (1..MAX_BAK_FILES).rev() {
        if bak(n).exists() {
            let _ = fs::rename(bak(n), bak(n + 1));
        }
    }
    bak(1)
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
