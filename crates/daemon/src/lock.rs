// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Advisory lock files serializing instance slots across daemons.
//!
//! Each numbered slot is backed by one file under `<run-dir>/cvd_locks/`.
//! Holding the file's exclusive flock means owning the slot; the first
//! byte of the file carries the [`InUseState`] marker so peer daemons can
//! inspect a slot without acquiring it. The kernel drops advisory locks
//! on process death, so crashed daemons never strand a slot.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;
use vdm_core::{InUseState, Result};

use crate::env;

pub struct LockFileManager {
    lock_dir: PathBuf,
    max_slots: u32,
}

impl LockFileManager {
    /// `run_dir` is the host-global run directory; the lock directory is
    /// created beneath it on first acquisition.
    pub fn new(run_dir: &Path, max_slots: u32) -> Self {
        Self { lock_dir: run_dir.join(env::LOCK_DIR_NAME), max_slots }
    }

    /// Manager over the default run directory for `uid`.
    pub fn in_default_run_dir(uid: u32, max_slots: u32) -> Self {
        Self::new(&env::default_run_dir(uid), max_slots)
    }

    pub fn max_slots(&self) -> u32 {
        self.max_slots
    }

    pub fn lock_file_path(&self, slot: u32) -> PathBuf {
        self.lock_dir.join(format!("local-instance-{slot}.lock"))
    }

    /// Non-blocking acquisition of one slot. Contention is `Ok(None)`,
    /// not an error; only real I/O failures propagate.
    pub fn try_acquire_lock(&self, slot: u32) -> Result<Option<LockFile>> {
        std::fs::create_dir_all(&self.lock_dir)?;
        let path = self.lock_file_path(slot);
        // Never truncate: a holder's state marker must survive our open.
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!(slot, "acquired instance slot lock");
                Ok(Some(LockFile { slot, path, file }))
            }
            Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Scans slots in ascending order and returns the first acquired slot
    /// whose marker reads not-in-use. Slots that are locked, or held free
    /// of a flock but marked busy, are skipped.
    pub fn try_acquire_unused_lock(&self) -> Result<Option<LockFile>> {
        for slot in 1..=self.max_slots {
            let Some(mut lock) = self.try_acquire_lock(slot)? else {
                continue;
            };
            if lock.status()? == InUseState::NotInUse {
                return Ok(Some(lock));
            }
            drop(lock);
        }
        Ok(None)
    }
}

/// Exclusive ownership of one instance slot.
///
/// The flock is dropped when the handle goes out of scope; the last
/// written marker stays behind for peer daemons.
#[derive(Debug)]
pub struct LockFile {
    slot: u32,
    path: PathBuf,
    file: File,
}

impl LockFile {
    pub fn slot(&self) -> u32 {
        self.slot
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the marker byte. A fresh (empty) lock file reads not-in-use.
    pub fn status(&mut self) -> Result<InUseState> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut marker = [0u8; 1];
        let read = self.file.read(&mut marker)?;
        if read == 0 {
            return Ok(InUseState::NotInUse);
        }
        InUseState::from_byte(marker[0])
    }

    /// Writes the marker byte through to disk.
    pub fn set_status(&mut self, state: InUseState) -> Result<()> {
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&[state.to_byte()])?;
        self.file.sync_data()?;
        Ok(())
    }

    /// Writes a final marker and releases the slot.
    pub fn release(mut self, state: InUseState) -> Result<()> {
        self.set_status(state)?;
        Ok(())
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        let _ = self.file.sync_data();
        let _ = self.file.unlock();
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
