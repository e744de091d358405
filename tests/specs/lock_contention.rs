// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Slot locks coordinate peer daemons through the shared lock directory.

use crate::prelude::*;

#[test]
fn peer_daemon_never_takes_a_held_slot() {
    let run_dir = tempdir().unwrap();
    // Two managers over one lock directory act like two daemon processes:
    // flock conflicts across open file descriptions.
    let daemon_a = LockFileManager::new(run_dir.path(), 10);
    let daemon_b = LockFileManager::new(run_dir.path(), 10);

    let _held = daemon_a.try_acquire_lock(3).unwrap().unwrap();

    // Contention is empty, not an error.
    assert!(daemon_b.try_acquire_lock(3).unwrap().is_none());

    // The unused-slot scan hands out 1 and 2, skips 3, continues at 4.
    let first = daemon_b.try_acquire_unused_lock().unwrap().unwrap();
    let second = daemon_b.try_acquire_unused_lock().unwrap().unwrap();
    let third = daemon_b.try_acquire_unused_lock().unwrap().unwrap();
    assert_eq!((first.slot(), second.slot(), third.slot()), (1, 2, 4));
}

#[test]
fn dropped_handle_frees_the_slot_for_peers() {
    let run_dir = tempdir().unwrap();
    let daemon_a = LockFileManager::new(run_dir.path(), 10);
    let daemon_b = LockFileManager::new(run_dir.path(), 10);

    let held = daemon_a.try_acquire_lock(3).unwrap().unwrap();
    drop(held);
    assert!(daemon_b.try_acquire_lock(3).unwrap().is_some());
}
