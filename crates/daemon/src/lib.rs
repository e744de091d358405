// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! vdm-daemon: lifecycle orchestration for locally-launched virtual devices.
//!
//! The daemon tracks instance groups per user, serializes lifecycle
//! commands behind one mutex, coordinates slot ownership with peer
//! daemons through advisory lock files, and delegates per-instance work
//! to the helper binaries shipped in each group's host-artifacts
//! directory.

pub mod analyzer;
pub mod env;
pub mod host_tool;
pub mod lock;
pub mod manager;
pub mod snapshot;
pub mod subprocess;

pub use analyzer::{CreationAnalyzer, CreationAnalyzerParam, GroupCreationInfo, PerInstanceInfo};
pub use host_tool::HostToolTargetManager;
pub use lock::{LockFile, LockFileManager};
pub use manager::{InstanceManager, StatusCode};
pub use snapshot::{load_snapshot, save_snapshot, Snapshot, UserSnapshot};
pub use subprocess::{run, run_with_captured_stdio, CapturedStdio, Command};
