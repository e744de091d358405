// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! vdm-core: data model and per-user registry for the vdm daemon

pub mod credential;
pub mod database;
pub mod error;
pub mod group;
pub mod instance;
pub mod query;

pub use credential::Credential;
pub use database::{InstanceDatabase, InstanceInfo};
pub use error::{Error, Result, SubprocessFailure};
pub use group::{GroupSpec, InstanceGroup};
pub use instance::{InUseState, Instance};
pub use query::{Query, QueryField};
