// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Translates a create invocation into a validated materialization plan.
//!
//! The analyzer picks the group name, home directory, artifact paths,
//! per-instance names and slot numbers, and reserves the slot locks
//! before anything is registered. The caller owns the returned locks:
//! they are handed to the instance manager together with the plan, and
//! dropping the plan releases the reservations.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::{debug, info};
use vdm_core::{Credential, Error, InUseState, InstanceDatabase, Result};

use crate::env;
use crate::lock::{LockFile, LockFileManager};

/// Raw user input: selector/launcher arguments plus the submitting
/// shell's environment.
#[derive(Debug, Clone, Default)]
pub struct CreationAnalyzerParam {
    pub args: Vec<String>,
    pub envs: HashMap<String, String>,
}

/// One planned instance with its reserved slot lock.
#[derive(Debug)]
pub struct PerInstanceInfo {
    pub instance_id: u32,
    pub per_instance_name: String,
    pub lock: LockFile,
}

/// A validated group-creation plan.
#[derive(Debug)]
pub struct GroupCreationInfo {
    pub group_name: String,
    pub home_dir: PathBuf,
    pub host_artifacts_path: PathBuf,
    pub product_out_path: PathBuf,
    pub instances: Vec<PerInstanceInfo>,
}

/// Selector flags recognized out of the raw argument list. Anything else
/// is a launcher argument and passes through untouched.
#[derive(Debug, Default)]
struct SelectorFlags {
    group_name: Option<String>,
    instance_names: Option<Vec<String>>,
    num_instances: Option<u32>,
    base_instance_num: Option<u32>,
    home_dir: Option<PathBuf>,
    host_path: Option<PathBuf>,
}

pub struct CreationAnalyzer;

impl CreationAnalyzer {
    pub fn analyze(
        sub_cmd: &str,
        param: &CreationAnalyzerParam,
        credential: Credential,
        db: &InstanceDatabase,
        lock_manager: &LockFileManager,
    ) -> Result<GroupCreationInfo> {
        debug!(sub_cmd, uid = credential.uid, pid = credential.pid, "analyzing group creation");
        let SelectorFlags {
            group_name,
            instance_names,
            num_instances,
            base_instance_num,
            home_dir,
            host_path,
        } = parse_selector_args(&param.args)?;

        // An invocation that names no group defines the default group.
        let is_default_group = group_name.is_none();
        let group_name = group_name.unwrap_or_else(|| env::DEFAULT_GROUP_NAME.to_string());

        let host_artifacts_path = resolve_host_artifacts(host_path, &param.envs)?;
        let product_out_path = param
            .envs
            .get(env::PRODUCT_OUT_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| host_artifacts_path.clone());
        let home_dir = resolve_home_dir(home_dir, &param.envs, is_default_group, &group_name)?;

        let (names, count) = resolve_instance_names(instance_names, num_instances, &group_name)?;
        let locks = acquire_slots(lock_manager, base_instance_num, count)?;

        // Collision checks against the registry before the plan escapes.
        if db.groups().iter().any(|g| g.group_name == group_name) {
            return Err(Error::AlreadyExists(format!("group \"{group_name}\"")));
        }
        if db.groups().iter().any(|g| g.home_dir == home_dir) {
            return Err(Error::AlreadyExists(format!(
                "home directory \"{}\"",
                home_dir.display()
            )));
        }
        for lock in &locks {
            if db.groups().iter().any(|g| g.has_instance_id(lock.slot())) {
                return Err(Error::AlreadyExists(format!("instance id {}", lock.slot())));
            }
        }

        let instances: Vec<PerInstanceInfo> = locks
            .into_iter()
            .zip(names)
            .map(|(mut lock, per_instance_name)| {
                lock.set_status(InUseState::BeingPrepared)?;
                Ok(PerInstanceInfo { instance_id: lock.slot(), per_instance_name, lock })
            })
            .collect::<Result<_>>()?;

        info!(
            group = %group_name,
            count,
            ids = ?instances.iter().map(|i| i.instance_id).collect::<Vec<_>>(),
            "group creation plan ready"
        );
        Ok(GroupCreationInfo {
            group_name,
            home_dir,
            host_artifacts_path,
            product_out_path,
            instances,
        })
    }
}

fn parse_selector_args(args: &[String]) -> Result<SelectorFlags> {
    let mut flags = SelectorFlags::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let Some(stripped) = arg.strip_prefix("--") else {
            continue;
        };
        let (name, inline_value) = match stripped.split_once('=') {
            Some((name, value)) => (name, Some(value.to_string())),
            None => (stripped, None),
        };
        if !is_selector_flag(name) {
            continue;
        }
        let value = match inline_value {
            Some(value) => value,
            None => iter
                .next()
                .cloned()
                .ok_or_else(|| Error::InvalidArgument(format!("--{name} requires a value")))?,
        };
        match name {
            "group_name" => flags.group_name = Some(value),
            "instance_name" => {
                flags.instance_names =
                    Some(value.split(',').map(|s| s.trim().to_string()).collect());
            }
            "num_instances" => flags.num_instances = Some(parse_number(name, &value)?),
            // --instance_num and --base_instance_num both pin the first
            // slot number.
            "instance_num" | "base_instance_num" => {
                if flags.base_instance_num.is_some() {
                    return Err(Error::InvalidArgument(
                        "--instance_num and --base_instance_num are mutually exclusive"
                            .to_string(),
                    ));
                }
                flags.base_instance_num = Some(parse_number(name, &value)?);
            }
            "home_dir" => flags.home_dir = Some(PathBuf::from(value)),
            "host_path" => flags.host_path = Some(PathBuf::from(value)),
            _ => {}
        }
    }
    Ok(flags)
}

fn is_selector_flag(name: &str) -> bool {
    matches!(
        name,
        "group_name"
            | "instance_name"
            | "num_instances"
            | "instance_num"
            | "base_instance_num"
            | "home_dir"
            | "host_path"
    )
}

fn parse_number(flag: &str, value: &str) -> Result<u32> {
    let parsed = value
        .parse::<u32>()
        .map_err(|_| Error::InvalidArgument(format!("--{flag} is not numeric: \"{value}\"")))?;
    if parsed == 0 {
        return Err(Error::InvalidArgument(format!("--{flag} must be positive")));
    }
    Ok(parsed)
}

fn resolve_host_artifacts(
    explicit: Option<PathBuf>,
    envs: &HashMap<String, String>,
) -> Result<PathBuf> {
    let path = explicit
        .or_else(|| envs.get(env::HOST_OUT_ENV).map(PathBuf::from))
        .ok_or_else(|| {
            Error::InvalidArgument(format!(
                "host artifacts path missing: pass --host_path or set {}",
                env::HOST_OUT_ENV
            ))
        })?;
    if !path.is_dir() {
        return Err(Error::InvalidArgument(format!(
            "host artifacts path is not a readable directory: \"{}\"",
            path.display()
        )));
    }
    Ok(path)
}

/// The default group lives directly in the caller's `$HOME`; named
/// groups get a subdirectory so several groups can coexist per user.
fn resolve_home_dir(
    explicit: Option<PathBuf>,
    envs: &HashMap<String, String>,
    is_default_group: bool,
    group_name: &str,
) -> Result<PathBuf> {
    let home = match explicit {
        Some(home) => home,
        None => {
            let base = envs.get("HOME").map(PathBuf::from).ok_or_else(|| {
                Error::InvalidArgument("home directory missing: pass --home_dir or set HOME".to_string())
            })?;
            if is_default_group {
                base
            } else {
                base.join(group_name)
            }
        }
    };
    if !home.is_absolute() {
        return Err(Error::InvalidArgument(format!(
            "home directory is not absolute: \"{}\"",
            home.display()
        )));
    }
    Ok(home)
}

fn resolve_instance_names(
    explicit: Option<Vec<String>>,
    num_instances: Option<u32>,
    group_name: &str,
) -> Result<(Vec<String>, u32)> {
    match explicit {
        Some(names) => {
            if names.iter().any(|n| n.is_empty()) {
                return Err(Error::InvalidArgument("empty instance name".to_string()));
            }
            let count = names.len() as u32;
            if let Some(requested) = num_instances {
                if requested != count {
                    return Err(Error::InvalidArgument(format!(
                        "--num_instances is {requested} but --instance_name lists {count} names"
                    )));
                }
            }
            for (idx, name) in names.iter().enumerate() {
                if names[..idx].contains(name) {
                    return Err(Error::AlreadyExists(format!("instance name \"{name}\"")));
                }
            }
            Ok((names, count))
        }
        None => {
            let count = num_instances.unwrap_or(1);
            let names =
                (1..=count).map(|ordinal| format!("{group_name}-{ordinal}")).collect();
            Ok((names, count))
        }
    }
}

fn acquire_slots(
    lock_manager: &LockFileManager,
    base_instance_num: Option<u32>,
    count: u32,
) -> Result<Vec<LockFile>> {
    let mut locks = Vec::with_capacity(count as usize);
    match base_instance_num {
        // Explicit numbering: the requested slots must all be free.
        Some(base) => {
            let end = base.checked_add(count).ok_or_else(|| {
                Error::InvalidArgument("instance number out of range".to_string())
            })?;
            for slot in base..end {
                let mut lock = lock_manager
                    .try_acquire_lock(slot)?
                    .ok_or(Error::Contention(slot))?;
                if lock.status()? != InUseState::NotInUse {
                    return Err(Error::Contention(slot));
                }
                locks.push(lock);
            }
        }
        // Otherwise take the lowest free slots.
        None => {
            for _ in 0..count {
                let lock = lock_manager.try_acquire_unused_lock()?.ok_or_else(|| {
                    Error::NotFound(format!(
                        "no unused instance slot available (max {})",
                        lock_manager.max_slots()
                    ))
                })?;
                locks.push(lock);
            }
        }
    }
    Ok(locks)
}

#[cfg(test)]
#[path = "analyzer_tests.rs"]
mod tests;
