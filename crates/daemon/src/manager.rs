// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The instance manager: one mutex over all per-user registries.
//!
//! Every public operation serializes on that mutex. Operations that block
//! on helper binaries snapshot the registry data they need, drop the
//! guard, and only then spawn and wait, so a slow helper never stalls
//! unrelated commands.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use tracing::{error, info, warn};
use vdm_core::{
    Credential, Error, GroupSpec, InUseState, Instance, InstanceDatabase, InstanceGroup,
    InstanceInfo, Query, QueryField, Result, SubprocessFailure,
};

use crate::analyzer::{CreationAnalyzer, CreationAnalyzerParam, GroupCreationInfo};
use crate::env;
use crate::host_tool::HostToolTargetManager;
use crate::lock::LockFileManager;
use crate::snapshot::{Snapshot, UserSnapshot};
use crate::subprocess::{self, Command};

/// Aggregate outcome of a fleet or clear command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    Internal,
}

pub struct InstanceManager {
    instance_dbs: Mutex<HashMap<u32, InstanceDatabase>>,
    lock_manager: Arc<LockFileManager>,
    host_tools: HostToolTargetManager,
}

impl InstanceManager {
    pub fn new(lock_manager: Arc<LockFileManager>) -> Self {
        Self {
            instance_dbs: Mutex::new(HashMap::new()),
            lock_manager,
            host_tools: HostToolTargetManager::new(),
        }
    }

    pub fn lock_manager(&self) -> &LockFileManager {
        &self.lock_manager
    }

    /// Produces a creation plan with its slot locks reserved.
    ///
    /// Runs the analyzer on a snapshot of the user's registry: the
    /// analyzer touches lock files on disk, which must not happen under
    /// the registry mutex.
    pub fn analyze(
        &self,
        sub_cmd: &str,
        param: &CreationAnalyzerParam,
        credential: Credential,
    ) -> Result<GroupCreationInfo> {
        let db_snapshot = {
            let mut dbs = self.instance_dbs.lock();
            dbs.entry(credential.uid).or_default().clone()
        };
        CreationAnalyzer::analyze(sub_cmd, param, credential, &db_snapshot, &self.lock_manager)
    }

    /// Materializes a planned group: registers the empty group, then its
    /// instances, rolling the group back if any instance is rejected.
    /// Partial groups are never observable.
    pub fn set_instance_group(&self, uid: u32, info: GroupCreationInfo) -> Result<()> {
        {
            let mut dbs = self.instance_dbs.lock();
            let db = dbs.entry(uid).or_default();
            db.add_group(GroupSpec {
                group_name: info.group_name.clone(),
                home_dir: info.home_dir.clone(),
                host_artifacts_path: info.host_artifacts_path.clone(),
                product_out_path: info.product_out_path.clone(),
            })?;
            let instance_infos: Vec<InstanceInfo> = info
                .instances
                .iter()
                .map(|i| InstanceInfo { id: i.instance_id, name: i.per_instance_name.clone() })
                .collect();
            if let Err(e) = db.add_instances(&info.group_name, &instance_infos) {
                // Failing to populate a brand-new group means the group
                // creation itself failed; take the empty group back out.
                db.remove_group(&info.group_name);
                warn!(
                    group = %info.group_name,
                    error = %e,
                    "instance registration failed, group rolled back"
                );
                return Err(e);
            }
        }
        // The group is live. Publish each slot's marker and drop the
        // flock so peer daemons observe the state without acquiring.
        for per in info.instances {
            let slot = per.lock.slot();
            if let Err(e) = per.lock.release(InUseState::InUseByThisDaemon) {
                warn!(slot, error = %e, "failed to publish in-use marker");
            }
        }
        info!(uid, "instance group registered");
        Ok(())
    }

    pub fn set_build_id(&self, uid: u32, group_name: &str, build_id: &str) -> Result<()> {
        let mut dbs = self.instance_dbs.lock();
        dbs.entry(uid).or_default().set_build_id(group_name, build_id)
    }

    /// Removes the group whose home directory is `home_dir`, if any.
    pub fn remove_instance_group(&self, uid: u32, home_dir: &Path) -> bool {
        let mut dbs = self.instance_dbs.lock();
        let db = dbs.entry(uid).or_default();
        let query = Query::new(QueryField::HomeDir, home_dir.display().to_string());
        let Ok(group) = db.find_group(&[query]) else {
            return false;
        };
        let group_name = group.group_name.clone();
        db.remove_group(&group_name)
    }

    pub fn has_instance_groups(&self, uid: u32) -> bool {
        let dbs = self.instance_dbs.lock();
        dbs.get(&uid).is_some_and(|db| !db.is_empty())
    }

    /// Detached matching groups, in insertion order.
    pub fn find_groups(&self, uid: u32, queries: &[Query]) -> Result<Vec<InstanceGroup>> {
        let dbs = self.instance_dbs.lock();
        let Some(db) = dbs.get(&uid) else {
            return Ok(Vec::new());
        };
        Ok(db.find_groups(queries)?.into_iter().cloned().collect())
    }

    /// Detached matching instances, in insertion order.
    pub fn find_instances(&self, uid: u32, queries: &[Query]) -> Result<Vec<Instance>> {
        let dbs = self.instance_dbs.lock();
        let Some(db) = dbs.get(&uid) else {
            return Ok(Vec::new());
        };
        Ok(db.find_instances(queries)?.into_iter().cloned().collect())
    }

    /// Exactly-one variant of [`InstanceManager::find_groups`].
    pub fn find_group(&self, uid: u32, queries: &[Query]) -> Result<InstanceGroup> {
        let dbs = self.instance_dbs.lock();
        let db = dbs
            .get(&uid)
            .ok_or_else(|| Error::NotFound(format!("no instance groups for uid {uid}")))?;
        Ok(db.find_group(queries)?.clone())
    }

    pub fn serialize(&self, uid: u32) -> Result<serde_json::Value> {
        let mut dbs = self.instance_dbs.lock();
        dbs.entry(uid).or_default().serialize()
    }

    pub fn load_from(&self, uid: u32, document: &serde_json::Value) -> Result<()> {
        let mut dbs = self.instance_dbs.lock();
        dbs.entry(uid).or_default().load_from(document)
    }

    /// Dumps every user's registry, lowest uid first.
    pub(crate) fn serialize_all(&self) -> Result<Vec<UserSnapshot>> {
        let dbs = self.instance_dbs.lock();
        let mut users = dbs
            .iter()
            .map(|(uid, db)| Ok(UserSnapshot { uid: *uid, db: db.serialize()? }))
            .collect::<Result<Vec<_>>>()?;
        users.sort_by_key(|u| u.uid);
        Ok(users)
    }

    /// Restores every user registry from a snapshot. Each restored user
    /// must not already have state.
    pub fn load_all(&self, snapshot: &Snapshot) -> Result<()> {
        for user in &snapshot.users {
            self.load_from(user.uid, &user.db)?;
        }
        Ok(())
    }

    /// Lists the status of every instance of every group, as reported by
    /// each group's `status` helper.
    ///
    /// Helper failures downgrade to a stderr line plus an empty record;
    /// the aggregate is `Internal` if any group failed.
    pub async fn fleet(
        &self,
        uid: u32,
        out: &mut (dyn Write + Send),
        err: &mut (dyn Write + Send),
    ) -> Result<StatusCode> {
        // Snapshot before blocking on helpers.
        let groups: Vec<InstanceGroup> = {
            let mut dbs = self.instance_dbs.lock();
            dbs.entry(uid).or_default().groups().to_vec()
        };

        let mut status = StatusCode::Ok;
        let mut groups_doc = Vec::with_capacity(groups.len());
        for group in &groups {
            // A failed group is reported on stderr and omitted from the
            // output document.
            let instances = match self.issue_status_command(group, &mut *err).await {
                Ok(instances) => instances,
                Err(e) => {
                    writeln!(err, "Group '{}' status error: '{}'", group.group_name, e)?;
                    status = StatusCode::Internal;
                    continue;
                }
            };
            groups_doc.push(json!({
                "group_name": group.group_name,
                "instances": instances,
            }));
        }
        let output = json!({ "groups": groups_doc });
        writeln!(out, "{output:#}")?;
        Ok(status)
    }

    async fn issue_status_command(
        &self,
        group: &InstanceGroup,
        err: &mut (dyn Write + Send),
    ) -> Result<Vec<serde_json::Value>> {
        let status_bin = self.host_tools.exec_base_name(&group.host_artifacts_path, "status")?;
        let prog_path = group.host_artifacts_path.join("bin").join(&status_bin);

        let mut instances_doc = Vec::with_capacity(group.instances.len());
        for instance in &group.instances {
            let cmd = Command::new(&prog_path)
                .arg("-print")
                .env("HOME", group.home_dir.display().to_string())
                .env(env::CUTTLEFISH_INSTANCE_ENV, instance.id.to_string());
            let captured = subprocess::run_with_captured_stdio(cmd, None).await?;
            if captured.exit_code != 0 {
                return Err(SubprocessFailure::ExitCode { code: captured.exit_code }.into());
            }
            let mut raw = captured.stdout;
            if raw.iter().all(|b| b.is_ascii_whitespace()) {
                writeln!(err, "{} does not comply with cvd fleet.", instance.device_name())?;
                raw = b"{}".to_vec();
            }
            let parsed: serde_json::Value = serde_json::from_slice(&raw)
                .map_err(|e| Error::SchemaMismatch(format!("{status_bin} output: {e}")))?;
            // Some status binaries print an array even when limited to a
            // single instance.
            let mut record = match parsed {
                serde_json::Value::Array(mut array) => {
                    if array.len() != 1 {
                        return Err(Error::SchemaMismatch(format!(
                            "{status_bin} returned {} instances, expected 1",
                            array.len()
                        )));
                    }
                    array.remove(0)
                }
                other => other,
            };
            let Some(fields) = record.as_object_mut() else {
                return Err(Error::SchemaMismatch(format!(
                    "{status_bin} did not print a status object"
                )));
            };
            // Older builds printed the webrtc device id under
            // instance_name only.
            if !fields.contains_key("webrtc_device_id") {
                if let Some(name) = fields.get("instance_name").cloned() {
                    fields.insert("webrtc_device_id".to_string(), name);
                }
            }
            // The helper does not know the name this server created the
            // instance under.
            fields.insert("instance_name".to_string(), json!(instance.per_instance_name));
            instances_doc.push(record);
        }
        Ok(instances_doc)
    }

    /// Stops one group's devices via its `stop` helper.
    pub async fn stop_group(
        &self,
        uid: u32,
        group_name: &str,
        out: &mut (dyn Write + Send),
        err: &mut (dyn Write + Send),
    ) -> Result<()> {
        let group = self.find_group(uid, &[Query::new(QueryField::GroupName, group_name)])?;
        let config_path = env::config_file_path(&group.home_dir);
        self.issue_stop_command(&mut *out, &mut *err, &config_path, &group).await
    }

    async fn issue_stop_command(
        &self,
        out: &mut (dyn Write + Send),
        err: &mut (dyn Write + Send),
        config_path: &Path,
        group: &InstanceGroup,
    ) -> Result<()> {
        let stop_bin = self.host_tools.exec_base_name(&group.host_artifacts_path, "stop")?;
        let prog_path = group.host_artifacts_path.join("bin").join(&stop_bin);

        let first = Command::new(&prog_path)
            .arg("--clear_instance_dirs")
            .env(env::CUTTLEFISH_CONFIG_FILE_ENV, config_path.display().to_string());
        let mut wait_result = run_and_forward(first, &mut *out, &mut *err).await;
        if wait_result.is_err() {
            // Old stop binaries fail to parse --clear_instance_dirs; one
            // retry without the flag.
            writeln!(
                err,
                "{stop_bin} was executed internally, and failed. It might be failing to \
                 parse the new --clear_instance_dirs. Will try without the flag."
            )?;
            let retry = Command::new(&prog_path)
                .env(env::CUTTLEFISH_CONFIG_FILE_ENV, config_path.display().to_string());
            wait_result = run_and_forward(retry, &mut *out, &mut *err).await;
        }
        if let Err(e) = wait_result {
            writeln!(
                err,
                "Warning: error stopping instances for dir \"{}\".\n\
                 This can happen if instances are already stopped.",
                group.home_dir.display()
            )?;
            info!(group = %group.group_name, error = %e, "stop helper failed after retry");
        }

        // Whatever the helper did, try to hand the slots back.
        for instance in &group.instances {
            match self.lock_manager.try_acquire_lock(instance.id) {
                Ok(Some(lock)) => {
                    if let Err(e) = lock.release(InUseState::NotInUse) {
                        warn!(slot = instance.id, error = %e, "failed to reset slot marker");
                    }
                }
                Ok(None) | Err(_) => {
                    writeln!(
                        err,
                        "the lock manager failed to acquire the lock for slot {}",
                        instance.id
                    )?;
                }
            }
        }
        Ok(())
    }

    /// Stops everything for every user, removes each group's ephemeral
    /// files, and empties the whole registry. Best-effort throughout;
    /// always reports `Ok`.
    ///
    /// The registry is drained atomically, so on return no user has any
    /// registered group and stop was attempted for everything that
    /// existed at entry.
    pub async fn clear(
        &self,
        out: &mut (dyn Write + Send),
        err: &mut (dyn Write + Send),
    ) -> Result<StatusCode> {
        let drained = std::mem::take(&mut *self.instance_dbs.lock());
        let mut users: Vec<(u32, InstanceDatabase)> = drained.into_iter().collect();
        users.sort_by_key(|(uid, _)| *uid);

        for (uid, db) in &users {
            for group in db.groups() {
                let config_path = env::config_file_path(&group.home_dir);
                if config_path.exists() {
                    if let Err(e) =
                        self.issue_stop_command(&mut *out, &mut *err, &config_path, group).await
                    {
                        error!(uid = *uid, group = %group.group_name, error = %e, "stop failed during clear");
                    }
                }
                remove_path(&group.home_dir.join(env::RUNTIME_DIR_NAME));
                remove_path(&config_path);
            }
        }
        writeln!(err, "Stopped all known instances")?;
        Ok(StatusCode::Ok)
    }
}

/// Runs the command with captured stdio, forwards both streams to the
/// caller's sinks, and maps a non-zero exit to an error.
async fn run_and_forward(
    cmd: Command,
    out: &mut (dyn Write + Send),
    err: &mut (dyn Write + Send),
) -> Result<()> {
    let captured = subprocess::run_with_captured_stdio(cmd, None).await?;
    out.write_all(&captured.stdout)?;
    err.write_all(&captured.stderr)?;
    if captured.exit_code != 0 {
        return Err(SubprocessFailure::ExitCode { code: captured.exit_code }.into());
    }
    Ok(())
}

/// Removes a file, symlink, or directory tree; missing paths are fine.
fn remove_path(path: &Path) {
    let Ok(meta) = std::fs::symlink_metadata(path) else {
        return;
    };
    let result = if meta.file_type().is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    if let Err(e) = result {
        warn!(path = %path.display(), error = %e, "failed to remove ephemeral path");
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
