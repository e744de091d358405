// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-user registry of instance groups.
//!
//! The database is purely in-memory and single-threaded; the instance
//! manager serializes access behind its own mutex. Every mutation
//! re-checks the uniqueness invariants: no two groups share a name or a
//! home directory, no two instances share a slot id, and instance names
//! are unique within their group.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::group::{GroupSpec, InstanceGroup};
use crate::instance::{InUseState, Instance};
use crate::query::{self, Query};

/// Id/name pair for one instance to be appended to a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceInfo {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Default, Clone)]
pub struct InstanceDatabase {
    groups: Vec<InstanceGroup>,
}

impl InstanceDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an empty group. The caller is expected to populate it with
    /// [`InstanceDatabase::add_instances`] immediately afterwards.
    pub fn add_group(&mut self, spec: GroupSpec) -> Result<&InstanceGroup> {
        validate_name("group name", &spec.group_name)?;
        validate_absolute("home directory", &spec.home_dir)?;
        validate_absolute("host artifacts path", &spec.host_artifacts_path)?;
        validate_absolute("product out path", &spec.product_out_path)?;
        if self.groups.iter().any(|g| g.group_name == spec.group_name) {
            return Err(Error::AlreadyExists(format!("group \"{}\"", spec.group_name)));
        }
        if self.groups.iter().any(|g| g.home_dir == spec.home_dir) {
            return Err(Error::AlreadyExists(format!(
                "home directory \"{}\"",
                spec.home_dir.display()
            )));
        }
        self.groups.push(InstanceGroup::new(spec));
        // Just pushed, so last() is always present.
        self.groups.last().ok_or_else(|| Error::Internal("group vanished after push".to_string()))
    }

    /// Appends instances to an existing group.
    pub fn add_instances(&mut self, group_name: &str, infos: &[InstanceInfo]) -> Result<()> {
        if infos.is_empty() {
            return Err(Error::InvalidArgument("no instances given".to_string()));
        }
        let group_idx = self
            .groups
            .iter()
            .position(|g| g.group_name == group_name)
            .ok_or_else(|| Error::NotFound(format!("group \"{group_name}\"")))?;

        // Instances land one at a time, so within-batch duplicates trip
        // the same checks as collisions with pre-existing instances.
        for info in infos {
            validate_name("instance name", &info.name)?;
            if self.groups.iter().any(|g| g.has_instance_id(info.id)) {
                return Err(Error::AlreadyExists(format!("instance id {}", info.id)));
            }
            if self.groups[group_idx].find_instance_by_name(&info.name).is_some() {
                return Err(Error::AlreadyExists(format!(
                    "instance \"{}\" in group \"{group_name}\"",
                    info.name
                )));
            }
            self.groups[group_idx].instances.push(Instance {
                id: info.id,
                per_instance_name: info.name.clone(),
                group_name: group_name.to_string(),
                in_use_state: InUseState::NotInUse,
            });
        }
        Ok(())
    }

    /// Removes a group and all its instances. Idempotent: removing an
    /// absent group is a no-op and returns `false`.
    pub fn remove_group(&mut self, group_name: &str) -> bool {
        let before = self.groups.len();
        self.groups.retain(|g| g.group_name != group_name);
        self.groups.len() != before
    }

    pub fn set_build_id(&mut self, group_name: &str, build_id: &str) -> Result<()> {
        let group = self
            .groups
            .iter_mut()
            .find(|g| g.group_name == group_name)
            .ok_or_else(|| Error::NotFound(format!("group \"{group_name}\"")))?;
        group.build_id = Some(build_id.to_string());
        Ok(())
    }

    /// Conjunctive group lookup, in insertion order. Empty result is not
    /// an error.
    pub fn find_groups(&self, queries: &[Query]) -> Result<Vec<&InstanceGroup>> {
        let mut matched = Vec::new();
        for group in &self.groups {
            if query::group_matches(group, queries)? {
                matched.push(group);
            }
        }
        Ok(matched)
    }

    /// Like [`InstanceDatabase::find_groups`] but requires exactly one match.
    pub fn find_group(&self, queries: &[Query]) -> Result<&InstanceGroup> {
        let matched = self.find_groups(queries)?;
        match matched.len() {
            0 => Err(Error::NotFound("no group matched the query".to_string())),
            1 => Ok(matched[0]),
            n => Err(Error::InvalidArgument(format!("query matched {n} groups, expected one"))),
        }
    }

    /// Conjunctive instance lookup across all groups, in insertion order.
    pub fn find_instances(&self, queries: &[Query]) -> Result<Vec<&Instance>> {
        let mut matched = Vec::new();
        for group in &self.groups {
            for instance in &group.instances {
                if query::instance_matches(group, instance, queries)? {
                    matched.push(instance);
                }
            }
        }
        Ok(matched)
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn groups(&self) -> &[InstanceGroup] {
        &self.groups
    }

    pub fn clear(&mut self) {
        self.groups.clear();
    }

    /// Serializes the registry into the dump document.
    pub fn serialize(&self) -> Result<serde_json::Value> {
        let dump = DatabaseDump {
            groups: self
                .groups
                .iter()
                .map(|g| GroupDump {
                    group_name: g.group_name.clone(),
                    home_dir: g.home_dir.clone(),
                    host_artifacts_path: g.host_artifacts_path.clone(),
                    product_out_path: g.product_out_path.clone(),
                    build_id: g.build_id.clone(),
                    instances: g
                        .instances
                        .iter()
                        .map(|i| InstanceDump { id: i.id, name: i.per_instance_name.clone() })
                        .collect(),
                })
                .collect(),
        };
        serde_json::to_value(&dump).map_err(|e| Error::Internal(e.to_string()))
    }

    /// Rebuilds the registry from a dump document.
    ///
    /// Only valid on an empty database. Goes through the regular mutation
    /// path so a tampered document cannot smuggle in invariant violations.
    pub fn load_from(&mut self, document: &serde_json::Value) -> Result<()> {
        if !self.is_empty() {
            return Err(Error::InvalidArgument(
                "load requires an empty instance database".to_string(),
            ));
        }
        let dump: DatabaseDump = serde_json::from_value(document.clone())
            .map_err(|e| Error::SchemaMismatch(e.to_string()))?;

        let mut loaded = InstanceDatabase::new();
        for group in dump.groups {
            loaded.add_group(GroupSpec {
                group_name: group.group_name.clone(),
                home_dir: group.home_dir,
                host_artifacts_path: group.host_artifacts_path,
                product_out_path: group.product_out_path,
            })?;
            let infos: Vec<InstanceInfo> = group
                .instances
                .into_iter()
                .map(|i| InstanceInfo { id: i.id, name: i.name })
                .collect();
            loaded.add_instances(&group.group_name, &infos)?;
            if let Some(build_id) = group.build_id {
                loaded.set_build_id(&group.group_name, &build_id)?;
            }
        }
        self.groups = loaded.groups;
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct DatabaseDump {
    groups: Vec<GroupDump>,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct GroupDump {
    group_name: String,
    home_dir: PathBuf,
    host_artifacts_path: PathBuf,
    product_out_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    build_id: Option<String>,
    instances: Vec<InstanceDump>,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct InstanceDump {
    id: u32,
    name: String,
}

fn validate_name(what: &str, name: &str) -> Result<()> {
    if name.is_empty()
        || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(Error::InvalidArgument(format!("malformed {what}: \"{name}\"")));
    }
    Ok(())
}

fn validate_absolute(what: &str, path: &std::path::Path) -> Result<()> {
    let as_str = path.to_str()
        .ok_or_else(|| Error::InvalidArgument(format!("{what} is not valid UTF-8")))?;
    if as_str.is_empty() || !path.is_absolute() || as_str.chars().any(|c| c.is_control()) {
        return Err(Error::InvalidArgument(format!("malformed {what}: \"{as_str}\"")));
    }
    Ok(())
}

#[cfg(test)]
#[path = "database_tests.rs"]
mod tests;
