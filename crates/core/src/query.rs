// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Selector queries for locating groups and instances.
//!
//! A query is a `(field, value)` pair over a closed field set; a slice of
//! queries is a conjunction. Instance-scoped fields match a group when any
//! child instance matches, and group-scoped fields match an instance
//! through its parent group.

use std::path::Path;

use crate::error::{Error, Result};
use crate::group::InstanceGroup;
use crate::instance::Instance;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryField {
    GroupName,
    HomeDir,
    InstanceId,
    PerInstanceName,
    DeviceName,
    /// Composite `<group>/<instance>` selector.
    GroupAndInstanceName,
}

impl QueryField {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryField::GroupName => "group_name",
            QueryField::HomeDir => "home_dir",
            QueryField::InstanceId => "instance_id",
            QueryField::PerInstanceName => "per_instance_name",
            QueryField::DeviceName => "device_name",
            QueryField::GroupAndInstanceName => "group_name_and_instance_name",
        }
    }
}

impl std::str::FromStr for QueryField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "group_name" => Ok(QueryField::GroupName),
            "home_dir" => Ok(QueryField::HomeDir),
            "instance_id" => Ok(QueryField::InstanceId),
            "per_instance_name" => Ok(QueryField::PerInstanceName),
            "device_name" => Ok(QueryField::DeviceName),
            "group_name_and_instance_name" => Ok(QueryField::GroupAndInstanceName),
            other => Err(Error::InvalidArgument(format!("unknown query field \"{other}\""))),
        }
    }
}

impl std::fmt::Display for QueryField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub field: QueryField,
    pub value: String,
}

impl Query {
    pub fn new(field: QueryField, value: impl Into<String>) -> Self {
        Self { field, value: value.into() }
    }

    /// Whether `group` satisfies this query.
    pub fn matches_group(&self, group: &InstanceGroup) -> Result<bool> {
        match self.field {
            QueryField::GroupName => Ok(group.group_name == self.value),
            QueryField::HomeDir => Ok(group.home_dir == Path::new(&self.value)),
            QueryField::InstanceId => {
                let id = self.parse_id()?;
                Ok(group.instances.iter().any(|i| i.id == id))
            }
            QueryField::PerInstanceName => {
                Ok(group.instances.iter().any(|i| i.per_instance_name == self.value))
            }
            QueryField::DeviceName => {
                Ok(group.instances.iter().any(|i| i.device_name() == self.value))
            }
            QueryField::GroupAndInstanceName => {
                let (group_name, instance_name) = self.split_composite()?;
                Ok(group.group_name == group_name
                    && group.find_instance_by_name(instance_name).is_some())
            }
        }
    }

    /// Whether `instance` (a member of `group`) satisfies this query.
    pub fn matches_instance(&self, group: &InstanceGroup, instance: &Instance) -> Result<bool> {
        match self.field {
            QueryField::GroupName => Ok(group.group_name == self.value),
            QueryField::HomeDir => Ok(group.home_dir == Path::new(&self.value)),
            QueryField::InstanceId => Ok(instance.id == self.parse_id()?),
            QueryField::PerInstanceName => Ok(instance.per_instance_name == self.value),
            QueryField::DeviceName => Ok(instance.device_name() == self.value),
            QueryField::GroupAndInstanceName => {
                let (group_name, instance_name) = self.split_composite()?;
                Ok(group.group_name == group_name
                    && instance.per_instance_name == instance_name)
            }
        }
    }

    fn parse_id(&self) -> Result<u32> {
        self.value.parse::<u32>().map_err(|_| {
            Error::InvalidArgument(format!("instance_id query is not numeric: \"{}\"", self.value))
        })
    }

    fn split_composite(&self) -> Result<(&str, &str)> {
        self.value.split_once('/').ok_or_else(|| {
            Error::InvalidArgument(format!(
                "composite query must be <group>/<instance>: \"{}\"",
                self.value
            ))
        })
    }
}

/// Conjunction over a query slice. An empty slice matches everything.
pub(crate) fn group_matches(group: &InstanceGroup, queries: &[Query]) -> Result<bool> {
    for query in queries {
        if !query.matches_group(group)? {
            return Ok(false);
        }
    }
    Ok(true)
}

pub(crate) fn instance_matches(
    group: &InstanceGroup,
    instance: &Instance,
    queries: &[Query],
) -> Result<bool> {
    for query in queries {
        if !query.matches_instance(group, instance)? {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
#[path = "query_tests.rs"]
mod tests;
