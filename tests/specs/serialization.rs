// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registry round-trips through documents and snapshot files.

use crate::prelude::*;

use vdm_daemon::{load_snapshot, save_snapshot};

fn populate(manager: &InstanceManager, run_suffix: &str) {
    // Two groups, four instances total.
    for (group, slots) in [("phone", [1u32, 2]), ("tablet", [3, 4])] {
        let instances = slots
            .iter()
            .enumerate()
            .map(|(idx, slot)| PerInstanceInfo {
                instance_id: *slot,
                per_instance_name: format!("dev{idx}"),
                lock: manager.lock_manager().try_acquire_lock(*slot).unwrap().unwrap(),
            })
            .collect();
        manager
            .set_instance_group(
                UID,
                GroupCreationInfo {
                    group_name: group.to_string(),
                    home_dir: format!("/tmp/{run_suffix}/{group}").into(),
                    host_artifacts_path: "/opt/artifacts".into(),
                    product_out_path: "/opt/product".into(),
                    instances,
                },
            )
            .unwrap();
    }
}

#[test]
fn document_roundtrip_preserves_every_group() {
    let run_dir = tempdir().unwrap();
    let manager = new_manager(run_dir.path());
    populate(&manager, "doc");

    let document = manager.serialize(UID).unwrap();

    let fresh_run = tempdir().unwrap();
    let fresh = new_manager(fresh_run.path());
    fresh.load_from(UID, &document).unwrap();

    let original = manager.find_groups(UID, &[]).unwrap();
    let restored = fresh.find_groups(UID, &[]).unwrap();
    assert_eq!(original, restored);
}

#[test]
fn snapshot_file_survives_a_daemon_restart() {
    let run_dir = tempdir().unwrap();
    let state_dir = tempdir().unwrap();
    let snapshot_path = state_dir.path().join("registry.json");

    let manager = new_manager(run_dir.path());
    populate(&manager, "snap");
    save_snapshot(&snapshot_path, &manager).unwrap();
    drop(manager);

    // A restarted daemon loads the snapshot and sees the same registry.
    let restarted = new_manager(run_dir.path());
    let snapshot = load_snapshot(&snapshot_path).unwrap().unwrap();
    restarted.load_all(&snapshot).unwrap();

    let groups = restarted.find_groups(UID, &[]).unwrap();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].group_name, "phone");
    assert_eq!(groups[1].group_name, "tablet");
    assert_eq!(
        restarted.find_instances(UID, &[]).unwrap().len(),
        4
    );
}
