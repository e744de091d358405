// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Partial creation must roll back the whole group.

use crate::prelude::*;

#[test]
fn colliding_instance_id_rolls_back_the_new_group() {
    let run_dir = tempdir().unwrap();
    let artifacts = tempdir().unwrap();
    let home = tempdir().unwrap();
    let manager = new_manager(run_dir.path());

    let home_arg = format!("--home_dir={}", home.path().display());
    let param = selector_param(
        &["--group_name=first", "--instance_num=1", home_arg.as_str()],
        home.path(),
        artifacts.path(),
    );
    let plan = manager.analyze("start", &param, credential(UID)).unwrap();
    manager.set_instance_group(UID, plan).unwrap();

    // Hand-build a plan whose second instance collides on id 1.
    let second = GroupCreationInfo {
        group_name: "second".to_string(),
        home_dir: "/tmp/u/other".into(),
        host_artifacts_path: artifacts.path().to_path_buf(),
        product_out_path: artifacts.path().to_path_buf(),
        instances: vec![
            PerInstanceInfo {
                instance_id: 2,
                per_instance_name: "a".to_string(),
                lock: manager.lock_manager().try_acquire_lock(2).unwrap().unwrap(),
            },
            PerInstanceInfo {
                instance_id: 1,
                per_instance_name: "b".to_string(),
                lock: manager.lock_manager().try_acquire_lock(1).unwrap().unwrap(),
            },
        ],
    };

    let err = manager.set_instance_group(UID, second).unwrap_err();
    assert_eq!(err.kind(), "already_exists");

    // The new group is not observable at all.
    let groups =
        manager.find_groups(UID, &[Query::new(QueryField::GroupName, "second")]).unwrap();
    assert!(groups.is_empty());
    // The existing group survived untouched.
    let first =
        manager.find_groups(UID, &[Query::new(QueryField::GroupName, "first")]).unwrap();
    assert_eq!(first.len(), 1);
}
