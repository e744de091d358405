// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clear stops and forgets every group of every user.

use crate::prelude::*;

#[tokio::test]
async fn clear_acts_as_a_barrier_across_users() {
    let run_dir = tempdir().unwrap();
    let artifacts = tempdir().unwrap();
    let manager = new_manager(run_dir.path());

    install_helper(artifacts.path(), "cvd_internal_stop", "#!/bin/sh\nexit 0\n");

    let homes = [tempdir().unwrap(), tempdir().unwrap()];
    for (uid, home) in [UID, OTHER_UID].into_iter().zip(&homes) {
        // A group home as the launcher leaves it: runtime dir + config.
        std::fs::create_dir(home.path().join("cuttlefish_runtime")).unwrap();
        std::fs::write(home.path().join(".cuttlefish_config.json"), "{}").unwrap();

        let home_arg = format!("--home_dir={}", home.path().display());
        let param = selector_param(
            &["--group_name=phone", home_arg.as_str()],
            home.path(),
            artifacts.path(),
        );
        let plan = manager.analyze("start", &param, credential(uid)).unwrap();
        manager.set_instance_group(uid, plan).unwrap();
    }
    assert!(manager.has_instance_groups(UID));
    assert!(manager.has_instance_groups(OTHER_UID));

    let mut out = Vec::new();
    let mut err = Vec::new();
    let status = manager.clear(&mut out, &mut err).await.unwrap();
    assert_eq!(status, StatusCode::Ok);

    assert!(!manager.has_instance_groups(UID));
    assert!(!manager.has_instance_groups(OTHER_UID));
    for home in &homes {
        assert!(!home.path().join("cuttlefish_runtime").exists());
        assert!(!home.path().join(".cuttlefish_config.json").exists());
    }
    let stderr = String::from_utf8(err).unwrap();
    assert!(stderr.contains("Stopped all known instances"), "stderr: {stderr}");
}
