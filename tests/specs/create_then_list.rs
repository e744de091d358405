// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Create a group, then list the fleet.

use crate::prelude::*;

#[tokio::test]
async fn create_then_list_reports_every_instance() {
    let run_dir = tempdir().unwrap();
    let artifacts = tempdir().unwrap();
    let home = tempdir().unwrap();
    let manager = new_manager(run_dir.path());

    // The status helper records each invocation, then prints one status
    // object mentioning the id it was asked about.
    let log = artifacts.path().join("invocations");
    let script = format!(
        "#!/bin/sh\n\
         echo \"$CUTTLEFISH_INSTANCE $1\" >> {log}\n\
         printf '{{\"instance_name\":\"i-%s\"}}' \"$CUTTLEFISH_INSTANCE\"\n",
        log = log.display()
    );
    install_helper(artifacts.path(), "cvd_internal_status", &script);

    let home_arg = format!("--home_dir={}", home.path().display());
    let param = selector_param(
        &["--group_name=cvd-1", "--instance_name=a,b", "--instance_num=1", home_arg.as_str()],
        home.path(),
        artifacts.path(),
    );
    let plan = manager.analyze("start", &param, credential(UID)).unwrap();
    manager.set_instance_group(UID, plan).unwrap();

    let groups =
        manager.find_groups(UID, &[Query::new(QueryField::GroupName, "cvd-1")]).unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].home_dir, home.path());

    let mut out = Vec::new();
    let mut err = Vec::new();
    let status = manager.fleet(UID, &mut out, &mut err).await.unwrap();
    assert_eq!(status, StatusCode::Ok);

    // One child per instance, each with `-print` and its own id.
    let invocations = std::fs::read_to_string(&log).unwrap();
    let lines: Vec<&str> = invocations.lines().collect();
    assert_eq!(lines, ["1 -print", "2 -print"]);

    let doc: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(doc["groups"][0]["group_name"], "cvd-1");
    let instances = doc["groups"][0]["instances"].as_array().unwrap();
    assert_eq!(instances.len(), 2);
    assert_eq!(instances[0]["instance_name"], "a");
    assert_eq!(instances[1]["instance_name"], "b");
    // The helper's legacy instance_name spelling became the webrtc id.
    assert_eq!(instances[0]["webrtc_device_id"], "i-1");
    assert_eq!(instances[1]["webrtc_device_id"], "i-2");
}
