// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stop helpers that reject `--clear_instance_dirs` get one bare retry.

use crate::prelude::*;

#[tokio::test]
async fn rejected_flag_is_retried_once_and_slot_freed() {
    let run_dir = tempdir().unwrap();
    let artifacts = tempdir().unwrap();
    let home = tempdir().unwrap();
    let manager = new_manager(run_dir.path());

    // An old stop binary: chokes on the new flag, succeeds bare.
    let log = artifacts.path().join("invocations");
    let script = format!(
        "#!/bin/sh\n\
         echo \"$@\" >> {log}\n\
         for arg in \"$@\"; do\n\
           if [ \"$arg\" = \"--clear_instance_dirs\" ]; then\n\
             echo 'flag provided but not defined' >&2\n\
             exit 1\n\
           fi\n\
         done\n\
         exit 0\n",
        log = log.display()
    );
    install_helper(artifacts.path(), "cvd_internal_stop", &script);

    let home_arg = format!("--home_dir={}", home.path().display());
    let param = selector_param(
        &["--group_name=phone", "--instance_num=3", home_arg.as_str()],
        home.path(),
        artifacts.path(),
    );
    let plan = manager.analyze("start", &param, credential(UID)).unwrap();
    manager.set_instance_group(UID, plan).unwrap();

    let mut out = Vec::new();
    let mut err = Vec::new();
    manager.stop_group(UID, "phone", &mut out, &mut err).await.unwrap();

    // Exactly two invocations: with the flag, then without.
    let invocations = std::fs::read_to_string(&log).unwrap();
    let lines: Vec<&str> = invocations.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("--clear_instance_dirs"));
    assert!(!lines[1].contains("--clear_instance_dirs"));

    let stderr = String::from_utf8(err).unwrap();
    assert!(stderr.contains("Will try without the flag."), "stderr: {stderr}");

    // The retry succeeded, so the slot marker reads not-in-use again.
    let raw = std::fs::read(manager.lock_manager().lock_file_path(3)).unwrap();
    assert_eq!(raw[0], b'0');
}
