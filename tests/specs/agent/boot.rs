//! Agent boot pass specs
//!
//! The boot pass holds the agent lock, migrates the legacy registry,
//! unlocks moved disks and resumes interrupted encryptions.

use crate::prelude::*;
use crate::prelude::assert_eq;

#[test]
fn interrupted_encryption_finishes_on_next_boot() {
    let host = Host::new();
    let store = host.store();
    let queue = Arc::new(EncryptionWorkQueue::new());
    let mapper = host.pipeline(&store, &queue).handle(host.data_disk("sdc"), &host.key_file()).unwrap();
    // Die between the data copy and the header restore
    host.disk.fail("luks_close");
    let first = host.scheduler(&store, &queue).run_pending();
    assert_eq!(first.failed.len(), 1);
    assert_eq!(ProgressLedger::pending_mappers(&host.env.ongoing_dir), vec![mapper.clone()]);

    host.disk.succeed("luks_close");
    let summary = host.boot();

    assert_eq!(summary.resume.completed, vec![mapper]);
    assert!(summary.is_clean());
    assert!(ProgressLedger::pending_mappers(&host.env.ongoing_dir).is_empty());
    assert!(host.store().list_records().unwrap().iter().all(|r| !r.has_detached_header()));
}

#[test]
fn legacy_registry_is_migrated_once() {
    let host = Host::new();
    let mp = host.mount_point("data");
    let root = "osencrypt /dev/sda2 None / ext4 False 0";
    host.write(
        &host.env.legacy_registry,
        &format!("{root}\ndata0 /dev/sdc None {} ext4 False 0\n", mp.display()),
    );
    host.disk.set_file_system("/dev/sdc", Some("ext4"));

    let first = host.boot();
    assert_eq!(first.migration.migrated, vec!["data0"]);
    assert!(first.migration.registry_retired);
    assert_eq!(read(&host.env.legacy_registry), format!("{root}\n"));

    let second = host.boot();
    assert_eq!(second.migration, MigrationReport::default());
    assert_eq!(read(&host.env.crypttab).matches("data0 ").count(), 1);
}

#[test]
fn moved_disk_with_token_is_unlocked() {
    let host = Host::new();
    host.disk.add_luks_device("/dev/sdc");
    host.disk.add_luks_device("/dev/sdd");
    host.disk.set_token("/dev/sdc", "protector");

    let summary = host.boot();

    assert_eq!(summary.unlock.unlocked, vec!["/dev/sdc"]);
    assert_eq!(summary.unlock.skipped, vec!["/dev/sdd"]);
    assert!(host.disk.is_unlocked("/dev/sdc"));
}

#[test]
fn second_agent_is_refused() {
    let host = Host::new();
    let _held = ode_agent::lifecycle::acquire_lock(&host.env.lock_path()).unwrap();

    let err = ode_agent::boot(
        &host.env,
        Arc::new(host.disk.clone()),
        Arc::new(host.runner.clone()),
        host.clock.clone(),
    )
    .unwrap_err();

    assert!(matches!(err, ode_agent::LifecycleError::LockFailed(_)));
}
