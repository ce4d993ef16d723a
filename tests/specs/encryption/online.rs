//! Online encryption specs
//!
//! A mounted data disk goes through prepare, copy and header consolidation
//! and ends up listed in the native tables under its new mapper.

use crate::prelude::*;
use crate::prelude::assert_eq;

#[test]
fn mounted_data_disk_is_encrypted_in_place() {
    let host = Host::new();
    let store = host.store();
    let queue = Arc::new(EncryptionWorkQueue::new());
    let disk = host.data_disk("sdc");
    let device_path = disk.path.clone();
    let mount_point = disk.mount_point.clone().unwrap();

    let mapper = host.pipeline(&store, &queue).handle(disk, &host.key_file()).unwrap();
    let report = host.scheduler(&store, &queue).run_pending();

    assert_eq!(report.completed, vec![mapper.clone()]);
    assert!(report.failed.is_empty());
    assert!(ProgressLedger::pending_mappers(&host.env.ongoing_dir).is_empty());

    let crypttab = read(&host.env.crypttab);
    let line = crypttab.lines().find(|l| l.starts_with(&mapper)).unwrap();
    assert!(line.contains(&device_path));

    let fstab = read(&host.env.fstab);
    let mapper_line = format!("{} {}", host.mapper_path(&mapper).display(), mount_point.display());
    assert!(fstab.lines().any(|l| l.starts_with(&mapper_line)));
    assert!(!fstab.lines().any(|l| l.starts_with(&device_path)));

    let records = host.store().list_records().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].mapper_name, mapper);
    assert!(!records[0].has_detached_header());
}

#[test]
fn refused_disk_leaves_tables_untouched() {
    let host = Host::new();
    let store = host.store();
    let queue = Arc::new(EncryptionWorkQueue::new());
    let mut disk = host.data_disk("sdc");
    disk.file_system = Some("zfs".into());
    let fstab_before = read(&host.env.fstab);

    let failure = host.pipeline(&store, &queue).handle(disk, &host.key_file()).unwrap_err();

    assert_eq!(failure.device.name, "sdc");
    assert!(queue.is_empty());
    assert_eq!(read(&host.env.fstab), fstab_before);
    assert!(!host.env.crypttab.exists());
}

#[test]
fn several_disks_share_one_run() {
    let host = Host::new();
    let store = host.store();
    let queue = Arc::new(EncryptionWorkQueue::new());
    let key = host.key_file();
    let pipeline = host.pipeline(&store, &queue);
    let mut mappers: Vec<String> =
        ["sdc", "sdd", "sde", "sdf"].iter().map(|n| pipeline.handle(host.data_disk(n), &key).unwrap()).collect();

    let mut report = host.scheduler(&store, &queue).run_pending();

    report.completed.sort();
    mappers.sort();
    assert_eq!(report.completed, mappers);
    assert_eq!(read(&host.env.crypttab).lines().count(), 4);
}
