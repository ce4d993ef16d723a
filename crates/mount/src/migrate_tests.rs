// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::{read, write, Fixture};
use ode_core::env::FSTAB_COMMENT;

const DEVICE: &str = "/dev/disk/azure/scsi1/lun0";

fn registry_backup(fx: &Fixture) -> std::path::PathBuf {
    let mut s = fx.env.legacy_registry.as_os_str().to_owned();
    s.push(".backup");
    s.into()
}

fn seed_data_volume(fx: &Fixture, fs: Option<&str>) -> std::path::PathBuf {
    let mp = fx.mount_point("data");
    write(&fx.env.legacy_registry, &format!("data0 {DEVICE} None {} ext4 False 0\n", mp.display()));
    write(&fx.env.fstab, "UUID=abc / ext4 defaults 0 1\n");
    fx.disk.set_lun(DEVICE, 1, 0);
    if let Some(fs) = fs {
        fx.disk.set_file_system(DEVICE, Some(fs));
    }
    mp
}

#[test]
fn no_registry_is_a_no_op() {
    let fx = Fixture::new();
    assert_eq!(fx.store.migrate_records().unwrap(), MigrationReport::default());
    assert!(!fx.env.fstab.exists());
    assert!(!fx.env.crypttab.exists());
}

#[test]
fn data_volume_moves_to_native_tables() {
    let fx = Fixture::new();
    let mp = seed_data_volume(&fx, Some("ext4"));

    let report = fx.store.migrate_records().unwrap();

    assert_eq!(report.migrated, vec!["data0"]);
    assert!(report.skipped.is_empty());
    assert!(report.registry_retired);
    assert!(!fx.env.legacy_registry.exists());
    assert!(read(&registry_backup(&fx)).contains("data0"));

    let key = fx.env.bek_mount_point.join("LinuxPassPhraseFileName_1_0");
    let crypttab_line = format!("data0 {DEVICE} {} luks,nofail", key.display());
    assert_eq!(read(&fx.env.crypttab).trim(), crypttab_line);

    let fstab_line = format!("{} {} auto defaults,nofail,discard 0 0", fx.mapper("data0"), mp.display());
    let fstab = read(&fx.env.fstab);
    assert!(fstab.contains(&format!("{FSTAB_COMMENT}\n{fstab_line}\n")));
    assert!(fstab.contains("LABEL=BEK\\040VOLUME"));

    let backup = ode_core::backup_dir_for(&mp);
    assert_eq!(read(&backup.join(CRYPTTAB_BACKUP)).trim(), crypttab_line);
    assert_eq!(read(&backup.join(FSTAB_BACKUP)).trim(), fstab_line);

    let listed = fx.store.list_records().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].mount_point.as_deref(), Some(mp.as_path()));
    assert_eq!(listed[0].file_system.as_deref(), Some("auto"));
}

#[test]
fn old_fstab_line_for_the_mount_is_replaced() {
    let fx = Fixture::new();
    let mp = seed_data_volume(&fx, Some("ext4"));
    write(
        &fx.env.fstab,
        &format!("UUID=abc / ext4 defaults 0 1\n/dev/mapper/data0 {} ext4 defaults 0 0\n", mp.display()),
    );

    fx.store.migrate_records().unwrap();

    let fstab = read(&fx.env.fstab);
    assert!(!fstab.contains("ext4 defaults 0 0"));
    assert_eq!(fstab.matches(&*mp.display().to_string()).count(), 1);
}

#[test]
fn unsupported_file_system_keeps_registry() {
    let fx = Fixture::new();
    seed_data_volume(&fx, Some("zfs"));

    let report = fx.store.migrate_records().unwrap();

    assert!(report.migrated.is_empty());
    assert_eq!(report.skipped.len(), 1);
    assert!(!report.registry_retired);
    assert!(fx.env.legacy_registry.exists());
    assert!(!fx.env.crypttab.exists());
    // BEK line goes in even for skipped records
    assert!(read(&fx.env.fstab).contains("LABEL=BEK\\040VOLUME"));
}

#[test]
fn missing_device_is_skipped() {
    let fx = Fixture::new();
    seed_data_volume(&fx, None);

    let report = fx.store.migrate_records().unwrap();

    assert_eq!(report.skipped[0].0, "data0");
    assert!(report.skipped[0].1.starts_with("device unavailable"));
    assert!(fx.env.legacy_registry.exists());
}

#[test]
fn root_lines_stay_in_registry() {
    let fx = Fixture::new();
    let mp = fx.mount_point("data");
    let root = "osencrypt /dev/sda2 None / ext4 False 0";
    write(
        &fx.env.legacy_registry,
        &format!("{root}\ndata0 {DEVICE} None {} ext4 False 0\n", mp.display()),
    );
    fx.disk.set_file_system(DEVICE, Some("xfs"));

    let report = fx.store.migrate_records().unwrap();

    assert!(report.registry_retired);
    assert_eq!(read(&fx.env.legacy_registry), format!("{root}\n"));
    assert!(read(&registry_backup(&fx)).contains("data0"));
    assert!(!fx.store.should_use_legacy_registry().unwrap());
    let names: Vec<_> = fx.store.list_records().unwrap().into_iter().map(|r| r.mapper_name).collect();
    assert_eq!(names, vec!["osencrypt", "data0"]);
}

#[test]
fn retry_after_partial_migration_adds_no_duplicates() {
    let fx = Fixture::new();
    let mp0 = fx.mount_point("data0");
    let mp1 = fx.mount_point("data1");
    write(
        &fx.env.legacy_registry,
        &format!(
            "data0 /dev/sdc None {} ext4 False 0\ndata1 /dev/sdd None {} ext4 False 0\n",
            mp0.display(),
            mp1.display()
        ),
    );
    fx.disk.set_file_system("/dev/sdc", Some("ext4"));

    let first = fx.store.migrate_records().unwrap();
    assert_eq!(first.migrated, vec!["data0"]);
    assert!(!first.registry_retired);

    fx.disk.set_file_system("/dev/sdd", Some("ext4"));
    let second = fx.store.migrate_records().unwrap();
    assert_eq!(second.migrated, vec!["data0", "data1"]);
    assert!(second.registry_retired);

    let crypttab = read(&fx.env.crypttab);
    assert_eq!(crypttab.matches("data0 ").count(), 1);
    assert_eq!(crypttab.matches("data1 ").count(), 1);
    assert_eq!(read(&fx.env.fstab).matches(FSTAB_COMMENT).count(), 2);

    assert_eq!(fx.store.migrate_records().unwrap(), MigrationReport::default());
}

#[test]
fn failing_record_does_not_stop_the_rest() {
    let fx = Fixture::new();
    // A regular file where the mount point should be: no backup dir fits
    let bad_mp = fx.dir.path().join("not-a-dir");
    write(&bad_mp, "");
    let good_mp = fx.mount_point("good");
    write(
        &fx.env.legacy_registry,
        &format!(
            "bad /dev/sdc None {} ext4 False 0\ngood /dev/sdd None {} ext4 False 0\n",
            bad_mp.display(),
            good_mp.display()
        ),
    );
    fx.disk.set_file_system("/dev/sdc", Some("ext4"));
    fx.disk.set_file_system("/dev/sdd", Some("ext4"));

    let report = fx.store.migrate_records().unwrap();

    assert_eq!(report.migrated, vec!["good"]);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].0, "bad");
    assert!(!report.registry_retired);
    assert!(fx.env.legacy_registry.exists());
    assert!(read(&fx.env.crypttab).lines().any(|l| l.starts_with("good /dev/sdd ")));
    assert!(ode_core::backup_dir_for(&good_mp).join(CRYPTTAB_BACKUP).exists());
}

#[test]
fn key_lookup_failure_skips_only_that_record() {
    let fx = Fixture::new();
    let mp0 = fx.mount_point("data0");
    let mp1 = fx.mount_point("data1");
    write(
        &fx.env.legacy_registry,
        &format!(
            "data0 /dev/sdc None {} ext4 False 0\ndata1 /dev/sdd None {} ext4 False 0\n",
            mp0.display(),
            mp1.display()
        ),
    );
    fx.disk.set_file_system("/dev/sdc", Some("ext4"));
    fx.disk.set_file_system("/dev/sdd", Some("ext4"));
    fx.disk.fail_for("controller_and_lun", "/dev/sdc");

    let report = fx.store.migrate_records().unwrap();

    assert_eq!(report.migrated, vec!["data1"]);
    assert_eq!(report.skipped[0].0, "data0");
    assert!(!report.registry_retired);
}
