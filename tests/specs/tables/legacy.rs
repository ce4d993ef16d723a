//! Mount table specs
//!
//! Which table format is authoritative, and how records read back.

use crate::prelude::*;
use crate::prelude::assert_eq;

#[test]
fn native_tables_round_trip_a_record() {
    let host = Host::new();
    let store = host.store();
    let mp = host.mount_point("data");
    let record = CryptRecord::builder()
        .mapper_name("data0")
        .device_path("/dev/disk/azure/scsi1/lun0")
        .mount_point(mp.clone())
        .file_system("ext4")
        .key_file_path(host.env.default_key_file())
        .build();

    assert!(store.add_record(&record, None));

    let listed = host.store().list_records().unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].same_table_mapping(&record));
    assert!(read(&host.env.crypttab).starts_with("data0 /dev/disk/azure/scsi1/lun0 "));
}

#[test]
fn legacy_registry_wins_while_it_lists_data_volumes() {
    let host = Host::new();
    host.write(&host.env.legacy_registry, "data0 /dev/sdc None /data ext4 False 0\n");
    host.write(&host.env.crypttab, "data1 /dev/sdd /key luks,nofail\n");
    let store = host.store();

    assert!(store.should_use_legacy_registry().unwrap());
    let names: Vec<_> = store.list_records().unwrap().into_iter().map(|r| r.mapper_name).collect();
    assert_eq!(names, vec!["data0"]);

    assert!(store.remove_record(&CryptRecord::new("data0", "/dev/sdc"), None));
    assert!(!store.should_use_legacy_registry().unwrap());
}
