// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn new_record_has_unknown_slot() {
    let rec = CryptRecord::new("data0", "/dev/disk/azure/scsi1/lun0");
    assert_eq!(rec.current_luks_slot, UNKNOWN_LUKS_SLOT);
    assert!(!rec.uses_cleartext_key);
    assert!(rec.mount_point.is_none());
}

#[test]
fn slot_never_drops_below_unknown() {
    let rec = CryptRecord::new("data0", "/dev/sdc").with_slot(-7);
    assert_eq!(rec.current_luks_slot, -1);
    let rec = rec.with_slot(2);
    assert_eq!(rec.current_luks_slot, 2);
}

#[test]
fn equality_is_field_wise() {
    let a = CryptRecord::builder().mount_point("/data").build();
    let b = CryptRecord::builder().mount_point("/data").build();
    assert_eq!(a, b);

    let c = CryptRecord::builder().mount_point("/data").current_luks_slot(0).build();
    assert_ne!(a, c);
    assert!(a.same_table_mapping(&c));
}

#[test]
fn root_volume_detection() {
    assert!(CryptRecord::builder().mount_point("/").build().is_root_volume());
    assert!(!CryptRecord::builder().mount_point("/mnt/point").build().is_root_volume());
    assert!(!CryptRecord::builder().build().is_root_volume());
}

#[test]
fn mapper_device_joins_mapper_dir() {
    let rec = CryptRecord::builder().mapper_name("osencrypt").build();
    assert_eq!(
        rec.mapper_device(Path::new("/dev/mapper")),
        PathBuf::from("/dev/mapper/osencrypt")
    );
}

#[test]
fn serde_round_trip_keeps_absent_fields() {
    let rec = CryptRecord::builder().luks_header_path("/hdr").build();
    let json = serde_json::to_string(&rec).unwrap();
    let back: CryptRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(rec, back);
    assert!(back.mount_point.is_none());
}
