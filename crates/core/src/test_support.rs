// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::{CryptRecord, EncryptionEnvironment};
use std::path::Path;

// ── Proptest strategies ─────────────────────────────────────────────────

/// Proptest strategies for records and phases.
pub mod strategies {
    use crate::{CryptRecord, Phase};
    use proptest::prelude::*;
    use std::path::PathBuf;

    pub fn arb_phase() -> impl Strategy<Value = Phase> {
        prop_oneof![
            Just(Phase::NotStarted),
            Just(Phase::BackupHeader),
            Just(Phase::CopyData),
            Just(Phase::EncryptHeader),
            Just(Phase::EncryptDevice),
            Just(Phase::Resume),
            Just(Phase::Completed),
        ]
    }

    /// A token safe for any whitespace-separated table column.
    pub fn arb_token() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_-]{0,11}"
    }

    pub fn arb_abs_path() -> impl Strategy<Value = PathBuf> {
        prop::collection::vec(arb_token(), 1..4)
            .prop_map(|parts| PathBuf::from(format!("/{}", parts.join("/"))))
    }

    /// Records whose every column survives the legacy registry grammar.
    pub fn arb_record() -> impl Strategy<Value = CryptRecord> {
        (
            arb_token(),
            arb_abs_path(),
            any::<bool>(),
            proptest::option::of(arb_abs_path()),
            proptest::option::of(arb_abs_path()),
            proptest::option::of(prop_oneof![Just("ext4"), Just("xfs"), Just("btrfs")]),
            -1i32..8,
        )
            .prop_map(|(mapper, dev, cleartext, header, mount, fs, slot)| CryptRecord {
                mapper_name: mapper,
                device_path: dev.display().to_string(),
                uses_cleartext_key: cleartext,
                luks_header_path: header,
                mount_point: mount,
                file_system: fs.map(str::to_string),
                current_luks_slot: slot,
                key_file_path: None,
            })
    }
}

// ── Fixtures ────────────────────────────────────────────────────────────

/// Environment relocated under `root` with its directories created.
pub fn scratch_env(root: &Path) -> std::io::Result<EncryptionEnvironment> {
    let env = EncryptionEnvironment::under_root(root);
    for dir in [
        &env.config_dir,
        &env.ongoing_dir,
        &env.header_dir,
        &env.bek_mount_point,
        &env.mapper_dir,
        &env.scratch_mount_root,
    ] {
        std::fs::create_dir_all(dir)?;
    }
    if let Some(etc) = env.fstab.parent() {
        std::fs::create_dir_all(etc)?;
    }
    Ok(env)
}

/// A data-disk record mounted at `mount_point`.
pub fn data_record(mapper: &str, device: &str, mount_point: &Path) -> CryptRecord {
    CryptRecord::builder()
        .mapper_name(mapper)
        .device_path(device)
        .mount_point(mount_point)
        .file_system("ext4")
        .build()
}
