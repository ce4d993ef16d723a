// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The managed encrypted mapping record.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Slot value meaning "unknown / not yet assigned".
pub const UNKNOWN_LUKS_SLOT: i32 = -1;

/// One managed device → mapper → mount point mapping.
///
/// Equality is field-wise. Two records are the same mapping when every field
/// matches; the string form of a record is never used for comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptRecord {
    /// Device-mapper name, unique within a host.
    pub mapper_name: String,
    /// Stable device identifier (a persistent path, not `/dev/sdX`).
    pub device_path: String,
    pub uses_cleartext_key: bool,
    /// Set while the LUKS header lives outside the device.
    pub luks_header_path: Option<PathBuf>,
    /// Absent for raw devices that are never mounted.
    pub mount_point: Option<PathBuf>,
    pub file_system: Option<String>,
    /// `-1` when unknown; never lower.
    pub current_luks_slot: i32,
    /// Explicit key file, overriding the derived BEK path.
    pub key_file_path: Option<PathBuf>,
}

impl CryptRecord {
    pub fn new(mapper_name: impl Into<String>, device_path: impl Into<String>) -> Self {
        Self {
            mapper_name: mapper_name.into(),
            device_path: device_path.into(),
            uses_cleartext_key: false,
            luks_header_path: None,
            mount_point: None,
            file_system: None,
            current_luks_slot: UNKNOWN_LUKS_SLOT,
            key_file_path: None,
        }
    }

    /// Set the LUKS slot, clamping anything below "unknown" to unknown.
    pub fn with_slot(mut self, slot: i32) -> Self {
        self.current_luks_slot = slot.max(UNKNOWN_LUKS_SLOT);
        self
    }

    /// Path of the unlocked device node, e.g. `/dev/mapper/<name>`.
    pub fn mapper_device(&self, mapper_dir: &Path) -> PathBuf {
        mapper_dir.join(&self.mapper_name)
    }

    /// True when this record describes the root file system.
    pub fn is_root_volume(&self) -> bool {
        self.mount_point.as_deref() == Some(Path::new("/"))
    }

    /// True when the header still lives in a side file.
    pub fn has_detached_header(&self) -> bool {
        self.luks_header_path.is_some()
    }

    /// Compare the fields the native tables can carry.
    ///
    /// The native tables have no slot column, so a record read back from
    /// them always reports an unknown slot. Their key file column is always
    /// filled in, so the key file is not compared either.
    pub fn same_table_mapping(&self, other: &CryptRecord) -> bool {
        self.mapper_name == other.mapper_name
            && self.device_path == other.device_path
            && self.uses_cleartext_key == other.uses_cleartext_key
            && self.luks_header_path == other.luks_header_path
            && self.mount_point == other.mount_point
            && self.file_system == other.file_system
    }
}

crate::builder! {
    pub struct CryptRecordBuilder => CryptRecord {
        into {
            mapper_name: String = "mapper_name",
            device_path: String = "/dev/dev_path",
        }
        set {
            uses_cleartext_key: bool = false,
            current_luks_slot: i32 = UNKNOWN_LUKS_SLOT,
        }
        option {
            luks_header_path: PathBuf = None,
            mount_point: PathBuf = None,
            file_system: String = None,
            key_file_path: PathBuf = None,
        }
    }
}

#[cfg(test)]
#[path = "record_tests.rs"]
mod tests;
