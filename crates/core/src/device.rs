// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Block device descriptors handed to the pipeline by discovery.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// File systems the mount tables accept when migrating a record.
pub const MOUNTABLE_FILE_SYSTEMS: &[&str] = &["ext2", "ext3", "ext4", "xfs", "btrfs"];

/// File systems the online pipeline knows how to shrink in place.
pub const SHRINKABLE_FILE_SYSTEMS: &[&str] = &["ext2", "ext3", "ext4"];

pub fn is_mountable_file_system(fs: &str) -> bool {
    MOUNTABLE_FILE_SYSTEMS.contains(&fs.to_ascii_lowercase().as_str())
}

pub fn is_shrinkable_file_system(fs: &str) -> bool {
    SHRINKABLE_FILE_SYSTEMS.contains(&fs.to_ascii_lowercase().as_str())
}

/// One attached block device as seen by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceItem {
    /// Kernel name, e.g. `sdc`
    pub name: String,
    /// Device node the bulk copy reads and writes, e.g. `/dev/sdc`
    pub path: String,
    pub file_system: Option<String>,
    pub mount_point: Option<PathBuf>,
    pub size_bytes: u64,
}

impl DeviceItem {
    pub fn is_mounted(&self) -> bool {
        self.mount_point.is_some()
    }
}

crate::builder! {
    pub struct DeviceItemBuilder => DeviceItem {
        into {
            name: String = "sdc",
            path: String = "/dev/sdc",
        }
        set {
            size_bytes: u64 = 64 * 1024 * 1024,
        }
        option {
            file_system: String = Some("ext4".to_string()),
            mount_point: PathBuf = Some(PathBuf::from("/data")),
        }
    }
}

#[cfg(test)]
#[path = "device_tests.rs"]
mod tests;
