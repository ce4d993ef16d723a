// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The block-device and LUKS collaborator seam.
//!
//! Everything the agent needs to know about live disks goes through
//! [`DiskUtil`]. The system implementation shells out to standard tools; the
//! fake keeps an in-memory picture of the host for tests.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Mapper name used for an encrypted OS volume.
pub const OS_MAPPER_NAME: &str = "osencrypt";

#[derive(Debug, Error)]
pub enum DiskError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("`{command}` exited with {code}: {stderr}")]
    CommandFailed { command: String, code: i32, stderr: String },
    #[error("could not parse {what}: {detail}")]
    Parse { what: &'static str, detail: String },
}

impl DiskError {
    pub fn command_failed(command: impl Into<String>, code: i32, stderr: &str) -> Self {
        DiskError::CommandFailed { command: command.into(), code, stderr: stderr.trim().to_string() }
    }
}

/// One line of the live mount table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountItem {
    pub src: String,
    pub dest: PathBuf,
    pub fs: String,
}

impl MountItem {
    pub fn new(src: impl Into<String>, dest: impl Into<PathBuf>, fs: impl Into<String>) -> Self {
        Self { src: src.into(), dest: dest.into(), fs: fs.into() }
    }
}

/// Encryption state of the OS and data volumes as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EncryptionStatus {
    pub os: String,
    #[serde(default)]
    pub data: String,
}

impl EncryptionStatus {
    pub fn os_encrypted(&self) -> bool {
        self.os.eq_ignore_ascii_case("Encrypted")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DistroInfo {
    pub id: String,
    pub version: String,
}

impl DistroInfo {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self { id: id.into(), version: version.into() }
    }

    /// Ubuntu 14.x predates `nofail` support for the BEK volume.
    pub fn is_ubuntu_14(&self) -> bool {
        self.id.eq_ignore_ascii_case("ubuntu") && self.version.starts_with("14")
    }
}

/// Live disk state and LUKS operations.
pub trait DiskUtil: Send + Sync {
    fn encryption_status(&self) -> Result<EncryptionStatus, DiskError>;

    fn os_mapper_name(&self) -> String {
        OS_MAPPER_NAME.to_string()
    }

    fn mount_items(&self) -> Result<Vec<MountItem>, DiskError>;

    /// SCSI controller and LUN of an attached data disk, if it is one.
    fn controller_and_lun(&self, device_path: &str) -> Result<Option<(u32, u32)>, DiskError>;

    /// File system on a device. `Err` means the device could not be found.
    fn device_file_system(&self, device_path: &str) -> Result<Option<String>, DiskError>;

    fn is_device_locked(&self, device_path: &str) -> Result<bool, DiskError>;

    fn is_luks_device(&self, device_path: &str, header: Option<&Path>) -> bool;

    /// Device paths carrying a LUKS signature.
    fn luks_devices(&self) -> Result<Vec<String>, DiskError>;

    fn luks_open(
        &self,
        device_path: &str,
        mapper_name: &str,
        key_file: &Path,
        header: Option<&Path>,
    ) -> Result<(), DiskError>;

    fn luks_close(&self, mapper_name: &str) -> Result<(), DiskError>;

    fn mount_filesystem(
        &self,
        device: &Path,
        mount_point: &Path,
        file_system: Option<&str>,
    ) -> Result<(), DiskError>;

    fn umount(&self, mount_point: &Path) -> Result<(), DiskError>;

    /// Check and shrink the file system so it ends at `target_bytes`.
    fn check_shrink_fs(&self, device_path: &str, target_bytes: u64) -> Result<(), DiskError>;

    /// Key protector stored in the device's LUKS token, if any.
    fn export_token(&self, device_path: &str) -> Result<Option<String>, DiskError>;

    /// True when the device is part-way through an online transform.
    fn luks_check_reencryption(&self, device_path: &str, header: Option<&Path>) -> bool;

    fn mapper_backing_device(&self, mapper_name: &str) -> Result<Option<String>, DiskError>;

    /// Stable path for a kernel device node (falls back to the node itself).
    fn persistent_path(&self, device_path: &str) -> Result<String, DiskError>;

    fn distro(&self) -> Result<DistroInfo, DiskError>;
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::{DiskError, DiskUtil, DistroInfo, EncryptionStatus, MountItem};
    use parking_lot::Mutex;
    use std::collections::{HashMap, HashSet};
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    #[derive(Default)]
    struct FakeDiskState {
        os_encrypted: bool,
        mounts: Vec<MountItem>,
        luns: HashMap<String, (u32, u32)>,
        file_systems: HashMap<String, Option<String>>,
        luks: HashSet<String>,
        unlocked: HashSet<String>,
        /// mapper -> device
        open: HashMap<String, String>,
        tokens: HashMap<String, String>,
        reencrypting: HashSet<String>,
        backing: HashMap<String, String>,
        persistent: HashMap<String, String>,
        distro: DistroInfo,
        failing: HashSet<&'static str>,
        /// (op, arg) pairs that fail
        failing_for: HashSet<(&'static str, String)>,
        calls: Vec<String>,
    }

    /// In-memory host for tests.
    ///
    /// `luks_open` creates the mapper node as a plain file under the mapper
    /// directory (when one is set) so callers can read and write it, and
    /// `luks_close` removes it again. Device contents are not linked.
    #[derive(Clone, Default)]
    pub struct FakeDiskUtil {
        inner: Arc<Mutex<FakeDiskState>>,
        mapper_dir: Option<PathBuf>,
    }

    impl FakeDiskUtil {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_mapper_dir(mut self, dir: impl Into<PathBuf>) -> Self {
            self.mapper_dir = Some(dir.into());
            self
        }

        pub fn set_os_encrypted(&self, encrypted: bool) {
            self.inner.lock().os_encrypted = encrypted;
        }

        pub fn add_mount(&self, item: MountItem) {
            self.inner.lock().mounts.push(item);
        }

        pub fn set_lun(&self, device: &str, controller: u32, lun: u32) {
            self.inner.lock().luns.insert(device.to_string(), (controller, lun));
        }

        /// Make the device visible with the given file system.
        pub fn set_file_system(&self, device: &str, fs: Option<&str>) {
            self.inner.lock().file_systems.insert(device.to_string(), fs.map(str::to_string));
        }

        /// Register a locked LUKS device.
        pub fn add_luks_device(&self, device: &str) {
            let mut state = self.inner.lock();
            state.luks.insert(device.to_string());
            state.file_systems.insert(device.to_string(), Some("crypto_LUKS".to_string()));
        }

        pub fn set_token(&self, device: &str, token: &str) {
            self.inner.lock().tokens.insert(device.to_string(), token.to_string());
        }

        pub fn set_reencrypting(&self, device: &str) {
            self.inner.lock().reencrypting.insert(device.to_string());
        }

        pub fn set_backing_device(&self, mapper: &str, device: &str) {
            self.inner.lock().backing.insert(mapper.to_string(), device.to_string());
        }

        pub fn set_persistent_path(&self, device: &str, persistent: &str) {
            self.inner.lock().persistent.insert(device.to_string(), persistent.to_string());
        }

        pub fn set_distro(&self, distro: DistroInfo) {
            self.inner.lock().distro = distro;
        }

        /// Make every call of the named operation fail.
        pub fn fail(&self, op: &'static str) {
            self.inner.lock().failing.insert(op);
        }

        /// Make the named operation fail for one argument only.
        pub fn fail_for(&self, op: &'static str, arg: &str) {
            self.inner.lock().failing_for.insert((op, arg.to_string()));
        }

        /// Undo [`FakeDiskUtil::fail`].
        pub fn succeed(&self, op: &str) {
            self.inner.lock().failing.remove(op);
        }

        pub fn is_unlocked(&self, device: &str) -> bool {
            self.inner.lock().unlocked.contains(device)
        }

        /// Recorded calls as `op arg`, in call order.
        pub fn calls(&self) -> Vec<String> {
            self.inner.lock().calls.clone()
        }

        pub fn calls_to(&self, op: &str) -> Vec<String> {
            let prefix = format!("{op} ");
            self.calls().into_iter().filter(|c| c.starts_with(&prefix)).collect()
        }

        fn record(&self, op: &'static str, arg: impl std::fmt::Display) -> Result<(), DiskError> {
            let arg = arg.to_string();
            let mut state = self.inner.lock();
            state.calls.push(format!("{op} {arg}"));
            if state.failing.contains(op) || state.failing_for.contains(&(op, arg)) {
                return Err(DiskError::command_failed(op, 1, "injected failure"));
            }
            Ok(())
        }
    }

    impl DiskUtil for FakeDiskUtil {
        fn encryption_status(&self) -> Result<EncryptionStatus, DiskError> {
            let os = if self.inner.lock().os_encrypted { "Encrypted" } else { "NotEncrypted" };
            Ok(EncryptionStatus { os: os.to_string(), data: String::new() })
        }

        fn mount_items(&self) -> Result<Vec<MountItem>, DiskError> {
            Ok(self.inner.lock().mounts.clone())
        }

        fn controller_and_lun(&self, device_path: &str) -> Result<Option<(u32, u32)>, DiskError> {
            self.record("controller_and_lun", device_path)?;
            Ok(self.inner.lock().luns.get(device_path).copied())
        }

        fn device_file_system(&self, device_path: &str) -> Result<Option<String>, DiskError> {
            self.record("device_file_system", device_path)?;
            self.inner
                .lock()
                .file_systems
                .get(device_path)
                .cloned()
                .ok_or_else(|| DiskError::DeviceNotFound(device_path.to_string()))
        }

        fn is_device_locked(&self, device_path: &str) -> Result<bool, DiskError> {
            let state = self.inner.lock();
            Ok(state.luks.contains(device_path) && !state.unlocked.contains(device_path))
        }

        fn is_luks_device(&self, device_path: &str, header: Option<&Path>) -> bool {
            header.is_some_and(|h| h.exists()) || self.inner.lock().luks.contains(device_path)
        }

        fn luks_devices(&self) -> Result<Vec<String>, DiskError> {
            let mut devices: Vec<String> = self.inner.lock().luks.iter().cloned().collect();
            devices.sort();
            Ok(devices)
        }

        fn luks_open(
            &self,
            device_path: &str,
            mapper_name: &str,
            _key_file: &Path,
            header: Option<&Path>,
        ) -> Result<(), DiskError> {
            let via = header.map(|h| format!(" header={}", h.display())).unwrap_or_default();
            self.record("luks_open", format!("{device_path} {mapper_name}{via}"))?;
            if let Some(dir) = &self.mapper_dir {
                std::fs::create_dir_all(dir)?;
                std::fs::OpenOptions::new().create(true).append(true).open(dir.join(mapper_name))?;
            }
            let mut state = self.inner.lock();
            state.unlocked.insert(device_path.to_string());
            state.open.insert(mapper_name.to_string(), device_path.to_string());
            Ok(())
        }

        fn luks_close(&self, mapper_name: &str) -> Result<(), DiskError> {
            self.record("luks_close", mapper_name)?;
            {
                let mut state = self.inner.lock();
                if let Some(device) = state.open.remove(mapper_name) {
                    state.unlocked.remove(&device);
                }
            }
            if let Some(dir) = &self.mapper_dir {
                match std::fs::remove_file(dir.join(mapper_name)) {
                    Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
                    _ => {}
                }
            }
            Ok(())
        }

        fn mount_filesystem(
            &self,
            device: &Path,
            mount_point: &Path,
            _file_system: Option<&str>,
        ) -> Result<(), DiskError> {
            self.record("mount", format!("{} {}", device.display(), mount_point.display()))
        }

        fn umount(&self, mount_point: &Path) -> Result<(), DiskError> {
            self.record("umount", mount_point.display())
        }

        fn check_shrink_fs(&self, device_path: &str, target_bytes: u64) -> Result<(), DiskError> {
            self.record("check_shrink_fs", format!("{device_path} {target_bytes}"))
        }

        fn export_token(&self, device_path: &str) -> Result<Option<String>, DiskError> {
            Ok(self.inner.lock().tokens.get(device_path).cloned())
        }

        fn luks_check_reencryption(&self, device_path: &str, _header: Option<&Path>) -> bool {
            self.inner.lock().reencrypting.contains(device_path)
        }

        fn mapper_backing_device(&self, mapper_name: &str) -> Result<Option<String>, DiskError> {
            Ok(self.inner.lock().backing.get(mapper_name).cloned())
        }

        fn persistent_path(&self, device_path: &str) -> Result<String, DiskError> {
            Ok(self
                .inner
                .lock()
                .persistent
                .get(device_path)
                .cloned()
                .unwrap_or_else(|| device_path.to_string()))
        }

        fn distro(&self) -> Result<DistroInfo, DiskError> {
            Ok(self.inner.lock().distro.clone())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeDiskUtil;

#[cfg(test)]
#[path = "disk_tests.rs"]
mod tests;
