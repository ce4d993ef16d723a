// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The authoritative record of managed encrypted mappings.
//!
//! Two mutually exclusive on-disk formats carry the records: the legacy flat
//! registry and the native crypttab/fstab pair. The registry wins while it
//! lists any data volume; otherwise the native tables are authoritative.
//! Root-volume registry lines are never migrated and stay visible in both
//! modes.

use crate::error::MountConfigError;
use crate::files;
use ode_adapters::DiskUtil;
use ode_core::env::BEK_KEY_FILE_NAME;
use ode_core::{CryptRecord, EncryptionEnvironment};
use parking_lot::{Mutex, MutexGuard};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const CRYPTTAB_BACKUP: &str = "crypttab_line";
pub const FSTAB_BACKUP: &str = "fstab_line";
pub const LEGACY_BACKUP: &str = "azure_crypt_mount_line";

pub struct MountConfigStore {
    pub(crate) env: EncryptionEnvironment,
    pub(crate) disk: Arc<dyn DiskUtil>,
    table_lock: Mutex<()>,
}

impl MountConfigStore {
    pub fn new(env: EncryptionEnvironment, disk: Arc<dyn DiskUtil>) -> Self {
        Self { env, disk, table_lock: Mutex::new(()) }
    }

    pub fn env(&self) -> &EncryptionEnvironment {
        &self.env
    }

    pub fn disk(&self) -> &Arc<dyn DiskUtil> {
        &self.disk
    }

    /// Held across every read-modify-write of the tables.
    pub(crate) fn lock_tables(&self) -> MutexGuard<'_, ()> {
        self.table_lock.lock()
    }

    /// True iff the registry exists and lists a non-root volume.
    pub fn should_use_legacy_registry(&self) -> Result<bool, MountConfigError> {
        Ok(self.read_legacy_records()?.iter().any(|r| !r.is_root_volume()))
    }

    /// All managed mappings, merged with what the host reports live.
    pub fn list_records(&self) -> Result<Vec<CryptRecord>, MountConfigError> {
        let legacy = self.read_legacy_records()?;
        let mut records = if legacy.iter().any(|r| !r.is_root_volume()) {
            legacy
        } else {
            let mut native = self.read_native_records()?;
            for root in legacy {
                if !native.iter().any(|r| r.mapper_name == root.mapper_name) {
                    native.insert(0, root);
                }
            }
            native
        };

        let os_mapper = self.disk.os_mapper_name();
        if !records.iter().any(|r| r.mapper_name == os_mapper) && self.disk.encryption_status()?.os_encrypted() {
            if let Some(os) = self.synthesize_os_record(&os_mapper)? {
                records.insert(0, os);
            }
        }
        Ok(records)
    }

    /// Describe the OS volume from the live mount table and mapper status.
    fn synthesize_os_record(&self, os_mapper: &str) -> Result<Option<CryptRecord>, MountConfigError> {
        let mounts = self.disk.mount_items()?;
        let Some(mount) = mounts.iter().find(|m| self.is_mapper_device(&m.src, os_mapper)) else {
            tracing::warn!(mapper = os_mapper, "OS volume reported encrypted but its mapper is not mounted");
            return Ok(None);
        };
        let Some(device) = self.disk.mapper_backing_device(os_mapper)? else {
            tracing::warn!(mapper = os_mapper, "no backing device for OS mapper");
            return Ok(None);
        };
        let mut record = CryptRecord::new(os_mapper, device);
        record.mount_point = Some(mount.dest.clone());
        record.file_system = Some(mount.fs.clone());
        Ok(Some(record))
    }

    /// Add a record to the authoritative format. False on any failure.
    pub fn add_record(&self, record: &CryptRecord, backup_dir: Option<&Path>) -> bool {
        let _tables = self.lock_tables();
        match self.add_record_locked(record, backup_dir) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(mapper = %record.mapper_name, error = %e, "failed to add crypt record");
                false
            }
        }
    }

    pub(crate) fn add_record_locked(
        &self,
        record: &CryptRecord,
        backup_dir: Option<&Path>,
    ) -> Result<(), MountConfigError> {
        if self.should_use_legacy_registry()? {
            self.add_legacy_record(record, backup_dir)
        } else {
            self.add_native_record(record, backup_dir)
        }
    }

    /// Drop every line for the record's mapper and its backups. False on failure.
    pub fn remove_record(&self, record: &CryptRecord, backup_dir: Option<&Path>) -> bool {
        let _tables = self.lock_tables();
        let result = (|| -> Result<(), MountConfigError> {
            if self.should_use_legacy_registry()? {
                self.remove_legacy_record(record)?;
            } else {
                self.remove_native_record(record)?;
            }
            if let Some(dir) = backup_dir {
                for name in [CRYPTTAB_BACKUP, FSTAB_BACKUP, LEGACY_BACKUP] {
                    files::remove_if_present(&dir.join(name))?;
                }
            }
            Ok(())
        })();
        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(mapper = %record.mapper_name, error = %e, "failed to remove crypt record");
                false
            }
        }
    }

    /// Remove then add; the two halves are separate table transactions.
    pub fn update_record(&self, record: &CryptRecord, backup_dir: Option<&Path>) -> bool {
        self.remove_record(record, backup_dir) && self.add_record(record, backup_dir)
    }

    /// `<key mount>/LinuxPassPhraseFileName[_<controller>_<lun>]`
    pub fn key_file_path(
        &self,
        device_path: &str,
        key_mount_point: Option<&Path>,
    ) -> Result<PathBuf, MountConfigError> {
        let mount = key_mount_point.unwrap_or(&self.env.bek_mount_point);
        let name = match self.disk.controller_and_lun(device_path)? {
            Some((controller, lun)) => format!("{BEK_KEY_FILE_NAME}_{controller}_{lun}"),
            None => BEK_KEY_FILE_NAME.to_string(),
        };
        Ok(mount.join(name))
    }

    /// Key file a crypttab line should reference for this record.
    pub(crate) fn crypttab_key_file(&self, record: &CryptRecord) -> Result<PathBuf, MountConfigError> {
        if record.uses_cleartext_key {
            return Ok(self.env.cleartext_key_path(&record.mapper_name));
        }
        match &record.key_file_path {
            Some(path) => Ok(path.clone()),
            None => self.key_file_path(&record.device_path, None),
        }
    }

    pub(crate) fn mapper_device(&self, mapper_name: &str) -> PathBuf {
        self.env.mapper_dir.join(mapper_name)
    }

    /// Key file to unlock a persisted record with.
    pub fn unlock_key_file(&self, record: &CryptRecord) -> Result<PathBuf, MountConfigError> {
        self.crypttab_key_file(record)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
