// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-way migration from the legacy registry to crypttab/fstab.

use crate::error::MountConfigError;
use crate::files;
use crate::lines::{data_disk_fstab_line, format_crypttab_line};
use crate::store::{MountConfigStore, CRYPTTAB_BACKUP, FSTAB_BACKUP};
use ode_core::{backup_dir_for, is_mountable_file_system, CryptRecord};

/// Outcome of one migration pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub migrated: Vec<String>,
    /// `(mapper, reason)` for records left in the registry
    pub skipped: Vec<(String, String)>,
    /// True once the registry no longer lists data volumes
    pub registry_retired: bool,
}

impl MountConfigStore {
    /// Move every data-volume record out of the legacy registry.
    ///
    /// A no-op unless the registry lists a data volume. Records whose device
    /// is unreadable, carries an unsupported file system, or fails to migrate
    /// are skipped and the rest carry on. While anything is skipped the
    /// registry stays in place so a later boot can retry. Every step is
    /// idempotent.
    pub fn migrate_records(&self) -> Result<MigrationReport, MountConfigError> {
        let _tables = self.lock_tables();
        let legacy = self.read_legacy_records()?;
        let mut report = MigrationReport::default();
        if !legacy.iter().any(|r| !r.is_root_volume()) {
            return Ok(report);
        }

        for record in legacy.iter().filter(|r| !r.is_root_volume()) {
            let skip = match self.migrate_one(record) {
                Ok(skip) => skip,
                Err(e) => Some(e.to_string()),
            };
            match skip {
                None => {
                    tracing::info!(mapper = %record.mapper_name, "migrated record to crypttab");
                    report.migrated.push(record.mapper_name.clone());
                }
                Some(reason) => {
                    tracing::warn!(mapper = %record.mapper_name, device = %record.device_path, %reason, "skipping migration");
                    report.skipped.push((record.mapper_name.clone(), reason));
                }
            }
        }

        if report.skipped.is_empty() {
            self.retire_legacy_registry(&legacy)?;
            report.registry_retired = true;
        }
        Ok(report)
    }

    /// Migrate one record. `Ok(Some(reason))` when it has to stay behind.
    fn migrate_one(&self, record: &CryptRecord) -> Result<Option<String>, MountConfigError> {
        self.ensure_bek_in_fstab_locked()?;
        self.add_bek_to_default_cryptdisks()?;

        match self.disk.device_file_system(&record.device_path) {
            Err(e) => return Ok(Some(format!("device unavailable: {e}"))),
            Ok(Some(fs)) if is_mountable_file_system(&fs) => {}
            Ok(fs) => return Ok(Some(format!("unsupported file system {}", fs.as_deref().unwrap_or("none")))),
        }

        let key_file = self.crypttab_key_file(record)?;
        let crypttab_line = format_crypttab_line(record, &key_file);
        self.append_crypttab_line(&record.mapper_name, &crypttab_line)?;

        let Some(mount_point) = &record.mount_point else {
            return Ok(None);
        };
        let fstab_line = data_disk_fstab_line(&self.mapper_device(&record.mapper_name), mount_point, "auto");
        self.replace_fstab_mount_locked(mount_point, &fstab_line)?;

        let backup_dir = backup_dir_for(mount_point);
        files::write_backup(&backup_dir, CRYPTTAB_BACKUP, &crypttab_line)?;
        files::write_backup(&backup_dir, FSTAB_BACKUP, &fstab_line)?;
        Ok(None)
    }
}

#[cfg(test)]
#[path = "migrate_tests.rs"]
mod tests;
