// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Boot-time unlock of LUKS devices and restore of their table lines.
//!
//! A device encrypted by this agent carries its key protector in a LUKS
//! token and a copy of its table lines inside the encrypted file system.
//! When the host's tables are lost (e.g. the disk moved to a new VM) the
//! device is unlocked with the token, mounted on a scratch point, and the
//! backed-up lines are put back.

use crate::error::MountConfigError;
use crate::files;
use crate::lines::{commented_fstab_entry, parse_crypttab_fields, parse_fstab_line, parse_legacy_line};
use crate::store::{MountConfigStore, CRYPTTAB_BACKUP, FSTAB_BACKUP, LEGACY_BACKUP};
use ode_core::{backup_dir_for, CryptRecord};
use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::Path;

/// Which backup format a restore used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoredFrom {
    Legacy,
    Native,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnlockReport {
    pub unlocked: Vec<String>,
    /// Devices already open or without a key protector
    pub skipped: Vec<String>,
    pub failed: Vec<(String, String)>,
}

enum UnlockOutcome {
    Unlocked,
    Skipped(&'static str),
    Failed(String),
}

impl MountConfigStore {
    /// Unlock every locked LUKS device that carries a key protector token.
    ///
    /// Devices are handled on one thread each; table edits serialize on the
    /// table lock.
    pub fn device_unlock_using_detached_header(&self) -> Result<UnlockReport, MountConfigError> {
        let devices = self.disk.luks_devices()?;
        let outcomes: Vec<(String, UnlockOutcome)> = std::thread::scope(|s| {
            let handles: Vec<_> = devices
                .iter()
                .map(|device| {
                    let name = format!("unlock-{}", device_basename(device));
                    let handle = std::thread::Builder::new()
                        .name(name)
                        .spawn_scoped(s, move || self.unlock_one(device));
                    (device.clone(), handle)
                })
                .collect();
            handles
                .into_iter()
                .map(|(device, handle)| {
                    let outcome = match handle {
                        Ok(h) => h.join().unwrap_or_else(|_| UnlockOutcome::Failed("unlock thread panicked".into())),
                        Err(e) => UnlockOutcome::Failed(format!("failed to spawn unlock thread: {e}")),
                    };
                    (device, outcome)
                })
                .collect()
        });

        let mut report = UnlockReport::default();
        for (device, outcome) in outcomes {
            match outcome {
                UnlockOutcome::Unlocked => report.unlocked.push(device),
                UnlockOutcome::Skipped(reason) => {
                    tracing::debug!(%device, reason, "not unlocking device");
                    report.skipped.push(device);
                }
                UnlockOutcome::Failed(error) => {
                    tracing::error!(%device, %error, "failed to unlock device");
                    report.failed.push((device, error));
                }
            }
        }
        Ok(report)
    }

    fn unlock_one(&self, device: &str) -> UnlockOutcome {
        match self.disk.is_device_locked(device) {
            Ok(true) => {}
            Ok(false) => return UnlockOutcome::Skipped("not locked"),
            Err(e) => return UnlockOutcome::Failed(e.to_string()),
        }
        let token = match self.disk.export_token(device) {
            Ok(Some(token)) => token,
            Ok(None) => return UnlockOutcome::Skipped("no key protector token"),
            Err(e) => return UnlockOutcome::Failed(e.to_string()),
        };
        let key_file = self.env.config_dir.join(format!("{}_protector", device_basename(device)));
        if let Err(e) = write_private(&key_file, &token) {
            return UnlockOutcome::Failed(format!("failed to write key protector: {e}"));
        }

        let mapper_name = uuid::Uuid::new_v4().to_string();
        if let Err(e) = self.disk.luks_open(device, &mapper_name, &key_file, None) {
            return UnlockOutcome::Failed(e.to_string());
        }
        tracing::info!(%device, mapper = %mapper_name, "unlocked device with key protector");

        let persistent = self.disk.persistent_path(device).unwrap_or_else(|_| device.to_string());
        let record = CryptRecord::new(mapper_name, persistent);
        match self.restore_backup_table_info(&record, &key_file) {
            Ok(from) => {
                tracing::info!(%device, ?from, "restored table lines from backup");
                UnlockOutcome::Unlocked
            }
            Err(MountConfigError::BackupUnbound { mapper }) => {
                tracing::warn!(%device, %mapper, "device unlocked but carries no table backup");
                UnlockOutcome::Unlocked
            }
            Err(e) => UnlockOutcome::Failed(e.to_string()),
        }
    }

    /// Put a device's backed-up table lines back into the host's tables.
    ///
    /// The device is opened if still locked, its mapper mounted on a scratch
    /// point, and the backup inside read. A legacy backup line wins over
    /// native ones. The scratch mount is always undone; if mounting fails the
    /// mapper is closed again.
    pub fn restore_backup_table_info(
        &self,
        record: &CryptRecord,
        key_file: &Path,
    ) -> Result<RestoredFrom, MountConfigError> {
        let device = &record.device_path;
        let header = record.luks_header_path.as_deref();
        if !self.disk.is_luks_device(device, header) {
            return Err(MountConfigError::NotLuks(device.clone()));
        }
        if self.disk.is_device_locked(device)? {
            self.disk.luks_open(device, &record.mapper_name, key_file, header)?;
        }

        let mapper_dev = self.mapper_device(&record.mapper_name);
        let scratch = self.env.scratch_mount_point(&record.mapper_name);
        std::fs::create_dir_all(&scratch)?;
        if let Err(e) = self.disk.mount_filesystem(&mapper_dev, &scratch, None) {
            if let Err(close) = self.disk.luks_close(&record.mapper_name) {
                tracing::warn!(mapper = %record.mapper_name, error = %close, "failed to close mapper after mount failure");
            }
            return Err(e.into());
        }

        let result = self.restore_from_backup_dir(&record.mapper_name, &backup_dir_for(&scratch));
        if let Err(e) = self.disk.umount(&scratch) {
            tracing::warn!(mount_point = %scratch.display(), error = %e, "failed to unmount scratch mount");
        }
        // Fails harmlessly while something is still mounted there.
        let _ = std::fs::remove_dir(&scratch);
        result
    }

    fn restore_from_backup_dir(&self, mapper_name: &str, dir: &Path) -> Result<RestoredFrom, MountConfigError> {
        let _tables = self.lock_tables();
        if let Some(record) = files::read_backup(dir, LEGACY_BACKUP)?.as_deref().and_then(parse_legacy_line) {
            self.add_record_locked(&record, None)?;
            return Ok(RestoredFrom::Legacy);
        }

        let crypttab_line = files::read_backup(dir, CRYPTTAB_BACKUP)?;
        let fstab_line = files::read_backup(dir, FSTAB_BACKUP)?;
        if crypttab_line.is_none() && fstab_line.is_none() {
            return Err(MountConfigError::BackupUnbound { mapper: mapper_name.to_string() });
        }
        if let Some(line) = crypttab_line {
            if let Some(parsed) = parse_crypttab_fields(&line) {
                self.append_crypttab_line(&parsed.name, &line)?;
            }
        }
        if let Some(line) = fstab_line {
            self.restore_fstab_line(&line)?;
        }
        Ok(RestoredFrom::Native)
    }

    fn restore_fstab_line(&self, line: &str) -> Result<(), MountConfigError> {
        let Some(wanted) = parse_fstab_line(line) else {
            return Ok(());
        };
        let present = files::read_lines(&self.env.fstab)?.iter().filter_map(|l| parse_fstab_line(l)).any(|f| {
            f.device == wanted.device && f.mount_point == wanted.mount_point
        });
        if !present {
            files::append(&self.env.fstab, &commented_fstab_entry(line), 0o644)?;
        }
        Ok(())
    }
}

fn device_basename(device: &str) -> &str {
    device.rsplit('/').next().unwrap_or(device)
}

/// Write `content` to a file only the owner can read.
fn write_private(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let mut file = OpenOptions::new().create(true).write(true).truncate(true).mode(0o600).open(path)?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    file.write_all(content.as_bytes())?;
    file.sync_all()
}

#[cfg(test)]
#[path = "unlock_tests.rs"]
mod tests;
