// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Native crypttab/fstab records.

use crate::error::MountConfigError;
use crate::files;
use crate::lines::{
    commented_fstab_entry, data_disk_fstab_line, format_crypttab_line, parse_crypttab_fields,
    parse_crypttab_line, parse_fstab_line, FstabLine,
};
use crate::store::{MountConfigStore, CRYPTTAB_BACKUP, FSTAB_BACKUP};
use ode_core::env::FSTAB_COMMENT;
use ode_core::CryptRecord;
use std::path::{Path, PathBuf};

impl MountConfigStore {
    pub(crate) fn read_native_records(&self) -> Result<Vec<CryptRecord>, MountConfigError> {
        let fstab: Vec<FstabLine> =
            files::read_lines(&self.env.fstab)?.iter().filter_map(|l| parse_fstab_line(l)).collect();
        let mut live = None;
        let mut records = Vec::new();

        for line in files::read_lines(&self.env.crypttab)? {
            let Some(mut record) = parse_crypttab_line(&line, &self.env) else {
                continue;
            };
            if let Some(entry) = fstab.iter().find(|f| self.is_mapper_device(&f.device, &record.mapper_name)) {
                record.mount_point = Some(PathBuf::from(&entry.mount_point));
                record.file_system = Some(entry.fs_type.clone());
            } else {
                let mounts = match &live {
                    Some(m) => m,
                    None => live.insert(self.disk.mount_items()?),
                };
                if let Some(m) = mounts.iter().find(|m| self.is_mapper_device(&m.src, &record.mapper_name)) {
                    record.mount_point = Some(m.dest.clone());
                    record.file_system = Some(m.fs.clone());
                }
            }
            records.push(record);
        }
        Ok(records)
    }

    /// Matches both the configured mapper directory and `/dev/mapper`.
    pub(crate) fn is_mapper_device(&self, device: &str, mapper_name: &str) -> bool {
        Path::new(device) == self.mapper_device(mapper_name) || device == format!("/dev/mapper/{mapper_name}")
    }

    pub(crate) fn crypttab_has_mapper(&self, mapper_name: &str) -> Result<bool, MountConfigError> {
        Ok(files::read_lines(&self.env.crypttab)?
            .iter()
            .filter_map(|l| parse_crypttab_fields(l))
            .any(|l| l.name == mapper_name))
    }

    /// Append a crypttab line unless the mapper already has one.
    pub(crate) fn append_crypttab_line(&self, mapper_name: &str, line: &str) -> Result<(), MountConfigError> {
        if self.crypttab_has_mapper(mapper_name)? {
            tracing::debug!(mapper = mapper_name, "crypttab already has a line for mapper");
            return Ok(());
        }
        files::append(&self.env.crypttab, line, 0o644)?;
        Ok(())
    }

    pub(crate) fn add_native_record(
        &self,
        record: &CryptRecord,
        backup_dir: Option<&Path>,
    ) -> Result<(), MountConfigError> {
        let key_file = self.crypttab_key_file(record)?;
        let crypttab_line = format_crypttab_line(record, &key_file);
        self.append_crypttab_line(&record.mapper_name, &crypttab_line)?;
        if let Some(dir) = backup_dir {
            files::write_backup(dir, CRYPTTAB_BACKUP, &crypttab_line)?;
        }

        if let Some(mount_point) = &record.mount_point {
            let existing = files::read_lines(&self.env.fstab)?.into_iter().find(|l| {
                parse_fstab_line(l).is_some_and(|f| self.is_mapper_device(&f.device, &record.mapper_name))
            });
            let fstab_line = match existing {
                Some(line) => line,
                None => {
                    let fs = record.file_system.as_deref().unwrap_or("auto");
                    let line = data_disk_fstab_line(&self.mapper_device(&record.mapper_name), mount_point, fs);
                    files::append(&self.env.fstab, &commented_fstab_entry(&line), 0o644)?;
                    line
                }
            };
            if let Some(dir) = backup_dir {
                files::write_backup(dir, FSTAB_BACKUP, &fstab_line)?;
            }
        }
        tracing::info!(mapper = %record.mapper_name, "added record to crypttab");
        Ok(())
    }

    pub(crate) fn remove_native_record(&self, record: &CryptRecord) -> Result<(), MountConfigError> {
        if self.env.crypttab.exists() {
            let kept: Vec<String> = files::read_lines(&self.env.crypttab)?
                .into_iter()
                .filter(|l| parse_crypttab_fields(l).is_none_or(|c| c.name != record.mapper_name))
                .collect();
            files::rewrite(&self.env.crypttab, &kept)?;
        }
        if self.env.fstab.exists() {
            let lines = files::read_lines(&self.env.fstab)?;
            let kept = drop_fstab_lines(&lines, |f| self.is_mapper_device(&f.device, &record.mapper_name));
            files::rewrite(&self.env.fstab, &kept)?;
        }
        Ok(())
    }
}

/// Drop matching fstab lines together with a marker comment right above them.
pub(crate) fn drop_fstab_lines(lines: &[String], matches: impl Fn(&FstabLine) -> bool) -> Vec<String> {
    let mut kept: Vec<String> = Vec::with_capacity(lines.len());
    for line in lines {
        if parse_fstab_line(line).is_some_and(|f| matches(&f)) {
            if kept.last().is_some_and(|prev| prev.trim() == FSTAB_COMMENT) {
                kept.pop();
            }
            continue;
        }
        kept.push(line.clone());
    }
    kept
}
