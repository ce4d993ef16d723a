// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The legacy flat registry (`azure_crypt_mount`).

use crate::error::MountConfigError;
use crate::files;
use crate::lines::{format_legacy_line, parse_legacy_line};
use crate::store::{MountConfigStore, LEGACY_BACKUP};
use ode_core::CryptRecord;
use std::path::Path;

impl MountConfigStore {
    pub(crate) fn read_legacy_records(&self) -> Result<Vec<CryptRecord>, MountConfigError> {
        let lines = files::read_lines(&self.env.legacy_registry)?;
        Ok(lines.iter().filter_map(|l| parse_legacy_line(l)).collect())
    }

    pub(crate) fn add_legacy_record(
        &self,
        record: &CryptRecord,
        backup_dir: Option<&Path>,
    ) -> Result<(), MountConfigError> {
        let line = format_legacy_line(record);
        let path = &self.env.legacy_registry;
        let existing = files::read_lines(path)?;
        if existing.iter().any(|l| is_line_for(l, &record.mapper_name)) {
            // One line per mapper: replace in place
            let mut replaced = false;
            let lines: Vec<String> = existing
                .into_iter()
                .filter_map(|l| {
                    if !is_line_for(&l, &record.mapper_name) {
                        Some(l)
                    } else if replaced {
                        None
                    } else {
                        replaced = true;
                        Some(line.clone())
                    }
                })
                .collect();
            files::rewrite(path, &lines)?;
        } else {
            files::append(path, &line, 0o644)?;
        }
        if let Some(dir) = backup_dir {
            files::write_backup(dir, LEGACY_BACKUP, &line)?;
        }
        tracing::info!(mapper = %record.mapper_name, "added record to legacy registry");
        Ok(())
    }

    pub(crate) fn remove_legacy_record(&self, record: &CryptRecord) -> Result<(), MountConfigError> {
        let path = &self.env.legacy_registry;
        if !path.exists() {
            return Ok(());
        }
        let kept: Vec<String> = files::read_lines(path)?
            .into_iter()
            .filter(|l| !is_line_for(l, &record.mapper_name))
            .collect();
        files::rewrite(path, &kept)?;
        Ok(())
    }

    /// Hand the registry over to the native tables after migration.
    ///
    /// Without root-volume lines the registry is renamed to `<registry>.backup`.
    /// Root-volume lines are kept in place, with a full copy saved alongside.
    pub(crate) fn retire_legacy_registry(&self, records: &[CryptRecord]) -> Result<(), MountConfigError> {
        let path = &self.env.legacy_registry;
        let mut backup = path.as_os_str().to_owned();
        backup.push(".backup");
        let roots: Vec<String> =
            records.iter().filter(|r| r.is_root_volume()).map(format_legacy_line).collect();
        if roots.is_empty() {
            std::fs::rename(path, &backup)?;
        } else {
            std::fs::copy(path, &backup)?;
            files::rewrite(path, &roots)?;
        }
        tracing::info!(registry = %path.display(), kept_root_lines = roots.len(), "retired legacy registry");
        Ok(())
    }
}

fn is_line_for(line: &str, mapper_name: &str) -> bool {
    parse_legacy_line(line).is_some_and(|r| r.mapper_name == mapper_name)
}
