// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Edits to fstab and the cryptdisks defaults that are not tied to one record.

use crate::error::MountConfigError;
use crate::files;
use crate::lines::{add_nofail_if_absent, bek_fstab_line, commented_fstab_entry, is_bek_line, parse_fstab_line};
use crate::native::drop_fstab_lines;
use crate::store::MountConfigStore;
use std::path::Path;

const BEK_CRYPTDISKS_MARKER: &str = "azure_bek_disk";

impl MountConfigStore {
    /// Switch the fstab entry for `mount_point` over to its encrypted mapper.
    ///
    /// fstab is copied to its backup path first. In legacy mode the line is
    /// removed since the registry mounts the volume; in native mode its
    /// device becomes `mapper_device` and `nofail` is ensured. The BEK
    /// volume line and the cryptdisks mount are added either way.
    pub fn modify_fstab_entry_encrypt(
        &self,
        mount_point: &Path,
        mapper_device: &Path,
    ) -> Result<(), MountConfigError> {
        if mount_point.as_os_str().is_empty() {
            return Ok(());
        }
        let _tables = self.lock_tables();
        if self.env.fstab.exists() {
            std::fs::copy(&self.env.fstab, &self.env.fstab_backup)?;
        }

        let target = mount_point.to_string_lossy();
        let lines = files::read_lines(&self.env.fstab)?;
        let updated = if self.should_use_legacy_registry()? {
            lines.into_iter().filter(|l| parse_fstab_line(l).is_none_or(|f| f.mount_point != target)).collect()
        } else {
            lines
                .into_iter()
                .map(|line| match parse_fstab_line(&line) {
                    Some(f) if f.mount_point == target => {
                        let mut fields: Vec<String> = line.split_whitespace().map(str::to_string).collect();
                        fields[0] = mapper_device.display().to_string();
                        add_nofail_if_absent(&fields.join(" "))
                    }
                    _ => line,
                })
                .collect::<Vec<_>>()
        };
        if self.env.fstab.exists() {
            files::rewrite(&self.env.fstab, &updated)?;
        }
        tracing::info!(mount_point = %mount_point.display(), mapper = %mapper_device.display(), "fstab entry switched for encryption");

        self.ensure_bek_in_fstab_locked()?;
        self.add_bek_to_default_cryptdisks()?;
        Ok(())
    }

    /// Add the BEK volume line to fstab if missing. True when it was added.
    pub fn ensure_bek_in_fstab(&self) -> Result<bool, MountConfigError> {
        let _tables = self.lock_tables();
        self.ensure_bek_in_fstab_locked()
    }

    pub(crate) fn ensure_bek_in_fstab_locked(&self) -> Result<bool, MountConfigError> {
        if files::read_lines(&self.env.fstab)?.iter().any(|l| is_bek_line(l)) {
            return Ok(false);
        }
        let line = bek_fstab_line(&self.env.bek_mount_point, &self.disk.distro()?);
        files::append(&self.env.fstab, &line, 0o644)?;
        tracing::info!("added BEK volume to fstab");
        Ok(true)
    }

    /// Make cryptdisks mount the BEK volume before unlocking. True when changed.
    ///
    /// Only an existing defaults file is edited.
    pub fn add_bek_to_default_cryptdisks(&self) -> Result<bool, MountConfigError> {
        let path = &self.env.default_cryptdisks;
        if !path.exists() {
            return Ok(false);
        }
        let content = std::fs::read_to_string(path)?;
        if content.contains(BEK_CRYPTDISKS_MARKER) {
            return Ok(false);
        }
        let line = format!("CRYPTDISKS_MOUNT=\"$CRYPTDISKS_MOUNT {}\"", self.env.bek_mount_point.display());
        files::append(path, &line, 0o644)?;
        tracing::info!(path = %path.display(), "added BEK volume to cryptdisks defaults");
        Ok(true)
    }

    /// Replace whatever fstab says about `mount_point` with a managed entry.
    pub(crate) fn replace_fstab_mount_locked(
        &self,
        mount_point: &Path,
        line: &str,
    ) -> Result<(), MountConfigError> {
        let target = mount_point.to_string_lossy();
        let mut kept = drop_fstab_lines(&files::read_lines(&self.env.fstab)?, |f| f.mount_point == target);
        kept.extend(commented_fstab_entry(line).lines().map(str::to_string));
        files::rewrite(&self.env.fstab, &kept)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "fstab_tests.rs"]
mod tests;
