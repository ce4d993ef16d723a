// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bulk phases for one device, driven by its progress ledger.
//!
//! Each phase does its work and then commits the move to the next phase, so
//! after a crash the ledger names the phase to redo. Every phase is safe to
//! redo from the start. `CopyData` is finer grained and picks up at the
//! committed slice.

use crate::copy::{copy_head, copy_range, slice_count, slice_range};
use crate::error::TransformError;
use crate::queue::{EncryptionWorkItem, EncryptionWorkQueue};
use ode_adapters::{CommandRunner, DiskUtil, Invocation};
use ode_core::{backup_dir_for, Clock, CryptRecord, EncryptionEnvironment, Phase};
use ode_mount::MountConfigStore;
use ode_storage::ProgressLedger;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Progress lines are emitted about this many times per copy.
const PROGRESS_REPORTS: u64 = 10;

pub struct DeviceTransform {
    store: Arc<MountConfigStore>,
    runner: Arc<dyn CommandRunner>,
    clock: Arc<dyn Clock>,
}

impl DeviceTransform {
    pub fn new(store: Arc<MountConfigStore>, runner: Arc<dyn CommandRunner>, clock: Arc<dyn Clock>) -> Self {
        Self { store, runner, clock }
    }

    fn env(&self) -> &EncryptionEnvironment {
        self.store.env()
    }

    fn disk(&self) -> &Arc<dyn DiskUtil> {
        self.store.disk()
    }

    /// Run the remaining phases of `item` to completion.
    pub fn run(&self, item: &EncryptionWorkItem, queue: &EncryptionWorkQueue) -> Result<(), TransformError> {
        let mapper = item.record.mapper_name.clone();
        let mut ledger = ProgressLedger::new(self.env().ledger_path(&mapper), self.clock.clone());
        if !ledger.exists() {
            return Err(TransformError::MissingLedger(mapper));
        }
        ledger.load_from_store()?;
        let mut record = item.record.clone();

        if ledger.phase().is_resumable() {
            self.resume(&mut ledger, item)?;
        }

        loop {
            let phase = ledger.phase();
            tracing::info!(%mapper, %phase, "running phase");
            match phase {
                Phase::NotStarted => ledger.transition(Phase::BackupHeader)?,
                Phase::BackupHeader => {
                    self.backup_header(&ledger)?;
                    ledger.transition(Phase::CopyData)?;
                }
                Phase::CopyData => {
                    self.copy_data(&mut ledger, item, queue)?;
                    ledger.entry.clear_cursor();
                    ledger.transition(Phase::EncryptHeader)?;
                }
                Phase::EncryptHeader => {
                    self.encrypt_header(&ledger, &mut record)?;
                    ledger.transition(Phase::EncryptDevice)?;
                }
                Phase::EncryptDevice => {
                    self.encrypt_device(&ledger, &record, item)?;
                    ledger.transition(Phase::Completed)?;
                }
                Phase::Resume => self.resume(&mut ledger, item)?,
                Phase::Completed => {
                    self.finish(&mut ledger)?;
                    tracing::info!(%mapper, "online encryption completed");
                    return Ok(());
                }
            }
        }
    }

    /// Re-enter an interrupted phase without re-initialising anything.
    fn resume(&self, ledger: &mut ProgressLedger, item: &EncryptionWorkItem) -> Result<(), TransformError> {
        if ledger.phase() != Phase::Resume {
            ledger.transition(Phase::Resume)?;
        }
        let mapper = &item.record.mapper_name;
        let Some(target) = ledger.entry.resumed_from else {
            return Err(TransformError::IncompleteLedger { mapper: mapper.clone(), field: "resumed_from" });
        };
        tracing::info!(%mapper, phase = %target, slice = ?ledger.entry.current_slice_index, "resuming");
        if target == Phase::CopyData {
            self.open_with_detached_header(ledger, item)?;
        }
        ledger.transition(target)?;
        Ok(())
    }

    fn backup_header(&self, ledger: &ProgressLedger) -> Result<(), TransformError> {
        let source = self.source(ledger)?;
        let slice = match &ledger.entry.header_slice_file_path {
            Some(path) => path.clone(),
            None => self.env().header_slice_path(&self.mapper(ledger)?),
        };
        if let Some(dir) = slice.parent() {
            std::fs::create_dir_all(dir)?;
        }
        copy_head(&source, &slice, self.env().luks_header_bytes)?;
        tracing::info!(mapper = %self.mapper(ledger)?, slice = %slice.display(), "saved header region");
        Ok(())
    }

    fn copy_data(
        &self,
        ledger: &mut ProgressLedger,
        item: &EncryptionWorkItem,
        queue: &EncryptionWorkQueue,
    ) -> Result<(), TransformError> {
        let mapper = self.mapper(ledger)?;
        if ledger.entry.current_slice_index.is_none() {
            let size = self.field(ledger, ledger.entry.device_size_bytes, "device_size_bytes")?;
            ledger.entry.current_source_path = Some(self.source(ledger)?);
            ledger.entry.current_destination_path = Some(self.env().mapper_dir.join(&mapper));
            ledger.entry.current_block_size_bytes = Some(self.env().copy_block_bytes);
            ledger.entry.current_total_copy_size_bytes = Some(size.saturating_sub(self.env().luks_header_bytes));
            ledger.entry.current_slice_index = Some(0);
            ledger.commit()?;
        }
        self.open_with_detached_header(ledger, item)?;

        let source = self.field(ledger, ledger.entry.current_source_path.clone(), "current_source_path")?;
        let destination =
            self.field(ledger, ledger.entry.current_destination_path.clone(), "current_destination_path")?;
        let block = self.field(ledger, ledger.entry.current_block_size_bytes, "current_block_size_bytes")?;
        let total = self.field(ledger, ledger.entry.current_total_copy_size_bytes, "current_total_copy_size_bytes")?;
        let from_end = ledger.entry.copy_from_end.unwrap_or(true);
        let slices = slice_count(total, block);
        let report_every = (slices / PROGRESS_REPORTS).max(1);

        let mut index = ledger.entry.current_slice_index.unwrap_or(0);
        while let Some(range) = slice_range(index, block, total, from_end) {
            copy_range(&source, &destination, range)?;
            index = ledger.advance_slice()?;
            if index % report_every == 0 || index == slices {
                queue.update_log(&[
                    format!("{mapper}: copied {index}/{slices} slices"),
                    format!("{mapper}: {} of {total} bytes", (index * block).min(total)),
                ]);
            }
        }
        Ok(())
    }

    /// Move the header onto the device and drop the side file from the record.
    fn encrypt_header(&self, ledger: &ProgressLedger, record: &mut CryptRecord) -> Result<(), TransformError> {
        let mapper = self.mapper(ledger)?;
        if self.env().mapper_dir.join(&mapper).exists() {
            self.disk().luks_close(&mapper)?;
        }
        let device = self.source(ledger)?;
        let header = self.header(ledger)?;
        let invocation = Invocation::new("cryptsetup")
            .args(["luksHeaderRestore", &device.display().to_string(), "--header-backup-file"])
            .arg(header.display().to_string())
            .arg("-q")
            .timeout(self.env().command_timeout);
        let output = self.runner.run(&invocation);
        if !output.success() {
            return Err(TransformError::Command {
                command: invocation.display(),
                code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }

        record.luks_header_path = None;
        if !self.store.update_record(record, None) {
            return Err(TransformError::TableUpdate { mapper });
        }
        Ok(())
    }

    /// Open the consolidated device, mount it and save the table backups inside.
    fn encrypt_device(
        &self,
        ledger: &ProgressLedger,
        record: &CryptRecord,
        item: &EncryptionWorkItem,
    ) -> Result<(), TransformError> {
        let mapper = self.mapper(ledger)?;
        let mapper_device = self.env().mapper_dir.join(&mapper);
        let device = self.source(ledger)?.display().to_string();
        if !mapper_device.exists() {
            self.disk().luks_open(&device, &mapper, &item.key_file, None)?;
        }

        let Some(mount_point) = &ledger.entry.mount_point else {
            return Ok(());
        };
        let mounted = self.disk().mount_items()?.iter().any(|m| &m.dest == mount_point);
        if !mounted {
            std::fs::create_dir_all(mount_point)?;
            self.disk().mount_filesystem(&mapper_device, mount_point, ledger.entry.file_system.as_deref())?;
        }

        let mut consolidated = record.clone();
        consolidated.luks_header_path = None;
        if !self.store.add_record(&consolidated, Some(&backup_dir_for(mount_point))) {
            return Err(TransformError::TableUpdate { mapper });
        }
        Ok(())
    }

    /// Drop the side files and archive the ledger.
    fn finish(&self, ledger: &mut ProgressLedger) -> Result<(), TransformError> {
        let side_files = [ledger.entry.header_slice_file_path.clone(), ledger.entry.luks_header_file_path.clone()];
        for path in side_files.into_iter().flatten() {
            match std::fs::remove_file(&path) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
                _ => {}
            }
        }
        ledger.clear()?;
        Ok(())
    }

    fn open_with_detached_header(
        &self,
        ledger: &ProgressLedger,
        item: &EncryptionWorkItem,
    ) -> Result<(), TransformError> {
        let mapper = self.mapper(ledger)?;
        if self.env().mapper_dir.join(&mapper).exists() {
            return Ok(());
        }
        let device = self.source(ledger)?.display().to_string();
        let header = self.header(ledger)?;
        self.disk().luks_open(&device, &mapper, &item.key_file, Some(&header))?;
        Ok(())
    }

    fn mapper(&self, ledger: &ProgressLedger) -> Result<String, TransformError> {
        self.field(ledger, ledger.entry.mapper_name.clone(), "mapper_name")
    }

    fn source(&self, ledger: &ProgressLedger) -> Result<PathBuf, TransformError> {
        self.field(ledger, ledger.entry.original_device_path.as_ref().map(PathBuf::from), "original_device_path")
    }

    fn header(&self, ledger: &ProgressLedger) -> Result<PathBuf, TransformError> {
        self.field(ledger, ledger.entry.luks_header_file_path.clone(), "luks_header_file_path")
    }

    fn field<T>(&self, ledger: &ProgressLedger, value: Option<T>, field: &'static str) -> Result<T, TransformError> {
        value.ok_or_else(|| TransformError::IncompleteLedger {
            mapper: ledger_name(ledger.path()),
            field,
        })
    }
}

fn ledger_name(path: &Path) -> String {
    path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
}

#[cfg(test)]
#[path = "transform_tests.rs"]
mod tests;
