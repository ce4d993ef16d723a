// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Online encryption front half: take a mounted device up to the point where
//! a worker can move its data.
//!
//! Order matters for crash safety. Nothing touches the tables before the
//! detached header exists, and nothing is queued before the tables name the
//! new mapper.

use crate::error::{HandleFailure, PipelineError};
use crate::queue::{EncryptionWorkItem, EncryptionWorkQueue};
use ode_adapters::{CommandRunner, DiskUtil, Invocation};
use ode_core::{is_shrinkable_file_system, Clock, CryptRecord, DeviceItem, EncryptionEnvironment, Phase};
use ode_mount::MountConfigStore;
use ode_storage::ProgressLedger;
use std::path::Path;
use std::sync::Arc;

const SECTOR_BYTES: u64 = 512;

pub struct OnlineEncryptionPipeline {
    store: Arc<MountConfigStore>,
    runner: Arc<dyn CommandRunner>,
    queue: Arc<EncryptionWorkQueue>,
    clock: Arc<dyn Clock>,
}

impl OnlineEncryptionPipeline {
    pub fn new(
        store: Arc<MountConfigStore>,
        runner: Arc<dyn CommandRunner>,
        queue: Arc<EncryptionWorkQueue>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { store, runner, queue, clock }
    }

    fn env(&self) -> &EncryptionEnvironment {
        self.store.env()
    }

    fn disk(&self) -> &Arc<dyn DiskUtil> {
        self.store.disk()
    }

    /// Prepare `device` and queue it. Returns the new mapper name.
    ///
    /// On failure the device comes back with the reason. A device rejected
    /// up front is untouched; later failures may leave it unmounted.
    pub fn handle(&self, device: DeviceItem, key_file: &Path) -> Result<String, HandleFailure> {
        match self.prepare(&device, key_file) {
            Ok(mapper) => Ok(mapper),
            Err(error) => {
                tracing::error!(device = %device.path, %error, "online encryption not started");
                Err(HandleFailure { device, error })
            }
        }
    }

    fn prepare(&self, device: &DeviceItem, key_file: &Path) -> Result<String, PipelineError> {
        let fs = device.file_system.as_deref().unwrap_or_default();
        if !is_shrinkable_file_system(fs) {
            return Err(PipelineError::UnsupportedFileSystem(fs.to_string()));
        }
        let header_bytes = self.env().luks_header_bytes;
        if device.size_bytes <= header_bytes {
            return Err(PipelineError::TooSmall { size: device.size_bytes, header: header_bytes });
        }

        let mapper = uuid::Uuid::new_v4().to_string();
        tracing::info!(device = %device.path, %mapper, fs, "starting online encryption");

        if let Some(mount_point) = &device.mount_point {
            self.disk().umount(mount_point)?;
        }
        self.disk().check_shrink_fs(&device.path, device.size_bytes - header_bytes)?;

        let header = self.env().detached_header_path(&mapper);
        if let Some(dir) = header.parent() {
            std::fs::create_dir_all(dir)?;
        }
        self.format_detached_header(&device.path, &header, key_file)?;

        let mut ledger = ProgressLedger::new(self.env().ledger_path(&mapper), self.clock.clone());
        ledger.entry.original_device_path = Some(device.path.clone());
        ledger.entry.mapper_name = Some(mapper.clone());
        ledger.entry.luks_header_file_path = Some(header.clone());
        ledger.entry.file_system = Some(fs.to_string());
        ledger.entry.mount_point = device.mount_point.clone();
        ledger.entry.device_size_bytes = Some(device.size_bytes);
        ledger.entry.copy_from_end = Some(true);
        ledger.entry.header_slice_file_path = Some(self.env().header_slice_path(&mapper));
        ledger.transition(Phase::BackupHeader)?;

        let mut record = CryptRecord::new(mapper.clone(), self.disk().persistent_path(&device.path)?).with_slot(0);
        record.luks_header_path = Some(header);
        record.mount_point = device.mount_point.clone();
        record.file_system = Some(fs.to_string());
        record.key_file_path = Some(key_file.to_path_buf());

        if let Some(mount_point) = &device.mount_point {
            let mapper_device = record.mapper_device(&self.env().mapper_dir);
            self.store.modify_fstab_entry_encrypt(mount_point, &mapper_device)?;
        }
        if !self.store.add_record(&record, None) {
            return Err(PipelineError::TableUpdate { mapper });
        }

        self.queue.enqueue(EncryptionWorkItem { record, key_file: key_file.to_path_buf() });
        Ok(mapper)
    }

    /// LUKS2 header in a side file, data segment starting past the header room.
    fn format_detached_header(&self, device: &str, header: &Path, key_file: &Path) -> Result<(), PipelineError> {
        let offset_sectors = self.env().luks_header_bytes / SECTOR_BYTES;
        let invocation = Invocation::new("cryptsetup")
            .args(["luksFormat", "--type", "luks2", "--header"])
            .arg(header.display().to_string())
            .arg("--offset")
            .arg(offset_sectors.to_string())
            .arg("--key-file")
            .arg(key_file.display().to_string())
            .args(["-q", device])
            .timeout(self.env().command_timeout);
        let output = self.runner.run(&invocation);
        if !output.success() {
            return Err(PipelineError::Command {
                command: invocation.display(),
                code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
