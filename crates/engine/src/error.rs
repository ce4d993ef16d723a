// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use ode_adapters::DiskError;
use ode_core::DeviceItem;
use ode_mount::MountConfigError;
use ode_storage::LedgerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("disk error: {0}")]
    Disk(#[from] DiskError),
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("table error: {0}")]
    Tables(#[from] MountConfigError),
    #[error("file system {0} cannot be encrypted online")]
    UnsupportedFileSystem(String),
    #[error("device holds {size} bytes, not enough room for a {header}-byte header")]
    TooSmall { size: u64, header: u64 },
    #[error("`{command}` exited with {code}: {stderr}")]
    Command { command: String, code: i32, stderr: String },
    #[error("failed to record mapper {mapper} in the mount tables")]
    TableUpdate { mapper: String },
}

/// A device the pipeline gave up on, handed back to the caller.
#[derive(Debug, Error)]
#[error("{}: {error}", device.path)]
pub struct HandleFailure {
    pub device: DeviceItem,
    #[source]
    pub error: PipelineError,
}

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("disk error: {0}")]
    Disk(#[from] DiskError),
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("table error: {0}")]
    Tables(#[from] MountConfigError),
    #[error("no progress ledger for mapper {0}")]
    MissingLedger(String),
    #[error("progress ledger for {mapper} lacks {field}")]
    IncompleteLedger { mapper: String, field: &'static str },
    #[error("`{command}` exited with {code}: {stderr}")]
    Command { command: String, code: i32, stderr: String },
    #[error("failed to record mapper {mapper} in the mount tables")]
    TableUpdate { mapper: String },
}
