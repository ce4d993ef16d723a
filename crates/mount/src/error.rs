// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use ode_adapters::DiskError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MountConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("disk error: {0}")]
    Disk(#[from] DiskError),
    #[error("{0} is not a LUKS device")]
    NotLuks(String),
    /// Neither a legacy nor a native backup was found for the mapper.
    #[error("no backed-up table lines found for {mapper}")]
    BackupUnbound { mapper: String },
}
