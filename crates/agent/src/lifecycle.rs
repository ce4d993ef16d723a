// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Boot pass: lock, migrate, unlock, resume.

use fs2::FileExt;
use ode_adapters::{CommandExecutor, CommandRunner, DiskUtil, SystemDiskUtil};
use ode_core::{Clock, EncryptionEnvironment, SystemClock};
use ode_engine::{DeviceTransform, EncryptionWorkQueue, RunReport, Scheduler};
use ode_mount::{MigrationReport, MountConfigError, MountConfigStore, UnlockReport};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Stands in for a mapper name when the whole registry could not be migrated.
pub(crate) const LEGACY_REGISTRY: &str = "legacy-registry";

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Failed to acquire lock: agent already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("mount table error: {0}")]
    Tables(#[from] MountConfigError),

    #[error("failed to set up logging: {0}")]
    Logging(String),
}

/// What one boot pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootSummary {
    pub migration: MigrationReport,
    pub unlock: UnlockReport,
    pub resume: RunReport,
}

impl BootSummary {
    /// True when no device failed or was left behind.
    pub fn is_clean(&self) -> bool {
        self.migration.skipped.is_empty() && self.unlock.failed.is_empty() && self.resume.failed.is_empty()
    }
}

/// Take the agent lock and record our PID in it.
///
/// The lock is held for as long as the returned file is open.
pub fn acquire_lock(path: &Path) -> Result<File, LifecycleError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    // Opening must not truncate: the file may hold a running agent's PID.
    let mut file = OpenOptions::new().write(true).create(true).truncate(false).open(path)?;
    file.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;
    file.set_len(0)?;
    writeln!(file, "{}", std::process::id())?;
    Ok(file)
}

/// Boot pass against the real host.
pub fn run(env: &EncryptionEnvironment) -> Result<BootSummary, LifecycleError> {
    let runner: Arc<dyn CommandRunner> = Arc::new(CommandExecutor::new(env.command_timeout));
    let disk: Arc<dyn DiskUtil> = Arc::new(SystemDiskUtil::new(runner.clone(), env));
    boot(env, disk, runner, Arc::new(SystemClock))
}

/// Boot pass with injected collaborators.
///
/// Migration runs before unlocking so restored backups land in whichever
/// format is then authoritative; resuming runs last so it sees both.
pub fn boot(
    env: &EncryptionEnvironment,
    disk: Arc<dyn DiskUtil>,
    runner: Arc<dyn CommandRunner>,
    clock: Arc<dyn Clock>,
) -> Result<BootSummary, LifecycleError> {
    let _lock = acquire_lock(&env.lock_path())?;
    info!(pid = std::process::id(), config = %env.config_dir.display(), "agent boot pass starting");

    let store = Arc::new(MountConfigStore::new(env.clone(), disk));

    // Unlock and resume still run when the registry itself is unreadable
    let migration = store.migrate_records().unwrap_or_else(|e| {
        tracing::error!(error = %e, "legacy registry migration failed");
        MigrationReport { skipped: vec![(LEGACY_REGISTRY.to_string(), e.to_string())], ..MigrationReport::default() }
    });
    if !migration.migrated.is_empty() || !migration.skipped.is_empty() {
        info!(
            migrated = migration.migrated.len(),
            skipped = migration.skipped.len(),
            retired = migration.registry_retired,
            "legacy registry migration"
        );
    }

    let unlock = store.device_unlock_using_detached_header()?;
    info!(unlocked = unlock.unlocked.len(), failed = unlock.failed.len(), "unlock pass");

    let queue = Arc::new(EncryptionWorkQueue::new());
    let transform = Arc::new(DeviceTransform::new(store.clone(), runner, clock));
    let resume = Scheduler::new(store, queue, transform).resume_all()?;
    info!(completed = resume.completed.len(), failed = resume.failed.len(), "resume pass");

    Ok(BootSummary { migration, unlock, resume })
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
