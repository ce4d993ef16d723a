// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker-per-device fan-out over the work queue.

use crate::queue::{EncryptionWorkItem, EncryptionWorkQueue};
use crate::transform::DeviceTransform;
use ode_mount::{MountConfigError, MountConfigStore};
use ode_storage::ProgressLedger;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

/// Per-device outcome of a worker pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub completed: Vec<String>,
    /// `(mapper, error)`
    pub failed: Vec<(String, String)>,
}

pub struct Scheduler {
    store: Arc<MountConfigStore>,
    queue: Arc<EncryptionWorkQueue>,
    transform: Arc<DeviceTransform>,
}

impl Scheduler {
    pub fn new(store: Arc<MountConfigStore>, queue: Arc<EncryptionWorkQueue>, transform: Arc<DeviceTransform>) -> Self {
        Self { store, queue, transform }
    }

    /// Requeue every managed device left mid-transform and run them all.
    ///
    /// A device counts as mid-transform when the disk layer says it is still
    /// being re-encrypted or a live progress ledger exists for its mapper.
    pub fn resume_all(&self) -> Result<RunReport, MountConfigError> {
        let disk = self.store.disk();
        let pending: HashSet<String> =
            ProgressLedger::pending_mappers(&self.store.env().ongoing_dir).into_iter().collect();

        let mut failed = Vec::new();
        for record in self.store.list_records()? {
            let reencrypting = disk.luks_check_reencryption(&record.device_path, record.luks_header_path.as_deref());
            if !reencrypting && !pending.contains(&record.mapper_name) {
                continue;
            }
            let key_file = match self.store.unlock_key_file(&record) {
                Ok(key_file) => key_file,
                Err(e) => {
                    tracing::error!(mapper = %record.mapper_name, error = %e, "no key file to resume with");
                    failed.push((record.mapper_name, format!("key file lookup failed: {e}")));
                    continue;
                }
            };
            tracing::info!(mapper = %record.mapper_name, device = %record.device_path, "resuming online encryption");
            self.queue.enqueue(EncryptionWorkItem { record, key_file });
        }

        let mut report = self.run_pending();
        failed.append(&mut report.failed);
        report.failed = failed;
        Ok(report)
    }

    /// Drain the queue, one named thread per item, and wait for all of them.
    ///
    /// A failing device never stops the others.
    pub fn run_pending(&self) -> RunReport {
        let items: Vec<EncryptionWorkItem> = std::iter::from_fn(|| self.queue.get_next()).collect();
        if items.is_empty() {
            return RunReport::default();
        }
        tracing::info!(workers = items.len(), "starting encryption workers");

        let outcomes: Vec<(String, Result<(), String>)> = thread::scope(|s| {
            let handles: Vec<_> = items
                .iter()
                .map(|item| {
                    let handle = thread::Builder::new()
                        .name(format!("encrypt-{}", item.record.mapper_name))
                        .spawn_scoped(s, move || self.transform.run(item, &self.queue));
                    (item.record.mapper_name.clone(), handle)
                })
                .collect();
            handles
                .into_iter()
                .map(|(mapper, handle)| {
                    let outcome = match handle {
                        Ok(h) => match h.join() {
                            Ok(result) => result.map_err(|e| e.to_string()),
                            Err(_) => Err("worker panicked".to_string()),
                        },
                        Err(e) => Err(format!("failed to spawn worker: {e}")),
                    };
                    (mapper, outcome)
                })
                .collect()
        });

        let mut report = RunReport::default();
        for (mapper, outcome) in outcomes {
            match outcome {
                Ok(()) => report.completed.push(mapper),
                Err(error) => {
                    tracing::error!(%mapper, %error, "online encryption failed");
                    report.failed.push((mapper, error));
                }
            }
        }
        report
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
