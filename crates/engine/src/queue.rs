// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! FIFO of devices waiting for a worker.

use ode_core::CryptRecord;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::PathBuf;

/// One device ready for its bulk phases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionWorkItem {
    pub record: CryptRecord,
    pub key_file: PathBuf,
}

/// Work queue shared by the pipeline and the workers.
///
/// Polling never blocks. The log lock is separate from the queue lock so
/// a worker writing a report never holds up a dequeue.
#[derive(Default)]
pub struct EncryptionWorkQueue {
    items: Mutex<VecDeque<EncryptionWorkItem>>,
    log_lock: Mutex<()>,
}

impl EncryptionWorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, item: EncryptionWorkItem) {
        tracing::debug!(mapper = %item.record.mapper_name, "queued for encryption");
        self.items.lock().push_back(item);
    }

    /// Next item in arrival order, or `None` when empty.
    pub fn get_next(&self) -> Option<EncryptionWorkItem> {
        self.items.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Emit a multi-line report without interleaving other workers' reports.
    pub fn update_log(&self, lines: &[String]) {
        let _log = self.log_lock.lock();
        for line in lines {
            tracing::info!("{line}");
        }
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
