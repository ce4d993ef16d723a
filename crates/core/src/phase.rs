// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-device encryption phases and their allowed transitions.

use serde::{Deserialize, Serialize};

/// Where a device is in its online encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    NotStarted,
    /// Saving the region the LUKS header will overwrite
    BackupHeader,
    /// Moving plaintext through the mapper, slice by slice
    CopyData,
    /// Writing the detached header onto the device
    EncryptHeader,
    /// Opening the consolidated device and mounting it
    EncryptDevice,
    /// Re-entering an interrupted phase after a restart
    Resume,
    Completed,
}

crate::simple_display! {
    Phase {
        NotStarted => "not_started",
        BackupHeader => "backup_header",
        CopyData => "copy_data",
        EncryptHeader => "encrypt_header",
        EncryptDevice => "encrypt_device",
        Resume => "resume",
        Completed => "completed",
    }
}

impl Phase {
    fn rank(self) -> u8 {
        match self {
            Phase::NotStarted => 0,
            Phase::BackupHeader => 1,
            Phase::CopyData => 2,
            Phase::EncryptHeader => 3,
            Phase::EncryptDevice => 4,
            Phase::Resume => 5,
            Phase::Completed => 6,
        }
    }

    /// Phases that can be interrupted and picked up again via [`Phase::Resume`].
    pub fn is_resumable(self) -> bool {
        matches!(self, Phase::CopyData | Phase::EncryptDevice | Phase::Resume)
    }

    pub fn is_terminal(self) -> bool {
        self == Phase::Completed
    }

    /// Check a transition out of `self`.
    ///
    /// `resumed_from` is the phase recorded when `Resume` was entered; it is
    /// the only phase `Resume` may leave to.
    pub fn can_transition(self, next: Phase, resumed_from: Option<Phase>) -> bool {
        match (self, next) {
            (_, Phase::Resume) => self.is_resumable(),
            (Phase::Resume, next) => resumed_from == Some(next),
            (Phase::Completed, _) => false,
            (from, to) => to.rank() > from.rank(),
        }
    }
}

#[cfg(test)]
#[path = "phase_tests.rs"]
mod tests;
