// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ode-mount: Persistent record of encrypted mappings (legacy registry,
//! crypttab and fstab) with migration and boot-time restore

mod error;
mod files;
mod fstab;
mod legacy;
pub mod lines;
mod migrate;
mod native;
mod store;
mod unlock;

pub use error::MountConfigError;
pub use migrate::MigrationReport;
pub use store::{MountConfigStore, CRYPTTAB_BACKUP, FSTAB_BACKUP, LEGACY_BACKUP};
pub use unlock::{RestoredFrom, UnlockReport};

#[cfg(test)]
mod test_helpers;
