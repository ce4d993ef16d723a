// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ode-core: Data model, phases and environment for the online disk encryption agent

pub mod macros;

pub mod clock;
pub mod device;
pub mod env;
pub mod exit;
pub mod phase;
pub mod record;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::{Clock, FakeClock, SystemClock};
#[cfg(any(test, feature = "test-support"))]
pub use device::DeviceItemBuilder;
pub use device::{is_mountable_file_system, is_shrinkable_file_system, DeviceItem};
pub use env::{backup_dir_for, EncryptionEnvironment};
pub use exit::{EXIT_SIGNALED_BASE, EXIT_SPAWN_FAILED, EXIT_SUCCESS, EXIT_TIMED_OUT};
pub use phase::Phase;
#[cfg(any(test, feature = "test-support"))]
pub use record::CryptRecordBuilder;
pub use record::{CryptRecord, UNKNOWN_LUKS_SLOT};
