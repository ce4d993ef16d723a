// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ode-adapters: Disk and subprocess seams for the encryption agent

pub mod disk;
pub mod exec;
pub mod system;

pub use disk::{DiskError, DiskUtil, DistroInfo, EncryptionStatus, MountItem, OS_MAPPER_NAME};
pub use exec::{CommandExecutor, CommandRunner, ExecOutput, Invocation};
pub use system::SystemDiskUtil;

#[cfg(any(test, feature = "test-support"))]
pub use disk::FakeDiskUtil;
#[cfg(any(test, feature = "test-support"))]
pub use exec::FakeCommandRunner;
