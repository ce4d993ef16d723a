// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ode-agent: Boot-time pass of the online disk encryption agent

pub mod lifecycle;
pub mod logging;

pub use lifecycle::{boot, run, BootSummary, LifecycleError};
