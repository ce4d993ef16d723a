// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ode-engine: Online encryption pipeline, per-device transform and workers

pub mod copy;
mod error;
mod pipeline;
mod queue;
mod scheduler;
mod transform;

pub use error::{HandleFailure, PipelineError, TransformError};
pub use pipeline::OnlineEncryptionPipeline;
pub use queue::{EncryptionWorkItem, EncryptionWorkQueue};
pub use scheduler::{RunReport, Scheduler};
pub use transform::DeviceTransform;

#[cfg(test)]
mod test_helpers;
