// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Log file setup.

use crate::lifecycle::LifecycleError;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

pub const LOG_FILE_NAME: &str = "agent.log";

/// Filter directives, e.g. `ODE_LOG=debug` or `ODE_LOG=ode_engine=trace`.
pub const LOG_ENV: &str = "ODE_LOG";

/// Send `tracing` output to `<dir>/agent.log`.
///
/// The guard flushes buffered lines when dropped; hold it until exit.
pub fn init(dir: &Path) -> Result<WorkerGuard, LifecycleError> {
    std::fs::create_dir_all(dir)?;
    let appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_thread_names(true)
        .try_init()
        .map_err(|e| LifecycleError::Logging(e.to_string()))?;
    Ok(guard)
}
