// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ode-agent: migrate the mount tables, unlock moved disks and resume any
//! interrupted online encryption, then exit.

use ode_core::EncryptionEnvironment;
use std::process::ExitCode;

fn main() -> ExitCode {
    let env = EncryptionEnvironment::from_env();
    let _guard = match ode_agent::logging::init(&env.log_dir()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("ode-agent: {e}");
            return ExitCode::FAILURE;
        }
    };

    match ode_agent::run(&env) {
        Ok(summary) if summary.is_clean() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(2),
        Err(e) => {
            tracing::error!(error = %e, "boot pass failed");
            eprintln!("ode-agent: {e}");
            ExitCode::FAILURE
        }
    }
}
