// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sentinel exit codes shared by the subprocess layer and its callers.

pub const EXIT_SUCCESS: i32 = 0;

/// The child could not be started.
pub const EXIT_SPAWN_FAILED: i32 = -1;

/// The child outlived its timeout and was killed.
pub const EXIT_TIMED_OUT: i32 = -9;

/// The child died from signal `n` and reports `EXIT_SIGNALED_BASE - n`.
pub const EXIT_SIGNALED_BASE: i32 = -128;
