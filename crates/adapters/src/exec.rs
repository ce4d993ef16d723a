// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess execution with a hard timeout.
//!
//! Failures never surface as errors here: a child that cannot be spawned
//! reports [`EXIT_SPAWN_FAILED`] and a child that outlives its timeout is
//! killed and reports [`EXIT_TIMED_OUT`]. A child killed by any other signal
//! reports [`EXIT_SIGNALED_BASE`] minus the signal number. Callers decide
//! what a non-zero code means for them.

use ode_core::{EXIT_SIGNALED_BASE, EXIT_SPAWN_FAILED, EXIT_SUCCESS, EXIT_TIMED_OUT};
use std::io::{Read, Write};
use std::os::unix::process::ExitStatusExt;
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// One program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Option<Duration>,
    pub stdin: Option<Vec<u8>>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into(), args: Vec::new(), timeout: None, stdin: None }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// `program arg arg ...` for logs.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of an invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn code(exit_code: i32) -> Self {
        Self { exit_code, ..Self::default() }
    }

    pub fn success(&self) -> bool {
        self.exit_code == EXIT_SUCCESS
    }

    pub fn timed_out(&self) -> bool {
        self.exit_code == EXIT_TIMED_OUT
    }
}

/// Runs programs on behalf of the disk layer and the pipeline.
pub trait CommandRunner: Send + Sync {
    fn run(&self, invocation: &Invocation) -> ExecOutput;
}

/// Runs real child processes.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    default_timeout: Duration,
}

impl CommandExecutor {
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }

    fn spawn(&self, invocation: &Invocation) -> std::io::Result<Child> {
        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args).stdout(Stdio::piped()).stderr(Stdio::piped());
        if invocation.stdin.is_some() {
            command.stdin(Stdio::piped());
        } else {
            command.stdin(Stdio::null());
        }
        let mut child = command.spawn()?;
        if let (Some(payload), Some(mut stdin)) = (&invocation.stdin, child.stdin.take()) {
            stdin.write_all(payload)?;
        }
        Ok(child)
    }
}

impl CommandRunner for CommandExecutor {
    fn run(&self, invocation: &Invocation) -> ExecOutput {
        let timeout = invocation.timeout.unwrap_or(self.default_timeout);
        let mut child = match self.spawn(invocation) {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(command = %invocation.display(), error = %e, "failed to start command");
                return ExecOutput { exit_code: EXIT_SPAWN_FAILED, stderr: e.to_string(), ..ExecOutput::default() };
            }
        };

        let stdout = spawn_reader(child.stdout.take());
        let stderr = spawn_reader(child.stderr.take());
        let start = Instant::now();
        let mut status = None;
        while start.elapsed() <= timeout {
            match child.try_wait() {
                Ok(Some(s)) => {
                    status = Some(s);
                    break;
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    tracing::warn!(command = %invocation.display(), error = %e, "failed to poll command");
                    break;
                }
            }
        }

        let exit_code = match status {
            Some(s) => s.code().or_else(|| s.signal().map(|n| EXIT_SIGNALED_BASE - n)).unwrap_or(EXIT_SPAWN_FAILED),
            None => {
                let _ = child.kill();
                let _ = child.wait();
                tracing::warn!(
                    command = %invocation.display(),
                    timeout_ms = timeout.as_millis() as u64,
                    "command timed out, killed",
                );
                EXIT_TIMED_OUT
            }
        };

        let output = ExecOutput { exit_code, stdout: join_reader(stdout), stderr: join_reader(stderr) };
        tracing::debug!(command = %invocation.display(), exit_code, "command finished");
        output
    }
}

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_reader(handle: JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::{CommandRunner, ExecOutput, Invocation};
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct FakeRunnerState {
        calls: Vec<Invocation>,
        scripted: Vec<(String, Option<String>, ExecOutput)>,
    }

    /// Fake command runner: records invocations, answers from a script.
    ///
    /// Unscripted invocations succeed with empty output.
    #[derive(Clone, Default)]
    pub struct FakeCommandRunner {
        inner: Arc<Mutex<FakeRunnerState>>,
    }

    impl FakeCommandRunner {
        pub fn new() -> Self {
            Self::default()
        }

        /// Answer every call of `program` whose first argument is
        /// `subcommand` (any first argument when `None`).
        pub fn respond(&self, program: &str, subcommand: Option<&str>, output: ExecOutput) {
            self.inner.lock().scripted.push((
                program.to_string(),
                subcommand.map(str::to_string),
                output,
            ));
        }

        pub fn fail(&self, program: &str, subcommand: Option<&str>, exit_code: i32) {
            self.respond(program, subcommand, ExecOutput::code(exit_code));
        }

        pub fn calls(&self) -> Vec<Invocation> {
            self.inner.lock().calls.clone()
        }

        /// Rendered command lines, in call order.
        pub fn command_lines(&self) -> Vec<String> {
            self.inner.lock().calls.iter().map(Invocation::display).collect()
        }
    }

    impl CommandRunner for FakeCommandRunner {
        fn run(&self, invocation: &Invocation) -> ExecOutput {
            let mut state = self.inner.lock();
            state.calls.push(invocation.clone());
            let first = invocation.args.first().map(String::as_str);
            state
                .scripted
                .iter()
                .rev()
                .find(|(program, sub, _)| {
                    *program == invocation.program && (sub.is_none() || sub.as_deref() == first)
                })
                .map(|(_, _, out)| out.clone())
                .unwrap_or_default()
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeCommandRunner;

#[cfg(test)]
#[path = "exec_tests.rs"]
mod tests;
