//! Launches a child command with redirected stdin/stdout/stderr, supplying
//! input and capturing output concurrently with the child's lifetime, and
//! delivers a final exit status.
//!
//! # Platform support
//! The stream-routing and callback-marshalling core (§4.1, §4.2, §4.5,
//! §4.6, §4.8, §4.9 in the design doc) is shared between the POSIX
//! ([`unix`]) and Windows ([`windows`]) backends. The interactive-PTY proxy
//! (§4.4 point on forking a proxy, §4.7) is POSIX-only: on Windows, a
//! `Callback` stdin binding is serviced through an ordinary pipe instead, so
//! a child that line-buffers against an inherited terminal will not see the
//! callback as typed input the way it would on POSIX.

mod binding;
mod command;
mod console;
mod error;
mod marshal;
mod resolve;
#[cfg(unix)]
mod unix;
mod workers;
#[cfg(windows)]
mod windows;

pub use binding::{InputBinding, OutputBinding, OwnedStdioHandle};
pub use command::Command;
pub use console::{ConsolePolicy, InheritParentConsole};
pub use error::{Error, Result, Stream, StatusCode};
pub use workers::CapturedOutput;

/// Result of one [`Command::spawn`] call (spec.md §6 external interface:
/// `spawn(...) -> { status, childExitCode, errorText }`).
#[derive(Debug)]
pub struct SpawnOutcome {
    /// Stable numeric status, per spec.md §6. `StatusCode::Ok` even when the
    /// child itself exited non-zero -- that is reported through
    /// `child_exit_code`, not `status`.
    pub status: StatusCode,
    /// The child's exit code, mapped per spec.md §4.8 (`WEXITSTATUS`, or
    /// `128 + signal` for a signaled termination). `None` if the invocation
    /// failed before or during launch.
    pub child_exit_code: Option<i32>,
    /// Present only when `status != StatusCode::Ok`; a short human-readable
    /// description of the failure.
    pub error_text: Option<String>,
    /// Accumulated stdout, if stdout was bound to `Lines` or `Buffer`.
    pub stdout: CapturedOutput,
    /// Accumulated stderr, if stderr was bound to `Lines` or `Buffer`.
    pub stderr: CapturedOutput,
}

impl SpawnOutcome {
    fn from_error(err: Error) -> Self {
        SpawnOutcome {
            status: err.status_code(),
            child_exit_code: None,
            error_text: Some(err.to_string()),
            stdout: CapturedOutput::None,
            stderr: CapturedOutput::None,
        }
    }

    /// `true` if the invocation itself succeeded (independent of the
    /// child's own exit code).
    pub fn is_ok(&self) -> bool {
        self.status == StatusCode::Ok
    }
}

/// Launch `command`, with the three standard streams routed per `stdin`,
/// `stdout`, and `stderr`. Equivalent to
/// `Command::new(command).stdin(stdin).stdout(stdout).stderr(stderr).spawn()`.
pub fn spawn(
    command: impl Into<String>,
    stdin: InputBinding,
    stdout: OutputBinding,
    stderr: OutputBinding,
) -> SpawnOutcome {
    let mut cmd = Command::new(command);
    cmd.stdin(stdin).stdout(stdout).stderr(stderr);
    cmd.spawn()
}

/// The real body of [`Command::spawn`]: validate bindings, resolve the
/// command string, dispatch to the platform backend, and translate the
/// result (or any error along the way) into a [`SpawnOutcome`].
pub(crate) fn run_invocation(command: Command) -> SpawnOutcome {
    let (command_str, bindings) = match command.into_parts() {
        Ok(parts) => parts,
        Err(err) => return SpawnOutcome::from_error(err),
    };

    let span = tracing::info_span!("shellspawn::spawn", command = %command_str);
    let _enter = span.enter();

    let resolution = match resolve::resolve(&command_str) {
        Ok(r) => r,
        Err(err) => {
            tracing::warn!(command = %command_str, "command resolution failed");
            return SpawnOutcome::from_error(err);
        }
    };
    tracing::debug!(program = ?resolution.program, argv = ?resolution.argv, "resolved command");

    #[cfg(unix)]
    let run_result = unix::run(resolution, bindings.stdin, bindings.stdout, bindings.stderr);
    #[cfg(windows)]
    let run_result = windows::run(
        resolution,
        bindings.stdin,
        bindings.stdout,
        bindings.stderr,
        bindings.console_policy,
    );

    match run_result {
        Ok(outcome) => {
            tracing::info!(exit_code = outcome.exit_code, "child exited");
            SpawnOutcome {
                status: StatusCode::Ok,
                child_exit_code: Some(outcome.exit_code),
                error_text: None,
                stdout: outcome.stdout,
                stderr: outcome.stderr,
            }
        }
        Err(err) => {
            tracing::error!(error = %err, "spawn failed");
            SpawnOutcome::from_error(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn echo_hello_captures_stdout() {
        let outcome = spawn(
            "/bin/echo hello",
            InputBinding::Discard,
            OutputBinding::Buffer,
            OutputBinding::Discard,
        );
        assert!(outcome.is_ok(), "{:?}", outcome.error_text);
        assert_eq!(outcome.child_exit_code, Some(0));
        match outcome.stdout {
            CapturedOutput::Buffer(buf) => assert_eq!(buf, b"hello\n"),
            other => panic!("expected Buffer, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn false_exits_nonzero_without_error() {
        let outcome = spawn(
            "/usr/bin/false",
            InputBinding::Discard,
            OutputBinding::Discard,
            OutputBinding::Discard,
        );
        assert!(outcome.is_ok(), "{:?}", outcome.error_text);
        assert_eq!(outcome.child_exit_code, Some(1));
    }

    #[cfg(unix)]
    #[test]
    fn conflicting_stdout_binding_fails_before_launch() {
        let mut cmd = Command::new("/bin/echo hi");
        cmd.stdout(OutputBinding::Buffer);
        cmd.stdout(OutputBinding::Lines);
        let outcome = cmd.spawn();
        assert_eq!(outcome.status, StatusCode::TooManyOut);
        assert_eq!(outcome.child_exit_code, None);
    }

    #[test]
    fn unknown_program_is_not_found() {
        let outcome = spawn(
            "no_such_program_xyz",
            InputBinding::Discard,
            OutputBinding::Discard,
            OutputBinding::Discard,
        );
        assert_eq!(outcome.status, StatusCode::NotFound);
    }
}
