//! Child-process builder.
//!
//! Accumulate bindings on a `&mut self`-returning builder, then dispatch in
//! one call. The whole invocation is tied to a single command string,
//! parsed internally by [`crate::resolve`] rather than threaded through
//! separate path/argv/env setters.

use crate::binding::{BindingSlot, InputBinding, OutputBinding, ResolvedBindings};
use crate::console::{ConsolePolicy, InheritParentConsole};
use crate::error::{Result, Stream};

/// Accumulates stdio bindings for one invocation of [`crate::spawn`].
///
/// Each of `stdin`/`stdout`/`stderr` starts unset (equivalent to `Discard`);
/// calling the corresponding setter more than once is not rejected here --
/// the at-most-one-binding check happens in [`Command::spawn`], which
/// yields a classified binding error before any resources are allocated.
#[derive(Default, Debug)]
pub struct Command {
    command: String,
    stdin: BindingSlot<InputBinding>,
    stdout: BindingSlot<OutputBinding>,
    stderr: BindingSlot<OutputBinding>,
    console_policy: Option<Box<dyn ConsolePolicy>>,
}

impl Command {
    /// Start building an invocation of `command`, parsed by [`crate::resolve`].
    pub fn new(command: impl Into<String>) -> Self {
        Command {
            command: command.into(),
            ..Default::default()
        }
    }

    /// Bind the child's stdin. Calling this more than once marks the stream
    /// in conflict; [`Command::spawn`] then fails with `TooManyIn`.
    pub fn stdin(&mut self, binding: InputBinding) -> &mut Self {
        self.stdin.set(binding);
        self
    }

    /// Bind the child's stdout. See [`Command::stdin`] for the conflict rule.
    pub fn stdout(&mut self, binding: OutputBinding) -> &mut Self {
        self.stdout.set(binding);
        self
    }

    /// Bind the child's stderr. See [`Command::stdin`] for the conflict rule.
    pub fn stderr(&mut self, binding: OutputBinding) -> &mut Self {
        self.stderr.set(binding);
        self
    }

    /// Install a custom console-attachment policy (Windows only; ignored on
    /// POSIX, which has no equivalent concept). Defaults to
    /// [`InheritParentConsole`].
    pub fn console_policy(&mut self, policy: impl ConsolePolicy + 'static) -> &mut Self {
        self.console_policy = Some(Box::new(policy));
        self
    }

    /// Validate the bindings (§4.1), resolve the command string (§4.2),
    /// launch, coordinate the concurrent I/O, and collect the result
    /// (§4.3-§4.9). Never panics; every failure surfaces through
    /// [`crate::SpawnOutcome::status`].
    pub fn spawn(self) -> crate::SpawnOutcome {
        crate::run_invocation(self)
    }

    pub(crate) fn into_parts(self) -> Result<(String, ResolvedBindings)> {
        let stdin = self
            .stdin
            .resolve(Stream::Stdin)?
            .unwrap_or(InputBinding::Discard);
        let stdout = self
            .stdout
            .resolve(Stream::Stdout)?
            .unwrap_or(OutputBinding::Discard);
        let stderr = self
            .stderr
            .resolve(Stream::Stderr)?
            .unwrap_or(OutputBinding::Discard);
        let console_policy = self
            .console_policy
            .unwrap_or_else(|| Box::new(InheritParentConsole));
        Ok((
            self.command,
            ResolvedBindings {
                stdin,
                stdout,
                stderr,
                console_policy,
            },
        ))
    }
}
