//! Error taxonomy for a spawn invocation.
//!
//! Mirrors the classification style of minion's `linux::error::Error`:
//! a `thiserror`-derived enum with a `kind`-like accessor, here exposed as
//! the stable numeric `StatusCode` the external interface promises.

use std::fmt;

/// Which of the three standard streams a binding-conflict error refers to.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Stream {
    Stdin,
    Stdout,
    Stderr,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stream::Stdin => "stdin",
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        };
        f.write_str(name)
    }
}

/// Stable numeric encoding for C-ABI parity.
#[repr(i32)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StatusCode {
    Ok = 0,
    TooManyIn = 1,
    TooManyOut = 2,
    TooManyErr = 3,
    NotFound = 4,
    Failure = 5,
}

/// Errors produced by [`crate::spawn`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// More than one binding was supplied for a single stream.
    #[error("more than one binding supplied for {0}")]
    BindingConflict(Stream),

    /// The resolver could not produce an executable candidate for the
    /// command string.
    #[error("command not found")]
    NotFound,

    /// Any other system call or coordination failure. `context` is a short
    /// tag identifying the failing step; `cause` carries the OS error.
    #[error("{context}: {cause}")]
    Failure {
        context: &'static str,
        #[source]
        cause: std::io::Error,
    },
}

impl Error {
    pub fn failure(context: &'static str, cause: std::io::Error) -> Self {
        Error::Failure { context, cause }
    }

    /// The stable numeric status code for this error, per spec.md §6.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BindingConflict(Stream::Stdin) => StatusCode::TooManyIn,
            Error::BindingConflict(Stream::Stdout) => StatusCode::TooManyOut,
            Error::BindingConflict(Stream::Stderr) => StatusCode::TooManyErr,
            Error::NotFound => StatusCode::NotFound,
            Error::Failure { .. } => StatusCode::Failure,
        }
    }
}

#[cfg(unix)]
impl From<nix::Error> for Error {
    fn from(err: nix::Error) -> Self {
        let io_err = err
            .as_errno()
            .map(|e| std::io::Error::from_raw_os_error(e as i32))
            .unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, err));
        Error::Failure {
            context: "system call failed",
            cause: io_err,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
