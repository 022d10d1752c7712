//! Lifecycle Coordinator: wait for the child (or, on an
//! interactive-input spawn, the PTY proxy standing in for it), collect its
//! exit status, and map it onto the external `childExitCode` convention.
//!
//! Grounded on `linux/wait.rs`'s wait-future shape, minus the async
//! `AsyncFd` plumbing -- this crate's coordinator blocks synchronously, per
//! spec.md §5's synchronous-threads-and-condvars concurrency model -- and
//! on `jswans33-james-shell/src/status.rs`'s 128+signal convention.

use crate::error::{Error, Result};

/// The process the coordinator actually waits on: the real child for a
/// direct launch, or the PTY proxy for an interactive-input launch, whose
/// own exit code is defined to be the real child's.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Waitable {
    Direct(libc::pid_t),
    ThroughProxy {
        proxy_pid: libc::pid_t,
        #[allow(dead_code)]
        child_pid: libc::pid_t,
    },
}

impl Waitable {
    fn wait_pid(&self) -> libc::pid_t {
        match *self {
            Waitable::Direct(pid) => pid,
            Waitable::ThroughProxy { proxy_pid, .. } => proxy_pid,
        }
    }
}

/// Blocks until `waitable`'s process exits, returning the mapped exit code.
/// A normal exit yields `WEXITSTATUS`; a signaled termination yields
/// `128 + signal`, the common convention spec.md §4.8 names.
pub(crate) fn wait_for_exit(waitable: Waitable) -> Result<i32> {
    let pid = waitable.wait_pid();
    loop {
        let mut status: libc::c_int = 0;
        let rc = unsafe { libc::waitpid(pid, &mut status, 0) };
        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            return Err(Error::failure("waitpid", err));
        }
        if unsafe { libc::WIFEXITED(status) } {
            return Ok(unsafe { libc::WEXITSTATUS(status) });
        }
        if unsafe { libc::WIFSIGNALED(status) } {
            return Ok(128 + unsafe { libc::WTERMSIG(status) });
        }
        // Stopped/continued notifications can't reach us: this waitpid call
        // doesn't pass WUNTRACED|WCONTINUED. Only the proxy's own loop
        // needs to see those.
    }
}
