//! Child Launcher: fork+dup2+exec of the resolved program.
//!
//! Grounded on `linux/zygote/setup.rs`'s fork/dup2/exec sequencing, stripped
//! of namespace/cgroup/chroot setup (out of scope for this spec).

use crate::error::Result;
use crate::resolve::CommandResolution;
use crate::unix::fd::Fd;
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;

/// `execv` the resolved program with its parsed argv. Never returns on
/// success. On failure, per spec.md §4.4, the child prints a diagnostic and
/// terminates with status 255 (`-1` as an unsigned byte).
pub(crate) fn exec_resolved(resolution: &CommandResolution) -> ! {
    let path = match CString::new(resolution.program.as_os_str().as_bytes()) {
        Ok(p) => p,
        Err(_) => unsafe { libc::_exit(255) },
    };
    let argv: Vec<CString> = resolution
        .argv
        .iter()
        .map(|a| CString::new(a.as_os_str().as_bytes()).unwrap_or_default())
        .collect();

    match nix::unistd::execv(&path, &argv) {
        Ok(_) => unreachable!("execv does not return on success"),
        Err(e) => {
            eprintln!("shellspawn: exec failed: {}", e);
            unsafe { libc::_exit(255) };
        }
    }
}

/// Pipe/handle ends to be inherited by the directly-launched (non-PTY)
/// child, already made inheritable by the Provisioner.
pub(crate) struct ChildStdio {
    pub(crate) stdin: RawStdio,
    pub(crate) stdout: RawStdio,
    pub(crate) stderr: RawStdio,
}

/// Either a pipe end the parent provisioned, or a caller-supplied handle to
/// dup onto the child's descriptor.
pub(crate) enum RawStdio {
    Fd(Fd),
    CallerHandle(std::os::raw::c_int),
}

impl RawStdio {
    pub(crate) fn raw(&self) -> std::os::raw::c_int {
        match self {
            RawStdio::Fd(fd) => fd.as_raw(),
            RawStdio::CallerHandle(h) => *h,
        }
    }
}

/// After `dup2(stdio, target)`, drop the pre-`dup2` descriptor so it doesn't
/// leak across `exec` -- it had `FD_CLOEXEC` cleared by the Provisioner
/// (`unix::fd::Fd::allow_inherit`) precisely so the `dup2` above could see
/// it, and per spec.md §4.4 the child must "close the remaining pipe ends."
/// A caller-supplied `Handle` binding is left untouched: the caller owns it.
/// If the provisioned end already happened to be numbered `target`, it must
/// stay open -- `into_raw` releases our `Fd` wrapper without closing it.
pub(crate) fn close_duplicated_end(stdio: RawStdio, target: libc::c_int) {
    if let RawStdio::Fd(fd) = stdio {
        if fd.as_raw() == target {
            let _ = fd.into_raw();
        }
    }
}

/// Fork the child directly (no PTY proxy), matching spec.md §4.4's
/// dup2-then-exec sequence. Resets job-control signal dispositions to
/// default before exec, as a bare `exec` normally does not reach that code
/// path (job control only matters when an interactive PTY is involved, but
/// resetting here keeps behavior uniform regardless of the parent's own
/// disposition).
pub(crate) fn fork_child(
    resolution: &CommandResolution,
    stdio: ChildStdio,
) -> Result<libc::pid_t> {
    match unsafe { nix::unistd::fork() }? {
        nix::unistd::ForkResult::Child => {
            unsafe {
                libc::dup2(stdio.stdin.raw(), libc::STDIN_FILENO);
                libc::dup2(stdio.stdout.raw(), libc::STDOUT_FILENO);
                libc::dup2(stdio.stderr.raw(), libc::STDERR_FILENO);
                libc::signal(libc::SIGTTIN, libc::SIG_DFL);
                libc::signal(libc::SIGTTOU, libc::SIG_DFL);
                libc::signal(libc::SIGTSTP, libc::SIG_DFL);
                libc::signal(libc::SIGPIPE, libc::SIG_DFL);
            }
            close_duplicated_end(stdio.stdin, libc::STDIN_FILENO);
            close_duplicated_end(stdio.stdout, libc::STDOUT_FILENO);
            close_duplicated_end(stdio.stderr, libc::STDERR_FILENO);
            exec_resolved(resolution);
        }
        nix::unistd::ForkResult::Parent { child } => Ok(child.as_raw()),
    }
}
