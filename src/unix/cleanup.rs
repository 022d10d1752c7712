//! Cleanup: idempotent teardown of the child/proxy process
//! group on an error exit.
//!
//! Every fd and thread this crate owns is already wrapped in an RAII type
//! (`unix::fd::Fd`, `std::thread::JoinHandle`) whose `Drop`/`join` covers
//! the "release exactly once" invariant for those resources, mirroring the
//! `Fd`/`LinuxReadPipe`/`LinuxWritePipe` `Drop` impls in
//! `linux/fd.rs`/`linux/pipe.rs`. The one invariant Rust's ownership system
//! doesn't give us for free is spec.md's "if the child or proxy is still
//! alive, send SIGTERM to the child's process group and SIGKILL to the
//! proxy" -- that's a liveness check against an external process, not a
//! value this process owns, so it's handled explicitly here.

/// Sentinel-marked handle to a child or proxy process group, safe to sweep
/// multiple times (`terminate` is idempotent: signaling an already-dead
/// pid is a harmless `ESRCH`).
#[derive(Debug, Clone, Copy)]
pub(crate) struct OwnedProcess {
    pid: libc::pid_t,
    is_proxy: bool,
}

impl OwnedProcess {
    pub(crate) fn child(pid: libc::pid_t) -> Self {
        OwnedProcess {
            pid,
            is_proxy: false,
        }
    }

    pub(crate) fn proxy(pid: libc::pid_t) -> Self {
        OwnedProcess {
            pid,
            is_proxy: true,
        }
    }

    /// Signal the process (its group, for the real child) if it is still
    /// alive. Safe to call on an already-reaped pid.
    pub(crate) fn terminate_if_alive(&self) {
        let sig = if self.is_proxy {
            libc::SIGKILL
        } else {
            libc::SIGTERM
        };
        let target = if self.is_proxy { self.pid } else { -self.pid };
        unsafe {
            libc::kill(target, sig);
        }
    }
}

/// Invocation-scoped teardown pass, constructed as soon as a pid exists and
/// run on every error exit path before the function returns. A successful run that already reaped the process should
/// call [`Guard::disarm`] so cleanup does not re-signal a recycled pid.
#[derive(Default)]
pub(crate) struct Guard {
    processes: Vec<OwnedProcess>,
    armed: bool,
}

impl Guard {
    pub(crate) fn new() -> Self {
        Guard {
            processes: Vec::new(),
            armed: true,
        }
    }

    pub(crate) fn track(&mut self, process: OwnedProcess) {
        self.processes.push(process);
    }

    /// Call once the invocation has fully reaped its processes through the
    /// normal exit path; prevents a stray signal to a recycled pid.
    pub(crate) fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for Guard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        for process in &self.processes {
            process.terminate_if_alive();
        }
    }
}
