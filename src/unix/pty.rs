//! POSIX PTY-proxy subsystem.
//!
//! The job-control primitives (`tcsetpgrp`/`SIGCONT`/`EINTR`-retry loops)
//! are grounded on `jswans33-james-shell/src/job_control.rs`, the one file
//! in the retrieval pack that already implements this exact dance in safe
//! Rust for a single interactive shell; here it drives a reusable
//! intermediate process instead of the shell itself. PTY allocation is
//! `nix::pty::openpty`, matched to minion's preference for `nix` over raw
//! `libc` where `nix` has a safe wrapper.

use crate::unix::fd::Fd;
use crate::unix::launch::RawStdio;
use nix::sys::termios::{self, LocalFlags, OutputFlags, SetArg};
use std::io::{Read, Write};
use std::os::unix::io::RawFd;
use std::time::Duration;

/// Heuristic delay after `SIGCONT` to let the foregrounded child drain
/// whatever is already buffered on the PTY before it is stopped and
/// backgrounded again. Spec.md §9 flags this sleep as a known race,
/// adjustable rather than tightened.
pub(crate) const FOREGROUND_DRAIN_DELAY: Duration = Duration::from_micros(50);

/// Heuristic delay after the input worker confirms it wrote a chunk,
/// before re-stopping and backgrounding the child. Same caveat as
/// [`FOREGROUND_DRAIN_DELAY`].
pub(crate) const INPUT_SETTLE_DELAY: Duration = Duration::from_micros(100);

/// One-byte rendezvous messages exchanged between the proxy and the
/// parent-side input worker.
const MSG_INPUT_READY: u8 = b'X';
const MSG_INPUT_CLOSED: u8 = b'C';

/// Resources the parent process retains for an interactive-input session.
/// Lives for the duration of one spawn invocation; torn down by
/// [`crate::unix::cleanup`].
pub(crate) struct PtySession {
    pub(crate) master: Fd,
    pub(crate) proxy_pid: libc::pid_t,
    pub(crate) child_pid: libc::pid_t,
    /// Parent writes a request-confirmation byte here; proxy reads it.
    confirm_tx: Fd,
    /// Proxy writes an input-ready request here; parent's worker reads it.
    request_rx: Fd,
}

impl PtySession {
    /// Worker-side: block for the proxy's next "give me input" request.
    /// Returns `false` on EOF (the proxy, and thus the whole session, is
    /// gone).
    pub(crate) fn wait_for_request(&self) -> bool {
        let mut byte = [0u8; 1];
        loop {
            match nix::unistd::read(self.request_rx.as_raw(), &mut byte) {
                Ok(0) => return false,
                Ok(_) => return byte[0] == MSG_INPUT_READY,
                Err(nix::Error::Sys(nix::errno::Errno::EINTR)) => continue,
                Err(_) => return false,
            }
        }
    }

    /// Worker-side: write one input chunk onto the PTY master, as if a
    /// human had typed it, then confirm to the proxy.
    pub(crate) fn deliver_input(&self, data: &[u8]) -> nix::Result<()> {
        write_all(self.master.as_raw(), data)?;
        write_all(self.confirm_tx.as_raw(), &[MSG_INPUT_READY])?;
        Ok(())
    }

    /// Worker-side: the input callback asked to close input. Tells the
    /// proxy not to stop the child again; subsequent reads by the child
    /// will see EOF on the PTY once the master side is fully closed.
    pub(crate) fn notify_input_closed(&self) -> nix::Result<()> {
        write_all(self.confirm_tx.as_raw(), &[MSG_INPUT_CLOSED])
    }
}

fn write_all(fd: RawFd, mut data: &[u8]) -> nix::Result<()> {
    while !data.is_empty() {
        let n = nix::unistd::write(fd, data)?;
        data = &data[n..];
    }
    Ok(())
}

/// Disable echo and output NL-to-CRNL translation on `fd`'s terminal, per
/// spec.md §4.4 point 2.
fn make_interactive_quiet(fd: RawFd) -> nix::Result<()> {
    let mut attrs = termios::tcgetattr(fd)?;
    attrs.local_flags.remove(LocalFlags::ECHO);
    attrs.output_flags.remove(OutputFlags::ONLCR);
    termios::tcsetattr(fd, SetArg::TCSANOW, &attrs)?;
    Ok(())
}

/// Result of provisioning the PTY pair and rendezvous pipes, before the
/// proxy is forked.
pub(crate) struct PtyProvision {
    pub(crate) master: Fd,
    pub(crate) slave: Fd,
    /// Proxy's end: read the worker's confirmation byte.
    confirm_rx: Fd,
    /// Parent's end: write the worker's confirmation byte.
    confirm_tx: Fd,
    /// Proxy's end: write an input-ready request.
    request_tx: Fd,
    /// Parent's end: read the proxy's request.
    request_rx: Fd,
}

pub(crate) fn provision() -> Result<PtyProvision, crate::error::Error> {
    let result = nix::pty::openpty(None, None).map_err(crate::error::Error::from)?;
    let master = Fd::new(result.master);
    let slave = Fd::new(result.slave);

    let (confirm_rx, confirm_tx) = crate::unix::pipe::raw_pair()?;
    let (request_rx, request_tx) = crate::unix::pipe::raw_pair()?;

    Ok(PtyProvision {
        master,
        slave,
        confirm_rx,
        confirm_tx,
        request_tx,
        request_rx,
    })
}

/// Fork the proxy process. On success, returns the
/// parent-side [`PtySession`] handle; the proxy process never returns from
/// this function (it runs [`run_proxy`] and calls `std::process::exit`).
pub(crate) fn fork_proxy(
    provision: PtyProvision,
    resolution: &crate::resolve::CommandResolution,
    child_stdout: RawStdio,
    child_stderr: RawStdio,
) -> Result<PtySession, crate::error::Error> {
    let PtyProvision {
        master,
        slave,
        confirm_rx,
        confirm_tx,
        request_tx,
        request_rx,
    } = provision;

    match unsafe { nix::unistd::fork() }.map_err(crate::error::Error::from)? {
        nix::unistd::ForkResult::Child => {
            drop(confirm_tx);
            drop(request_rx);
            // The proxy keeps its own copy of the master end (fork shares
            // the underlying file description) so its own `select` probe
            // in `proxy_loop` can check for typed-ahead input independently
            // of the parent's copy.
            run_proxy(
                master,
                slave,
                confirm_rx,
                request_tx,
                resolution,
                child_stdout,
                child_stderr,
            );
        }
        nix::unistd::ForkResult::Parent { child } => {
            drop(confirm_rx);
            drop(request_tx);
            drop(slave);
            drop(child_stdout);
            drop(child_stderr);

            // The proxy reports the real child's pid back over the
            // request pipe's ancillary first byte isn't used for this;
            // instead it writes four raw bytes (native-endian pid_t)
            // before settling into its request-driven loop. This mirrors
            // spec.md §4.4 point 3: "sends the child PID back to the
            // parent via a rendezvous pipe".
            let mut pid_bytes = [0u8; std::mem::size_of::<libc::pid_t>()];
            nix::unistd::read(request_rx.as_raw(), &mut pid_bytes)
                .map_err(crate::error::Error::from)?;
            let child_pid = libc::pid_t::from_ne_bytes(pid_bytes);

            Ok(PtySession {
                master,
                proxy_pid: child.as_raw(),
                child_pid,
                confirm_tx,
                request_rx,
            })
        }
    }
}

/// The proxy's own body: becomes session leader, takes the PTY slave as
/// its controlling terminal, forks the real child, then runs the
/// job-control state machine. Never returns.
///
/// Only the child's stdin comes from the PTY slave (inherited from the
/// proxy's own fd 0, set below); stdout/stderr are the ordinary pipes the
/// Provisioner already allocated for those streams, exactly as a direct
/// (non-interactive) launch would wire them -- the proxy exists to mediate
/// *input* job-control, per spec.md §1/§4.4, not to retarget output.
fn run_proxy(
    master: Fd,
    slave: Fd,
    confirm_rx: Fd,
    request_tx: Fd,
    resolution: &crate::resolve::CommandResolution,
    child_stdout: RawStdio,
    child_stderr: RawStdio,
) -> ! {
    unsafe {
        libc::setsid();
    }

    if let Err(e) = make_interactive_quiet(slave.as_raw()) {
        eprintln!("shellspawn: proxy failed to configure pty: {}", e);
        unsafe { libc::_exit(255) };
    }

    unsafe {
        libc::dup2(slave.as_raw(), libc::STDIN_FILENO);
    }

    let proxy_pgid = unsafe { libc::getpgrp() };
    unsafe {
        libc::tcsetpgrp(slave.as_raw(), proxy_pgid);
    }

    let child_pid = match unsafe { nix::unistd::fork() } {
        Ok(nix::unistd::ForkResult::Child) => {
            unsafe {
                libc::setpgid(0, 0);
                libc::dup2(child_stdout.raw(), libc::STDOUT_FILENO);
                libc::dup2(child_stderr.raw(), libc::STDERR_FILENO);
                libc::signal(libc::SIGTTIN, libc::SIG_DFL);
                libc::signal(libc::SIGTTOU, libc::SIG_DFL);
                libc::signal(libc::SIGTSTP, libc::SIG_DFL);
            }
            crate::unix::launch::close_duplicated_end(child_stdout, libc::STDOUT_FILENO);
            crate::unix::launch::close_duplicated_end(child_stderr, libc::STDERR_FILENO);
            crate::unix::launch::exec_resolved(resolution);
        }
        Ok(nix::unistd::ForkResult::Parent { child }) => child.as_raw(),
        Err(e) => {
            eprintln!("shellspawn: proxy failed to fork child: {}", e);
            unsafe { libc::_exit(255) };
        }
    };

    unsafe {
        let _ = libc::setpgid(child_pid, child_pid);
        libc::tcsetpgrp(slave.as_raw(), child_pid);
    }

    {
        let pid_bytes = child_pid.to_ne_bytes();
        let _ = write_all(request_tx.as_raw(), &pid_bytes);
    }

    proxy_loop(child_pid, master, slave, confirm_rx, request_tx);
}

fn select_readable(fd: RawFd, timeout: &mut libc::timeval) -> bool {
    unsafe {
        let mut set: libc::fd_set = std::mem::zeroed();
        libc::FD_ZERO(&mut set);
        libc::FD_SET(fd, &mut set);
        let rc = libc::select(
            fd + 1,
            &mut set,
            std::ptr::null_mut(),
            std::ptr::null_mut(),
            timeout,
        );
        rc > 0 && libc::FD_ISSET(fd, &set)
    }
}

/// Drive the real child through job-control transitions until it exits
///. Never returns; calls `std::process::exit`.
fn proxy_loop(child_pid: libc::pid_t, master: Fd, slave: Fd, confirm_rx: Fd, request_tx: Fd) -> ! {
    let mut master_fd = Some(master);
    loop {
        let mut status: libc::c_int = 0;
        let wait_rc =
            unsafe { libc::waitpid(child_pid, &mut status, libc::WUNTRACED | libc::WCONTINUED) };
        if wait_rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            unsafe { libc::_exit(255) };
        }

        if unsafe { libc::WIFEXITED(status) } {
            unsafe { libc::_exit(libc::WEXITSTATUS(status)) };
        }
        if unsafe { libc::WIFSIGNALED(status) } {
            unsafe { libc::_exit(128 + libc::WTERMSIG(status)) };
        }
        if !unsafe { libc::WIFSTOPPED(status) } {
            continue;
        }
        if unsafe { libc::WSTOPSIG(status) } != libc::SIGTTIN {
            // Other stop signals: leave the child stopped, per spec.md §4.7.
            continue;
        }

        let proxy_pgid = unsafe { libc::getpgrp() };
        let master_ref = match master_fd.as_ref() {
            Some(m) => m.as_raw(),
            None => {
                // Master already closed (input was closed earlier); just
                // keep the child foregrounded and let it run to EOF/exit.
                unsafe {
                    libc::tcsetpgrp(slave.as_raw(), child_pid);
                    libc::kill(-child_pid, libc::SIGCONT);
                }
                continue;
            }
        };

        let mut zero_timeout = libc::timeval {
            tv_sec: 0,
            tv_usec: 0,
        };
        if select_readable(master_ref, &mut zero_timeout) {
            unsafe {
                libc::tcsetpgrp(slave.as_raw(), child_pid);
                libc::kill(-child_pid, libc::SIGCONT);
            }
            std::thread::sleep(FOREGROUND_DRAIN_DELAY);
            unsafe {
                libc::kill(-child_pid, libc::SIGSTOP);
                libc::tcsetpgrp(slave.as_raw(), proxy_pgid);
                libc::kill(-child_pid, libc::SIGCONT);
            }
            continue;
        }

        let _ = write_all(request_tx.as_raw(), &[MSG_INPUT_READY]);
        unsafe {
            libc::tcsetpgrp(slave.as_raw(), child_pid);
            libc::kill(-child_pid, libc::SIGCONT);
        }

        let mut confirm = [0u8; 1];
        let read_rc = loop {
            match nix::unistd::read(confirm_rx.as_raw(), &mut confirm) {
                Ok(n) => break n,
                Err(nix::Error::Sys(nix::errno::Errno::EINTR)) => continue,
                Err(_) => break 0,
            }
        };
        if read_rc == 0 || confirm[0] == MSG_INPUT_CLOSED {
            // Caller closed input (or the worker is gone): stop polling,
            // drop our PTY master duplicate so EOF can propagate once the
            // parent's copy is closed too, and let the child run.
            master_fd = None;
            unsafe {
                libc::tcsetpgrp(slave.as_raw(), child_pid);
                libc::kill(-child_pid, libc::SIGCONT);
            }
            continue;
        }

        std::thread::sleep(INPUT_SETTLE_DELAY);
        unsafe {
            libc::kill(-child_pid, libc::SIGSTOP);
            libc::tcsetpgrp(slave.as_raw(), proxy_pgid);
            libc::kill(-child_pid, libc::SIGCONT);
        }
    }
}
