//! Ordinary-pipe plumbing, mirrored on minion's `linux::pipe` module:
//! `pipe2(O_CLOEXEC)` plus small `Read`/`Write` wrappers over one end.
//! Generalized from minion's per-direction helpers into one pair
//! constructor shared by stdin/stdout/stderr.

use crate::error::{Error, Result};
use crate::unix::fd::Fd;
use std::io;

pub(crate) struct ReadPipe(Fd);

impl ReadPipe {
    pub(crate) fn fd(&self) -> &Fd {
        &self.0
    }

    pub(crate) fn into_fd(self) -> Fd {
        self.0
    }
}

impl io::Read for ReadPipe {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        nix::unistd::read(self.0.as_raw(), buf).map_err(|e| {
            e.as_errno()
                .map(|errno| io::Error::from_raw_os_error(errno as i32))
                .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, e))
        })
    }
}

pub(crate) struct WritePipe(Fd);

impl WritePipe {
    pub(crate) fn fd(&self) -> &Fd {
        &self.0
    }

    pub(crate) fn into_fd(self) -> Fd {
        self.0
    }
}

impl io::Write for WritePipe {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        nix::unistd::write(self.0.as_raw(), buf).map_err(|e| {
            e.as_errno()
                .map(|errno| io::Error::from_raw_os_error(errno as i32))
                .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, e))
        })
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Allocate an ordinary pipe. Returns `(read end, write end)`; both ends are
/// created `O_CLOEXEC` so the parent must explicitly re-enable inheritance
/// on whichever end the child needs via [`Fd::allow_inherit`].
pub(crate) fn pipe() -> Result<(ReadPipe, WritePipe)> {
    let (r, w) = nix::unistd::pipe2(nix::fcntl::OFlag::O_CLOEXEC)
        .map_err(|e| Error::from(e))?;
    Ok((ReadPipe(Fd::new(r)), WritePipe(Fd::new(w))))
}

/// Allocate a pipe as a bare `(read, write)` [`Fd`] pair, for the one-byte
/// rendezvous channels the PTY proxy uses -- these
/// carry single control bytes, not stream data, so the `Read`/`Write`
/// wrappers above would be the wrong abstraction.
pub(crate) fn raw_pair() -> Result<(Fd, Fd)> {
    let (r, w) = nix::unistd::pipe2(nix::fcntl::OFlag::O_CLOEXEC)
        .map_err(|e| Error::from(e))?;
    Ok((Fd::new(r), Fd::new(w)))
}
