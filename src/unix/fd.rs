//! Owning file-descriptor wrapper, mirrored on minion's `linux::fd::Fd`.

use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use std::mem::ManuallyDrop;
use std::os::unix::io::RawFd;

/// A single owned file descriptor. Closed exactly once, on `Drop`, unless
/// extracted via [`Fd::into_raw`].
#[derive(Debug)]
pub(crate) struct Fd(RawFd);

impl Fd {
    pub(crate) fn new(raw: RawFd) -> Self {
        Fd(raw)
    }

    pub(crate) fn as_raw(&self) -> RawFd {
        self.0
    }

    /// Hand the descriptor to the caller without closing it.
    pub(crate) fn into_raw(self) -> RawFd {
        let this = ManuallyDrop::new(self);
        this.0
    }

    /// Duplicate this descriptor onto a fresh one, inheritable by a child.
    pub(crate) fn duplicate(&self) -> nix::Result<Self> {
        Ok(Fd::new(nix::unistd::dup(self.0)?))
    }

    /// Clear `FD_CLOEXEC` so a forked child retains this descriptor across
    /// `exec`.
    pub(crate) fn allow_inherit(&self) -> nix::Result<()> {
        fcntl(self.0, FcntlArg::F_SETFD(FdFlag::empty())).map(drop)
    }
}

impl Drop for Fd {
    fn drop(&mut self) {
        let _ = nix::unistd::close(self.0);
    }
}
