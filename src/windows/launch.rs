//! `CreateProcessW`-based direct launch.
//!
//! Windows has no PTY-proxy subsystem -- spec.md §3 scopes interactive
//! callback input to POSIX -- so a `Callback` stdin binding is serviced
//! through an ordinary anonymous pipe here, identically to `Buffer`/`Lines`.

use crate::resolve::CommandResolution;
use crate::windows::error::{Cvt, Error};
use crate::windows::util::OwnedHandle;
use std::ffi::OsStr;
use std::os::windows::ffi::OsStrExt;
use winapi::shared::minwindef::TRUE;
use winapi::um::processthreadsapi::{CreateProcessW, PROCESS_INFORMATION, STARTUPINFOW};
use winapi::um::winbase::{CREATE_NO_WINDOW, CREATE_UNICODE_ENVIRONMENT, STARTF_USESTDHANDLES};
use winapi::um::winnt::HANDLE;

/// A stream's child-facing handle: either one this call allocated (closed in
/// the parent once the child has its own copy, mirroring how a POSIX fork
/// drops the child's end of a pipe in the parent), or a caller-owned handle
/// we must not close.
pub(crate) enum RawStdio {
    Owned(OwnedHandle),
    CallerHandle(HANDLE),
}

impl RawStdio {
    pub(crate) fn raw(&self) -> HANDLE {
        match self {
            RawStdio::Owned(h) => h.as_raw(),
            RawStdio::CallerHandle(h) => *h,
        }
    }
}

pub(crate) struct ChildStdio {
    pub(crate) stdin: RawStdio,
    pub(crate) stdout: RawStdio,
    pub(crate) stderr: RawStdio,
}

pub(crate) struct SpawnedChild {
    pub(crate) process: HANDLE,
    pub(crate) thread: HANDLE,
}

unsafe impl Send for SpawnedChild {}

/// Launches `resolution` with the three streams wired per `stdio`. The
/// `ChildStdio` handles this call owns are dropped (closed) as soon as the
/// function returns, which is what lets the parent's paired pipe ends
/// observe EOF once the child exits. `needs_console` is the
/// [`crate::console::ConsolePolicy`] verdict for this launch: `false` adds
/// `CREATE_NO_WINDOW` so the child starts detached from any console.
pub(crate) fn spawn_child(
    resolution: &CommandResolution,
    stdio: ChildStdio,
    needs_console: bool,
) -> Result<SpawnedChild, Error> {
    let mut startup_info: STARTUPINFOW = unsafe { std::mem::zeroed() };
    startup_info.cb = std::mem::size_of::<STARTUPINFOW>() as u32;
    startup_info.dwFlags = STARTF_USESTDHANDLES;
    startup_info.hStdInput = stdio.stdin.raw();
    startup_info.hStdOutput = stdio.stdout.raw();
    startup_info.hStdError = stdio.stderr.raw();

    let application_name: Vec<u16> = resolution
        .program
        .as_os_str()
        .encode_wide()
        .chain(std::iter::once(0))
        .collect();
    let mut cmd_line = build_command_line(&resolution.argv);

    let creation_flags = if needs_console {
        CREATE_UNICODE_ENVIRONMENT
    } else {
        CREATE_UNICODE_ENVIRONMENT | CREATE_NO_WINDOW
    };

    let mut info: PROCESS_INFORMATION = unsafe { std::mem::zeroed() };
    unsafe {
        Cvt::nonzero(CreateProcessW(
            application_name.as_ptr(),
            cmd_line.as_mut_ptr(),
            std::ptr::null_mut(),
            std::ptr::null_mut(),
            TRUE,
            creation_flags,
            std::ptr::null_mut(),
            std::ptr::null(),
            &mut startup_info,
            &mut info,
        ))?;
    }

    Ok(SpawnedChild {
        process: info.hProcess,
        thread: info.hThread,
    })
}

fn build_command_line(argv: &[std::ffi::OsString]) -> Vec<u16> {
    let mut out = Vec::new();
    for (i, arg) in argv.iter().enumerate() {
        if i > 0 {
            out.push(b' ' as u16);
        }
        quote_arg(&mut out, arg);
    }
    out.push(0);
    out
}

fn quote_arg(out: &mut Vec<u16>, data: &OsStr) {
    out.push(b'"' as u16);
    for ch in data.encode_wide() {
        debug_assert_ne!(ch, b'"' as u16, "embedded quotes in arguments are not yet supported");
        out.push(ch);
    }
    out.push(b'"' as u16);
}
