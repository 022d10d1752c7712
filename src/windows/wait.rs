//! Blocking wait for process exit.
//!
//! The crate's concurrency model is synchronous threads + condvars, not
//! futures -- the coordinator drives a dedicated wait thread on every
//! platform (see `unix::lifecycle`), so this is a plain blocking call rather
//! than the bespoke `WaitFuture`/`AtomicWaker` machinery it replaces.

use crate::windows::error::{Cvt, Error};
use winapi::um::processthreadsapi::GetExitCodeProcess;
use winapi::um::synchapi::WaitForSingleObject;
use winapi::um::winbase::{INFINITE, WAIT_OBJECT_0};
use winapi::um::winnt::HANDLE;

/// Waits for `process` to exit and returns its exit code, mapped per
/// spec.md §4.8 (normal exit: exit code verbatim; Windows has no POSIX
/// signal-termination distinction, so every exit surfaces here the same way).
pub(crate) fn wait_for_exit(process: HANDLE) -> Result<i32, Error> {
    let res = unsafe { WaitForSingleObject(process, INFINITE) };
    if res != WAIT_OBJECT_0 {
        return Err(Error::last());
    }
    let mut exit_code = 0u32;
    unsafe {
        Cvt::nonzero(GetExitCodeProcess(process, &mut exit_code))?;
    }
    Ok(exit_code as i32)
}
