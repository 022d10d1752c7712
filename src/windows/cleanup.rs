//! RAII cleanup mirroring `unix::cleanup`: if the caller's
//! thread errors out before the wait completes, any process this invocation
//! started is torn down rather than left running.

use winapi::um::handleapi::CloseHandle;
use winapi::um::processthreadsapi::TerminateProcess;
use winapi::um::winnt::HANDLE;

pub(crate) struct OwnedProcess(HANDLE);

unsafe impl Send for OwnedProcess {}

impl OwnedProcess {
    pub(crate) fn new(handle: HANDLE) -> Self {
        OwnedProcess(handle)
    }

    fn terminate_if_alive(&self) {
        unsafe {
            TerminateProcess(self.0, 1);
        }
    }
}

impl Drop for OwnedProcess {
    fn drop(&mut self) {
        unsafe {
            CloseHandle(self.0);
        }
    }
}

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

    pub(crate) fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for Guard {
    fn drop(&mut self) {
        if !self.armed {
            for p in &self.processes {
                p.terminate_if_alive();
            }
        }
    }
}
