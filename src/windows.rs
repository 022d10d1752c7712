//! Windows backend: `CreateProcessW` direct launch for every stream binding.
//!
//! Windows has no PTY-proxy equivalent to `unix::pty` -- interactive
//! callback input is POSIX-only -- so a `Callback` stdin binding is
//! serviced through an ordinary anonymous pipe here exactly like
//! `Buffer`/`Lines`; only stream provisioning and the launch/wait primitives
//! differ from [`crate::unix`].

mod cleanup;
mod error;
mod launch;
mod pipe;
mod util;
mod wait;

pub(crate) use error::{Cvt, Error};

use crate::binding::{InputBinding, OutputBinding};
use crate::console::ConsolePolicy;
use crate::error::{Error as CrateError, Result, Stream};
use crate::marshal::CallbackMarshaller;
use crate::resolve::CommandResolution;
use crate::workers::{self, CapturedOutput, InputSource, OutputSink};
use launch::{ChildStdio, RawStdio};
use std::os::raw::c_int;
use std::os::windows::io::IntoRawHandle;
use std::sync::Arc;
use std::thread;
use winapi::um::handleapi::CloseHandle;
use winapi::um::winnt::HANDLE;

pub(crate) struct RunOutcome {
    pub(crate) exit_code: i32,
    pub(crate) stdout: CapturedOutput,
    pub(crate) stderr: CapturedOutput,
}

/// Entry point for the Windows backend. Unlike POSIX there is only one
/// launch path -- no PTY allocation decision -- since interactive callback
/// input rides an ordinary pipe here.
pub(crate) fn run(
    resolution: CommandResolution,
    stdin: InputBinding,
    stdout: OutputBinding,
    stderr: OutputBinding,
    console_policy: Box<dyn ConsolePolicy>,
) -> Result<RunOutcome> {
    let (child_stdin, parent_stdin) = provision_input(&stdin)?;
    let (child_stdout, parent_stdout) = provision_output(&stdout)?;
    let (child_stderr, parent_stderr) = provision_output(&stderr)?;

    let spawned = launch::spawn_child(
        &resolution,
        ChildStdio {
            stdin: child_stdin,
            stdout: child_stdout,
            stderr: child_stderr,
        },
        console_policy.needs_console(),
    )
    .map_err(CrateError::from)?;
    unsafe {
        CloseHandle(spawned.thread);
    }

    let mut guard = cleanup::Guard::new();
    guard.track(cleanup::OwnedProcess::new(spawned.process));

    let marshaller = Arc::new(CallbackMarshaller::new());
    let callback_bound = has_callback(&stdin, &stdout, &stderr);

    let (stdin_source, mut input_cb) = into_input_source(stdin, &marshaller);
    let (stdout_sink, mut stdout_cb) = into_output_sink(stdout, &marshaller);
    let (stderr_sink, mut stderr_cb) = into_output_sink(stderr, &marshaller);

    let input_handle = parent_stdin.map(|w| thread::spawn(move || workers::run_input_worker(w, stdin_source)));
    let stdout_handle = parent_stdout
        .map(|r| thread::spawn(move || workers::run_output_worker(r, Stream::Stdout, stdout_sink)));
    let stderr_handle = parent_stderr
        .map(|r| thread::spawn(move || workers::run_output_worker(r, Stream::Stderr, stderr_sink)));

    // The wait-thread joins every stream worker *before* posting
    // `Terminated`, matching spec.md §4.6 ("a dedicated wait-thread that
    // joins the child and the three workers"). A worker can still be
    // mid-`CallbackMarshaller::post` when the child exits (an output worker
    // with one more buffered chunk to deliver); joining first guarantees
    // the caller thread's `drive` loop is still running to `ack` it, so it
    // cannot block forever on the `handled` condvar once `Terminated` fires.
    let (exit_code, stdout_result, stderr_result) = if callback_bound {
        let wait_marshaller = marshaller.clone();
        let process = spawned.process as usize;
        let wait_thread = thread::spawn(move || -> Result<(i32, CapturedOutput, CapturedOutput)> {
            let exit_result = wait::wait_for_exit(process as HANDLE).map_err(CrateError::from);
            let workers_result = join_workers(input_handle, stdout_handle, stderr_handle);
            wait_marshaller.terminate();
            let exit_code = exit_result?;
            let (stdout_result, stderr_result) = workers_result?;
            Ok((exit_code, stdout_result, stderr_result))
        });
        marshaller.drive(
            input_cb.as_deref_mut(),
            stdout_cb.as_deref_mut(),
            stderr_cb.as_deref_mut(),
        );
        let result = wait_thread.join().expect("wait-thread panicked")?;
        guard.disarm();
        result
    } else {
        let exit_code = wait::wait_for_exit(spawned.process).map_err(CrateError::from)?;
        guard.disarm();
        let (stdout_result, stderr_result) = join_workers(input_handle, stdout_handle, stderr_handle)?;
        (exit_code, stdout_result, stderr_result)
    };

    Ok(RunOutcome {
        exit_code,
        stdout: stdout_result,
        stderr: stderr_result,
    })
}

fn provision_input(binding: &InputBinding) -> Result<(RawStdio, Option<pipe::WritePipe>)> {
    match binding {
        InputBinding::Handle(h) => Ok((RawStdio::CallerHandle(handle_from_raw(h.as_raw())), None)),
        _ => {
            let (read, write) = pipe::make(pipe::InheritKind::Allow).map_err(CrateError::from)?;
            let owned = util::OwnedHandle::new(read.into_raw_handle());
            Ok((RawStdio::Owned(owned), Some(write)))
        }
    }
}

fn provision_output(binding: &OutputBinding) -> Result<(RawStdio, Option<pipe::ReadPipe>)> {
    match binding {
        OutputBinding::Handle(h) => Ok((RawStdio::CallerHandle(handle_from_raw(h.as_raw())), None)),
        _ => {
            let (read, write) = pipe::make(pipe::InheritKind::Allow).map_err(CrateError::from)?;
            let owned = util::OwnedHandle::new(write.into_raw_handle());
            Ok((RawStdio::Owned(owned), Some(read)))
        }
    }
}

fn handle_from_raw(raw: c_int) -> HANDLE {
    raw as isize as HANDLE
}

type InputCallback = Box<dyn FnMut(&mut Vec<u8>) -> bool + Send>;
type OutputCallback = Box<dyn FnMut(&[u8]) + Send>;

fn into_input_source(
    binding: InputBinding,
    marshaller: &Arc<CallbackMarshaller>,
) -> (InputSource, Option<InputCallback>) {
    match binding {
        InputBinding::Discard => (InputSource::Discard, None),
        InputBinding::Lines(lines) => (InputSource::Lines(lines), None),
        InputBinding::Buffer(data) => (InputSource::Buffer(data), None),
        InputBinding::Callback(cb) => (InputSource::Callback(marshaller.clone()), Some(cb)),
        InputBinding::Handle(_) => (InputSource::Discard, None),
    }
}

fn into_output_sink(
    binding: OutputBinding,
    marshaller: &Arc<CallbackMarshaller>,
) -> (OutputSink, Option<OutputCallback>) {
    match binding {
        OutputBinding::Discard => (OutputSink::Discard, None),
        OutputBinding::Lines => (OutputSink::Lines, None),
        OutputBinding::Buffer => (OutputSink::Buffer, None),
        OutputBinding::Callback(cb) => (OutputSink::Callback(marshaller.clone()), Some(cb)),
        OutputBinding::Handle(_) => (OutputSink::Discard, None),
    }
}

fn has_callback(stdin: &InputBinding, stdout: &OutputBinding, stderr: &OutputBinding) -> bool {
    matches!(stdin, InputBinding::Callback(_))
        || matches!(stdout, OutputBinding::Callback(_))
        || matches!(stderr, OutputBinding::Callback(_))
}

type WorkerOutput = (CapturedOutput, Option<std::io::Error>);

fn join_workers(
    input: Option<thread::JoinHandle<Option<std::io::Error>>>,
    stdout: Option<thread::JoinHandle<WorkerOutput>>,
    stderr: Option<thread::JoinHandle<WorkerOutput>>,
) -> Result<(CapturedOutput, CapturedOutput)> {
    let input_err = input.and_then(|h| h.join().ok()).flatten();
    let (stdout_result, stdout_err) = stdout
        .and_then(|h| h.join().ok())
        .unwrap_or((CapturedOutput::None, None));
    let (stderr_result, stderr_err) = stderr
        .and_then(|h| h.join().ok())
        .unwrap_or((CapturedOutput::None, None));

    if let Some(e) = input_err {
        return Err(CrateError::failure("stdin worker", e));
    }
    if let Some(e) = stdout_err {
        return Err(CrateError::failure("stdout worker", e));
    }
    if let Some(e) = stderr_err {
        return Err(CrateError::failure("stderr worker", e));
    }
    Ok((stdout_result, stderr_result))
}
