//! POSIX backend: direct fork+exec for every stdin binding except an
//! interactive callback, and the PTY-proxy path when
//! stdin is bound to a callback.

mod cleanup;
mod fd;
mod launch;
mod lifecycle;
mod pipe;
mod pty;

use crate::binding::{InputBinding, OutputBinding, OwnedStdioHandle};
use crate::error::{Error, Result, Stream};
use crate::marshal::CallbackMarshaller;
use crate::resolve::CommandResolution;
use crate::workers::{self, CapturedOutput, InputSource, OutputSink};
use launch::{ChildStdio, RawStdio};
use lifecycle::Waitable;
use std::sync::Arc;
use std::thread;

pub(crate) struct RunOutcome {
    pub(crate) exit_code: i32,
    pub(crate) stdout: CapturedOutput,
    pub(crate) stderr: CapturedOutput,
}

/// Entry point for the platform backend.
pub(crate) fn run(
    resolution: CommandResolution,
    stdin: InputBinding,
    stdout: OutputBinding,
    stderr: OutputBinding,
) -> Result<RunOutcome> {
    if matches!(stdin, InputBinding::Callback(_)) {
        run_interactive(resolution, stdin, stdout, stderr)
    } else {
        run_direct(resolution, stdin, stdout, stderr)
    }
}

fn provision_input(binding: &InputBinding) -> Result<(RawStdio, Option<pipe::WritePipe>)> {
    match binding {
        InputBinding::Handle(h) => Ok((RawStdio::CallerHandle(h.as_raw()), None)),
        _ => {
            let (read, write) = pipe::pipe()?;
            read.fd().allow_inherit().map_err(Error::from)?;
            Ok((RawStdio::Fd(read.into_fd()), Some(write)))
        }
    }
}

fn provision_output(binding: &OutputBinding) -> Result<(RawStdio, Option<pipe::ReadPipe>)> {
    match binding {
        OutputBinding::Handle(h) => Ok((RawStdio::CallerHandle(h.as_raw()), None)),
        _ => {
            let (read, write) = pipe::pipe()?;
            write.fd().allow_inherit().map_err(Error::from)?;
            Ok((RawStdio::Fd(write.into_fd()), Some(read)))
        }
    }
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

/// Join the three optional stream workers and collapse their results,
/// matching spec.md §4.8 "joins the workers" / §7 "worker threads record
/// their first error ... the coordinator aggregates worker errors".
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
        return Err(Error::failure("stdin worker", e));
    }
    if let Some(e) = stdout_err {
        return Err(Error::failure("stdout worker", e));
    }
    if let Some(e) = stderr_err {
        return Err(Error::failure("stderr worker", e));
    }
    Ok((stdout_result, stderr_result))
}

fn run_direct(
    resolution: CommandResolution,
    stdin: InputBinding,
    stdout: OutputBinding,
    stderr: OutputBinding,
) -> Result<RunOutcome> {
    let (child_stdin, parent_stdin) = provision_input(&stdin)?;
    let (child_stdout, parent_stdout) = provision_output(&stdout)?;
    let (child_stderr, parent_stderr) = provision_output(&stderr)?;

    let pid = launch::fork_child(
        &resolution,
        ChildStdio {
            stdin: child_stdin,
            stdout: child_stdout,
            stderr: child_stderr,
        },
    )?;

    let mut guard = cleanup::Guard::new();
    guard.track(cleanup::OwnedProcess::child(pid));

    let marshaller = Arc::new(CallbackMarshaller::new());
    let callback_bound = has_callback(&stdin, &stdout, &stderr);

    let (stdin_source, input_cb) = into_input_source(stdin, &marshaller);
    let (stdout_sink, stdout_cb) = into_output_sink(stdout, &marshaller);
    let (stderr_sink, stderr_cb) = into_output_sink(stderr, &marshaller);

    let input_handle = parent_stdin.map(|w| thread::spawn(move || workers::run_input_worker(w, stdin_source)));
    let stdout_handle = parent_stdout
        .map(|r| thread::spawn(move || workers::run_output_worker(r, Stream::Stdout, stdout_sink)));
    let stderr_handle = parent_stderr
        .map(|r| thread::spawn(move || workers::run_output_worker(r, Stream::Stderr, stderr_sink)));

    let (exit_code, stdout_result, stderr_result) = drive_to_completion(
        Waitable::Direct(pid),
        &marshaller,
        callback_bound,
        input_cb,
        stdout_cb,
        stderr_cb,
        &mut guard,
        move || join_workers(input_handle, stdout_handle, stderr_handle),
    )?;

    Ok(RunOutcome {
        exit_code,
        stdout: stdout_result,
        stderr: stderr_result,
    })
}

fn run_interactive(
    resolution: CommandResolution,
    stdin: InputBinding,
    stdout: OutputBinding,
    stderr: OutputBinding,
) -> Result<RunOutcome> {
    let input_cb = match stdin {
        InputBinding::Callback(cb) => cb,
        _ => unreachable!("run_interactive is only invoked for a Callback stdin binding"),
    };

    let (child_stdout, parent_stdout) = provision_output(&stdout)?;
    let (child_stderr, parent_stderr) = provision_output(&stderr)?;

    let provision = pty::provision()?;
    let session = pty::fork_proxy(provision, &resolution, child_stdout, child_stderr)?;

    let mut guard = cleanup::Guard::new();
    guard.track(cleanup::OwnedProcess::child(session.child_pid));
    guard.track(cleanup::OwnedProcess::proxy(session.proxy_pid));

    let marshaller = Arc::new(CallbackMarshaller::new());
    let session = Arc::new(session);

    let (stdout_sink, stdout_cb) = into_output_sink(stdout, &marshaller);
    let (stderr_sink, stderr_cb) = into_output_sink(stderr, &marshaller);

    let session_for_input = session.clone();
    let marshaller_for_input = marshaller.clone();
    let input_handle = thread::spawn(move || {
        run_pty_input_worker(&session_for_input, &marshaller_for_input)
    });

    // The PTY master itself is read by no dedicated "worker" in spec.md's
    // sense -- it only carries the input side of the interactive protocol,
    // written by `run_pty_input_worker` above. Child stdout/stderr are
    // ordinary pipes, handled by the same output workers a direct launch
    // uses (see `run_proxy`'s doc comment in `unix::pty`).
    let stdout_handle = parent_stdout
        .map(|r| thread::spawn(move || workers::run_output_worker(r, Stream::Stdout, stdout_sink)));
    let stderr_handle = parent_stderr
        .map(|r| thread::spawn(move || workers::run_output_worker(r, Stream::Stderr, stderr_sink)));

    let (exit_code, stdout_result, stderr_result) = drive_to_completion(
        Waitable::ThroughProxy {
            proxy_pid: session.proxy_pid,
            child_pid: session.child_pid,
        },
        &marshaller,
        true,
        Some(input_cb),
        stdout_cb,
        stderr_cb,
        &mut guard,
        move || {
            let _ = input_handle.join();
            join_workers(None, stdout_handle, stderr_handle)
        },
    )?;

    Ok(RunOutcome {
        exit_code,
        stdout: stdout_result,
        stderr: stderr_result,
    })
}

/// Worker-side loop for the interactive protocol: wait for the proxy's
/// request, hop to the caller thread for one callback's worth of input via
/// the marshaller, then either deliver it onto the PTY master or tell the
/// proxy input is closed.
fn run_pty_input_worker(session: &pty::PtySession, marshaller: &CallbackMarshaller) {
    loop {
        if !session.wait_for_request() {
            return;
        }
        let (data, close) = marshaller.request_input();
        if close {
            let _ = session.notify_input_closed();
            return;
        }
        if session.deliver_input(&data).is_err() {
            return;
        }
    }
}

/// Shared §4.8 tail: either wait directly and skip the marshaller loop (no
/// callback binding at all), or run the caller-thread marshaller loop until
/// `Terminated`, fed by a dedicated wait-thread.
///
/// `finish_workers` joins whichever stream workers this launch started and
/// collects their results. It runs inside the wait-thread, *before*
/// `terminate()` is posted: spec.md §4.6 has the wait-thread "join the child
/// and the three workers" before announcing `Terminated`, and for good
/// reason -- a worker can still be mid-`CallbackMarshaller::post` when the
/// child exits (an output worker with one more buffered chunk to deliver,
/// or an input worker awaiting the next chunk), and nothing would ever
/// `ack` that post if the caller thread's `drive` loop had already broken
/// out on `Terminated`.
#[allow(clippy::too_many_arguments)]
fn drive_to_completion(
    waitable: Waitable,
    marshaller: &Arc<CallbackMarshaller>,
    callback_bound: bool,
    mut input_cb: Option<InputCallback>,
    mut stdout_cb: Option<OutputCallback>,
    mut stderr_cb: Option<OutputCallback>,
    guard: &mut cleanup::Guard,
    finish_workers: impl FnOnce() -> Result<(CapturedOutput, CapturedOutput)> + Send + 'static,
) -> Result<(i32, CapturedOutput, CapturedOutput)> {
    if !callback_bound {
        let exit_code = lifecycle::wait_for_exit(waitable)?;
        guard.disarm();
        let (stdout_result, stderr_result) = finish_workers()?;
        return Ok((exit_code, stdout_result, stderr_result));
    }

    let wait_marshaller = marshaller.clone();
    let wait_thread = thread::spawn(move || -> Result<(i32, CapturedOutput, CapturedOutput)> {
        // `terminate()` must fire no matter how waiting/joining turns out,
        // or the caller thread's `drive` loop below blocks forever.
        let exit_result = lifecycle::wait_for_exit(waitable);
        let workers_result = finish_workers();
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

    let (exit_code, stdout_result, stderr_result) =
        wait_thread.join().expect("wait-thread panicked")?;
    guard.disarm();
    Ok((exit_code, stdout_result, stderr_result))
}
