//! Stream Worker bodies.
//!
//! Platform-agnostic: both the Unix pipe wrappers (`unix::pipe::{ReadPipe,
//! WritePipe}`) and the Windows ones (`windows::pipe::{ReadPipe, WritePipe}`)
//! implement `std::io::{Read, Write}`, so one worker body serves both
//! backends. Only pipe/PTY provisioning, process launch, and wait are
//! platform-specific.

use crate::error::Stream;
use crate::marshal::CallbackMarshaller;
use std::io::{Read, Write};
use std::sync::Arc;

/// Output workers read into a fixed-size chunk, per spec.md §4.5.
const CHUNK_SIZE: usize = 256;

/// What an output worker does with bytes it reads, stripped of the actual
/// caller closure (that lives on the caller's thread; the worker only holds
/// a handle to the marshaller it must post through for `Callback`).
pub(crate) enum OutputSink {
    Discard,
    Lines,
    Buffer,
    Callback(Arc<CallbackMarshaller>),
}

/// What an output worker produced, for streams that accumulate (Lines/Buffer).
/// Re-exported as `shellspawn::CapturedOutput`; this is the only
/// worker-internal type that crosses the public API boundary.
#[derive(Debug)]
pub enum CapturedOutput {
    /// Nothing was accumulated (Discard, Callback, or Handle binding).
    None,
    Lines(Vec<String>),
    Buffer(Vec<u8>),
}

/// Read `reader` until EOF, routing each chunk per `sink`. Returns the accumulated result (if any) and the first
/// I/O error encountered, if any -- the coordinator surfaces this as the
/// worker's recorded error.
pub(crate) fn run_output_worker(
    mut reader: impl Read,
    stream: Stream,
    sink: OutputSink,
) -> (CapturedOutput, Option<std::io::Error>) {
    let mut buf = [0u8; CHUNK_SIZE];
    let mut lines: Vec<String> = Vec::new();
    let mut buffer: Vec<u8> = Vec::new();
    // Raw bytes, not `String`: a multi-byte UTF-8 sequence can straddle a
    // `CHUNK_SIZE` read boundary, and decoding each chunk independently
    // would corrupt it into U+FFFD on both sides. Accumulate bytes, split
    // on the `\n` byte, and decode each complete line exactly once.
    let mut pending_line: Vec<u8> = Vec::new();
    let mut err = None;

    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                let chunk = &buf[..n];
                match &sink {
                    OutputSink::Discard => {}
                    OutputSink::Buffer => buffer.extend_from_slice(chunk),
                    OutputSink::Lines => {
                        pending_line.extend_from_slice(chunk);
                        while let Some(pos) = pending_line.iter().position(|&b| b == b'\n') {
                            let line: Vec<u8> = pending_line.drain(..=pos).collect();
                            lines.push(String::from_utf8_lossy(&line[..line.len() - 1]).into_owned());
                        }
                    }
                    OutputSink::Callback(marshaller) => {
                        if !chunk.is_empty() {
                            marshaller.deliver_output(stream, chunk);
                        }
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                err = Some(e);
                break;
            }
        }
    }

    if matches!(sink, OutputSink::Lines) && !pending_line.is_empty() {
        lines.push(String::from_utf8_lossy(&pending_line).into_owned());
    }

    let result = match sink {
        OutputSink::Discard | OutputSink::Callback(_) => CapturedOutput::None,
        OutputSink::Lines => CapturedOutput::Lines(lines),
        OutputSink::Buffer => CapturedOutput::Buffer(buffer),
    };
    (result, err)
}

/// What an input worker writes, stripped of the actual caller closure (see
/// [`OutputSink`]).
pub(crate) enum InputSource {
    Discard,
    Lines(Vec<String>),
    Buffer(Vec<u8>),
    Callback(Arc<CallbackMarshaller>),
}

/// Write `source` to `writer` per spec.md §4.5 "Input worker". A broken pipe
/// (the child exited before consuming all input) is a normal terminal
/// condition, not an error -- spec.md §7/§8 "SIGPIPE safety": the invocation
/// still returns status OK with the child's real exit code.
pub(crate) fn run_input_worker(mut writer: impl Write, source: InputSource) -> Option<std::io::Error> {
    match source {
        InputSource::Discard => None,
        InputSource::Buffer(data) => write_all_or_pipe_closed(&mut writer, &data),
        InputSource::Lines(lines) => {
            for mut line in lines {
                line.push('\n');
                if let Some(e) = write_all_or_pipe_closed(&mut writer, line.as_bytes()) {
                    return Some(e);
                }
            }
            None
        }
        InputSource::Callback(marshaller) => {
            loop {
                let (data, close) = marshaller.request_input();
                if close {
                    break;
                }
                if write_all_or_pipe_closed(&mut writer, &data).is_some() {
                    break;
                }
            }
            None
        }
    }
}

fn is_broken_pipe(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::BrokenPipe || e.raw_os_error() == Some(libc_epipe())
}

#[cfg(unix)]
fn libc_epipe() -> i32 {
    libc::EPIPE
}

#[cfg(windows)]
fn libc_epipe() -> i32 {
    // ERROR_BROKEN_PIPE / ERROR_NO_DATA, surfaced through std::io::Error's
    // raw_os_error on Windows pipe writes once the read end is gone.
    109
}

fn write_all_or_pipe_closed(writer: &mut impl Write, mut data: &[u8]) -> Option<std::io::Error> {
    while !data.is_empty() {
        match writer.write(data) {
            Ok(0) => return None,
            Ok(n) => data = &data[n..],
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) if is_broken_pipe(&e) => return None,
            Err(e) => return Some(e),
        }
    }
    None
}
