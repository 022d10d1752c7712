//! Integration tests exercising the concrete scenarios and named invariants
//! from spec.md §8, driving real system binaries rather than mocks -- the
//! style `jswans33-james-shell`'s `tests/*.rs` use for this kind of
//! process-spawning crate.

#![cfg(unix)]

use shellspawn::{spawn, CapturedOutput, Command, InputBinding, OutputBinding, StatusCode};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn buffer_of(captured: CapturedOutput) -> Vec<u8> {
    match captured {
        CapturedOutput::Buffer(b) => b,
        other => panic!("expected Buffer, got {:?}", other),
    }
}

fn lines_of(captured: CapturedOutput) -> Vec<String> {
    match captured {
        CapturedOutput::Lines(l) => l,
        other => panic!("expected Lines, got {:?}", other),
    }
}

/// Scenario 1: `/bin/echo hello`, stdout=Buffer, everything else Discard.
#[test]
fn echo_hello_buffers_stdout() {
    let outcome = spawn(
        "/bin/echo hello",
        InputBinding::Discard,
        OutputBinding::Buffer,
        OutputBinding::Discard,
    );
    assert_eq!(outcome.status, StatusCode::Ok);
    assert_eq!(outcome.child_exit_code, Some(0));
    assert_eq!(buffer_of(outcome.stdout), b"hello\n");
}

/// Scenario 2: `/usr/bin/false` exits 1, which is not an invocation error.
#[test]
fn false_exits_one_without_error() {
    let outcome = spawn(
        "/usr/bin/false",
        InputBinding::Discard,
        OutputBinding::Discard,
        OutputBinding::Discard,
    );
    assert_eq!(outcome.status, StatusCode::Ok);
    assert_eq!(outcome.child_exit_code, Some(1));
}

/// Scenario 3: `/bin/cat` echoes a Buffer stdin straight to a Buffer stdout.
#[test]
fn cat_echoes_buffer() {
    let outcome = spawn(
        "/bin/cat",
        InputBinding::Buffer(b"abc\n".to_vec()),
        OutputBinding::Buffer,
        OutputBinding::Discard,
    );
    assert_eq!(outcome.status, StatusCode::Ok);
    assert_eq!(outcome.child_exit_code, Some(0));
    assert_eq!(buffer_of(outcome.stdout), b"abc\n");
}

/// Scenario 4: `/bin/cat` with Lines stdin/stdout round-trips the lines.
#[test]
fn cat_echoes_lines() {
    let outcome = spawn(
        "/bin/cat",
        InputBinding::Lines(vec!["one".to_string(), "two".to_string()]),
        OutputBinding::Lines,
        OutputBinding::Discard,
    );
    assert_eq!(outcome.status, StatusCode::Ok);
    assert_eq!(outcome.child_exit_code, Some(0));
    assert_eq!(lines_of(outcome.stdout), vec!["one", "two"]);
}

/// Scenario 5: an unresolvable command yields NotFound, exit code untouched.
#[test]
fn unknown_program_is_not_found() {
    let outcome = spawn(
        "no_such_program_xyz",
        InputBinding::Discard,
        OutputBinding::Discard,
        OutputBinding::Discard,
    );
    assert_eq!(outcome.status, StatusCode::NotFound);
    assert_eq!(outcome.child_exit_code, None);
}

/// Scenario 6: the command-string parser keeps quoted spans verbatim,
/// splits the rest on whitespace.
#[test]
fn quoted_spans_are_kept_verbatim() {
    let outcome = spawn(
        "/bin/echo 'a b' \"c d\" e",
        InputBinding::Discard,
        OutputBinding::Buffer,
        OutputBinding::Discard,
    );
    assert_eq!(outcome.status, StatusCode::Ok);
    assert_eq!(buffer_of(outcome.stdout), b"a b c d e\n");
}

/// Scenario 7: stdout and stderr are captured independently even when the
/// child writes to both.
#[test]
fn stdout_and_stderr_are_captured_independently() {
    let outcome = spawn(
        "/bin/sh -c 'printf a >&2; printf b'",
        InputBinding::Discard,
        OutputBinding::Buffer,
        OutputBinding::Buffer,
    );
    assert_eq!(outcome.status, StatusCode::Ok);
    assert_eq!(buffer_of(outcome.stdout), b"b");
    assert_eq!(buffer_of(outcome.stderr), b"a");
}

/// At-most-one-binding: a second stdout binding is rejected before launch,
/// with no child process ever started (no exit code recorded).
#[test]
fn conflicting_stdout_binding_is_rejected_before_launch() {
    let mut cmd = Command::new("/bin/echo should-not-run");
    cmd.stdout(OutputBinding::Buffer);
    cmd.stdout(OutputBinding::Lines);
    let outcome = cmd.spawn();
    assert_eq!(outcome.status, StatusCode::TooManyOut);
    assert_eq!(outcome.child_exit_code, None);
}

#[test]
fn conflicting_stdin_binding_is_rejected_before_launch() {
    let mut cmd = Command::new("/bin/cat");
    cmd.stdin(InputBinding::Buffer(b"a".to_vec()));
    cmd.stdin(InputBinding::Lines(vec!["b".to_string()]));
    let outcome = cmd.spawn();
    assert_eq!(outcome.status, StatusCode::TooManyIn);
}

#[test]
fn conflicting_stderr_binding_is_rejected_before_launch() {
    let mut cmd = Command::new("/bin/echo hi");
    cmd.stderr(OutputBinding::Buffer);
    cmd.stderr(OutputBinding::Discard);
    // Discard doesn't count as a binding the caller "supplied" in the
    // zero-bindings sense, but setting it twice still trips the conflict
    // slot regardless of which kinds were chosen.
    let outcome = cmd.spawn();
    assert_eq!(outcome.status, StatusCode::TooManyErr);
}

/// Exit-code faithfulness: `sh -c 'exit N'` for a spread of codes.
#[test]
fn exit_code_faithfulness() {
    for code in [0, 1, 7, 42, 255] {
        let outcome = spawn(
            format!("/bin/sh -c 'exit {}'", code),
            InputBinding::Discard,
            OutputBinding::Discard,
            OutputBinding::Discard,
        );
        assert_eq!(outcome.status, StatusCode::Ok);
        assert_eq!(outcome.child_exit_code, Some(code));
    }
}

/// Order preservation, Lines binding: a trailing newline produces no empty
/// trailing element; a missing trailing newline still appends the final
/// fragment as a line.
#[test]
fn lines_binding_trailing_newline_rules() {
    let with_trailing_nl = spawn(
        "/bin/printf 'one\\ntwo\\n'",
        InputBinding::Discard,
        OutputBinding::Lines,
        OutputBinding::Discard,
    );
    assert_eq!(lines_of(with_trailing_nl.stdout), vec!["one", "two"]);

    let without_trailing_nl = spawn(
        "/bin/printf 'one\\ntwo'",
        InputBinding::Discard,
        OutputBinding::Lines,
        OutputBinding::Discard,
    );
    assert_eq!(lines_of(without_trailing_nl.stdout), vec!["one", "two"]);
}

/// SIGPIPE safety: writing far more than a child's read buffer to a child
/// that reads one byte and exits must not kill the parent process; it
/// returns OK with the child's real exit code.
#[test]
fn sigpipe_safety_large_input_to_early_exiting_child() {
    let big = vec![b'x'; 1024 * 1024];
    let outcome = spawn(
        "/bin/sh -c 'dd bs=1 count=1 of=/dev/null 2>/dev/null'",
        InputBinding::Buffer(big),
        OutputBinding::Discard,
        OutputBinding::Discard,
    );
    assert_eq!(outcome.status, StatusCode::Ok);
    assert_eq!(outcome.child_exit_code, Some(0));
}

/// Serialized callbacks: an output-callback binding on both stdout and
/// stderr of a child that interleaves writes to both streams must never
/// let two callback invocations overlap in wall-clock time.
#[test]
fn callbacks_never_overlap() {
    let overlap_detected = Arc::new(Mutex::new(false));
    let in_flight = Arc::new(Mutex::new(false));

    let make_cb = |overlap: Arc<Mutex<bool>>, in_flight: Arc<Mutex<bool>>| {
        Box::new(move |_: &[u8]| {
            {
                let mut flag = in_flight.lock().unwrap();
                if *flag {
                    *overlap.lock().unwrap() = true;
                }
                *flag = true;
            }
            std::thread::sleep(Duration::from_millis(5));
            *in_flight.lock().unwrap() = false;
        })
    };

    let mut cmd = Command::new("/bin/sh -c 'for i in 1 2 3; do echo out$i; echo err$i >&2; done'");
    cmd.stdout(OutputBinding::Callback(make_cb(
        overlap_detected.clone(),
        in_flight.clone(),
    )));
    cmd.stderr(OutputBinding::Callback(make_cb(overlap_detected.clone(), in_flight)));

    let outcome = cmd.spawn();
    assert_eq!(outcome.status, StatusCode::Ok);
    assert!(
        !*overlap_detected.lock().unwrap(),
        "two callbacks ran concurrently"
    );
}

/// Cleanup idempotence: a failed invocation (binding conflict) performs no
/// launch at all, so it cannot leak a child process or any fd beyond what
/// the validator itself touched.
#[test]
fn cleanup_on_binding_conflict_launches_nothing() {
    let before = open_fd_count();
    let mut cmd = Command::new("/bin/sleep 5");
    cmd.stdin(InputBinding::Discard);
    cmd.stdin(InputBinding::Buffer(Vec::new()));
    let outcome = cmd.spawn();
    assert_eq!(outcome.status, StatusCode::TooManyIn);
    assert_eq!(outcome.child_exit_code, None);
    let after = open_fd_count();
    assert_eq!(before, after, "binding-conflict path leaked a file descriptor");
}

fn open_fd_count() -> usize {
    std::fs::read_dir("/proc/self/fd").map(|d| d.count()).unwrap_or(0)
}

/// Interactive callback round-trip: a child that prompts on stdout, reads a
/// line from stdin, and echoes it, driven by an input callback, produces
/// stdout containing both the prompt and the echoed line. Exercises the
/// PTY-proxy path (stdin bound to Callback on POSIX).
#[test]
fn interactive_callback_round_trip() {
    let start = Instant::now();
    let mut sent = false;

    let mut cmd = Command::new("/bin/sh -c 'printf PROMPT:; read line; printf GOT:%s\\n \"$line\"'");
    cmd.stdin(InputBinding::Callback(Box::new(move |buf: &mut Vec<u8>| {
        if sent {
            return true;
        }
        sent = true;
        buf.extend_from_slice(b"ping\n");
        false
    })));
    cmd.stdout(OutputBinding::Buffer);

    let outcome = cmd.spawn();
    assert!(
        start.elapsed() < Duration::from_secs(10),
        "interactive round trip did not complete promptly"
    );
    assert_eq!(outcome.status, StatusCode::Ok, "{:?}", outcome.error_text);
    let stdout = buffer_of(outcome.stdout);
    let stdout = String::from_utf8_lossy(&stdout);
    assert!(stdout.contains("PROMPT:"), "stdout was: {stdout}");
    assert!(stdout.contains("GOT:ping"), "stdout was: {stdout}");
}
