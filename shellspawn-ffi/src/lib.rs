//! C ABI shim over the `shellspawn` core.
//!
//! Mirrors minion-ffi's wrapping style: a C-visible `Status` struct carrying
//! the stable numeric code plus an optional heap-allocated detail message,
//! and opaque owned pointers the caller passes back in to free. Unlike
//! minion-ffi -- which only let a C caller hand over an already-open OS
//! handle for each stream -- this shim also exposes the `Buffer` and
//! `Callback` bindings spec.md's `InputBinding`/`OutputBinding` name, since
//! those are exactly the bindings a C caller without its own pipe plumbing
//! would want.

use shellspawn::{InputBinding, OutputBinding, OwnedStdioHandle, StatusCode};
use std::alloc::GlobalAlloc;
use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_void};

static mut CAPTURE_ERRORS: bool = false;

/// Operation status: a stable numeric code plus, if `capture_errors` was
/// passed to [`shellspawn_lib_init`], an owned detail message.
#[repr(C)]
pub struct Status {
    pub code: StatusCode,
    /// If not NULL, a boxed `String` with a human-readable detail. Use
    /// `shellspawn_status_get_message` to read it and
    /// `shellspawn_status_free` to release it.
    details: *mut c_void,
}

impl Status {
    fn ok() -> Self {
        Status {
            code: StatusCode::Ok,
            details: std::ptr::null_mut(),
        }
    }

    fn invalid_input() -> Self {
        Status {
            code: StatusCode::NotFound,
            details: unsafe {
                if CAPTURE_ERRORS {
                    Box::into_raw(Box::new(String::from("invalid input"))) as *mut c_void
                } else {
                    std::ptr::null_mut()
                }
            },
        }
    }

    fn from_outcome(code: StatusCode, message: Option<String>) -> Self {
        let details = unsafe {
            if CAPTURE_ERRORS {
                match message {
                    Some(m) => Box::into_raw(Box::new(m)) as *mut c_void,
                    None => std::ptr::null_mut(),
                }
            } else {
                std::ptr::null_mut()
            }
        };
        Status { code, details }
    }

    fn message(&self) -> Option<&str> {
        if self.details.is_null() {
            return None;
        }
        let s = unsafe { &*(self.details as *const String) };
        Some(s.as_str())
    }
}

/// Get a string description of a status code. Returned pointer is
/// `'static`, null-terminated ASCII, and must not be freed.
#[no_mangle]
pub extern "C" fn shellspawn_describe_status_code(status_code: StatusCode) -> *const u8 {
    match status_code {
        StatusCode::Ok => b"ok\0".as_ptr(),
        StatusCode::TooManyIn => b"more than one stdin binding\0".as_ptr(),
        StatusCode::TooManyOut => b"more than one stdout binding\0".as_ptr(),
        StatusCode::TooManyErr => b"more than one stderr binding\0".as_ptr(),
        StatusCode::NotFound => b"command not found\0".as_ptr(),
        StatusCode::Failure => b"spawn failed\0".as_ptr(),
    }
}

/// Get a heap-allocated, null-terminated message for `status`, or NULL if
/// `status` carries no detail. Free the returned pointer with `free`.
#[no_mangle]
pub extern "C" fn shellspawn_status_get_message(status: &Status) -> *const u8 {
    let msg = match status.message() {
        Some(m) => m,
        None => return std::ptr::null(),
    };
    unsafe {
        let buf = std::alloc::System
            .alloc(std::alloc::Layout::from_size_align(msg.len() + 1, 1).unwrap());
        std::ptr::copy(msg.as_ptr(), buf, msg.len());
        buf.add(msg.len()).write(0);
        buf
    }
}

/// Release the detail message owned by `status`, if any. Safe to call on a
/// `Status` with a NULL `details` pointer.
///
/// # Safety
/// `status` must have been returned by a `shellspawn_*` function in this
/// crate and not already freed.
#[no_mangle]
pub unsafe extern "C" fn shellspawn_status_free(status: Status) {
    if !status.details.is_null() {
        drop(unsafe { Box::from_raw(status.details as *mut String) });
    }
}

/// # Safety
/// Must be called once, before any other `shellspawn_*` function. If
/// `capture_errors` is true, returned `Status`-es may own a detail message;
/// call `shellspawn_status_free` on every one to avoid leaking it.
#[no_mangle]
#[must_use]
pub unsafe extern "C" fn shellspawn_lib_init(capture_errors: bool) -> Status {
    std::panic::set_hook(Box::new(|info| {
        eprintln!("[shellspawn-ffi] PANIC: {}", info);
        std::process::abort();
    }));
    unsafe {
        CAPTURE_ERRORS = capture_errors;
    }
    Status::ok()
}

/// # Safety
/// `buf` must be a valid, null-terminated, UTF-8-encoded C string.
unsafe fn get_string(buf: *const c_char) -> Option<String> {
    if buf.is_null() {
        return None;
    }
    let cstr = unsafe { CStr::from_ptr(buf) };
    cstr.to_str().ok().map(str::to_owned)
}

#[repr(C)]
pub enum InputKind {
    Discard,
    Buffer,
    Handle,
    Callback,
}

type InputTrampoline =
    Option<extern "C" fn(user_data: *mut c_void, buf: *mut u8, buf_cap: usize, written: *mut usize) -> bool>;

/// A C-visible stdin binding, mirroring [`shellspawn::InputBinding`].
///
/// For `kind == Buffer`, `buffer`/`buffer_len` describe the bytes to write.
/// For `kind == Handle`, `handle` is a caller-owned fd/HANDLE value. For
/// `kind == Callback`, `callback` is invoked with a scratch buffer of
/// capacity `buf_cap`; it writes up to that many bytes, stores the count
/// through `written`, and returns `true` to signal end-of-input.
#[repr(C)]
pub struct InputSpec {
    pub kind: InputKind,
    pub buffer: *const u8,
    pub buffer_len: usize,
    pub handle: c_int,
    pub callback: InputTrampoline,
    pub user_data: *mut c_void,
}

/// Wraps a raw `user_data` pointer the caller promises is safe to hand to
/// another thread; the callback itself runs on the caller's own thread
///, so this crate never dereferences it concurrently.
struct SendPtr(*mut c_void);
unsafe impl Send for SendPtr {}

impl InputSpec {
    /// # Safety
    /// `buffer` (if `kind == Buffer`) and `callback`'s `user_data` (if
    /// `kind == Callback`) must be valid for the lifetime of the spawn call.
    unsafe fn into_binding(self) -> InputBinding {
        match self.kind {
            InputKind::Discard => InputBinding::Discard,
            InputKind::Buffer => {
                let bytes = if self.buffer.is_null() || self.buffer_len == 0 {
                    Vec::new()
                } else {
                    unsafe { std::slice::from_raw_parts(self.buffer, self.buffer_len) }.to_vec()
                };
                InputBinding::Buffer(bytes)
            }
            InputKind::Handle => InputBinding::Handle(OwnedStdioHandle::from_raw_fd(self.handle)),
            InputKind::Callback => {
                let func = self.callback.expect("Callback kind requires a callback");
                let user_data = SendPtr(self.user_data);
                InputBinding::Callback(Box::new(move |buf: &mut Vec<u8>| {
                    buf.resize(4096, 0);
                    let mut written = 0usize;
                    let done = func(user_data.0, buf.as_mut_ptr(), buf.len(), &mut written);
                    buf.truncate(written);
                    done
                }))
            }
        }
    }
}

#[repr(C)]
pub enum OutputKind {
    Discard,
    Buffer,
    Handle,
    Callback,
}

type OutputTrampoline = Option<extern "C" fn(user_data: *mut c_void, buf: *const u8, len: usize)>;

/// A C-visible stdout/stderr binding, mirroring [`shellspawn::OutputBinding`].
#[repr(C)]
pub struct OutputSpec {
    pub kind: OutputKind,
    pub handle: c_int,
    pub callback: OutputTrampoline,
    pub user_data: *mut c_void,
}

impl OutputSpec {
    /// # Safety
    /// `callback`'s `user_data` (if `kind == Callback`) must be valid for
    /// the lifetime of the spawn call.
    unsafe fn into_binding(self) -> OutputBinding {
        match self.kind {
            OutputKind::Discard => OutputBinding::Discard,
            OutputKind::Buffer => OutputBinding::Buffer,
            OutputKind::Handle => OutputBinding::Handle(OwnedStdioHandle::from_raw_fd(self.handle)),
            OutputKind::Callback => {
                let func = self.callback.expect("Callback kind requires a callback");
                let user_data = SendPtr(self.user_data);
                OutputBinding::Callback(Box::new(move |buf: &[u8]| {
                    func(user_data.0, buf.as_ptr(), buf.len());
                }))
            }
        }
    }
}

/// Result of [`shellspawn_spawn`]. `stdout_buf`/`stderr_buf` are non-NULL
/// only when the corresponding binding was `Buffer`; free them with
/// `shellspawn_buffer_free`.
#[repr(C)]
pub struct SpawnResult {
    pub status: Status,
    pub has_exit_code: bool,
    pub exit_code: c_int,
    pub stdout_buf: *mut u8,
    pub stdout_len: usize,
    pub stderr_buf: *mut u8,
    pub stderr_len: usize,
}

impl SpawnResult {
    fn failure(status: Status) -> Self {
        SpawnResult {
            status,
            has_exit_code: false,
            exit_code: 0,
            stdout_buf: std::ptr::null_mut(),
            stdout_len: 0,
            stderr_buf: std::ptr::null_mut(),
            stderr_len: 0,
        }
    }
}

fn captured_into_raw(captured: shellspawn::CapturedOutput) -> (*mut u8, usize) {
    let bytes: Vec<u8> = match captured {
        shellspawn::CapturedOutput::None => return (std::ptr::null_mut(), 0),
        shellspawn::CapturedOutput::Buffer(b) => b,
        shellspawn::CapturedOutput::Lines(lines) => lines.join("\n").into_bytes(),
    };
    let mut boxed = bytes.into_boxed_slice();
    let ptr = boxed.as_mut_ptr();
    let len = boxed.len();
    std::mem::forget(boxed);
    (ptr, len)
}

/// Launch `command`, with stdio routed per `stdin`/`stdout`/`stderr`.
///
/// # Safety
/// `command` must be a valid, null-terminated UTF-8 C string.
/// `stdin`/`stdout`/`stderr` must satisfy the safety notes on
/// `InputSpec::into_binding`/`OutputSpec::into_binding`.
#[no_mangle]
#[must_use]
pub unsafe extern "C" fn shellspawn_spawn(
    command: *const c_char,
    stdin: InputSpec,
    stdout: OutputSpec,
    stderr: OutputSpec,
) -> SpawnResult {
    let command = match unsafe { get_string(command) } {
        Some(c) => c,
        None => return SpawnResult::failure(Status::invalid_input()),
    };

    let stdin = unsafe { stdin.into_binding() };
    let stdout = unsafe { stdout.into_binding() };
    let stderr = unsafe { stderr.into_binding() };

    let outcome = shellspawn::spawn(command, stdin, stdout, stderr);
    let status = Status::from_outcome(outcome.status, outcome.error_text);

    let (stdout_buf, stdout_len) = captured_into_raw(outcome.stdout);
    let (stderr_buf, stderr_len) = captured_into_raw(outcome.stderr);

    SpawnResult {
        status,
        has_exit_code: outcome.child_exit_code.is_some(),
        exit_code: outcome.child_exit_code.unwrap_or(0),
        stdout_buf,
        stdout_len,
        stderr_buf,
        stderr_len,
    }
}

/// Release a buffer returned through `SpawnResult::stdout_buf`/`stderr_buf`.
///
/// # Safety
/// `buf`/`len` must be exactly the pointer/length pair returned by a single
/// `shellspawn_spawn` call's `SpawnResult`, and must not already be freed.
#[no_mangle]
pub unsafe extern "C" fn shellspawn_buffer_free(buf: *mut u8, len: usize) {
    if buf.is_null() {
        return;
    }
    drop(unsafe { Box::from_raw(std::slice::from_raw_parts_mut(buf, len)) });
}
