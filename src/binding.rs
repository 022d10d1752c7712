//! Stream binding kinds and the at-most-one-binding validator.
//!
//! Mirrors the shape of minion's `InputSpecification`/`OutputSpecification`:
//! a public newtype wrapping a private enum, so the binding kind can grow
//! variants without breaking callers. Generalized here from minion's
//! "pipe vs handle vs null" split to the five kinds spec.md names.

use crate::error::{Error, Stream};
use std::os::raw::c_int;

/// One slot's worth of candidate bindings. A builder starts every stream at
/// `Empty`; the first `set` fills it; any further `set` flips it to
/// `Conflict`, which `resolve` turns into the matching `TooMany*` error.
///
/// This exists so that accidentally supplying two bindings for one stream
/// -- the scenario spec.md's data model explicitly calls out as an error,
/// not a silent overwrite -- is caught before any resource is allocated.
#[derive(Debug)]
pub(crate) struct BindingSlot<T> {
    state: SlotState<T>,
}

#[derive(Debug)]
enum SlotState<T> {
    Empty,
    One(T),
    Conflict,
}

impl<T> Default for SlotState<T> {
    fn default() -> Self {
        SlotState::Empty
    }
}

// Written by hand rather than `#[derive(Default)]`: the derive macro adds a
// spurious `T: Default` bound to the generated impl, but `InputBinding`/
// `OutputBinding` (this type's only real instantiations) hold a
// `Box<dyn FnMut(..)>` callback variant and can never implement `Default`.
impl<T> Default for BindingSlot<T> {
    fn default() -> Self {
        BindingSlot {
            state: SlotState::Empty,
        }
    }
}

impl<T> BindingSlot<T> {
    pub(crate) fn set(&mut self, value: T) {
        self.state = match std::mem::take(&mut self.state) {
            SlotState::Empty => SlotState::One(value),
            SlotState::One(_) | SlotState::Conflict => SlotState::Conflict,
        };
    }

    pub(crate) fn resolve(self, stream: Stream) -> Result<Option<T>, Error> {
        match self.state {
            SlotState::Empty => Ok(None),
            SlotState::One(v) => Ok(Some(v)),
            SlotState::Conflict => Err(Error::BindingConflict(stream)),
        }
    }
}

/// Child's stdin source.
pub enum InputBinding {
    /// No data is written; the child's stdin is immediately closed
    /// (unless the child is interactive, in which case it sees EOF).
    Discard,
    /// Each element is written followed by `\n`, in order.
    Lines(Vec<String>),
    /// The full byte sequence is written once.
    Buffer(Vec<u8>),
    /// `callback(&mut Vec<u8>) -> bool` is invoked on the caller's thread
    /// for each chunk the child is ready to read; returning `true` closes
    /// input. See spec.md §4.6/§6 for the callback ABI and threading rules.
    Callback(Box<dyn FnMut(&mut Vec<u8>) -> bool + Send>),
    /// A caller-owned OS handle, inherited by the child verbatim.
    Handle(OwnedStdioHandle),
}

impl std::fmt::Debug for InputBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputBinding::Discard => f.write_str("Discard"),
            InputBinding::Lines(lines) => f.debug_tuple("Lines").field(lines).finish(),
            InputBinding::Buffer(buf) => f.debug_tuple("Buffer").field(buf).finish(),
            InputBinding::Callback(_) => f.write_str("Callback(..)"),
            InputBinding::Handle(h) => f.debug_tuple("Handle").field(h).finish(),
        }
    }
}

/// Child's stdout/stderr sink.
pub enum OutputBinding {
    /// Bytes are read and dropped.
    Discard,
    /// Output is split on `\n` into an ordered sequence of lines (trailing
    /// non-newline-terminated fragment is still appended).
    Lines,
    /// Output is accumulated verbatim into one growing buffer.
    Buffer,
    /// `callback(&[u8])` is invoked on the caller's thread once per chunk,
    /// not guaranteed to be line-aligned.
    Callback(Box<dyn FnMut(&[u8]) + Send>),
    /// A caller-owned OS handle, inherited by the child verbatim.
    Handle(OwnedStdioHandle),
}

impl std::fmt::Debug for OutputBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputBinding::Discard => f.write_str("Discard"),
            OutputBinding::Lines => f.write_str("Lines"),
            OutputBinding::Buffer => f.write_str("Buffer"),
            OutputBinding::Callback(_) => f.write_str("Callback(..)"),
            OutputBinding::Handle(h) => f.debug_tuple("Handle").field(h).finish(),
        }
    }
}

/// An opaque caller-supplied OS file handle, treated as already-owned and
/// duplicated/inherited as-is.
#[derive(Debug, Copy, Clone)]
pub struct OwnedStdioHandle(pub(crate) c_int);

impl OwnedStdioHandle {
    /// Wrap a raw file descriptor (POSIX) or handle value the caller
    /// already owns. The core will `dup`/inherit it; it does not take
    /// ownership of the original value.
    pub fn from_raw_fd(fd: c_int) -> Self {
        OwnedStdioHandle(fd)
    }

    pub(crate) fn as_raw(&self) -> c_int {
        self.0
    }
}

/// Collected, at-most-one-each bindings for all three streams, produced by
/// [`crate::command::Command::into_parts`].
pub(crate) struct ResolvedBindings {
    pub(crate) stdin: InputBinding,
    pub(crate) stdout: OutputBinding,
    pub(crate) stderr: OutputBinding,
    pub(crate) console_policy: Box<dyn crate::console::ConsolePolicy>,
}
