//! Callback marshaller: hops a worker-thread callback request onto the
//! caller's thread and blocks the worker until the caller has handled it
//!.
//!
//! Implemented with the dual-condvar rendezvous the spec names rather than
//! a channel, per the design note in spec.md §9: the "request + handled"
//! handshake needs the caller thread to hold the handled-mutex across the
//! callback invocation itself, so the worker cannot post a second request
//! before the first is fully acknowledged. Shared state lives behind plain
//! `Mutex`/`Condvar` pairs, in the style `linux/sandbox/watchdog.rs` uses
//! for its own cross-thread coordination -- no lock-free tricks.

use crate::error::Stream;
use std::sync::{Condvar, Mutex};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Kind {
    None,
    InputRequest,
    OutputDelivery,
    Terminated,
}

#[derive(Debug, Default)]
struct Slot {
    kind_is_set: bool,
    kind: Option<Kind>,
    stream: Option<Stream>,
    buffer: Vec<u8>,
    close: bool,
}

impl Slot {
    fn take(&mut self) -> (Kind, Stream, Vec<u8>) {
        let kind = self.kind.take().unwrap_or(Kind::None);
        let stream = self.stream.take().unwrap_or(Stream::Stdout);
        let buffer = std::mem::take(&mut self.buffer);
        self.kind_is_set = false;
        (kind, stream, buffer)
    }
}

/// One-slot rendezvous, invocation-scoped. See module docs.
pub(crate) struct CallbackMarshaller {
    /// Serializes callbacks across all three streams: held by a worker for
    /// the whole request/response round trip.
    serialize: Mutex<()>,
    slot: Mutex<Slot>,
    requested: Condvar,
    handled_flag: Mutex<bool>,
    handled: Condvar,
}

impl CallbackMarshaller {
    pub(crate) fn new() -> Self {
        CallbackMarshaller {
            serialize: Mutex::new(()),
            slot: Mutex::new(Slot::default()),
            requested: Condvar::new(),
            handled_flag: Mutex::new(false),
            handled: Condvar::new(),
        }
    }

    /// Worker-side: post a request and block until the caller thread has
    /// handled it, returning whatever the caller wrote back into the slot.
    fn post(&self, kind: Kind, stream: Stream, data: Vec<u8>) -> (Vec<u8>, bool) {
        let _serial_guard = self.serialize.lock().unwrap();

        {
            let mut slot = self.slot.lock().unwrap();
            slot.kind = Some(kind);
            slot.stream = Some(stream);
            slot.buffer = data;
            slot.close = false;
            slot.kind_is_set = true;
            *self.handled_flag.lock().unwrap() = false;
            self.requested.notify_one();
        }

        let mut handled = self.handled_flag.lock().unwrap();
        while !*handled {
            handled = self.handled.wait(handled).unwrap();
        }

        let slot = self.slot.lock().unwrap();
        (slot.buffer.clone(), slot.close)
    }

    /// Worker-side: request one callback's worth of input. Returns the
    /// bytes the input callback produced and whether it asked to close
    /// input.
    pub(crate) fn request_input(&self) -> (Vec<u8>, bool) {
        self.post(Kind::InputRequest, Stream::Stdin, Vec::new())
    }

    /// Worker-side: deliver one chunk of output to the bound callback.
    pub(crate) fn deliver_output(&self, stream: Stream, data: &[u8]) {
        self.post(Kind::OutputDelivery, stream, data.to_vec());
    }

    /// Posted by the wait-thread once the child and all workers have
    /// finished, so the caller-thread loop always terminates.
    pub(crate) fn terminate(&self) {
        self.post(Kind::Terminated, Stream::Stdout, Vec::new());
    }

    /// Caller-thread loop: wait for requests and dispatch them, until
    /// `Terminated`. Only run at all when at least one callback binding is
    /// present.
    pub(crate) fn drive(
        &self,
        mut input_cb: Option<&mut dyn FnMut(&mut Vec<u8>) -> bool>,
        mut stdout_cb: Option<&mut dyn FnMut(&[u8])>,
        mut stderr_cb: Option<&mut dyn FnMut(&[u8])>,
    ) {
        loop {
            let (kind, stream, mut buffer) = {
                let mut slot = self.slot.lock().unwrap();
                while !slot.kind_is_set {
                    slot = self.requested.wait(slot).unwrap();
                }
                slot.take()
            };

            match kind {
                Kind::Terminated => {
                    self.ack(Vec::new(), false);
                    break;
                }
                Kind::InputRequest => {
                    let close = match input_cb.as_mut() {
                        Some(cb) => cb(&mut buffer),
                        None => true,
                    };
                    self.ack(buffer, close);
                }
                Kind::OutputDelivery => {
                    match stream {
                        Stream::Stdout => {
                            if let Some(cb) = stdout_cb.as_mut() {
                                cb(&buffer);
                            }
                        }
                        Stream::Stderr => {
                            if let Some(cb) = stderr_cb.as_mut() {
                                cb(&buffer);
                            }
                        }
                        Stream::Stdin => {}
                    }
                    self.ack(Vec::new(), false);
                }
                Kind::None => {}
            }
        }
    }

    fn ack(&self, buffer: Vec<u8>, close: bool) {
        {
            let mut slot = self.slot.lock().unwrap();
            slot.buffer = buffer;
            slot.close = close;
        }
        *self.handled_flag.lock().unwrap() = true;
        self.handled.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn serialized_output_delivery_round_trips() {
        let marshaller = Arc::new(CallbackMarshaller::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let worker_marshaller = marshaller.clone();
        let worker = thread::spawn(move || {
            worker_marshaller.deliver_output(Stream::Stdout, b"hello");
            worker_marshaller.deliver_output(Stream::Stderr, b"world");
            worker_marshaller.terminate();
        });

        let seen_clone = seen.clone();
        marshaller.drive(
            None,
            Some(&mut |data: &[u8]| seen_clone.lock().unwrap().push((Stream::Stdout, data.to_vec()))),
            Some(&mut |data: &[u8]| seen.lock().unwrap().push((Stream::Stderr, data.to_vec()))),
        );
        worker.join().unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].1, b"hello");
        assert_eq!(seen[1].1, b"world");
    }

    #[test]
    fn input_request_returns_callback_buffer() {
        let marshaller = Arc::new(CallbackMarshaller::new());

        let worker_marshaller = marshaller.clone();
        let worker = thread::spawn(move || {
            let (data, close) = worker_marshaller.request_input();
            assert_eq!(data, b"ping\n");
            assert!(!close);
            worker_marshaller.terminate();
        });

        marshaller.drive(
            Some(&mut |buf: &mut Vec<u8>| {
                buf.extend_from_slice(b"ping\n");
                false
            }),
            None,
            None,
        );
        worker.join().unwrap();
    }
}
