use std::io;
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mio::unix::pipe;
use nix::sys::signal::Signal;
use tracing::warn;

/// A self-pipe: `SIGCHLD`/`SIGTERM`/`SIGINT` handlers write a single byte
/// into `sender`, the loop thread reads it back off `receiver`. This is
/// the only async-signal-safe way to wake an event loop from a signal
/// handler — everything else in a handler must avoid allocation and
/// locking, which `write(2)` on an already-open fd and a relaxed atomic
/// store both satisfy.
///
/// Each watched signal also gets its own flag in `fired`, set by its
/// handler before the wakeup byte is written, so a caller woken by the
/// pipe can tell which of the registered signals actually arrived.
pub struct SelfPipe {
    pub receiver: pipe::Receiver,
    _sender: pipe::Sender,
    signals: Vec<Signal>,
    fired: Arc<[AtomicBool]>,
    registered: Vec<signal_hook::SigId>,
}

impl SelfPipe {
    /// Builds the pipe and installs handlers for every signal in `signals`.
    pub fn new(signals: &[Signal]) -> io::Result<Self> {
        let (sender, receiver) = pipe::new()?;
        let fired: Arc<[AtomicBool]> = signals.iter().map(|_| AtomicBool::new(false)).collect();
        let mut registered = Vec::with_capacity(signals.len());
        for (index, &sig) in signals.iter().enumerate() {
            let write_fd = sender.as_raw_fd();
            let fired = Arc::clone(&fired);
            // SAFETY: the closure only stores a relaxed atomic flag and
            // performs a single `write(2)` of one byte to an fd that
            // outlives the handler registration, both async-signal-safe.
            let id = unsafe {
                signal_hook::low_level::register(sig as i32, move || {
                    fired[index].store(true, Ordering::Relaxed);
                    let byte = [1u8];
                    libc::write(write_fd, byte.as_ptr().cast(), 1);
                })
            }?;
            registered.push(id);
        }
        Ok(Self { receiver, _sender: sender, signals: signals.to_vec(), fired, registered })
    }

    /// Drains every pending wakeup byte. Called after the receiver fd
    /// reports readable; never blocks.
    pub fn drain(&mut self) {
        use std::io::Read;
        let mut scratch = [0u8; 64];
        loop {
            match self.receiver.read(&mut scratch) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "self-pipe read failed");
                    break;
                }
            }
        }
    }

    /// Returns and clears whether `signal` has fired since the last call.
    pub fn take_fired(&self, signal: Signal) -> bool {
        self.signals
            .iter()
            .position(|&s| s == signal)
            .is_some_and(|index| self.fired[index].swap(false, Ordering::Relaxed))
    }
}

impl Drop for SelfPipe {
    fn drop(&mut self) {
        for id in self.registered.drain(..) {
            signal_hook::low_level::unregister(id);
        }
    }
}
