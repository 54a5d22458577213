mod timer;

use std::collections::HashMap;
use std::io;
use std::os::fd::RawFd;
use std::time::{Duration, Instant};

use mio::event::Source;
use mio::{Events, Interest, Poll, Token};
use tracing::warn;

pub use timer::{TimerCallback, TimerQueue};

pub const MAX_FD: usize = 10_240;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(100);

bitflags::bitflags! {
    /// Mirrors READ/WRITE readiness; kept as a plain bitmask rather than
    /// mio's own `Interest` so `add_event`/`del_event` can OR/AND-NOT it
    /// the way a fixed fd-indexed event table traditionally does.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Ready: u8 {
        const READ = 0b01;
        const WRITE = 0b10;
    }
}

type Callback = Box<dyn FnMut(&mut Poller, RawFd)>;

struct EventItem {
    interest: Ready,
    read_cb: Option<Callback>,
    write_cb: Option<Callback>,
}

/// A readiness-multiplexing event loop over a fixed-capacity, fd-indexed
/// callback table plus a cross-thread-safe timer queue.
///
/// Single-threaded by design: everything except [`TimerQueue::add`] must
/// only ever be called from the thread running [`Poller::run_loop`].
pub struct Poller {
    poll: Poll,
    events: Events,
    items: Vec<Option<EventItem>>,
    sources: HashMap<RawFd, Token>,
    timers: TimerQueue,
    running: bool,
    timeout: Duration,
}

impl Poller {
    pub fn new(event_capacity: usize) -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(event_capacity),
            items: (0..MAX_FD).map(|_| None).collect(),
            sources: HashMap::new(),
            timers: TimerQueue::new(),
            running: false,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn add_timer(&self, delay: Duration, repeat: bool, callback: TimerCallback) -> u64 {
        self.timers.add(delay, repeat, callback)
    }

    pub fn set_fd_read_callback(
        &mut self,
        fd: RawFd,
        cb: impl FnMut(&mut Poller, RawFd) + 'static,
    ) {
        self.item_mut(fd).read_cb = Some(Box::new(cb));
    }

    pub fn set_fd_write_callback(
        &mut self,
        fd: RawFd,
        cb: impl FnMut(&mut Poller, RawFd) + 'static,
    ) {
        self.item_mut(fd).write_cb = Some(Box::new(cb));
    }

    fn item_mut(&mut self, fd: RawFd) -> &mut EventItem {
        self.items[fd as usize].get_or_insert_with(|| EventItem {
            interest: Ready::empty(),
            read_cb: None,
            write_cb: None,
        })
    }

    /// Registers `fd` with the given interest mask. `source` must be the
    /// same underlying socket the callbacks close over; mio needs it to
    /// register at the OS level.
    pub fn add_fd(&mut self, fd: RawFd, source: &mut impl Source, mask: Ready) -> io::Result<()> {
        let token = Token(fd as usize);
        self.poll.registry().register(source, token, to_interest(mask))?;
        self.sources.insert(fd, token);
        self.item_mut(fd).interest = mask;
        Ok(())
    }

    pub fn del_fd(&mut self, fd: RawFd, source: &mut impl Source) -> io::Result<()> {
        self.poll.registry().deregister(source)?;
        self.sources.remove(&fd);
        self.items[fd as usize] = None;
        Ok(())
    }

    /// Clears `fd`'s callback slot without touching the OS registry. For
    /// the rare case where the underlying socket was already closed (and
    /// therefore already dropped out of epoll/kqueue on its own) before
    /// the caller got a chance to hold the `Source` needed for `del_fd`.
    pub fn forget_fd(&mut self, fd: RawFd) {
        self.sources.remove(&fd);
        if let Some(slot) = self.items.get_mut(fd as usize) {
            *slot = None;
        }
    }

    pub fn alter_event(&mut self, fd: RawFd, source: &mut impl Source, mask: Ready) -> io::Result<()> {
        self.poll.registry().reregister(source, Token(fd as usize), to_interest(mask))?;
        self.item_mut(fd).interest = mask;
        Ok(())
    }

    pub fn add_event(&mut self, fd: RawFd, source: &mut impl Source, mask: Ready) -> io::Result<()> {
        let current = self.items[fd as usize].as_ref().map_or(Ready::empty(), |i| i.interest);
        self.alter_event(fd, source, current | mask)
    }

    pub fn del_event(&mut self, fd: RawFd, source: &mut impl Source, mask: Ready) -> io::Result<()> {
        let current = self.items[fd as usize].as_ref().map_or(Ready::empty(), |i| i.interest);
        self.alter_event(fd, source, current & !mask)
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Blocks until [`Poller::stop`] is called (from inside a callback).
    pub fn run_loop(&mut self) -> io::Result<()> {
        self.running = true;
        while self.running {
            self.run_once()?;
        }
        Ok(())
    }

    /// A single iteration: wait for readiness bounded by the next timer
    /// deadline, dispatch read-before-write per ready fd, then fire any due
    /// timers. Exposed separately from `run_loop` so tests can step it.
    pub fn run_once(&mut self) -> io::Result<()> {
        let wait = self.next_wait();
        match self.poll.poll(&mut self.events, Some(wait)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(e) => return Err(e),
        }

        let ready: Vec<(RawFd, bool, bool)> = self
            .events
            .iter()
            .map(|ev| {
                let fd = ev.token().0 as RawFd;
                let readable = ev.is_readable() || ev.is_read_closed() || ev.is_error();
                let writable = ev.is_writable() || ev.is_error();
                (fd, readable, writable)
            })
            .collect();

        for (fd, readable, writable) in ready {
            if readable {
                self.invoke(fd, true);
            }
            if writable {
                self.invoke(fd, false);
            }
        }

        timer::TimerQueue::fire_due(self, Instant::now());
        Ok(())
    }

    fn invoke(&mut self, fd: RawFd, read: bool) {
        let idx = fd as usize;
        if idx >= self.items.len() {
            return;
        }
        let taken = self.items[idx].as_mut().and_then(|item| {
            if read {
                item.read_cb.take()
            } else {
                item.write_cb.take()
            }
        });
        let Some(mut cb) = taken else { return };
        cb(self, fd);
        if let Some(item) = self.items[idx].as_mut() {
            if read {
                item.read_cb = Some(cb);
            } else {
                item.write_cb = Some(cb);
            }
        } else {
            warn!(fd, "callback fired for fd removed during dispatch");
        }
    }

    fn next_wait(&self) -> Duration {
        match self.timers.next_expiration() {
            Some(when) => {
                let now = Instant::now();
                if when <= now {
                    Duration::ZERO
                } else {
                    (when - now).min(self.timeout)
                }
            }
            None => self.timeout,
        }
    }
}

fn to_interest(mask: Ready) -> Interest {
    match (mask.contains(Ready::READ), mask.contains(Ready::WRITE)) {
        (true, true) => Interest::READABLE.add(Interest::WRITABLE),
        (true, false) => Interest::READABLE,
        (false, true) => Interest::WRITABLE,
        (false, false) => Interest::READABLE,
    }
}
