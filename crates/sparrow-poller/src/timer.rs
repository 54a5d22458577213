use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::Poller;

pub type TimerCallback = Box<dyn FnMut(&mut Poller) + Send>;

struct TimerRecord {
    interval: Option<Duration>,
    callback: TimerCallback,
}

/// Min-heap of expirations plus a side table of callbacks, so the heap
/// itself never has to order boxed closures. Guarded by a mutex: this is
/// the only piece of a [`Poller`] that is safe to touch from another thread.
#[derive(Default)]
pub struct TimerQueue {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    heap: BinaryHeap<Reverse<(Instant, u64)>>,
    records: HashMap<u64, TimerRecord>,
    next_id: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, delay: Duration, repeat: bool, callback: TimerCallback) -> u64 {
        let mut inner = self.inner.lock().expect("timer queue poisoned");
        let id = inner.next_id;
        inner.next_id += 1;
        let expiration = Instant::now() + delay;
        inner.heap.push(Reverse((expiration, id)));
        inner.records.insert(
            id,
            TimerRecord { interval: repeat.then_some(delay), callback },
        );
        id
    }

    pub fn next_expiration(&self) -> Option<Instant> {
        let inner = self.inner.lock().expect("timer queue poisoned");
        inner.heap.peek().map(|Reverse((when, _))| *when)
    }

    /// Pops every timer due by `now` and runs it against `poller`. Repeating
    /// timers are rescheduled relative to `now`, not their original
    /// expiration, so a backlog collapses into a single catch-up tick
    /// instead of firing once per missed interval.
    pub fn fire_due(poller: &mut Poller, now: Instant) {
        loop {
            let due = {
                let queue = &poller.timers;
                let inner = queue.inner.lock().expect("timer queue poisoned");
                match inner.heap.peek() {
                    Some(Reverse((when, id))) if *when <= now => Some(*id),
                    _ => None,
                }
            };
            let Some(id) = due else { break };

            let mut callback = {
                let inner = &mut poller.timers.inner.lock().expect("timer queue poisoned");
                inner.heap.pop();
                match inner.records.get_mut(&id) {
                    Some(record) => {
                        if let Some(interval) = record.interval {
                            inner.heap.push(Reverse((now + interval, id)));
                        }
                        // take the callback out so we don't hold the mutex
                        // while it runs and possibly calls add_timer again.
                        std::mem::replace(&mut record.callback, Box::new(|_| {}))
                    }
                    None => continue,
                }
            };

            callback(poller);

            let mut inner = poller.timers.inner.lock().expect("timer queue poisoned");
            if let Some(record) = inner.records.get_mut(&id) {
                record.callback = callback;
            }
            if inner.records.get(&id).is_some_and(|r| r.interval.is_none()) {
                inner.records.remove(&id);
            }
        }
    }
}
