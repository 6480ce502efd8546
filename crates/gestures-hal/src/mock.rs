//! Mock implementations for testing without real hardware
//!
//! `MockSink` records everything a sensor posts, and `MockSource` is an
//! in-memory stand-in for the sysfs poller with the same blocking and
//! interrupt semantics. Both are used by this crate's own tests and are
//! public so downstream consumers can test against them too.

use crate::event::{Event, EventCallback};
use crate::sensor::EventSource;
use crate::{Result, SensorError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

fn relock<'a, T>(m: &'a Mutex<T>) -> MutexGuard<'a, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Event sink that records every posted batch
#[derive(Default)]
pub struct MockSink {
    batches: Mutex<Vec<(Vec<Event>, bool)>>,
    cond: Condvar,
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All batches posted so far, in delivery order
    pub fn batches(&self) -> Vec<(Vec<Event>, bool)> {
        relock(&self.batches).clone()
    }

    /// Total number of events across all batches
    pub fn total_events(&self) -> usize {
        relock(&self.batches).iter().map(|(e, _)| e.len()).sum()
    }

    /// Block until at least `n` batches arrived or the timeout elapses
    pub fn wait_for_batches(&self, n: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |batches| batches.len() >= n)
    }

    /// Block until at least `n` events arrived or the timeout elapses
    pub fn wait_for_events(&self, n: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |batches| {
            batches.iter().map(|(e, _)| e.len()).sum::<usize>() >= n
        })
    }

    fn wait_until(
        &self,
        timeout: Duration,
        done: impl Fn(&Vec<(Vec<Event>, bool)>) -> bool,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        let mut batches = relock(&self.batches);
        while !done(&batches) {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return false;
            };
            let (guard, res) = self
                .cond
                .wait_timeout(batches, remaining)
                .unwrap_or_else(|e| e.into_inner());
            batches = guard;
            if res.timed_out() && !done(&batches) {
                return false;
            }
        }
        true
    }
}

impl EventCallback for MockSink {
    fn post_events(&self, events: Vec<Event>, wakeup: bool) {
        relock(&self.batches).push((events, wakeup));
        self.cond.notify_all();
    }
}

#[derive(Default)]
struct MockSourceState {
    queue: VecDeque<Event>,
    interrupted: bool,
    enable_writes: Vec<bool>,
}

/// In-memory event source with the poller's blocking contract
#[derive(Default)]
pub struct MockSource {
    state: Mutex<MockSourceState>,
    cond: Condvar,
    fail_enable: AtomicBool,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an event as if the hardware produced it
    pub fn push(&self, event: Event) {
        relock(&self.state).queue.push_back(event);
        self.cond.notify_all();
    }

    /// Every `write_enable` value seen, in call order
    pub fn enable_writes(&self) -> Vec<bool> {
        relock(&self.state).enable_writes.clone()
    }

    /// Make the next `write_enable` fail with an I/O error
    pub fn fail_next_enable_write(&self) {
        self.fail_enable.store(true, Ordering::SeqCst);
    }
}

impl EventSource for MockSource {
    fn read_events(&self) -> Result<Vec<Event>> {
        let mut state = relock(&self.state);
        while state.queue.is_empty() && !state.interrupted {
            state = self.cond.wait(state).unwrap_or_else(|e| e.into_inner());
        }

        if state.interrupted {
            state.interrupted = false;
            return Ok(Vec::new());
        }

        let event = state.queue.pop_front();
        Ok(event.into_iter().collect())
    }

    fn interrupt(&self) {
        relock(&self.state).interrupted = true;
        self.cond.notify_all();
    }

    fn write_enable(&self, enable: bool) -> Result<()> {
        if self.fail_enable.swap(false, Ordering::SeqCst) {
            return Err(SensorError::Io(std::io::Error::other(
                "simulated enable write failure",
            )));
        }
        relock(&self.state).enable_writes.push(enable);
        Ok(())
    }
}
