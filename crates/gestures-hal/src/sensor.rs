//! The sensor polling/lifecycle engine
//!
//! One worker thread per active sensor. The thread parks on a condition
//! variable while the sensor is disabled or injecting, blocks inside the
//! event source while enabled, and exits when the stop flag is raised.
//! Activation, mode switches, and teardown all funnel through the same
//! mutex so a thread mid-shutdown is always joined before a new one spawns.

use crate::event::{Event, EventCallback, SensorInfo};
use crate::{Result, SensorError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;

/// How the sensor sources events from hardware
///
/// `read_events` is the worker thread's only blocking point and must return
/// promptly after `interrupt` is called from any other thread.
pub trait EventSource: Send + Sync {
    /// Block until the hardware produces events or the wait is interrupted.
    ///
    /// An interrupted wait returns an empty batch; it is not an error.
    fn read_events(&self) -> Result<Vec<Event>>;

    /// Force a blocked `read_events` to return. Never blocks.
    fn interrupt(&self);

    /// Tell the kernel driver to start or stop producing the signal.
    fn write_enable(&self, enable: bool) -> Result<()>;
}

/// Sensor operation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperationMode {
    /// Events come from hardware
    #[default]
    Normal,
    /// Events come only from `inject_event`
    DataInjection,
}

/// What this sensor shape supports
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    pub supports_batch: bool,
    pub supports_flush: bool,
}

impl Capabilities {
    /// One-shot/gesture shape: no sampling rate, nothing to flush
    pub fn one_shot() -> Self {
        Self {
            supports_batch: false,
            supports_flush: false,
        }
    }

    /// Continuous shape: batching stores a period, flush acknowledges
    pub fn continuous() -> Self {
        Self {
            supports_batch: true,
            supports_flush: true,
        }
    }
}

#[derive(Debug, Default)]
struct RunState {
    enabled: bool,
    stop: bool,
    mode: OperationMode,
    sampling_period_ns: i64,
    last_sample_ns: i64,
}

struct Shared {
    state: Mutex<RunState>,
    cond: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, RunState> {
        // Worker threads hold no invariant-breaking state across panics
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// An independently schedulable polling unit
pub struct Sensor {
    info: SensorInfo,
    caps: Capabilities,
    source: Arc<dyn EventSource>,
    callback: Arc<dyn EventCallback>,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl Sensor {
    pub fn new(
        info: SensorInfo,
        caps: Capabilities,
        source: Arc<dyn EventSource>,
        callback: Arc<dyn EventCallback>,
    ) -> Self {
        tracing::debug!("Creating sensor '{}' (handle {})", info.name, info.handle);
        Self {
            info,
            caps,
            source,
            callback,
            shared: Arc::new(Shared {
                state: Mutex::new(RunState::default()),
                cond: Condvar::new(),
            }),
            worker: None,
        }
    }

    /// The immutable descriptor
    pub fn info(&self) -> &SensorInfo {
        &self.info
    }

    /// Whether events from this sensor rouse the host
    pub fn is_wake_up(&self) -> bool {
        self.info.wake_up
    }

    /// Whether this sensor accepts injected events at all
    pub fn supports_data_injection(&self) -> bool {
        self.info.supports_injection
    }

    /// Record the requested sampling period
    ///
    /// One-shot shapes accept and ignore the value; a gesture has no rate.
    pub fn batch(&self, sampling_period_ns: i64) -> Result<()> {
        if !self.caps.supports_batch {
            return Ok(());
        }
        self.shared.lock().sampling_period_ns = sampling_period_ns;
        Ok(())
    }

    /// Enable or disable the sensor
    ///
    /// Idempotent. Enabling writes the kernel enable control first, so an
    /// I/O failure aborts the activation with no thread spawned. Disabling
    /// raises the stop flag, interrupts the wait, and joins the worker
    /// before touching the enable control.
    pub fn activate(&mut self, enable: bool) -> Result<()> {
        let mode = {
            let state = self.shared.lock();
            if state.enabled == enable {
                return Ok(());
            }
            state.mode
        };

        if enable {
            // Hardware stays silenced for the whole injection span;
            // set_operation_mode(Normal) re-arms it for enabled sensors.
            if mode == OperationMode::Normal {
                self.source.write_enable(true)?;
            }
            {
                let mut state = self.shared.lock();
                state.enabled = true;
                state.stop = false;
            }
            self.spawn_worker();
            self.shared.cond.notify_all();
            tracing::info!("Sensor '{}' activated", self.info.name);
        } else {
            {
                let mut state = self.shared.lock();
                state.enabled = false;
                state.stop = true;
            }
            self.shared.cond.notify_all();
            self.source.interrupt();
            if let Some(handle) = self.worker.take() {
                let _ = handle.join();
            }
            self.source.write_enable(false)?;
            tracing::info!("Sensor '{}' deactivated", self.info.name);
        }

        Ok(())
    }

    /// Request a flush-complete acknowledgment
    ///
    /// One-shot shapes have no buffered data and always report `BadValue`.
    pub fn flush(&self) -> Result<()> {
        if !self.caps.supports_flush {
            return Err(SensorError::BadValue("flush on one-shot sensor"));
        }
        if !self.shared.lock().enabled {
            return Err(SensorError::InvalidState("flush on disabled sensor"));
        }

        let ack = Event::flush_complete(self.info.handle, self.info.sensor_type);
        self.callback.post_events(vec![ack], false);
        Ok(())
    }

    /// Switch between hardware-driven and injection operation
    ///
    /// Entering injection mode silences the hardware source without
    /// touching the enabled bookkeeping; leaving it re-arms the hardware if
    /// the sensor is still enabled.
    pub fn set_operation_mode(&mut self, mode: OperationMode) -> Result<()> {
        if mode == OperationMode::DataInjection && !self.supports_data_injection() {
            return Err(SensorError::BadValue("sensor does not support injection"));
        }

        let enabled = {
            let mut state = self.shared.lock();
            if state.mode == mode {
                return Ok(());
            }
            state.mode = mode;
            state.enabled
        };
        self.shared.cond.notify_all();

        match mode {
            OperationMode::DataInjection => {
                // Unblock a thread parked in the hardware wait; it will
                // re-park on the condvar until the mode flips back.
                self.source.interrupt();
                if enabled {
                    self.source.write_enable(false)?;
                }
                tracing::info!("Sensor '{}' entering injection mode", self.info.name);
            }
            OperationMode::Normal => {
                if enabled {
                    self.source.write_enable(true)?;
                }
                tracing::info!("Sensor '{}' back to normal operation", self.info.name);
            }
        }

        Ok(())
    }

    /// Forward an externally injected event to the sink
    pub fn inject_event(&self, event: Event) -> Result<()> {
        if !self.supports_data_injection() {
            return Err(SensorError::BadValue("sensor does not support injection"));
        }
        if self.shared.lock().mode != OperationMode::DataInjection {
            return Err(SensorError::InvalidState("not in injection mode"));
        }

        self.callback.post_events(vec![event], self.info.wake_up);
        Ok(())
    }

    fn spawn_worker(&mut self) {
        // At most one worker per sensor; activation already joined any
        // previous thread before clearing the stop flag.
        if self.worker.is_some() {
            return;
        }

        let shared = self.shared.clone();
        let source = self.source.clone();
        let callback = self.callback.clone();
        let wake_up = self.info.wake_up;
        let name = self.info.name.clone();

        self.worker = Some(std::thread::spawn(move || {
            run_loop(&shared, source.as_ref(), callback.as_ref(), wake_up, &name);
        }));
    }
}

/// Worker thread body
///
/// Stop is checked both before and after the blocking read, and the
/// interrupt byte persists in the pipe until the source drains it, so a
/// stop raised at any point cannot be lost to an unbounded wait.
fn run_loop(
    shared: &Shared,
    source: &dyn EventSource,
    callback: &dyn EventCallback,
    wake_up: bool,
    name: &str,
) {
    tracing::debug!("Worker for '{name}' started");
    loop {
        {
            let mut state = shared.lock();
            while !state.stop && !(state.enabled && state.mode == OperationMode::Normal) {
                state = shared
                    .cond
                    .wait(state)
                    .unwrap_or_else(|e| e.into_inner());
            }
            if state.stop {
                break;
            }
        }

        let events = match source.read_events() {
            Ok(events) => events,
            Err(e) => {
                // No caller to report to; count it as an empty cycle
                tracing::warn!("Sensor '{name}' read failed: {e}");
                Vec::new()
            }
        };

        if !events.is_empty() {
            shared.lock().last_sample_ns = events[0].timestamp_ns;
            callback.post_events(events, wake_up);
        }
    }
    tracing::debug!("Worker for '{name}' exiting");
}

impl Drop for Sensor {
    fn drop(&mut self) {
        {
            let mut state = self.shared.lock();
            state.enabled = false;
            state.stop = true;
        }
        self.shared.cond.notify_all();
        self.source.interrupt();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
        // Best effort; the kernel control may already be gone at teardown
        if let Err(e) = self.source.write_enable(false) {
            tracing::debug!("Sensor '{}' disable at drop failed: {e}", self.info.name);
        }
    }
}
