//! Sysfs-backed one-shot polling
//!
//! The poller blocks in `poll(2)` on two descriptors: the kernel gesture
//! node and the read end of a self-interrupt pipe. Deactivation and mode
//! switches write one byte to the pipe to force the wait to return; the
//! byte stays in the pipe until the poller drains it, so a wake raised
//! before the thread reaches `poll` is never lost.

use crate::event::{Event, EventCallback, SensorInfo, SensorType};
use crate::sensor::{Capabilities, EventSource, Sensor};
use crate::{Result, SensorError};
use gestures_config::GestureSensor;
use nix::fcntl::OFlag;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use nix::unistd::pipe2;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::os::fd::AsFd;
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Pause after a hardware hangup before re-polling the always-ready fd
const HANGUP_BACKOFF: std::time::Duration = std::time::Duration::from_millis(10);

/// How activation is written to the kernel driver
///
/// Plain sensors own a boolean enable file. Gesture-grouped sensors share
/// one control node and each writes its own named token, so enabling one
/// gesture never clobbers another's.
pub enum EnableControl {
    Boolean { file: Mutex<File> },
    Gesture { file: Mutex<File>, token: String },
}

impl EnableControl {
    /// Per-sensor enable file taking "0"/"1"
    pub fn boolean(path: &Path) -> Result<Self> {
        Ok(Self::Boolean {
            file: Mutex::new(open_control(path)?),
        })
    }

    /// Shared control file taking a `<token>=<0|1>` command
    pub fn gesture(path: &Path, token: &str) -> Result<Self> {
        Ok(Self::Gesture {
            file: Mutex::new(open_control(path)?),
            token: token.to_string(),
        })
    }

    pub fn write(&self, enable: bool) -> Result<()> {
        let value = i32::from(enable);
        match self {
            Self::Boolean { file } => {
                let mut file = file.lock().unwrap_or_else(|e| e.into_inner());
                writeln!(file, "{value}")?;
                file.flush()?;
            }
            Self::Gesture { file, token } => {
                let mut file = file.lock().unwrap_or_else(|e| e.into_inner());
                writeln!(file, "{token}={value}")?;
                file.flush()?;
            }
        }
        Ok(())
    }
}

// Control nodes must already exist; a missing one is a configuration or
// driver problem and has to fail construction, not delivery.
fn open_control(path: &Path) -> Result<File> {
    let file = OpenOptions::new().append(true).open(path)?;
    Ok(file)
}

/// Blocking reader for one sysfs gesture node
///
/// All descriptors are opened at construction and live as long as the
/// instance, so `interrupt` always has a valid pipe to signal.
pub struct SysfsPoller {
    handle: i32,
    sensor_type: SensorType,
    screen_pos: Option<(i32, i32)>,
    poll_file: File,
    hw_flags: PollFlags,
    wake_rx: File,
    wake_tx: File,
    enable: EnableControl,
}

impl SysfsPoller {
    pub fn new(
        handle: i32,
        sensor_type: SensorType,
        poll_path: &Path,
        enable: EnableControl,
        screen_pos: Option<(i32, i32)>,
    ) -> Result<Self> {
        // Non-blocking keeps fifo-backed test fixtures from hanging the
        // open and makes spurious-readiness reads return WouldBlock.
        let poll_file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(poll_path)?;

        // Sysfs attributes are always readable and signal a gesture via
        // sysfs_notify, which surfaces as POLLPRI|POLLERR. Fifos (used as
        // test stand-ins) are level-readable only when data is pending.
        let hw_flags = if poll_file.metadata()?.file_type().is_fifo() {
            PollFlags::POLLIN
        } else {
            PollFlags::POLLPRI | PollFlags::POLLERR
        };

        let (rx, tx) = pipe2(OFlag::O_NONBLOCK | OFlag::O_CLOEXEC)?;

        tracing::debug!("Opened gesture node {}", poll_path.display());
        Ok(Self {
            handle,
            sensor_type,
            screen_pos,
            poll_file,
            hw_flags,
            wake_rx: File::from(rx),
            wake_tx: File::from(tx),
            enable,
        })
    }

    fn drain_wake_pipe(&self) {
        let mut buf = [0u8; 16];
        loop {
            match (&self.wake_rx).read(&mut buf) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(_) => break,
            }
        }
    }

    fn read_payload(&self) -> Result<String> {
        let mut file = &self.poll_file;
        // Sysfs attributes report fresh content from offset zero; fifos
        // reject the seek and that is fine.
        let _ = file.seek(SeekFrom::Start(0));

        let mut buf = [0u8; 64];
        match file.read(&mut buf) {
            Ok(n) => Ok(String::from_utf8_lossy(&buf[..n]).trim().to_string()),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(String::new()),
            Err(e) => Err(SensorError::Io(e)),
        }
    }

    fn event_for_trigger(&self) -> Event {
        match self.screen_pos {
            Some((x, y)) => Event::at_screen(self.handle, self.sensor_type, x, y),
            None => Event::trigger(self.handle, self.sensor_type),
        }
    }
}

impl EventSource for SysfsPoller {
    fn read_events(&self) -> Result<Vec<Event>> {
        let mut fds = [
            PollFd::new(self.poll_file.as_fd(), self.hw_flags),
            PollFd::new(self.wake_rx.as_fd(), PollFlags::POLLIN),
        ];

        poll(&mut fds, PollTimeout::NONE)?;

        let hw_revents = fds[0].revents().unwrap_or(PollFlags::empty());
        let hw_ready = hw_revents.intersects(self.hw_flags);
        let interrupted = fds[1]
            .revents()
            .is_some_and(|r| r.intersects(PollFlags::POLLIN));

        // The wake pipe is cleared only after it was seen as the cause of
        // the wakeup, and an interrupt wins over pending hardware data so
        // deactivation is never delayed by a late trigger.
        if interrupted {
            self.drain_wake_pipe();
            return Ok(Vec::new());
        }

        if !hw_ready {
            // A fifo whose writer closed reports POLLHUP on every poll;
            // back off briefly so the worker does not spin on an
            // instantly-ready descriptor. The wake pipe still cuts the
            // sleep's effect on cancellation latency to one cycle.
            if hw_revents.intersects(PollFlags::POLLHUP | PollFlags::POLLNVAL) {
                std::thread::sleep(HANGUP_BACKOFF);
            }
            return Ok(Vec::new());
        }

        let payload = self.read_payload()?;
        if payload.is_empty() || payload == "0" {
            return Ok(Vec::new());
        }

        tracing::debug!("Gesture trigger on handle {}: '{payload}'", self.handle);
        Ok(vec![self.event_for_trigger()])
    }

    fn interrupt(&self) {
        // One byte is enough; WouldBlock means the pipe already holds a
        // pending wake and the poller has not drained it yet.
        let _ = (&self.wake_tx).write(&[1]);
    }

    fn write_enable(&self, enable: bool) -> Result<()> {
        self.enable.write(enable)
    }
}

/// Build a one-shot sensor from a gesture table record
pub fn build_gesture_sensor(
    cfg: &GestureSensor,
    callback: Arc<dyn EventCallback>,
) -> Result<Sensor> {
    let enable = match &cfg.gesture {
        Some(token) => EnableControl::gesture(&cfg.control_path, token)?,
        None => EnableControl::boolean(&cfg.control_path)?,
    };

    let sensor_type = SensorType(cfg.type_code);
    let poller = SysfsPoller::new(
        cfg.handle,
        sensor_type,
        &cfg.poll_path,
        enable,
        cfg.screen_pos(),
    )?;

    let info = SensorInfo {
        handle: cfg.handle,
        name: cfg.name.clone(),
        vendor: cfg.vendor.clone(),
        type_string: cfg.type_string.clone(),
        sensor_type,
        wake_up: cfg.wake_up,
        supports_injection: cfg.supports_injection,
        max_range: 1.0,
        resolution: 1.0,
        power_ma: 0.0,
    };

    tracing::info!("Built gesture sensor '{}' (handle {})", info.name, info.handle);
    Ok(Sensor::new(
        info,
        Capabilities::one_shot(),
        Arc::new(poller),
        callback,
    ))
}
