//! Integration tests for the gesture sensor engine
//!
//! Real sysfs nodes are simulated with fifos (true blocking readiness) and
//! plain files (enable controls), so the full poll/interrupt/enable path is
//! exercised without hardware.

use gestures_config::{GestureSensor, GestureTable};
use gestures_hal::mock::MockSink;
use gestures_hal::sysfs::build_gesture_sensor;
use gestures_hal::{EventPayload, OperationMode, Sensor, SensorError, SensorType};
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Test environment with simulated sysfs nodes
struct SensorTestEnv {
    #[allow(dead_code)]
    temp_dir: TempDir,
    sink: Arc<MockSink>,
}

impl SensorTestEnv {
    fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
            sink: Arc::new(MockSink::new()),
        }
    }

    /// Create a fifo standing in for a gesture poll node
    fn create_poll_node(&self, name: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        mkfifo(&path, Mode::from_bits_truncate(0o600)).expect("mkfifo");
        path
    }

    /// Create an empty file standing in for an enable control node
    fn create_control_node(&self, name: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        fs::write(&path, "").unwrap();
        path
    }

    /// Keep a writer open so the fifo never reports EOF
    fn open_writer(&self, path: &PathBuf) -> File {
        OpenOptions::new().write(true).open(path).expect("open fifo writer")
    }

    fn gesture_config(
        &self,
        handle: i32,
        token: &str,
        poll_path: PathBuf,
        control_path: PathBuf,
    ) -> GestureSensor {
        let mut cfg = GestureTable::builtin().sensors[0].clone();
        cfg.handle = handle;
        cfg.name = format!("Test Gesture {handle}");
        cfg.gesture = Some(token.to_string());
        cfg.poll_path = poll_path;
        cfg.control_path = control_path;
        cfg
    }

    fn build(&self, cfg: &GestureSensor) -> Sensor {
        build_gesture_sensor(cfg, self.sink.clone()).expect("build sensor")
    }
}

fn open_fd_count() -> usize {
    fs::read_dir("/proc/self/fd").expect("proc fd dir").count()
}

#[test]
fn test_trigger_delivers_exactly_one_event() {
    let env = SensorTestEnv::new();
    let poll = env.create_poll_node("fod_pressed");
    let control = env.create_control_node("fts_gestures");
    let cfg = env.gesture_config(1, "fod", poll.clone(), control);

    let mut sensor = env.build(&cfg);
    sensor.activate(true).unwrap();

    let mut writer = env.open_writer(&poll);
    writer.write_all(b"1").unwrap();

    assert!(env.sink.wait_for_events(1, Duration::from_secs(2)));
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(env.sink.total_events(), 1);

    let batches = env.sink.batches();
    let event = batches[0].0[0];
    assert_eq!(event.handle, 1);
    assert_eq!(event.sensor_type, SensorType(65537));
    assert_eq!(event.payload, EventPayload::Screen { x: 540, y: 1761 });
    assert!(batches[0].1, "gesture sensors are wakeup sensors");

    sensor.activate(false).unwrap();
}

#[test]
fn test_deactivation_unblocks_within_bounded_time() {
    let env = SensorTestEnv::new();
    let poll = env.create_poll_node("tap_pressed");
    let control = env.create_control_node("fts_gestures");
    let cfg = env.gesture_config(2, "single_click", poll.clone(), control);

    let mut sensor = env.build(&cfg);
    let _writer = env.open_writer(&poll);
    sensor.activate(true).unwrap();

    // Give the worker time to park inside poll(2)
    std::thread::sleep(Duration::from_millis(50));

    let start = Instant::now();
    sensor.activate(false).unwrap();
    assert!(
        start.elapsed() < Duration::from_millis(500),
        "deactivation took {:?}",
        start.elapsed()
    );
}

#[test]
fn test_activation_cycles_leak_no_fds() {
    let env = SensorTestEnv::new();
    let poll = env.create_poll_node("fod_pressed");
    let control = env.create_control_node("fts_gestures");
    let cfg = env.gesture_config(1, "fod", poll.clone(), control);

    let mut sensor = env.build(&cfg);
    let _writer = env.open_writer(&poll);

    // Warm up once so lazily created runtime fds do not skew the baseline
    sensor.activate(true).unwrap();
    sensor.activate(false).unwrap();
    let baseline = open_fd_count();

    for _ in 0..1000 {
        sensor.activate(true).unwrap();
        sensor.activate(false).unwrap();
    }

    assert_eq!(open_fd_count(), baseline);
}

#[test]
fn test_double_activate_spawns_one_worker() {
    let env = SensorTestEnv::new();
    let poll = env.create_poll_node("fod_pressed");
    let control = env.create_control_node("fts_gestures");
    let cfg = env.gesture_config(1, "fod", poll.clone(), control);

    let mut sensor = env.build(&cfg);
    sensor.activate(true).unwrap();
    sensor.activate(true).unwrap();

    let mut writer = env.open_writer(&poll);
    writer.write_all(b"1").unwrap();

    assert!(env.sink.wait_for_events(1, Duration::from_secs(2)));
    std::thread::sleep(Duration::from_millis(100));
    // A duplicate worker would have raced the fifo read or delivered twice
    assert_eq!(env.sink.total_events(), 1);

    sensor.activate(false).unwrap();
}

#[test]
fn test_shared_control_file_tokens_do_not_interfere() {
    let env = SensorTestEnv::new();
    let control = env.create_control_node("fts_gestures");
    let fod_poll = env.create_poll_node("fod_pressed");
    let tap_poll = env.create_poll_node("tap_pressed");

    let fod_cfg = env.gesture_config(1, "fod", fod_poll.clone(), control.clone());
    let tap_cfg = env.gesture_config(2, "single_click", tap_poll.clone(), control.clone());

    let mut fod = env.build(&fod_cfg);
    let mut tap = env.build(&tap_cfg);
    let _fod_writer = env.open_writer(&fod_poll);
    let _tap_writer = env.open_writer(&tap_poll);

    fod.activate(true).unwrap();
    tap.activate(true).unwrap();

    let log = fs::read_to_string(&control).unwrap();
    assert!(log.contains("fod=1"));
    assert!(log.contains("single_click=1"));

    // Disabling one gesture must not write the other's token
    fod.activate(false).unwrap();
    let log = fs::read_to_string(&control).unwrap();
    assert!(log.contains("fod=0"));
    assert!(!log.contains("single_click=0"));

    tap.activate(false).unwrap();
}

#[test]
fn test_injection_mode_gates_hardware_events() {
    let env = SensorTestEnv::new();
    let poll = env.create_poll_node("fod_pressed");
    let control = env.create_control_node("fts_gestures");
    let mut cfg = env.gesture_config(1, "fod", poll.clone(), control.clone());
    cfg.supports_injection = true;

    let mut sensor = env.build(&cfg);
    sensor.activate(true).unwrap();
    sensor
        .set_operation_mode(OperationMode::DataInjection)
        .unwrap();

    // Hardware was told to stop producing
    let log = fs::read_to_string(&control).unwrap();
    assert!(log.contains("fod=0"));

    // Hardware readiness must not reach the sink while injecting
    let mut writer = env.open_writer(&poll);
    writer.write_all(b"1").unwrap();
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(env.sink.total_events(), 0);

    let injected = gestures_hal::Event::at_screen(1, SensorType(65537), 100, 200);
    sensor.inject_event(injected).unwrap();
    assert_eq!(env.sink.total_events(), 1);
    assert_eq!(
        env.sink.batches()[0].0[0].payload,
        EventPayload::Screen { x: 100, y: 200 }
    );

    sensor.activate(false).unwrap();
}

#[test]
fn test_inject_in_normal_mode_is_invalid_state() {
    let env = SensorTestEnv::new();
    let poll = env.create_poll_node("fod_pressed");
    let control = env.create_control_node("fts_gestures");
    let mut cfg = env.gesture_config(1, "fod", poll, control);
    cfg.supports_injection = true;

    let sensor = env.build(&cfg);
    let event = gestures_hal::Event::trigger(1, SensorType(65537));

    assert!(matches!(
        sensor.inject_event(event),
        Err(SensorError::InvalidState(_))
    ));
    assert_eq!(env.sink.total_events(), 0);
}

#[test]
fn test_batch_does_not_change_polling_behavior() {
    let env = SensorTestEnv::new();
    let poll = env.create_poll_node("fod_pressed");
    let control = env.create_control_node("fts_gestures");
    let cfg = env.gesture_config(1, "fod", poll.clone(), control);

    let mut sensor = env.build(&cfg);
    sensor.batch(20_000_000).unwrap();
    sensor.activate(true).unwrap();
    sensor.batch(5_000_000).unwrap();

    let mut writer = env.open_writer(&poll);
    writer.write_all(b"1").unwrap();

    // Still exactly one event per trigger, no periodic resampling
    assert!(env.sink.wait_for_events(1, Duration::from_secs(2)));
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(env.sink.total_events(), 1);

    sensor.activate(false).unwrap();
}

#[test]
fn test_one_shot_flush_always_fails() {
    let env = SensorTestEnv::new();
    let poll = env.create_poll_node("fod_pressed");
    let control = env.create_control_node("fts_gestures");
    let cfg = env.gesture_config(1, "fod", poll, control);

    let mut sensor = env.build(&cfg);
    assert!(matches!(sensor.flush(), Err(SensorError::BadValue(_))));

    sensor.activate(true).unwrap();
    assert!(matches!(sensor.flush(), Err(SensorError::BadValue(_))));
    sensor.activate(false).unwrap();
}

#[test]
fn test_drop_while_active_shuts_down_cleanly() {
    let env = SensorTestEnv::new();
    let poll = env.create_poll_node("fod_pressed");
    let control = env.create_control_node("fts_gestures");
    let cfg = env.gesture_config(1, "fod", poll.clone(), control);

    let mut sensor = env.build(&cfg);
    let _writer = env.open_writer(&poll);
    sensor.activate(true).unwrap();
    std::thread::sleep(Duration::from_millis(50));

    let start = Instant::now();
    drop(sensor);
    assert!(start.elapsed() < Duration::from_millis(500));
}
