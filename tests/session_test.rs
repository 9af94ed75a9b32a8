//! End-to-end session tests over scripted devices
//!
//! These run the full pipeline - capture strategy, envelope conditioning,
//! echo detection, ranging, rolling average - against synthetic signals
//! with a known geometry, so the expected distance is ground truth rather
//! than a regression snapshot.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use wavetape::testing::{pulse_echo_signal, ScriptedCapturer, ScriptedEmitter, UnavailableCapturer};
use wavetape::{
    speed_of_sound, CaptureMode, SessionState, SonarConfig, SonarError, SonarSession,
};

const SAMPLE_RATE: u32 = 48_000;
const ECHO_DELAY_S: f32 = 0.02;

fn continuous_config() -> SonarConfig {
    SonarConfig {
        capture_mode: CaptureMode::Continuous,
        num_measurements: 1,
        measure_period_ms: 20,
        window_duration_s: Some(8192.0 / SAMPLE_RATE as f32),
        guard_samples: 0,
        sample_rate: SAMPLE_RATE,
        ..SonarConfig::default()
    }
}

fn snapshot_config() -> SonarConfig {
    SonarConfig {
        capture_mode: CaptureMode::Snapshot,
        num_measurements: 2,
        measure_period_ms: 20,
        snapshot_delay_ms: 5,
        sample_rate: SAMPLE_RATE,
        ..SonarConfig::default()
    }
}

fn collecting_callback() -> (Arc<Mutex<Vec<f32>>>, wavetape::session::MeasurementCallback) {
    let values: Arc<Mutex<Vec<f32>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&values);
    let callback = Box::new(move |distance_m: f32| {
        if let Ok(mut v) = sink.lock() {
            v.push(distance_m);
        }
    });
    (values, callback)
}

#[test]
fn test_continuous_mode_measures_synthetic_echo() {
    let signal = pulse_echo_signal(SAMPLE_RATE, 16_384, 0.005, ECHO_DELAY_S, 1.0, 0.6);
    let config = continuous_config();
    let expected = ECHO_DELAY_S * speed_of_sound(config.temperature_c) / 2.0;

    let mut session = SonarSession::new(
        config,
        Box::new(ScriptedEmitter::new()),
        Box::new(ScriptedCapturer::new(SAMPLE_RATE, 512, signal)),
    );

    let (values, callback) = collecting_callback();
    session.start(callback, None).expect("start should succeed");
    assert_eq!(session.state(), SessionState::Running);

    std::thread::sleep(Duration::from_millis(300));
    session.stop();
    assert_eq!(session.state(), SessionState::Stopped);

    let measured = values.lock().unwrap();
    assert!(
        !measured.is_empty(),
        "expected at least one measurement from the synthetic echo"
    );
    assert!(
        (measured[0] - expected).abs() < 0.2,
        "measured {} m, expected ~{} m",
        measured[0],
        expected
    );
}

#[test]
fn test_snapshot_mode_measures_synthetic_echo() {
    // Script exactly one window so the snapshot ring holds both bursts.
    let config = snapshot_config();
    let signal = pulse_echo_signal(SAMPLE_RATE, config.window_len, 0.005, ECHO_DELAY_S, 1.0, 0.6);
    let expected = ECHO_DELAY_S * speed_of_sound(config.temperature_c) / 2.0;

    let mut session = SonarSession::new(
        config,
        Box::new(ScriptedEmitter::new()),
        Box::new(ScriptedCapturer::new(SAMPLE_RATE, 512, signal)),
    );

    let (values, callback) = collecting_callback();
    session.start(callback, None).expect("start should succeed");
    std::thread::sleep(Duration::from_millis(300));
    session.stop();

    let measured = values.lock().unwrap();
    // Batch semantics: the first report needs num_measurements completed
    // cycles, and every later cycle reports again.
    assert!(
        !measured.is_empty(),
        "expected batch reports after repeated snapshots"
    );
    for &d in measured.iter() {
        assert!(
            (d - expected).abs() < 0.2,
            "measured {} m, expected ~{} m",
            d,
            expected
        );
    }
}

#[test]
fn test_debug_callback_sees_envelope_and_peaks() {
    let signal = pulse_echo_signal(SAMPLE_RATE, 16_384, 0.005, ECHO_DELAY_S, 1.0, 0.6);
    let mut session = SonarSession::new(
        continuous_config(),
        Box::new(ScriptedEmitter::new()),
        Box::new(ScriptedCapturer::new(SAMPLE_RATE, 512, signal)),
    );

    let frames: Arc<Mutex<Vec<(usize, usize)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&frames);
    let (_, callback) = collecting_callback();
    session
        .start(
            callback,
            Some(Box::new(move |frame| {
                if let Ok(mut f) = sink.lock() {
                    f.push((frame.envelope.samples.len(), frame.peaks.len()));
                }
            })),
        )
        .expect("start should succeed");

    std::thread::sleep(Duration::from_millis(300));
    session.stop();

    let frames = frames.lock().unwrap();
    assert!(!frames.is_empty(), "debug callback should fire per cycle");
    let (envelope_len, peak_count) = frames[0];
    assert_eq!(envelope_len, 8192 / 8, "envelope should be downsampled");
    assert!(peak_count >= 2, "pulse and echo peaks should be reported");
}

#[test]
fn test_silent_capture_produces_no_measurements() {
    let mut session = SonarSession::new(
        continuous_config(),
        Box::new(ScriptedEmitter::new()),
        Box::new(ScriptedCapturer::silence(SAMPLE_RATE, 16_384)),
    );

    let (values, callback) = collecting_callback();
    session.start(callback, None).expect("start should succeed");
    std::thread::sleep(Duration::from_millis(150));
    session.stop();

    assert!(
        values.lock().unwrap().is_empty(),
        "silence must yield no measurements, and no crash"
    );
}

#[test]
fn test_start_is_idempotent_while_running() {
    let mut session = SonarSession::new(
        snapshot_config(),
        Box::new(ScriptedEmitter::new()),
        Box::new(ScriptedCapturer::silence(SAMPLE_RATE, 4096)),
    );

    let (_, callback) = collecting_callback();
    session.start(callback, None).expect("first start");
    let (_, second_callback) = collecting_callback();
    assert!(
        session.start(second_callback, None).is_ok(),
        "second start must be a no-op, not an error"
    );
    assert_eq!(session.state(), SessionState::Running);
    session.stop();
}

#[test]
fn test_stop_twice_is_safe() {
    let mut session = SonarSession::new(
        snapshot_config(),
        Box::new(ScriptedEmitter::new()),
        Box::new(ScriptedCapturer::silence(SAMPLE_RATE, 4096)),
    );

    let (_, callback) = collecting_callback();
    session.start(callback, None).expect("start");
    session.stop();
    session.stop();
    assert_eq!(session.state(), SessionState::Stopped);

    // And on a session that never ran.
    let mut idle = SonarSession::new(
        snapshot_config(),
        Box::new(ScriptedEmitter::new()),
        Box::new(ScriptedCapturer::silence(SAMPLE_RATE, 0)),
    );
    idle.stop();
    idle.stop();
    assert_eq!(idle.state(), SessionState::Stopped);
}

#[test]
fn test_start_surfaces_device_failure_and_stays_stopped() {
    let mut session = SonarSession::new(
        snapshot_config(),
        Box::new(ScriptedEmitter::new()),
        Box::new(UnavailableCapturer),
    );

    let (values, callback) = collecting_callback();
    let err = session.start(callback, None).unwrap_err();
    assert!(matches!(err, SonarError::DeviceUnavailable { .. }));
    assert_eq!(session.state(), SessionState::Stopped);
    assert!(values.lock().unwrap().is_empty());

    // No automatic retry: the caller decides, and a second start fails
    // the same way.
    let (_, callback) = collecting_callback();
    assert!(session.start(callback, None).is_err());
    assert_eq!(session.state(), SessionState::Stopped);
}

#[test]
fn test_invalid_config_rejected_at_start() {
    let config = SonarConfig {
        downsample_factor: 0,
        ..snapshot_config()
    };
    let mut session = SonarSession::new(
        config,
        Box::new(ScriptedEmitter::new()),
        Box::new(ScriptedCapturer::silence(SAMPLE_RATE, 0)),
    );

    let (_, callback) = collecting_callback();
    match session.start(callback, None).unwrap_err() {
        SonarError::ConfigInvalid { reason } => {
            assert!(reason.contains("downsample_factor"));
        }
        other => panic!("Expected ConfigInvalid, got {:?}", other),
    }
    assert_eq!(session.state(), SessionState::Stopped);
}

#[test]
fn test_no_measurements_arrive_after_stop() {
    let signal = pulse_echo_signal(SAMPLE_RATE, 16_384, 0.005, ECHO_DELAY_S, 1.0, 0.6);
    let mut session = SonarSession::new(
        continuous_config(),
        Box::new(ScriptedEmitter::new()),
        Box::new(ScriptedCapturer::new(SAMPLE_RATE, 512, signal)),
    );

    let (values, callback) = collecting_callback();
    session.start(callback, None).expect("start");
    std::thread::sleep(Duration::from_millis(200));
    session.stop();

    let count_at_stop = values.lock().unwrap().len();
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(
        values.lock().unwrap().len(),
        count_at_stop,
        "callbacks must not fire after stop()"
    );
}

#[test]
fn test_session_emits_pulses_with_configured_tone() {
    let config = snapshot_config();
    let emitter = ScriptedEmitter::new();
    let log = emitter.emitted();
    let mut session = SonarSession::new(
        config.clone(),
        Box::new(emitter),
        Box::new(ScriptedCapturer::silence(SAMPLE_RATE, 4096)),
    );

    let (_, callback) = collecting_callback();
    session.start(callback, None).expect("start");
    std::thread::sleep(Duration::from_millis(150));
    session.stop();

    let emitted = log.lock().unwrap();
    assert!(
        emitted.len() >= 2,
        "expected repeated pulses, got {}",
        emitted.len()
    );
    for &(frequency, duration) in emitted.iter() {
        assert_eq!(frequency, config.pulse_frequency_hz);
        assert_eq!(duration, config.pulse_duration_ms);
    }
}
