//! Measurement session - lifecycle, pulse scheduling, rolling average
//!
//! The session owns the emitter and capturer, drives the periodic
//! measurement loop on a dedicated worker thread, and folds distances into
//! a rolling average before reporting them. All session state mutation
//! happens either on the caller thread (start/stop) or on the worker, with
//! a single atomic state flag serializing the two: any completion arriving
//! after stop() is checked against the flag and discarded.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::capture::{CaptureStream, Capturer, CaptureStrategy, Emitter, Pulse};
use crate::config::{CaptureMode, SonarConfig};
use crate::dsp::{self, Envelope, Peak, ValidRange};
use crate::error::SonarError;

/// Receives the rolling-average distance in meters
pub type MeasurementCallback = Box<dyn FnMut(f32) + Send>;
/// Receives per-cycle debug data; purely informational
pub type DebugCallback = Box<dyn FnMut(&DebugFrame) + Send>;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Stopped,
    Starting,
    Running,
}

const STATE_STOPPED: u8 = 0;
const STATE_STARTING: u8 = 1;
const STATE_RUNNING: u8 = 2;

/// One completed distance measurement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    /// Distance to the reflector in meters
    pub distance_m: f32,
    /// When the measurement completed
    pub timestamp: Instant,
}

/// Per-cycle debug data handed to the debug callback
#[derive(Debug, Clone)]
pub struct DebugFrame {
    /// The conditioned envelope the detector scanned
    pub envelope: Envelope,
    /// All significant peaks, outgoing pulse first; empty if the cycle
    /// found fewer than two
    pub peaks: Vec<Peak>,
}

/// Bounded FIFO of recent measurements with mode-dependent reporting
///
/// Snapshot mode batches: nothing is reported
/// until the window holds `capacity` measurements. Continuous mode reports
/// from the first measurement onward. Either way the oldest entry is
/// evicted once capacity is exceeded.
struct RollingAverage {
    window: VecDeque<Measurement>,
    capacity: usize,
    batch: bool,
}

impl RollingAverage {
    fn new(capacity: usize, batch: bool) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity + 1),
            capacity,
            batch,
        }
    }

    /// Fold in a measurement; returns the mean when it should be reported.
    fn push(&mut self, measurement: Measurement) -> Option<f32> {
        self.window.push_back(measurement);
        if self.window.len() > self.capacity {
            self.window.pop_front();
        }
        let ready = if self.batch {
            self.window.len() == self.capacity
        } else {
            true
        };
        if !ready {
            return None;
        }
        let sum: f32 = self.window.iter().map(|m| m.distance_m).sum();
        Some(sum / self.window.len() as f32)
    }
}

/// Pulse-echo measurement session
///
/// Created around an emitter/capturer pair; `start` acquires both devices
/// and begins measuring, `stop` releases them. Both are idempotent.
pub struct SonarSession {
    config: SonarConfig,
    emitter: Box<dyn Emitter>,
    capturer: Box<dyn Capturer>,
    state: Arc<AtomicU8>,
    worker: Option<JoinHandle<()>>,
    opened_rate: Option<u32>,
}

impl SonarSession {
    pub fn new(
        config: SonarConfig,
        emitter: Box<dyn Emitter>,
        capturer: Box<dyn Capturer>,
    ) -> Self {
        Self {
            config,
            emitter,
            capturer,
            state: Arc::new(AtomicU8::new(STATE_STOPPED)),
            worker: None,
            opened_rate: None,
        }
    }

    /// Session over the default cpal input and output devices
    pub fn with_default_devices(config: SonarConfig) -> Self {
        Self::new(
            config,
            Box::new(crate::capture::CpalEmitter::new()),
            Box::new(crate::capture::CpalCapturer::new()),
        )
    }

    pub fn state(&self) -> SessionState {
        match self.state.load(Ordering::Acquire) {
            STATE_STARTING => SessionState::Starting,
            STATE_RUNNING => SessionState::Running,
            _ => SessionState::Stopped,
        }
    }

    pub fn config(&self) -> &SonarConfig {
        &self.config
    }

    /// Advisory distance bounds for the current configuration
    ///
    /// Uses the effective device rate once a capture stream has been
    /// opened, the configured rate before that.
    pub fn valid_range(&self) -> ValidRange {
        let rate = self.opened_rate.unwrap_or(self.config.sample_rate);
        dsp::valid_range(&self.config, rate)
    }

    /// Begin measuring; a no-op if the session is already running.
    ///
    /// Validates the configuration and acquires both devices before any
    /// state changes become observable; on failure the session remains
    /// Stopped with nothing partially initialized.
    ///
    /// # Errors
    /// `ConfigInvalid` for malformed configurations, device errors when
    /// the capturer or emitter cannot be opened.
    pub fn start(
        &mut self,
        on_measurement: MeasurementCallback,
        on_debug: Option<DebugCallback>,
    ) -> Result<(), SonarError> {
        if self.state.load(Ordering::Acquire) != STATE_STOPPED {
            log::debug!("[Session] start() ignored, session already active");
            return Ok(());
        }
        self.config.validate()?;
        self.state.store(STATE_STARTING, Ordering::Release);

        let stream = match self.capturer.open() {
            Ok(stream) => stream,
            Err(err) => {
                self.state.store(STATE_STOPPED, Ordering::Release);
                return Err(err);
            }
        };
        let pulse = match self.emitter.open() {
            Ok(pulse) => pulse,
            Err(err) => {
                self.capturer.close();
                self.state.store(STATE_STOPPED, Ordering::Release);
                return Err(err);
            }
        };
        self.opened_rate = Some(stream.sample_rate);

        let worker = Worker {
            config: self.config.clone(),
            state: Arc::clone(&self.state),
            pulse,
            stream,
            on_measurement,
            on_debug,
        };

        // The worker only runs while the flag reads Running, so it must be
        // set before the thread observes it.
        self.state.store(STATE_RUNNING, Ordering::Release);
        match thread::Builder::new()
            .name("wavetape-measure".to_string())
            .spawn(move || worker.run())
        {
            Ok(handle) => {
                self.worker = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.state.store(STATE_STOPPED, Ordering::Release);
                self.emitter.close();
                self.capturer.close();
                Err(err.into())
            }
        }
    }

    /// Stop measuring and release both devices.
    ///
    /// Safe to call from any state, including repeatedly; never blocks on
    /// an in-flight capture beyond the worker noticing the flag.
    pub fn stop(&mut self) {
        self.state.store(STATE_STOPPED, Ordering::Release);
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                log::warn!("[Session] Measurement worker panicked");
            }
        }
        self.emitter.close();
        self.capturer.close();
    }
}

impl Drop for SonarSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Owns everything the measurement loop needs; lives on the worker thread
struct Worker {
    config: SonarConfig,
    state: Arc<AtomicU8>,
    pulse: Box<dyn Pulse>,
    stream: CaptureStream,
    on_measurement: MeasurementCallback,
    on_debug: Option<DebugCallback>,
}

impl Worker {
    fn run(mut self) {
        let sample_rate = self.stream.sample_rate;
        let mut strategy = CaptureStrategy::new(&self.config, sample_rate);
        let mut average = RollingAverage::new(
            self.config.num_measurements,
            self.config.capture_mode == CaptureMode::Snapshot,
        );
        let period = Duration::from_millis(self.config.measure_period_ms);
        let snapshot_delay = Duration::from_millis(self.config.snapshot_delay_ms);
        let mut next_pulse = Instant::now();
        let mut snapshot_due: Option<Instant> = None;
        let mut completed: Vec<Vec<f32>> = Vec::new();

        log::info!(
            "[Session] Measurement loop started ({:?} mode, {} Hz)",
            self.config.capture_mode,
            sample_rate
        );

        while self.state.load(Ordering::Acquire) == STATE_RUNNING {
            let now = Instant::now();

            if now >= next_pulse {
                self.pulse
                    .emit(self.config.pulse_frequency_hz, self.config.pulse_duration_ms);
                strategy.on_pulse();
                if self.config.capture_mode == CaptureMode::Snapshot {
                    snapshot_due = Some(now + snapshot_delay);
                }
                next_pulse = now + period;
            }

            while let Ok(mut block) = self.stream.channels.data_consumer.pop() {
                if let Some(window) = strategy.ingest(&block) {
                    completed.push(window);
                }
                block.clear();
                let _ = self.stream.channels.recycle_producer.push(block);
            }

            if let Some(due) = snapshot_due {
                if Instant::now() >= due {
                    snapshot_due = None;
                    if let Some(window) = strategy.take_snapshot() {
                        completed.push(window);
                    }
                }
            }

            for window in completed.drain(..) {
                self.process_window(&window, sample_rate, &mut average);
            }

            thread::sleep(Duration::from_millis(1));
        }

        log::info!("[Session] Measurement loop stopped");
    }

    /// Run one capture window through the DSP pipeline and report.
    fn process_window(
        &mut self,
        window: &[f32],
        sample_rate: u32,
        average: &mut RollingAverage,
    ) {
        if window.is_empty() {
            return;
        }
        let envelope = dsp::condition(window, &self.config, sample_rate);
        let reading = dsp::detect_echo(&envelope);

        // The flag can flip mid-cycle; results completing after stop()
        // must never reach the caller.
        if self.state.load(Ordering::Acquire) != STATE_RUNNING {
            return;
        }

        if let Some(on_debug) = self.on_debug.as_mut() {
            let peaks = match &reading {
                Some(r) => {
                    let mut all = Vec::with_capacity(r.peaks.len() + 1);
                    all.push(r.pulse);
                    all.extend_from_slice(&r.peaks);
                    all
                }
                None => Vec::new(),
            };
            on_debug(&DebugFrame { envelope, peaks });
        }

        let Some(reading) = reading else {
            // Quiet cycle, nothing reflected back loud enough.
            log::debug!("[Session] No echo this cycle");
            return;
        };

        let distance_m =
            dsp::distance(&reading.pulse, &reading.echo, self.config.temperature_c);
        let measurement = Measurement {
            distance_m,
            timestamp: Instant::now(),
        };
        log::debug!(
            "[Session] Echo at {:.4}s -> {:.3} m",
            reading.echo.time,
            distance_m
        );

        if let Some(mean) = average.push(measurement) {
            if self.state.load(Ordering::Acquire) == STATE_RUNNING {
                (self.on_measurement)(mean);
            }
        }
    }
}
