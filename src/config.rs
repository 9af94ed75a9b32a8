//! Configuration for the measurement session
//!
//! All parameters are defaulted to the values the pipeline was tuned with
//! and can be overridden individually or loaded from a JSON file, enabling
//! tuning experiments without recompilation.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::SonarError;

/// How raw samples are gathered into a measurement window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureMode {
    /// Emit a pulse, wait a fixed delay, then snapshot the most recent
    /// window of the live input stream
    Snapshot,
    /// Discard input until a sample exceeds the onset threshold, then
    /// record a full window starting at that block
    Continuous,
}

/// Complete sonar configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SonarConfig {
    /// Pulse tone frequency in Hz
    pub pulse_frequency_hz: f32,
    /// Pulse tone length in milliseconds
    pub pulse_duration_ms: f32,
    /// Period between pulses in milliseconds
    pub measure_period_ms: u64,
    /// Snapshot mode: delay between pulse and buffer read, milliseconds
    pub snapshot_delay_ms: u64,
    /// Capture window length in input samples
    pub window_len: usize,
    /// Smoothing kernel half-width in input samples
    pub smoothing_kernel: usize,
    /// Decimation step for the envelope
    pub downsample_factor: usize,
    /// Use the windowed (anti-aliasing) downsample variant instead of
    /// plain decimation
    pub windowed_downsample: bool,
    /// Rectifier magnitude floor; samples below it are zeroed. Zero
    /// disables the floor, which is correct for signed float input.
    pub silence_floor: f32,
    /// Rolling-average window capacity
    pub num_measurements: usize,
    /// Ambient temperature in degrees Celsius, for the speed of sound
    pub temperature_c: f32,
    /// Continuous mode: rectified amplitude that arms recording
    pub onset_threshold: f32,
    /// Capture strategy selected for every cycle
    pub capture_mode: CaptureMode,
    /// Continuous mode: explicit window duration in seconds; when absent
    /// the duration is derived from `window_len` at the device rate
    pub window_duration_s: Option<f32>,
    /// Continuous mode: samples trimmed from the window tail
    pub guard_samples: usize,
    /// Sample rate requested from the capture device in Hz; the device
    /// may report a different effective rate once open
    pub sample_rate: u32,
}

impl Default for SonarConfig {
    fn default() -> Self {
        Self {
            pulse_frequency_hz: 12_000.0,
            pulse_duration_ms: 2.0,
            measure_period_ms: 190,
            snapshot_delay_ms: 22,
            window_len: 1024 * 8,
            smoothing_kernel: 32,
            downsample_factor: 8,
            windowed_downsample: false,
            silence_floor: 0.0,
            num_measurements: 5,
            temperature_c: 20.0,
            onset_threshold: 0.25,
            capture_mode: CaptureMode::Snapshot,
            window_duration_s: None,
            guard_samples: 256,
            sample_rate: 48_000,
        }
    }
}

impl SonarConfig {
    /// Load configuration from a JSON file, falling back to defaults if the
    /// file is missing or malformed
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Reject malformed configurations before anything is initialized
    ///
    /// # Errors
    /// Returns `SonarError::ConfigInvalid` naming the offending field.
    pub fn validate(&self) -> Result<(), SonarError> {
        if self.downsample_factor == 0 {
            return Err(self.invalid("downsample_factor must be > 0"));
        }
        if self.window_len == 0 {
            return Err(self.invalid("window_len must be > 0"));
        }
        if self.smoothing_kernel >= self.window_len / 2 {
            return Err(self.invalid(
                "smoothing_kernel must be smaller than half the capture window",
            ));
        }
        if self.num_measurements == 0 {
            return Err(self.invalid("num_measurements must be > 0"));
        }
        if self.pulse_frequency_hz <= 0.0 {
            return Err(self.invalid("pulse_frequency_hz must be > 0"));
        }
        if self.pulse_duration_ms <= 0.0 {
            return Err(self.invalid("pulse_duration_ms must be > 0"));
        }
        if self.measure_period_ms == 0 {
            return Err(self.invalid("measure_period_ms must be > 0"));
        }
        if self.sample_rate == 0 {
            return Err(self.invalid("sample_rate must be > 0"));
        }
        if self.capture_mode == CaptureMode::Continuous {
            if !(self.onset_threshold > 0.0 && self.onset_threshold <= 1.0) {
                return Err(self.invalid("onset_threshold must be within (0, 1]"));
            }
            if let Some(duration) = self.window_duration_s {
                if duration <= 0.0 {
                    return Err(self.invalid("window_duration_s must be > 0"));
                }
            }
            if self.continuous_target_len(self.sample_rate) == 0 {
                return Err(self.invalid("guard_samples consume the whole capture window"));
            }
        }
        Ok(())
    }

    /// Capture window duration in seconds at the given device rate
    pub fn window_duration(&self, sample_rate: u32) -> f32 {
        self.window_duration_s
            .unwrap_or(self.window_len as f32 / sample_rate as f32)
    }

    /// Continuous mode: number of samples recorded per window
    pub fn continuous_target_len(&self, sample_rate: u32) -> usize {
        let full = (self.window_duration(sample_rate) * sample_rate as f32).round() as usize;
        full.saturating_sub(self.guard_samples)
    }

    fn invalid(&self, reason: &str) -> SonarError {
        SonarError::ConfigInvalid {
            reason: reason.to_string(),
        }
    }
}
