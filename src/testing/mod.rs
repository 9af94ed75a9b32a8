//! Deterministic fixtures for exercising the pipeline without hardware
//!
//! A scripted capturer replays a pre-built sample stream through the same
//! block-pool transport the cpal backend uses, and a scripted emitter
//! records the bursts it was asked to play. Synthetic pulse/echo signals
//! give tests a known ground-truth distance.

use std::sync::{Arc, Mutex};

use crate::audio::{SampleBlock, SessionChannels};
use crate::capture::{Capturer, CaptureStream, Emitter, Pulse};
use crate::error::{DeviceKind, SonarError};

/// Burst length used by the synthetic signal builder, seconds
const SYNTH_BURST_S: f32 = 0.002;
/// Carrier frequency of synthetic bursts, Hz
const SYNTH_FREQUENCY_HZ: f32 = 12_000.0;

/// Build a signal holding an outgoing pulse and one echo.
///
/// The pulse burst starts at `pulse_at_s` with amplitude `pulse_amp`; the
/// echo is an identical burst `echo_delay_s` later at `echo_amp`. Both are
/// short sine bursts at the pipeline's pulse frequency, so the expected
/// measured distance is `echo_delay_s * speed_of_sound / 2`.
pub fn pulse_echo_signal(
    sample_rate: u32,
    len: usize,
    pulse_at_s: f32,
    echo_delay_s: f32,
    pulse_amp: f32,
    echo_amp: f32,
) -> Vec<f32> {
    let mut signal = vec![0.0_f32; len];
    write_burst(&mut signal, sample_rate, pulse_at_s, pulse_amp);
    write_burst(&mut signal, sample_rate, pulse_at_s + echo_delay_s, echo_amp);
    signal
}

fn write_burst(signal: &mut [f32], sample_rate: u32, at_s: f32, amplitude: f32) {
    let start = (at_s * sample_rate as f32) as usize;
    let burst_len = (sample_rate as f32 * SYNTH_BURST_S) as usize;
    for i in 0..burst_len {
        let Some(slot) = signal.get_mut(start + i) else {
            break;
        };
        let phase = SYNTH_FREQUENCY_HZ * i as f32 / sample_rate as f32;
        *slot = amplitude * (2.0 * std::f32::consts::PI * phase).sin();
    }
}

/// Capturer that replays a fixed sample stream once per open
///
/// The stream is chunked into blocks and preloaded into the data queue, so
/// the session drains it exactly as it would a live device. Reopening
/// replays the same script from the start.
pub struct ScriptedCapturer {
    sample_rate: u32,
    block_size: usize,
    script: Vec<f32>,
    // Held so recycled blocks have somewhere to go while the stream lives.
    recycle_rx: Option<rtrb::Consumer<SampleBlock>>,
}

impl ScriptedCapturer {
    pub fn new(sample_rate: u32, block_size: usize, script: Vec<f32>) -> Self {
        Self {
            sample_rate,
            block_size,
            script,
            recycle_rx: None,
        }
    }

    /// A script of plain silence
    pub fn silence(sample_rate: u32, len: usize) -> Self {
        Self::new(sample_rate, 512, vec![0.0; len])
    }
}

impl Capturer for ScriptedCapturer {
    fn open(&mut self) -> Result<CaptureStream, SonarError> {
        let block_count = (self.script.len() / self.block_size + 2).max(4);
        let (mut data_producer, data_consumer) = rtrb::RingBuffer::new(block_count);
        let (recycle_producer, recycle_consumer) = rtrb::RingBuffer::new(block_count);

        for chunk in self.script.chunks(self.block_size) {
            data_producer
                .push(chunk.to_vec())
                .expect("scripted data queue sized for the whole script");
        }

        self.recycle_rx = Some(recycle_consumer);
        Ok(CaptureStream {
            sample_rate: self.sample_rate,
            channels: SessionChannels {
                data_consumer,
                recycle_producer,
            },
        })
    }

    fn close(&mut self) {
        self.recycle_rx = None;
    }
}

/// Capturer whose device is never available; for start-failure paths
pub struct UnavailableCapturer;

impl Capturer for UnavailableCapturer {
    fn open(&mut self) -> Result<CaptureStream, SonarError> {
        Err(SonarError::DeviceUnavailable {
            kind: DeviceKind::Input,
        })
    }

    fn close(&mut self) {}
}

/// Emitter that records every burst instead of playing it
pub struct ScriptedEmitter {
    log: Arc<Mutex<Vec<(f32, f32)>>>,
}

impl ScriptedEmitter {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Shared log of `(frequency_hz, duration_ms)` pairs, one per emit
    pub fn emitted(&self) -> Arc<Mutex<Vec<(f32, f32)>>> {
        Arc::clone(&self.log)
    }
}

impl Default for ScriptedEmitter {
    fn default() -> Self {
        Self::new()
    }
}

struct ScriptedPulse {
    log: Arc<Mutex<Vec<(f32, f32)>>>,
}

impl Pulse for ScriptedPulse {
    fn emit(&self, frequency_hz: f32, duration_ms: f32) {
        if let Ok(mut log) = self.log.lock() {
            log.push((frequency_hz, duration_ms));
        }
    }
}

impl Emitter for ScriptedEmitter {
    fn open(&mut self) -> Result<Box<dyn Pulse>, SonarError> {
        Ok(Box::new(ScriptedPulse {
            log: Arc::clone(&self.log),
        }))
    }

    fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_has_two_bursts() {
        let signal = pulse_echo_signal(48_000, 8192, 0.005, 0.02, 1.0, 0.6);
        let pulse_start = (0.005 * 48_000.0) as usize;
        let echo_start = ((0.005 + 0.02) * 48_000.0) as usize;

        let peak_near = |start: usize| {
            signal[start..start + 96]
                .iter()
                .fold(0.0_f32, |m, &x| m.max(x.abs()))
        };
        assert!((peak_near(pulse_start) - 1.0).abs() < 1e-3);
        assert!((peak_near(echo_start) - 0.6).abs() < 1e-3);
        assert!(signal[..pulse_start].iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_burst_past_end_is_clipped() {
        let signal = pulse_echo_signal(48_000, 100, 0.001, 0.5, 1.0, 0.6);
        assert_eq!(signal.len(), 100);
    }

    #[test]
    fn test_scripted_capturer_replays_script() {
        let mut capturer = ScriptedCapturer::new(48_000, 4, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        let mut stream = capturer.open().unwrap();
        assert_eq!(stream.sample_rate, 48_000);

        let first = stream.channels.data_consumer.pop().unwrap();
        assert_eq!(first, vec![1.0, 2.0, 3.0, 4.0]);
        let second = stream.channels.data_consumer.pop().unwrap();
        assert_eq!(second, vec![5.0]);
        assert!(stream.channels.data_consumer.pop().is_err());

        // Recycling while the stream lives must not fail.
        stream.channels.recycle_producer.push(first).unwrap();
        capturer.close();
    }

    #[test]
    fn test_scripted_capturer_reopens_from_start() {
        let mut capturer = ScriptedCapturer::new(48_000, 2, vec![1.0, 2.0]);
        let mut stream = capturer.open().unwrap();
        assert!(stream.channels.data_consumer.pop().is_ok());
        capturer.close();

        let mut stream = capturer.open().unwrap();
        assert_eq!(stream.channels.data_consumer.pop().unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_scripted_emitter_records_bursts() {
        let mut emitter = ScriptedEmitter::new();
        let log = emitter.emitted();
        let pulse = emitter.open().unwrap();
        pulse.emit(12_000.0, 2.0);
        pulse.emit(10_000.0, 1.0);
        let recorded = log.lock().unwrap();
        assert_eq!(recorded.as_slice(), &[(12_000.0, 2.0), (10_000.0, 1.0)]);
    }
}
