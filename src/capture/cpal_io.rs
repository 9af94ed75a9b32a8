// cpal-backed emitter and capturer
//
// Input side: the device callback pops a pre-allocated block from the
// pool, fills it with the first channel of captured samples, and pushes it
// towards the session thread. No allocation or locking happens in the
// callback.
//
// Output side: a burst generator driven by two atomics. `emit` stores the
// frequency and the number of samples to play; the output callback
// synthesizes the sine while the countdown lasts and silence otherwise.
// The stream objects themselves are not Send and stay on the thread that
// opened them; only the Pulse handle crosses into the measurement thread.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::audio::{block_pool, DEFAULT_BLOCK_COUNT, DEFAULT_BLOCK_SIZE};
use crate::capture::{Capturer, CaptureStream, Emitter, Pulse};
use crate::error::{DeviceKind, SonarError};

/// Peak amplitude of the emitted burst, leaving headroom against clipping
const BURST_AMPLITUDE: f32 = 0.8;

/// Microphone capturer over the default cpal input device
pub struct CpalCapturer {
    stream: Option<cpal::Stream>,
    block_count: usize,
    block_size: usize,
}

impl CpalCapturer {
    pub fn new() -> Self {
        Self::with_pool(DEFAULT_BLOCK_COUNT, DEFAULT_BLOCK_SIZE)
    }

    /// Override the block pool geometry
    pub fn with_pool(block_count: usize, block_size: usize) -> Self {
        Self {
            stream: None,
            block_count,
            block_size,
        }
    }
}

impl Default for CpalCapturer {
    fn default() -> Self {
        Self::new()
    }
}

impl Capturer for CpalCapturer {
    fn open(&mut self) -> Result<CaptureStream, SonarError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(SonarError::DeviceUnavailable {
                kind: DeviceKind::Input,
            })?;

        let config = device
            .default_input_config()
            .map_err(|e| SonarError::StreamOpenFailed {
                reason: format!("Failed to get default input config: {:?}", e),
            })?;

        let stream_config: cpal::StreamConfig = config.clone().into();
        let sample_rate = stream_config.sample_rate.0;
        let channel_count = stream_config.channels as usize;

        let (mut callback, session) = block_pool(self.block_count, self.block_size);

        let err_fn = |err| log::error!("Input stream error: {}", err);

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut block) = callback.recycle_consumer.pop() {
                        block.clear();
                        if channel_count == 1 {
                            block.extend_from_slice(data);
                        } else {
                            // De-interleave: take the first channel
                            for frame in data.chunks(channel_count) {
                                block.push(frame.first().copied().unwrap_or(0.0));
                            }
                        }
                        let _ = callback.data_producer.push(block);
                    }
                },
                err_fn,
                None,
            ),
            other => {
                return Err(SonarError::StreamOpenFailed {
                    reason: format!("Unsupported input sample format {:?}, need F32", other),
                })
            }
        }
        .map_err(|e| SonarError::StreamOpenFailed {
            reason: format!("{:?}", e),
        })?;

        stream.play().map_err(|e| SonarError::HardwareError {
            details: format!("Input start failed: {}", e),
        })?;

        log::info!(
            "[Capture] Input stream open: {} Hz, {} channel(s)",
            sample_rate,
            channel_count
        );

        self.stream = Some(stream);
        Ok(CaptureStream {
            sample_rate,
            channels: session,
        })
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            log::info!("[Capture] Input stream closed");
        }
    }
}

/// Shared burst generator state, written by Pulse::emit and read by the
/// output callback
struct BurstState {
    frequency_bits: AtomicU32,
    samples_remaining: AtomicU32,
}

/// Send handle that schedules bursts on the open output stream
pub struct CpalPulse {
    state: Arc<BurstState>,
    sample_rate: u32,
}

impl Pulse for CpalPulse {
    fn emit(&self, frequency_hz: f32, duration_ms: f32) {
        let samples = (self.sample_rate as f32 * duration_ms / 1000.0) as u32;
        self.state
            .frequency_bits
            .store(frequency_hz.to_bits(), Ordering::Relaxed);
        self.state
            .samples_remaining
            .store(samples.max(1), Ordering::Relaxed);
    }
}

/// Tone emitter over the default cpal output device
pub struct CpalEmitter {
    stream: Option<cpal::Stream>,
}

impl CpalEmitter {
    pub fn new() -> Self {
        Self { stream: None }
    }
}

impl Default for CpalEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl Emitter for CpalEmitter {
    fn open(&mut self) -> Result<Box<dyn Pulse>, SonarError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(SonarError::DeviceUnavailable {
                kind: DeviceKind::Output,
            })?;

        let config = device
            .default_output_config()
            .map_err(|e| SonarError::StreamOpenFailed {
                reason: format!("Failed to get default output config: {:?}", e),
            })?;

        let stream_config: cpal::StreamConfig = config.clone().into();
        let sample_rate = stream_config.sample_rate.0;
        let channel_count = stream_config.channels as usize;

        let state = Arc::new(BurstState {
            frequency_bits: AtomicU32::new(0),
            samples_remaining: AtomicU32::new(0),
        });
        let callback_state = Arc::clone(&state);
        let mut phase: f32 = 0.0;

        let err_fn = |err| log::error!("Output stream error: {}", err);

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => device.build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut remaining =
                        callback_state.samples_remaining.load(Ordering::Relaxed);
                    let frequency =
                        f32::from_bits(callback_state.frequency_bits.load(Ordering::Relaxed));
                    let frame_count = data.len() / channel_count;
                    let before = remaining;

                    for i in 0..frame_count {
                        let sample = if remaining > 0 {
                            remaining -= 1;
                            let v = (2.0 * std::f32::consts::PI * phase).sin() * BURST_AMPLITUDE;
                            phase += frequency / sample_rate as f32;
                            if phase >= 1.0 {
                                phase -= 1.0;
                            }
                            v
                        } else {
                            phase = 0.0;
                            0.0
                        };
                        for ch in 0..channel_count {
                            data[i * channel_count + ch] = sample;
                        }
                    }

                    let consumed = before - remaining;
                    if consumed > 0 {
                        let _ = callback_state.samples_remaining.fetch_update(
                            Ordering::Relaxed,
                            Ordering::Relaxed,
                            |r| Some(r.saturating_sub(consumed)),
                        );
                    }
                },
                err_fn,
                None,
            ),
            other => {
                return Err(SonarError::StreamOpenFailed {
                    reason: format!("Unsupported output sample format {:?}, need F32", other),
                })
            }
        }
        .map_err(|e| SonarError::StreamOpenFailed {
            reason: format!("{:?}", e),
        })?;

        stream.play().map_err(|e| SonarError::HardwareError {
            details: format!("Output start failed: {}", e),
        })?;

        log::info!("[Emit] Output stream open: {} Hz", sample_rate);

        self.stream = Some(stream);
        Ok(Box::new(CpalPulse { state, sample_rate }))
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            log::info!("[Emit] Output stream closed");
        }
    }
}
