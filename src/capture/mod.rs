// Device seam - abstract emitter and capturer
//
// The session never touches audio hardware directly. It drives a Pulse
// handle to fire tone bursts and drains a CaptureStream of sample blocks;
// where those come from (cpal devices, scripted fixtures) is decided by
// the Emitter/Capturer implementations the session was built with.

pub mod cpal_io;
pub mod strategy;

use crate::audio::SessionChannels;
use crate::error::SonarError;

pub use cpal_io::{CpalCapturer, CpalEmitter};
pub use strategy::{CaptureStrategy, ContinuousPhase};

/// Thread-safe handle for firing tone bursts
///
/// Fire-and-forget: the burst is scheduled on the output device and plays
/// asynchronously, no completion is reported.
pub trait Pulse: Send {
    /// Play a single sine burst of the given frequency and length
    fn emit(&self, frequency_hz: f32, duration_ms: f32);
}

/// Speaker-side resource
///
/// `open` acquires the output device and returns a [`Pulse`] handle that
/// can be moved to the measurement thread; the emitter itself stays with
/// its stream on the opening thread.
pub trait Emitter {
    fn open(&mut self) -> Result<Box<dyn Pulse>, SonarError>;

    /// Release the output device; safe to call when not open
    fn close(&mut self);
}

/// An open microphone stream delivering sample blocks
///
/// Blocks arrive on the data queue as the device produces them; the
/// consumer returns drained blocks through the recycle queue. The stream
/// is continuous, unbounded, and cannot be restarted once closed.
pub struct CaptureStream {
    /// Effective device sample rate in Hz
    pub sample_rate: u32,
    /// Session-side ends of the block pool
    pub channels: SessionChannels,
}

/// Microphone-side resource
pub trait Capturer {
    /// Acquire the input device and start block delivery
    fn open(&mut self) -> Result<CaptureStream, SonarError>;

    /// Release the input device and stop delivery; safe when not open
    fn close(&mut self);
}
