// Wavetape - pulse-echo acoustic ranging over consumer audio hardware
//
// Emits short sine bursts through the speaker, captures the microphone
// stream, detects the echo in a smoothed volume envelope, and converts the
// round-trip time to a distance via the speed of sound.

pub mod audio;
pub mod capture;
pub mod config;
pub mod dsp;
pub mod error;
pub mod session;
pub mod testing;

pub use capture::{Capturer, CpalCapturer, CpalEmitter, Emitter, Pulse};
pub use config::{CaptureMode, SonarConfig};
pub use dsp::{detect_echo, distance, speed_of_sound, EchoReading, Envelope, Peak, ValidRange};
pub use error::{DeviceKind, SonarError};
pub use session::{DebugFrame, Measurement, SessionState, SonarSession};
