// Error types for the sonar pipeline
//
// Structured error variants covering device acquisition and configuration
// validation. A cycle that finds no echo is not an error and never surfaces
// here; it is a normal empty outcome of the detector.

use std::fmt;

/// Sonar-related errors
///
/// These cover the two failure families the session can surface: audio
/// devices that cannot be acquired, and configurations rejected before
/// anything is initialized.
#[derive(Debug, Clone, PartialEq)]
pub enum SonarError {
    /// No suitable audio device was found
    DeviceUnavailable { kind: DeviceKind },

    /// A device exists but its stream could not be opened
    StreamOpenFailed { reason: String },

    /// The device failed after the stream was opened
    HardwareError { details: String },

    /// Configuration rejected by validation before start
    ConfigInvalid { reason: String },
}

/// Which half of the duplex pair a device error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// Speaker side (pulse emitter)
    Output,
    /// Microphone side (echo capturer)
    Input,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Output => write!(f, "output"),
            DeviceKind::Input => write!(f, "input"),
        }
    }
}

impl fmt::Display for SonarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SonarError::DeviceUnavailable { kind } => {
                write!(f, "No default {} audio device available", kind)
            }
            SonarError::StreamOpenFailed { reason } => {
                write!(f, "Failed to open audio stream: {}", reason)
            }
            SonarError::HardwareError { details } => {
                write!(f, "Hardware error: {}", details)
            }
            SonarError::ConfigInvalid { reason } => {
                write!(f, "Invalid configuration: {}", reason)
            }
        }
    }
}

impl std::error::Error for SonarError {}

impl From<std::io::Error> for SonarError {
    fn from(err: std::io::Error) -> Self {
        SonarError::HardwareError {
            details: err.to_string(),
        }
    }
}
