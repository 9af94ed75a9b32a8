// DSP pipeline - raw capture window to echo reading
//
// Pipeline: rectify -> smooth(kernel) -> downsample(factor) -> two reduced
// smoothing passes. The post-decimation passes run at kernel / factor to
// compensate for the resolution lost in downsampling, matching the tuning
// the constants were chosen with.

pub mod envelope;
pub mod peaks;
pub mod ranging;

use crate::config::SonarConfig;

pub use peaks::{detect_echo, EchoReading, Peak};
pub use ranging::{distance, speed_of_sound, valid_range, ValidRange};

/// Smoothed, downsampled volume envelope of one capture window
///
/// Holds the time mapping alongside the samples: envelope index `i`
/// corresponds to `i * samples_per_step / sample_rate` seconds into the
/// window.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Non-negative envelope samples, one per downsampled step
    pub samples: Vec<f32>,
    /// Input samples represented by one envelope step
    pub samples_per_step: usize,
    /// Device sample rate in Hz
    pub sample_rate: u32,
}

impl Envelope {
    /// Time in seconds of envelope index `index` within the window
    pub fn time_at(&self, index: usize) -> f32 {
        (index * self.samples_per_step) as f32 / self.sample_rate as f32
    }

    /// Window duration covered by the envelope, in seconds
    pub fn duration(&self) -> f32 {
        self.time_at(self.samples.len())
    }
}

/// Condition a raw capture window into a volume envelope.
///
/// Applies the full pipeline as configured; the result is ready for
/// [`detect_echo`].
pub fn condition(raw: &[f32], config: &SonarConfig, sample_rate: u32) -> Envelope {
    let volume = envelope::rectify(raw, config.silence_floor);
    let smoothed = envelope::smooth(&volume, config.smoothing_kernel);
    let mut mini = if config.windowed_downsample {
        envelope::downsample_windowed(&smoothed, config.downsample_factor)
    } else {
        envelope::downsample(&smoothed, config.downsample_factor)
    };

    let mini_kernel = config.smoothing_kernel / config.downsample_factor;
    mini = envelope::smooth(&mini, mini_kernel);
    mini = envelope::smooth(&mini, mini_kernel);

    Envelope {
        samples: mini,
        samples_per_step: config.downsample_factor,
        sample_rate,
    }
}
