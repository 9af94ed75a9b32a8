// Timing-to-distance conversion
//
// Converts a pulse/echo time pair into a distance using the
// temperature-adjusted speed of sound, and derives the advisory
// measurement range a given configuration can resolve.

use crate::config::SonarConfig;
use crate::dsp::peaks::Peak;

/// Speed of sound in m/s for dry air near standard pressure.
///
/// Linear approximation, valid within a few degrees of room temperature.
pub fn speed_of_sound(temperature_c: f32) -> f32 {
    331.3 + 0.6 * temperature_c
}

/// Round-trip distance in meters between the sensor and the reflector.
///
/// The echo travels out and back, so the elapsed time covers twice the
/// distance.
pub fn distance(pulse: &Peak, echo: &Peak, temperature_c: f32) -> f32 {
    (echo.time - pulse.time) * speed_of_sound(temperature_c) / 2.0
}

/// Advisory bounds on the distances a configuration can resolve
///
/// Readings outside the bounds are reported as-is; the bounds exist so the
/// caller can judge how much to trust them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidRange {
    /// Shortest resolvable distance in meters
    pub min_m: f32,
    /// Longest observable distance in meters
    pub max_m: f32,
}

/// Compute the valid measurement range for a configuration at a device rate.
///
/// The minimum comes from the smallest peak separation the envelope can
/// still resolve: the pulse length itself plus the blur added by each
/// smoothing pass (one pre-decimation pass at the full kernel, two
/// post-decimation passes whose reduced kernel spans the same width in
/// input samples). The maximum is the one-way distance covered within the
/// capture window.
pub fn valid_range(config: &SonarConfig, sample_rate: u32) -> ValidRange {
    let c = speed_of_sound(config.temperature_c);

    let mini_kernel = config.smoothing_kernel / config.downsample_factor;
    let blur_samples =
        2 * config.smoothing_kernel + 2 * 2 * mini_kernel * config.downsample_factor;
    let min_separation_s =
        config.pulse_duration_ms / 1000.0 + blur_samples as f32 / sample_rate as f32;

    let window_s = config.window_duration(sample_rate);

    ValidRange {
        min_m: min_separation_s * c / 2.0,
        max_m: window_s * c / 2.0,
    }
}
