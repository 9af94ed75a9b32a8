// Peak extraction and echo discrimination
//
// Scans the conditioned envelope for strict local maxima, drops the noise
// floor, and separates the outgoing pulse from its strongest echo. Echo
// choice is amplitude-driven rather than time-first: with several
// reflections the dominant one wins, on the assumption that the nearest
// reflector is also the loudest. Ties are broken by scan order, first
// maximum found wins, so the choice is deterministic.

use crate::dsp::Envelope;

/// Peaks with amplitude at or below this fraction of the strongest peak
/// are treated as noise.
pub const NOISE_FLOOR_RATIO: f32 = 0.2;

/// A local maximum in the envelope
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    /// Index into the envelope
    pub index: usize,
    /// Time in seconds under the envelope's index-to-time mapping
    pub time: f32,
    /// Envelope amplitude at the peak
    pub amplitude: f32,
}

/// A pulse/echo pair extracted from one capture window
#[derive(Debug, Clone, PartialEq)]
pub struct EchoReading {
    /// The outgoing pulse, earliest significant peak
    pub pulse: Peak,
    /// The strongest significant peak after the pulse
    pub echo: Peak,
    /// All significant peaks other than the pulse, echo included
    pub peaks: Vec<Peak>,
}

/// Find the pulse and its echo in a conditioned envelope.
///
/// Returns `None` when the window holds no usable echo: fewer than two
/// peaks, or nothing left after the noise-floor cutoff. That is the normal
/// outcome of a quiet cycle, not an error.
pub fn detect_echo(envelope: &Envelope) -> Option<EchoReading> {
    let samples = &envelope.samples;
    if samples.len() < 3 {
        return None;
    }

    // Strict interior local maxima; plateaus do not count.
    let mut peaks = Vec::new();
    for i in 1..samples.len() - 1 {
        if samples[i - 1] < samples[i] && samples[i + 1] < samples[i] {
            peaks.push(Peak {
                index: i,
                time: envelope.time_at(i),
                amplitude: samples[i],
            });
        }
    }
    if peaks.len() < 2 {
        return None;
    }

    let max = peaks
        .iter()
        .map(|p| p.amplitude)
        .fold(f32::MIN, f32::max);
    let cutoff = max * NOISE_FLOOR_RATIO;
    peaks.retain(|p| p.amplitude > cutoff);

    // The earliest surviving peak is the outgoing pulse itself.
    if peaks.is_empty() {
        return None;
    }
    let pulse = peaks.remove(0);

    // Strongest remaining peak is the echo; strict > keeps the first of
    // equal-amplitude candidates.
    let echo = peaks.iter().copied().reduce(|best, p| {
        if p.amplitude > best.amplitude {
            p
        } else {
            best
        }
    })?;

    Some(EchoReading {
        pulse,
        echo,
        peaks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope_of(samples: Vec<f32>) -> Envelope {
        Envelope {
            samples,
            samples_per_step: 1,
            sample_rate: 1000,
        }
    }

    #[test]
    fn test_detects_pulse_and_echo() {
        let env = envelope_of(vec![0.0, 1.0, 0.0, 0.0, 0.6, 0.0]);
        let reading = detect_echo(&env).expect("should find an echo");
        assert_eq!(reading.pulse.index, 1);
        assert_eq!(reading.echo.index, 4);
        assert!(reading.echo.time > reading.pulse.time);
    }

    #[test]
    fn test_single_peak_yields_none() {
        let env = envelope_of(vec![0.0, 1.0, 0.0]);
        assert!(detect_echo(&env).is_none());
    }

    #[test]
    fn test_empty_and_tiny_envelopes_yield_none() {
        assert!(detect_echo(&envelope_of(vec![])).is_none());
        assert!(detect_echo(&envelope_of(vec![1.0, 2.0])).is_none());
    }

    #[test]
    fn test_noise_floor_cutoff_drops_weak_peaks() {
        // Second peak sits at 0.15 of max, below the 0.2 cutoff; with only
        // the pulse surviving there is no echo.
        let env = envelope_of(vec![0.0, 1.0, 0.0, 0.15, 0.0]);
        assert!(detect_echo(&env).is_none());
    }

    #[test]
    fn test_peak_at_exact_cutoff_is_dropped() {
        let env = envelope_of(vec![0.0, 1.0, 0.0, 0.2, 0.0]);
        assert!(detect_echo(&env).is_none());
    }

    #[test]
    fn test_echo_is_strongest_not_earliest() {
        // Two echoes pass the cutoff; the later, stronger one wins.
        let env = envelope_of(vec![0.0, 1.0, 0.0, 0.3, 0.0, 0.8, 0.0]);
        let reading = detect_echo(&env).unwrap();
        assert_eq!(reading.echo.index, 5);
        assert_eq!(reading.peaks.len(), 2);
    }

    #[test]
    fn test_equal_amplitude_tie_breaks_to_first() {
        let env = envelope_of(vec![0.0, 1.0, 0.0, 0.5, 0.0, 0.5, 0.0]);
        let reading = detect_echo(&env).unwrap();
        assert_eq!(reading.echo.index, 3);
    }

    #[test]
    fn test_echo_never_selects_globally_first_peak() {
        // Echo amplitude equals the maximum among peaks excluding the
        // first, even when the first peak dominates everything.
        let env = envelope_of(vec![0.0, 1.0, 0.0, 0.4, 0.0, 0.35, 0.0]);
        let reading = detect_echo(&env).unwrap();
        assert_ne!(reading.echo.index, reading.pulse.index);
        let max_excluding_pulse = reading
            .peaks
            .iter()
            .map(|p| p.amplitude)
            .fold(f32::MIN, f32::max);
        assert_eq!(reading.echo.amplitude, max_excluding_pulse);
    }

    #[test]
    fn test_plateau_is_not_a_peak() {
        let env = envelope_of(vec![0.0, 1.0, 1.0, 0.0, 0.5, 0.0]);
        // The plateau at indices 1-2 produces no strict maximum, leaving
        // only one peak.
        assert!(detect_echo(&env).is_none());
    }

    #[test]
    fn test_peak_times_follow_envelope_mapping() {
        let env = Envelope {
            samples: vec![0.0, 1.0, 0.0, 0.0, 0.6, 0.0],
            samples_per_step: 8,
            sample_rate: 48_000,
        };
        let reading = detect_echo(&env).unwrap();
        assert!((reading.pulse.time - 8.0 / 48_000.0).abs() < 1e-9);
        assert!((reading.echo.time - 32.0 / 48_000.0).abs() < 1e-9);
    }
}
