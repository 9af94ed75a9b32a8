// Envelope conditioning - rectification, smoothing, downsampling
//
// Turns a raw microphone buffer into a low-resolution volume envelope the
// peak detector can scan. The carrier oscillation of the pulse tone is
// removed by full-wave rectification followed by a moving-average hull.

/// Full-wave rectification: per-sample absolute magnitude.
///
/// Samples whose magnitude falls below `silence_floor` are zeroed. A floor
/// of 0.0 keeps every sample, which is the right setting for signed float
/// input centered on zero; sources that encode a symmetric waveform around
/// a non-zero baseline can use the floor to drop the residual offset.
pub fn rectify(samples: &[f32], silence_floor: f32) -> Vec<f32> {
    samples
        .iter()
        .map(|&x| {
            let mag = x.abs();
            if mag >= silence_floor {
                mag
            } else {
                0.0
            }
        })
        .collect()
}

/// Moving-average smoothing with an integer half-width kernel.
///
/// Each output sample is the arithmetic mean of all defined input samples
/// in `[i - kernel, i + kernel]`; indices outside the buffer are skipped,
/// not zero-padded, so the edges are not dragged towards zero.
/// `kernel == 0` is the identity.
pub fn smooth(buffer: &[f32], kernel: usize) -> Vec<f32> {
    if kernel == 0 {
        return buffer.to_vec();
    }
    let len = buffer.len();
    let kernel = kernel as isize;
    (0..len as isize)
        .map(|i| {
            let mut sum = 0.0;
            let mut count = 0u32;
            for j in -kernel..=kernel {
                let idx = i + j;
                if idx >= 0 && (idx as usize) < len {
                    sum += buffer[idx as usize];
                    count += 1;
                }
            }
            if count > 0 {
                sum / count as f32
            } else {
                0.0
            }
        })
        .collect()
}

/// Plain decimation: keep every `n`th sample.
///
/// Output length is exactly `len / n` (floor). `n == 1` is the identity.
pub fn downsample(buffer: &[f32], n: usize) -> Vec<f32> {
    debug_assert!(n > 0, "downsample factor must be > 0");
    let out_len = buffer.len() / n;
    (0..out_len).map(|i| buffer[i * n]).collect()
}

/// Windowed decimation: each output sample is the mean of the input
/// neighborhood centered on `i * n`, with half-width `n / 2`.
///
/// Avoids the aliasing of plain decimation when the input has not already
/// been smoothed. Output length matches [`downsample`].
pub fn downsample_windowed(buffer: &[f32], n: usize) -> Vec<f32> {
    debug_assert!(n > 0, "downsample factor must be > 0");
    let out_len = buffer.len() / n;
    let half = (n / 2) as isize;
    let len = buffer.len() as isize;
    (0..out_len)
        .map(|i| {
            let center = (i * n) as isize;
            let mut sum = 0.0;
            let mut count = 0u32;
            for j in -half..=half {
                let idx = center + j;
                if idx >= 0 && idx < len {
                    sum += buffer[idx as usize];
                    count += 1;
                }
            }
            if count > 0 {
                sum / count as f32
            } else {
                0.0
            }
        })
        .collect()
}
