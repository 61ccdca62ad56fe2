//! Per-frame loudness estimation.

/// Root-mean-square amplitude of one frame of samples.
///
/// Stateless and side-effect free. Returns `0.0` for an empty or all-zero
/// frame; the result is always finite and non-negative.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    (sum_sq / samples.len() as f64).sqrt() as f32
}
