//! Band-pass biquad for the onset detection path
//!
//! Constant 0 dB peak gain band-pass (RBJ cookbook), run as a Direct Form II
//! transposed biquad. Each frame is filtered from rest, so overlapping
//! analysis windows never share filter state.

use std::f32::consts::PI;

/// Normalized biquad coefficients
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandPass {
    b0: f32,
    b2: f32,
    a1: f32,
    a2: f32,
}

impl BandPass {
    /// Band-pass centred on `center_hz` with quality `q`.
    ///
    /// Returns `None` if the centre is not below Nyquist or any argument is
    /// not positive.
    pub fn new(center_hz: f32, q: f32, sample_rate: u32) -> Option<Self> {
        let rate = sample_rate as f32;
        if !(center_hz > 0.0) || !(q > 0.0) || sample_rate == 0 || center_hz >= rate / 2.0 {
            return None;
        }

        let omega = 2.0 * PI * center_hz / rate;
        let alpha = omega.sin() / (2.0 * q);
        let a0 = 1.0 + alpha;

        // b1 is zero for this response
        Some(Self {
            b0: alpha / a0,
            b2: -alpha / a0,
            a1: -2.0 * omega.cos() / a0,
            a2: (1.0 - alpha) / a0,
        })
    }

    /// Filter `input` into `output`, replacing its contents
    pub fn process(&self, input: &[f32], output: &mut Vec<f32>) {
        output.clear();
        let (mut z1, mut z2) = (0.0f32, 0.0f32);
        for &x in input {
            let x = if x.is_finite() { x } else { 0.0 };
            let y = self.b0 * x + z1;
            z1 = -self.a1 * y + z2;
            z2 = self.b2 * x - self.a2 * y;
            output.push(y);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f32 / rate as f32).sin())
            .collect()
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn test_passes_centre_frequency() {
        let filter = BandPass::new(100.0, 1.0, 48000).unwrap();
        let input = sine(100.0, 48000, 48000);
        let mut output = Vec::new();
        filter.process(&input, &mut output);

        // Skip the start-up transient
        let ratio = rms(&output[4800..]) / rms(&input[4800..]);
        assert!((ratio - 1.0).abs() < 0.05, "gain at centre {}", ratio);
    }

    #[test]
    fn test_rejects_high_frequencies() {
        let filter = BandPass::new(100.0, 1.0, 48000).unwrap();
        let input = sine(5000.0, 48000, 4800);
        let mut output = Vec::new();
        filter.process(&input, &mut output);
        assert!(rms(&output) < 0.05 * rms(&input));
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(BandPass::new(100.0, 1.0, 0).is_none());
        assert!(BandPass::new(0.0, 1.0, 48000).is_none());
        assert!(BandPass::new(100.0, 0.0, 48000).is_none());
        assert!(BandPass::new(30000.0, 1.0, 48000).is_none());
    }
}
