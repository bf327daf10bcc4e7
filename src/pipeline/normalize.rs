//! Pixel normalization and randomized brightness perturbation.

use rand::{Rng, SeedableRng};

use crate::error::DatasetResult;
use crate::pipeline::augment::PixelSample;

/// Center pixels from [0, 1] to [-0.5, 0.5].
pub fn center_normalize(sample: &mut PixelSample) {
    for v in sample.pixels.iter_mut() {
        *v -= 0.5;
    }
}

/// Add a uniform brightness shift and clamp back into the centered range.
pub fn brightness_shift(sample: &mut PixelSample, shift: f32) {
    for v in sample.pixels.iter_mut() {
        *v = (*v + shift).clamp(-0.5, 0.5);
    }
}

/// Iterator adapter chaining centering with a per-sample random brightness
/// shift drawn from [min_shift, max_shift]. Training and validation use
/// different ranges; training sees the wider perturbation.
pub struct NormalizeBrightness<I> {
    upstream: I,
    min_shift: f32,
    max_shift: f32,
    rng: rand::rngs::StdRng,
}

impl<I> NormalizeBrightness<I> {
    pub fn new(upstream: I, min_shift: f32, max_shift: f32, seed: Option<u64>) -> Self {
        debug_assert!(min_shift <= max_shift);
        let rng = match seed {
            Some(seed) => rand::rngs::StdRng::seed_from_u64(seed),
            None => rand::rngs::StdRng::from_rng(&mut rand::rng()),
        };
        NormalizeBrightness {
            upstream,
            min_shift,
            max_shift,
            rng,
        }
    }
}

impl<I: Iterator<Item = DatasetResult<PixelSample>>> Iterator for NormalizeBrightness<I> {
    type Item = DatasetResult<PixelSample>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut sample = match self.upstream.next()? {
            Ok(sample) => sample,
            Err(e) => return Some(Err(e)),
        };
        center_normalize(&mut sample);
        let shift = if self.max_shift > self.min_shift {
            self.rng.random_range(self.min_shift..self.max_shift)
        } else {
            self.min_shift
        };
        brightness_shift(&mut sample, shift);
        Some(Ok(sample))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_with(pixels: Vec<f32>) -> PixelSample {
        PixelSample {
            pixels,
            width: 1,
            height: 1,
            steering: 0.0,
        }
    }

    #[test]
    fn centering_maps_unit_range_to_half_range() {
        let mut s = sample_with(vec![0.0, 0.5, 1.0]);
        center_normalize(&mut s);
        assert!((s.pixels[0] + 0.5).abs() < 1e-6);
        assert!(s.pixels[1].abs() < 1e-6);
        assert!((s.pixels[2] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn extreme_shifts_stay_clamped() {
        for shift in [-0.18f32, 0.18, -1.0, 1.0] {
            let mut s = sample_with(vec![-0.5, 0.0, 0.5]);
            brightness_shift(&mut s, shift);
            for v in &s.pixels {
                assert!((-0.5..=0.5).contains(v), "pixel {v} escaped after shift {shift}");
            }
        }
    }

    #[test]
    fn adapter_keeps_values_in_range() {
        let raw = sample_with(vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        let stream = NormalizeBrightness::new(
            std::iter::once(Ok(raw)),
            -0.18,
            0.18,
            Some(9),
        );
        let out = stream.map(|r| r.unwrap()).next().unwrap();
        for v in &out.pixels {
            assert!((-0.5..=0.5).contains(v));
        }
    }
}
