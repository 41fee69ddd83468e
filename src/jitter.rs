//! Random cyclic shifts applied around each gradient step
//!
//! Rolling the image by a fresh random offset before the gradient pass and
//! rolling the gradient back afterwards keeps gradient ascent from locking onto
//! a fixed pixel grid, which otherwise shows up as tiling artifacts.

use candle_core::Tensor;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::Result;

/// Default maximum shift as a fraction of each spatial dimension
pub const DEFAULT_JITTER_FRACTION: f64 = 0.05;

/// Cyclic shift of `tensor` by `shift` positions along `dim`.
///
/// Positive shifts move elements towards higher indices; elements pushed past
/// the end wrap around to the front.
pub fn roll(tensor: &Tensor, shift: i64, dim: usize) -> Result<Tensor> {
    let size = tensor.dim(dim)?;
    if size == 0 {
        return Ok(tensor.clone());
    }
    let shift = shift.rem_euclid(size as i64) as usize;
    if shift == 0 {
        return Ok(tensor.clone());
    }
    let head = tensor.narrow(dim, size - shift, shift)?;
    let tail = tensor.narrow(dim, 0, size - shift)?;
    Ok(Tensor::cat(&[&head, &tail], dim)?)
}

/// Offsets for one iteration, applied to the last two (height, width) dims
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitterOffsets {
    pub dy: i64,
    pub dx: i64,
}

impl JitterOffsets {
    pub fn new(dy: i64, dx: i64) -> Self {
        Self { dy, dx }
    }

    /// Shift an image (or gradient) by the offsets
    pub fn apply(&self, tensor: &Tensor) -> Result<Tensor> {
        let rank = tensor.rank();
        let rolled = roll(tensor, self.dx, rank - 1)?;
        roll(&rolled, self.dy, rank - 2)
    }

    /// Exact inverse of [`Self::apply`]
    pub fn undo(&self, tensor: &Tensor) -> Result<Tensor> {
        Self::new(-self.dy, -self.dx).apply(tensor)
    }
}

/// Seedable sampler of per-iteration offsets.
///
/// Each offset is drawn uniformly from `[-m, m]` where `m` is
/// `ceil(fraction * dim)`, independently for height and width.
#[derive(Debug, Clone)]
pub struct Jitter {
    rng: StdRng,
    fraction: f64,
}

impl Jitter {
    /// Deterministic sampler
    pub fn seeded(seed: u64, fraction: f64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            fraction,
        }
    }

    /// Sampler seeded from OS entropy
    pub fn from_entropy(fraction: f64) -> Self {
        Self {
            rng: StdRng::from_entropy(),
            fraction,
        }
    }

    pub fn fraction(&self) -> f64 {
        self.fraction
    }

    /// Largest shift magnitude for a dimension of `size` pixels
    pub fn max_shift(&self, size: usize) -> i64 {
        if size == 0 || self.fraction <= 0.0 {
            return 0;
        }
        let m = (self.fraction * size as f64).ceil() as i64;
        m.min(size as i64 - 1).max(0)
    }

    /// Draw fresh offsets for an image of `height` x `width`
    pub fn sample(&mut self, height: usize, width: usize) -> JitterOffsets {
        let my = self.max_shift(height);
        let mx = self.max_shift(width);
        JitterOffsets {
            dy: self.rng.gen_range(-my..=my),
            dx: self.rng.gen_range(-mx..=mx),
        }
    }
}

impl Default for Jitter {
    fn default() -> Self {
        Self::from_entropy(DEFAULT_JITTER_FRACTION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    fn ramp(shape: (usize, usize, usize)) -> Tensor {
        let n = shape.0 * shape.1 * shape.2;
        Tensor::arange(0f32, n as f32, &Device::Cpu)
            .unwrap()
            .reshape(shape)
            .unwrap()
    }

    #[test]
    fn test_roll_wraps() {
        let t = Tensor::new(&[0f32, 1., 2., 3., 4.], &Device::Cpu).unwrap();
        let r: Vec<f32> = roll(&t, 2, 0).unwrap().to_vec1().unwrap();
        assert_eq!(r, vec![3., 4., 0., 1., 2.]);

        let r: Vec<f32> = roll(&t, -1, 0).unwrap().to_vec1().unwrap();
        assert_eq!(r, vec![1., 2., 3., 4., 0.]);

        // Full cycles are the identity
        let r: Vec<f32> = roll(&t, 10, 0).unwrap().to_vec1().unwrap();
        assert_eq!(r, vec![0., 1., 2., 3., 4.]);
    }

    #[test]
    fn test_shift_then_undo_is_identity() {
        let t = ramp((3, 7, 5));
        let original: Vec<f32> = t.flatten_all().unwrap().to_vec1().unwrap();

        for (dy, dx) in [(0, 0), (1, 2), (-3, 4), (13, -22), (7, 5)] {
            let offsets = JitterOffsets::new(dy, dx);
            let shifted = offsets.apply(&t).unwrap();
            assert_eq!(shifted.dims(), t.dims());
            let back: Vec<f32> = offsets
                .undo(&shifted)
                .unwrap()
                .flatten_all()
                .unwrap()
                .to_vec1()
                .unwrap();
            assert_eq!(back, original, "offsets ({dy}, {dx})");
        }
    }

    #[test]
    fn test_apply_moves_spatial_axes_only() {
        let t = ramp((2, 3, 4));
        let shifted = JitterOffsets::new(1, 1).apply(&t).unwrap();
        let v = shifted.to_vec3::<f32>().unwrap();
        let orig = t.to_vec3::<f32>().unwrap();
        // Pixel (0, 0) now holds what was at (h-1, w-1), per channel
        assert_eq!(v[0][0][0], orig[0][2][3]);
        assert_eq!(v[1][0][0], orig[1][2][3]);
    }

    #[test]
    fn test_seeded_sampling_is_deterministic() {
        let mut a = Jitter::seeded(7, 0.1);
        let mut b = Jitter::seeded(7, 0.1);
        for _ in 0..20 {
            assert_eq!(a.sample(224, 224), b.sample(224, 224));
        }
    }

    #[test]
    fn test_offsets_within_bounds() {
        let mut jitter = Jitter::seeded(1, 0.05);
        assert_eq!(jitter.max_shift(224), 12);
        let mx = jitter.max_shift(100);
        for _ in 0..200 {
            let o = jitter.sample(224, 100);
            assert!(o.dy.abs() <= 12);
            assert!(o.dx.abs() <= mx);
        }
    }

    #[test]
    fn test_zero_fraction_disables_jitter() {
        let mut jitter = Jitter::seeded(3, 0.0);
        assert_eq!(jitter.sample(64, 64), JitterOffsets::new(0, 0));

        let t = Tensor::ones((1, 1, 1), DType::F32, &Device::Cpu).unwrap();
        let mut tiny = Jitter::seeded(3, 0.5);
        let o = tiny.sample(1, 1);
        assert_eq!(o, JitterOffsets::new(0, 0));
        assert_eq!(o.apply(&t).unwrap().dims(), &[1, 1, 1]);
    }
}
