//! Sensor-noise simulation for reconstructed frames.

use crate::common::*;
use rand_distr::{Gamma, Normal};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseInjectorInit {
    /// Shape and scale of the multiplicative Gamma depth noise.
    pub gamma_shape: R64,
    pub gamma_scale: R64,
    /// Range of the coarse-grid rescale factor of the point-field noise.
    pub rescale_factor_range: (usize, usize),
    /// Range of the point-field noise scale in meters.
    pub gaussian_scale_range: (R64, R64),
}

impl Default for NoiseInjectorInit {
    fn default() -> Self {
        Self {
            gamma_shape: r64(1000.0),
            gamma_scale: r64(0.001),
            rescale_factor_range: (12, 20),
            gaussian_scale_range: (r64(0.0), r64(0.003)),
        }
    }
}

impl NoiseInjectorInit {
    pub fn build(self) -> Result<NoiseInjector> {
        let Self {
            gamma_shape,
            gamma_scale,
            rescale_factor_range: (factor_lo, factor_hi),
            gaussian_scale_range: (scale_lo, scale_hi),
        } = self;

        ensure!(
            gamma_shape > 0.0 && gamma_scale > 0.0,
            "gamma parameters must be positive"
        );
        ensure!(
            factor_lo >= 1 && factor_lo < factor_hi,
            "rescale factor range must be non-empty and at least 1, but get [{}, {})",
            factor_lo,
            factor_hi
        );
        ensure!(
            scale_lo >= 0.0 && scale_lo <= scale_hi,
            "gaussian scale range must be non-empty and non-negative"
        );

        let gamma = Gamma::new(gamma_shape.raw(), gamma_scale.raw())
            .map_err(|err| format_err!("invalid gamma parameters: {}", err))?;

        Ok(NoiseInjector {
            gamma,
            rescale_factor_range: (factor_lo, factor_hi),
            gaussian_scale_range: (scale_lo.raw(), scale_hi.raw()),
        })
    }
}

/// Simulates depth-sensor imperfection on reconstructed frames.
///
/// Callers that disable augmentation must skip these calls entirely; the
/// reconstruction is then bit-exact deterministic.
#[derive(Debug, Clone)]
pub struct NoiseInjector {
    gamma: Gamma<f64>,
    rescale_factor_range: (usize, usize),
    gaussian_scale_range: (f64, f64),
}

impl NoiseInjector {
    /// Multiply the whole depth frame by one Gamma sample.
    pub fn depth_noise<R>(&self, depth: &Tensor, rng: &mut R) -> Tensor
    where
        R: Rng,
    {
        let multiplier = self.gamma.sample(rng);
        depth * multiplier
    }

    /// Add smoothed Gaussian noise to the point field at pixels with
    /// positive depth.
    ///
    /// The noise is drawn on a coarse grid and upsampled bicubically, so
    /// neighboring points shift coherently.
    pub fn point_noise<R>(&self, xyz: &Tensor, depth: &Tensor, rng: &mut R) -> Result<Tensor>
    where
        R: Rng,
    {
        let (height, width, channels) = xyz.size3()?;
        ensure!(
            channels == 3,
            "expect 3-channel point field, but get {} channels",
            channels
        );

        let (factor_lo, factor_hi) = self.rescale_factor_range;
        let factor = rng.gen_range(factor_lo..factor_hi) as i64;
        let (scale_lo, scale_hi) = self.gaussian_scale_range;
        let scale = if scale_lo < scale_hi {
            rng.gen_range(scale_lo..scale_hi)
        } else {
            scale_lo
        };

        let grid_height = height / factor;
        let grid_width = width / factor;
        ensure!(
            grid_height > 0 && grid_width > 0,
            "frame size ({}, {}) is too small for rescale factor {}",
            height,
            width,
            factor
        );

        let normal = Normal::new(0.0, scale)
            .map_err(|err| format_err!("invalid gaussian scale {}: {}", scale, err))?;
        let samples: Vec<f32> = normal
            .sample_iter(&mut *rng)
            .take((grid_height * grid_width * 3) as usize)
            .map(|value| value as f32)
            .collect();

        tch::no_grad(|| {
            let noise = Tensor::of_slice(&samples)
                .view([grid_height, grid_width, 3])
                .permute(&[2, 0, 1])
                .unsqueeze(0)
                .upsample_bicubic2d(&[height, width], false, None, None)
                .view([3, height, width])
                .permute(&[1, 2, 0]);

            let gate = depth.gt(0.0).to_kind(Kind::Float).unsqueeze(-1);
            Ok(xyz + noise * gate)
        })
    }
}
