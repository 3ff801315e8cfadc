//! The pinhole camera model used to back-project recorded depth frames.

use crate::common::*;

/// Pinhole camera intrinsics in pixel units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub height: usize,
    pub width: usize,
    pub fx: R64,
    pub fy: R64,
    pub cx: R64,
    pub cy: R64,
}

impl CameraIntrinsics {
    pub fn new(height: usize, width: usize, fx: f64, fy: f64, cx: f64, cy: f64) -> Result<Self> {
        ensure!(height > 0 && width > 0, "image size must be positive");
        ensure!(fx > 0.0 && fy > 0.0, "focal lengths must be positive");

        Ok(Self {
            height,
            width,
            fx: r64(fx),
            fy: r64(fy),
            cx: r64(cx),
            cy: r64(cy),
        })
    }

    /// Back-project a depth frame to a per-pixel 3D point field in the
    /// camera frame.
    ///
    /// `depth` has shape `[height, width]` in meters; the output has shape
    /// `[height, width, 3]`.
    pub fn compute_xyz(&self, depth: &Tensor) -> Result<Tensor> {
        let (h, w) = depth.size2()?;
        ensure!(
            h == self.height as i64 && w == self.width as i64,
            "depth frame size ({}, {}) does not match camera size ({}, {})",
            h,
            w,
            self.height,
            self.width
        );

        tch::no_grad(|| {
            let depth = depth.to_kind(Kind::Float);
            let cols = Tensor::arange(w, FLOAT_CPU).view([1, w]).expand(&[h, w], false);
            let rows = Tensor::arange(h, FLOAT_CPU).view([h, 1]).expand(&[h, w], false);

            let xs = (cols - self.cx.raw()) * &depth / self.fx.raw();
            let ys = (rows - self.cy.raw()) * &depth / self.fy.raw();

            Ok(Tensor::stack(&[xs, ys, depth], 2))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn back_projection_follows_pinhole_model() -> Result<()> {
        let camera = CameraIntrinsics::new(2, 3, 2.0, 4.0, 1.0, 1.0)?;
        let depth = Tensor::of_slice(&[1.0f32, 1.0, 1.0, 2.0, 2.0, 2.0]).view([2, 3]);

        let xyz = camera.compute_xyz(&depth)?;
        assert_eq!(xyz.size(), &[2, 3, 3]);

        // pixel (row 1, col 2) at depth 2: x = (2 - 1) * 2 / 2, y = (1 - 1) * 2 / 4
        let point = Vec::<f32>::from(&xyz.i((1, 2, ..)));
        assert_eq!(point, vec![1.0, 0.0, 2.0]);

        Ok(())
    }

    #[test]
    fn mismatched_depth_size_is_rejected() {
        let camera = CameraIntrinsics::new(4, 4, 1.0, 1.0, 2.0, 2.0).unwrap();
        let depth = Tensor::zeros(&[2, 2], FLOAT_CPU);
        assert!(camera.compute_xyz(&depth).is_err());
    }
}
