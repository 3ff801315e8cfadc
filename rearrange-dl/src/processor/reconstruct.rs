//! Scene-frame reconstruction from recorded arrays.

use crate::{
    common::*,
    dataset::{CameraView, EpisodeReader},
    processor::NoiseInjector,
};
use scene_goodies::transform_points;

/// Scale divisor of the recorded unsigned depth samples.
const DEPTH_SCALE: f64 = 20000.0;

/// A reconstructed scene frame.
#[derive(Debug, TensorLike)]
pub struct SceneFrame {
    /// `[height, width, 3]` colors in `[0, 1]`.
    pub rgb: Tensor,
    /// `[height, width]` depth in meters.
    pub depth: Tensor,
    /// `[height, width]` integer segmentation ids.
    pub seg: Tensor,
    /// `[height, width]` boolean mask of pixels within the depth range.
    pub valid: Tensor,
    /// `[height, width, 3]` points in world coordinates.
    pub xyz: Tensor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneReconstructorInit {
    /// Depth validity range in meters.
    pub depth_range: (R64, R64),
}

impl Default for SceneReconstructorInit {
    fn default() -> Self {
        Self {
            depth_range: (r64(0.1), r64(2.0)),
        }
    }
}

impl SceneReconstructorInit {
    pub fn build(self) -> Result<SceneReconstructor> {
        let (min_depth, max_depth) = self.depth_range;
        ensure!(
            min_depth >= 0.0 && min_depth < max_depth,
            "depth range must be non-negative and non-empty, but get ({}, {})",
            min_depth,
            max_depth
        );

        Ok(SceneReconstructor {
            min_depth: min_depth.raw(),
            max_depth: max_depth.raw(),
        })
    }
}

/// Decodes one recorded frame into world-frame geometry.
#[derive(Debug, Clone, CopyGetters)]
pub struct SceneReconstructor {
    #[getset(get_copy = "pub")]
    min_depth: f64,
    #[getset(get_copy = "pub")]
    max_depth: f64,
}

impl SceneReconstructor {
    /// Reconstruct one recorded frame.
    ///
    /// `augment` carries the noise injector and random source. `None`
    /// reproduces the stored frame exactly; the validity mask is always
    /// computed on the clean decoded depth.
    pub fn forward<R>(
        &self,
        episode: &dyn EpisodeReader,
        view: CameraView,
        step: usize,
        mut augment: Option<(&NoiseInjector, &mut R)>,
    ) -> Result<SceneFrame>
    where
        R: Rng,
    {
        tch::no_grad(|| {
            let rgba = episode
                .rgba(view, step)
                .with_context(|| format!("missing color frame {} of {:?}", step, view))?;
            let (height, width, channels) = rgba.size3()?;
            ensure!(
                channels == 4,
                "expect an RGBA frame, but get {} channels",
                channels
            );
            let rgb = rgba
                .i((.., .., 0..3))
                .to_kind(Kind::Float)
                .g_div_scalar(255.0);

            let (depth_min, depth_max) = episode
                .depth_bounds(view, step)
                .with_context(|| format!("missing depth bounds of frame {}", step))?;
            let raw_depth = episode
                .raw_depth(view, step)
                .with_context(|| format!("missing depth frame {} of {:?}", step, view))?;
            let mut depth =
                raw_depth.to_kind(Kind::Float) / DEPTH_SCALE * (depth_max - depth_min) + depth_min;

            let valid = depth
                .gt(self.min_depth)
                .logical_and(&depth.lt(self.max_depth));

            let seg = episode
                .segmentation(view, step)
                .with_context(|| format!("missing segmentation frame {} of {:?}", step, view))?
                .to_kind(Kind::Int64);

            if let Some((noise, rng)) = &mut augment {
                depth = noise.depth_noise(&depth, *rng);
            }

            let camera = episode.camera_intrinsics(view)?;
            let mut xyz = camera.compute_xyz(&depth)?;
            if let Some((noise, rng)) = &mut augment {
                xyz = noise.point_noise(&xyz, &depth, *rng)?;
            }

            let mut camera_pose = episode.camera_view_pose(view, step)?;
            if view == CameraView::EndEffector {
                // the stored end-effector view transform has a zeroed translation
                let ee_pose = episode.ee_camera_pose()?;
                camera_pose[(0, 3)] = ee_pose[(0, 3)];
                camera_pose[(1, 3)] = ee_pose[(1, 3)];
                camera_pose[(2, 3)] = ee_pose[(2, 3)];
            }
            let xyz = transform_points(&xyz.view([-1, 3]), &camera_pose)?
                .view([height, width, 3]);

            Ok(SceneFrame {
                rgb,
                depth,
                seg,
                valid,
                xyz,
            })
        })
    }
}
