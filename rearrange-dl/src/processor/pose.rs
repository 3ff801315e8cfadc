//! Goal-pose computation for reconstructed object point clouds.

use crate::{common::*, dataset::StructureParameters, error::DataError};
use scene_goodies::{invert_pose, pose_matrix};

/// Solves the rigid target pose of a reconstructed point cloud, either in
/// the world frame or relative to the structure pose.
///
/// The composition `P_goal · P_cur⁻¹ · C` moves the noisy reconstructed
/// cloud center `C` by the recorded keyframe motion, so reconstruction
/// noise shifts the frame of the label but never the relative motion.
#[derive(Debug, Clone)]
pub struct GoalPoseSolver {
    structure_pose_inv: Option<Matrix4<f64>>,
}

impl GoalPoseSolver {
    /// Solver producing world-frame target poses.
    pub fn world_frame() -> Self {
        Self {
            structure_pose_inv: None,
        }
    }

    /// Solver producing target poses relative to the structure pose of
    /// `params`.
    pub fn structure_frame(params: &StructureParameters) -> Result<Self> {
        let pose = pose_matrix(params.position, params.rotation);
        Ok(Self {
            structure_pose_inv: Some(invert_pose(&pose)?),
        })
    }

    pub fn uses_structure_frame(&self) -> bool {
        self.structure_pose_inv.is_some()
    }

    /// Target pose of the cloud centered at `cloud_center`, given the
    /// recorded goal and current poses of `object`.
    pub fn solve(
        &self,
        goal_pose: &Matrix4<f64>,
        current_pose: &Matrix4<f64>,
        cloud_center: Vector3<f64>,
        object: &str,
    ) -> Result<Matrix4<f64>> {
        let current_inv = current_pose.try_inverse().ok_or_else(|| DataError::SingularPose {
            object: object.to_owned(),
        })?;
        let center_pose = Matrix4::new_translation(&cloud_center);

        let relative = goal_pose * current_inv * center_pose;
        Ok(match &self.structure_pose_inv {
            Some(structure_inv) => structure_inv * relative,
            None => relative,
        })
    }
}

/// Translation plus row-major flattened rotation block of a pose, the
/// 12-component layout used by every pose tensor.
pub fn pose_vector(pose: &Matrix4<f64>) -> [f64; 12] {
    [
        pose[(0, 3)],
        pose[(1, 3)],
        pose[(2, 3)],
        pose[(0, 0)],
        pose[(0, 1)],
        pose[(0, 2)],
        pose[(1, 0)],
        pose[(1, 1)],
        pose[(1, 2)],
        pose[(2, 0)],
        pose[(2, 1)],
        pose[(2, 2)],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::StructureKind;
    use approx::assert_abs_diff_eq;
    use scene_goodies::{pose_translation, transform_point};

    fn params() -> StructureParameters {
        StructureParameters {
            kind: StructureKind::Circle { radius: 0.3 },
            position: [0.4, -0.1, 0.05],
            rotation: [0.0, 0.2, 1.1],
        }
    }

    #[test]
    fn world_frame_composition_recovers_the_current_center() -> Result<()> {
        let goal_pose = pose_matrix([0.2, 0.1, 0.0], [0.0, 0.0, 0.8]);
        let current_pose = pose_matrix([0.6, -0.3, 0.1], [0.1, 0.0, -0.4]);
        let center = Vector3::new(0.58, -0.29, 0.13);

        let solver = GoalPoseSolver::world_frame();
        let target = solver.solve(&goal_pose, &current_pose, center, "object_00")?;

        // applying the inverse keyframe motion to the goal center must
        // recover the reconstructed current center
        let motion = goal_pose * invert_pose(&current_pose)?;
        let recovered = transform_point(&invert_pose(&motion)?, pose_translation(&target));
        assert_abs_diff_eq!(recovered, center, epsilon = 1e-9);

        Ok(())
    }

    #[test]
    fn structure_frame_composition_recovers_the_current_center() -> Result<()> {
        let goal_pose = pose_matrix([0.2, 0.1, 0.0], [0.0, 0.0, 0.8]);
        let current_pose = pose_matrix([0.6, -0.3, 0.1], [0.1, 0.0, -0.4]);
        let center = Vector3::new(0.61, -0.31, 0.09);

        let solver = GoalPoseSolver::structure_frame(&params())?;
        assert!(solver.uses_structure_frame());
        let target = solver.solve(&goal_pose, &current_pose, center, "object_00")?;

        let structure_pose = pose_matrix(params().position, params().rotation);
        let motion = invert_pose(&structure_pose)? * goal_pose * invert_pose(&current_pose)?;
        let recovered = transform_point(&invert_pose(&motion)?, pose_translation(&target));
        assert_abs_diff_eq!(recovered, center, epsilon = 1e-9);

        Ok(())
    }

    #[test]
    fn pose_vector_is_row_major() {
        let mut pose = Matrix4::identity();
        pose[(0, 1)] = 2.0;
        pose[(1, 0)] = 3.0;
        pose[(0, 3)] = 7.0;

        let vector = pose_vector(&pose);
        assert_eq!(
            vector,
            [7.0, 0.0, 0.0, 1.0, 2.0, 0.0, 3.0, 1.0, 0.0, 0.0, 0.0, 1.0]
        );
    }
}
