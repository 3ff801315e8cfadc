//! Rigid-transform helpers shared by the reconstruction and pose code.

use crate::common::*;

/// Rotation matrix from static-frame Euler angles, rotating about x, then
/// y, then z.
pub fn euler_matrix(roll: f64, pitch: f64, yaw: f64) -> Matrix4<f64> {
    Rotation3::from_euler_angles(roll, pitch, yaw).to_homogeneous()
}

/// 4×4 pose from a position and static-xyz Euler angles.
pub fn pose_matrix(position: [f64; 3], rotation: [f64; 3]) -> Matrix4<f64> {
    let mut pose = euler_matrix(rotation[0], rotation[1], rotation[2]);
    pose[(0, 3)] = position[0];
    pose[(1, 3)] = position[1];
    pose[(2, 3)] = position[2];
    pose
}

/// Invert a pose matrix.
pub fn invert_pose(pose: &Matrix4<f64>) -> Result<Matrix4<f64>> {
    pose.try_inverse()
        .ok_or_else(|| format_err!("pose matrix is singular: {}", pose))
}

/// Translation component of a pose.
pub fn pose_translation(pose: &Matrix4<f64>) -> Vector3<f64> {
    Vector3::new(pose[(0, 3)], pose[(1, 3)], pose[(2, 3)])
}

/// Apply a pose to one point.
pub fn transform_point(pose: &Matrix4<f64>, point: Vector3<f64>) -> Vector3<f64> {
    (pose * point.push(1.0)).xyz()
}

/// Apply a pose to an `[n, 3]` float tensor of points.
pub fn transform_points(points: &Tensor, pose: &Matrix4<f64>) -> Result<Tensor> {
    let (_num, channels) = points.size2()?;
    ensure!(
        channels == 3,
        "expect 3-channel points, but get {} channels",
        channels
    );

    tch::no_grad(|| {
        let rotation = {
            let rows: Vec<f32> = (0..3)
                .flat_map(|row| (0..3).map(move |col| (row, col)))
                .map(|(row, col)| pose[(row, col)] as f32)
                .collect();
            Tensor::of_slice(&rows).view([3, 3])
        };
        let translation = Tensor::of_slice(&[
            pose[(0, 3)] as f32,
            pose[(1, 3)] as f32,
            pose[(2, 3)] as f32,
        ]);

        Ok(points.matmul(&rotation.transpose(0, 1)) + translation)
    })
}
