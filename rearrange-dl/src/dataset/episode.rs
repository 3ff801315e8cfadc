//! Access to persisted per-episode recordings.

use crate::common::*;
use scene_goodies::CameraIntrinsics;

/// The recorded camera a frame was captured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraView {
    /// The static scene camera.
    External,
    /// The wrist-mounted camera.
    EndEffector,
}

/// One open episode recording exposing its named arrays.
///
/// A reader is a scoped handle to the underlying storage. Dropping it
/// releases the resource, which happens on every exit path of one example
/// construction, including early failures.
pub trait EpisodeReader {
    /// Provenance string recorded on assembled examples.
    fn source(&self) -> &str;

    /// Number of recorded keyframes.
    fn num_keyframes(&self) -> usize;

    /// Raw `[height, width, 4]` RGBA frame with values in `0..=255`.
    fn rgba(&self, view: CameraView, step: usize) -> Result<Tensor>;

    /// Raw `[height, width]` unsigned depth samples, scaled against the
    /// per-frame depth bounds.
    fn raw_depth(&self, view: CameraView, step: usize) -> Result<Tensor>;

    /// Per-frame `(min, max)` depth bounds in meters.
    fn depth_bounds(&self, view: CameraView, step: usize) -> Result<(f64, f64)>;

    /// `[height, width]` integer segmentation ids.
    fn segmentation(&self, view: CameraView, step: usize) -> Result<Tensor>;

    /// Stored camera-to-world transform of a frame. The end-effector view
    /// stores a zeroed translation; see [`EpisodeReader::ee_camera_pose`].
    fn camera_view_pose(&self, view: CameraView, step: usize) -> Result<Matrix4<f64>>;

    /// The separately recorded end-effector camera pose whose translation
    /// patches the zeroed end-effector view transform.
    fn ee_camera_pose(&self) -> Result<Matrix4<f64>>;

    fn camera_intrinsics(&self, view: CameraView) -> Result<CameraIntrinsics>;

    /// Object name to segmentation id, in recorded order.
    fn object_ids(&self) -> Result<IndexMap<String, i64>>;

    /// Recorded 4×4 pose of one object at a keyframe.
    fn object_pose(&self, name: &str, keyframe: usize) -> Result<Matrix4<f64>>;

    /// The JSON-encoded goal specification.
    fn goal_specification(&self) -> Result<String>;
}

impl<T> EpisodeReader for &T
where
    T: EpisodeReader + ?Sized,
{
    fn source(&self) -> &str {
        (**self).source()
    }

    fn num_keyframes(&self) -> usize {
        (**self).num_keyframes()
    }

    fn rgba(&self, view: CameraView, step: usize) -> Result<Tensor> {
        (**self).rgba(view, step)
    }

    fn raw_depth(&self, view: CameraView, step: usize) -> Result<Tensor> {
        (**self).raw_depth(view, step)
    }

    fn depth_bounds(&self, view: CameraView, step: usize) -> Result<(f64, f64)> {
        (**self).depth_bounds(view, step)
    }

    fn segmentation(&self, view: CameraView, step: usize) -> Result<Tensor> {
        (**self).segmentation(view, step)
    }

    fn camera_view_pose(&self, view: CameraView, step: usize) -> Result<Matrix4<f64>> {
        (**self).camera_view_pose(view, step)
    }

    fn ee_camera_pose(&self) -> Result<Matrix4<f64>> {
        (**self).ee_camera_pose()
    }

    fn camera_intrinsics(&self, view: CameraView) -> Result<CameraIntrinsics> {
        (**self).camera_intrinsics(view)
    }

    fn object_ids(&self) -> Result<IndexMap<String, i64>> {
        (**self).object_ids()
    }

    fn object_pose(&self, name: &str, keyframe: usize) -> Result<Matrix4<f64>> {
        (**self).object_pose(name, keyframe)
    }

    fn goal_specification(&self) -> Result<String> {
        (**self).goal_specification()
    }
}

/// A collection of episode recordings.
pub trait EpisodeStore {
    /// Open one episode for reading. The returned handle owns the
    /// underlying resource for the duration of one example construction.
    fn open(&self, name: &str) -> Result<Box<dyn EpisodeReader + '_>>;
}

/// One recorded frame of one camera view.
#[derive(Debug)]
pub struct MemoryFrame {
    pub rgba: Tensor,
    pub raw_depth: Tensor,
    pub depth_bounds: (f64, f64),
    pub segmentation: Tensor,
    pub camera_pose: Matrix4<f64>,
}

/// An episode recording held in memory.
///
/// Serves tests and callers that already hold decoded arrays; file-backed
/// stores implement [`EpisodeReader`] over their own storage instead.
#[derive(Debug)]
pub struct MemoryEpisode {
    pub source: String,
    pub frames: HashMap<CameraView, Vec<MemoryFrame>>,
    pub intrinsics: HashMap<CameraView, CameraIntrinsics>,
    pub ee_camera_pose: Matrix4<f64>,
    pub object_ids: IndexMap<String, i64>,
    pub object_poses: HashMap<String, Vec<Matrix4<f64>>>,
    pub goal_specification: String,
}

impl MemoryEpisode {
    fn frame(&self, view: CameraView, step: usize) -> Result<&MemoryFrame> {
        self.frames
            .get(&view)
            .and_then(|frames| frames.get(step))
            .ok_or_else(|| {
                format_err!(
                    "episode {:?} has no frame {} for view {:?}",
                    self.source,
                    step,
                    view
                )
            })
    }
}

impl EpisodeReader for MemoryEpisode {
    fn source(&self) -> &str {
        &self.source
    }

    fn num_keyframes(&self) -> usize {
        self.frames.values().map(|frames| frames.len()).min().unwrap_or(0)
    }

    fn rgba(&self, view: CameraView, step: usize) -> Result<Tensor> {
        Ok(self.frame(view, step)?.rgba.shallow_clone())
    }

    fn raw_depth(&self, view: CameraView, step: usize) -> Result<Tensor> {
        Ok(self.frame(view, step)?.raw_depth.shallow_clone())
    }

    fn depth_bounds(&self, view: CameraView, step: usize) -> Result<(f64, f64)> {
        Ok(self.frame(view, step)?.depth_bounds)
    }

    fn segmentation(&self, view: CameraView, step: usize) -> Result<Tensor> {
        Ok(self.frame(view, step)?.segmentation.shallow_clone())
    }

    fn camera_view_pose(&self, view: CameraView, step: usize) -> Result<Matrix4<f64>> {
        Ok(self.frame(view, step)?.camera_pose)
    }

    fn ee_camera_pose(&self) -> Result<Matrix4<f64>> {
        Ok(self.ee_camera_pose)
    }

    fn camera_intrinsics(&self, view: CameraView) -> Result<CameraIntrinsics> {
        self.intrinsics
            .get(&view)
            .cloned()
            .ok_or_else(|| format_err!("episode {:?} has no camera {:?}", self.source, view))
    }

    fn object_ids(&self) -> Result<IndexMap<String, i64>> {
        Ok(self.object_ids.clone())
    }

    fn object_pose(&self, name: &str, keyframe: usize) -> Result<Matrix4<f64>> {
        self.object_poses
            .get(name)
            .and_then(|poses| poses.get(keyframe))
            .copied()
            .ok_or_else(|| {
                format_err!(
                    "episode {:?} has no pose of object {:?} at keyframe {}",
                    self.source,
                    name,
                    keyframe
                )
            })
    }

    fn goal_specification(&self) -> Result<String> {
        Ok(self.goal_specification.clone())
    }
}

/// An in-memory episode collection.
#[derive(Debug, Default)]
pub struct MemoryStore {
    episodes: HashMap<String, MemoryEpisode>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, episode: MemoryEpisode) {
        self.episodes.insert(episode.source.clone(), episode);
    }
}

impl EpisodeStore for MemoryStore {
    fn open(&self, name: &str) -> Result<Box<dyn EpisodeReader + '_>> {
        let episode = self
            .episodes
            .get(name)
            .ok_or_else(|| format_err!("unknown episode {:?}", name))?;
        Ok(Box::new(episode))
    }
}
