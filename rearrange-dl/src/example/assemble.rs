//! Example assembly from one recorded episode.

use crate::{
    common::*,
    dataset::{CameraView, EpisodeReader, GoalSpecification},
    example::{
        record::{Example, InferenceData, StructureFrameData},
        sentence::{build_sentence, SENTENCE_LEN},
    },
    processor::{
        pose_vector, sample_object_points, GoalPoseSolver, NoiseInjector, NoiseInjectorInit,
        SceneFrame, SceneReconstructor, SceneReconstructorInit,
    },
};
use scene_goodies::pose_matrix;

/// Label value on padded pose outputs, excluded by the loss.
pub const IGNORE_LABEL: f64 = -100.0;

/// Token type ids of the three sequence zones, plus the structure token.
const TYPE_SENTENCE: i64 = 0;
const TYPE_OTHER_OBJECT: i64 = 1;
const TYPE_TARGET_OBJECT: i64 = 2;
const TYPE_STRUCTURE: i64 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExampleAssemblerInit {
    /// Capacity of the target-object slots.
    pub max_num_objects: usize,
    /// Capacity of the anchor/distractor slots.
    pub max_num_other_objects: usize,
    /// Token slots reserved for the structure description.
    pub max_num_shape_parameters: usize,
    /// Points per object cloud.
    pub num_pts: NonZeroUsize,
    /// Express target poses in the structure frame instead of the world
    /// frame.
    pub use_structure_frame: bool,
    /// Permute the real target slots of every assembled example.
    pub shuffle_object_index: bool,
    /// Simulate sensor noise on reconstructed frames.
    pub data_augmentation: bool,
    pub reconstructor: SceneReconstructorInit,
    pub noise: NoiseInjectorInit,
}

impl Default for ExampleAssemblerInit {
    fn default() -> Self {
        Self {
            max_num_objects: 7,
            max_num_other_objects: 5,
            max_num_shape_parameters: SENTENCE_LEN,
            num_pts: NonZeroUsize::new(1024).unwrap(),
            use_structure_frame: false,
            shuffle_object_index: false,
            data_augmentation: true,
            reconstructor: SceneReconstructorInit::default(),
            noise: NoiseInjectorInit::default(),
        }
    }
}

impl ExampleAssemblerInit {
    pub fn build(self) -> Result<ExampleAssembler> {
        let Self {
            max_num_objects,
            max_num_other_objects,
            max_num_shape_parameters,
            num_pts,
            use_structure_frame,
            shuffle_object_index,
            data_augmentation,
            reconstructor,
            noise,
        } = self;

        ensure!(max_num_objects > 0, "max_num_objects must be positive");
        ensure!(
            max_num_shape_parameters == SENTENCE_LEN,
            "the structure description always occupies {} token slots, but get {}",
            SENTENCE_LEN,
            max_num_shape_parameters
        );

        Ok(ExampleAssembler {
            max_num_objects,
            max_num_other_objects,
            num_pts: num_pts.get(),
            use_structure_frame,
            shuffle_object_index,
            data_augmentation,
            reconstructor: reconstructor.build()?,
            noise: noise.build()?,
        })
    }
}

/// Per-call overrides of [`ExampleAssembler::assemble`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AssembleOptions {
    /// Also reconstruct the goal keyframe and carry recorded poses for
    /// evaluation tooling.
    pub inference_mode: bool,
    /// Overrides the configured target-slot shuffling.
    pub shuffle_object_index: Option<bool>,
}

/// Builds training examples from recorded episodes.
#[derive(Debug, Clone, CopyGetters)]
pub struct ExampleAssembler {
    #[getset(get_copy = "pub")]
    max_num_objects: usize,
    #[getset(get_copy = "pub")]
    max_num_other_objects: usize,
    #[getset(get_copy = "pub")]
    num_pts: usize,
    #[getset(get_copy = "pub")]
    use_structure_frame: bool,
    #[getset(get_copy = "pub")]
    shuffle_object_index: bool,
    #[getset(get_copy = "pub")]
    data_augmentation: bool,
    reconstructor: SceneReconstructor,
    noise: NoiseInjector,
}

impl ExampleAssembler {
    /// Assemble one training example with the configured options.
    pub fn assemble<R>(&self, episode: &dyn EpisodeReader, rng: &mut R) -> Result<Example>
    where
        R: Rng,
    {
        self.assemble_with(episode, AssembleOptions::default(), rng)
    }

    /// Assemble one example with per-call overrides.
    pub fn assemble_with<R>(
        &self,
        episode: &dyn EpisodeReader,
        options: AssembleOptions,
        rng: &mut R,
    ) -> Result<Example>
    where
        R: Rng,
    {
        let goal = GoalSpecification::from_json(&episode.goal_specification()?)?;
        let object_ids = episode.object_ids()?;

        let (target_objects, other_objects) = self.partition_objects(&goal, &object_ids)?;
        let num_targets = target_objects.len();
        // the current scene is recorded after all targets were moved
        let step = num_targets;
        ensure!(
            step < episode.num_keyframes(),
            "episode {:?} records {} keyframes but the current scene is keyframe {}",
            episode.source(),
            episode.num_keyframes(),
            step
        );

        debug!(
            "assembling example from {:?} at keyframe {} ({} targets, {} others)",
            episode.source(),
            step,
            num_targets,
            other_objects.len()
        );

        let scene = self.reconstruct_frame(episode, step, rng)?;

        // per-object clouds, targets first
        let mut xyzs = Vec::with_capacity(self.max_num_objects);
        let mut rgbs = Vec::with_capacity(self.max_num_objects);
        let mut object_pad_mask = Vec::with_capacity(self.max_num_objects);
        let mut cloud_centers = Vec::with_capacity(num_targets);
        for name in &target_objects {
            let (cloud_xyz, cloud_rgb) = self.segment_object(&scene, &object_ids, name, rng)?;
            cloud_centers.push(tensor_center(&cloud_xyz));
            xyzs.push(cloud_xyz);
            rgbs.push(cloud_rgb);
            object_pad_mask.push(0);
        }

        let mut other_xyzs = Vec::with_capacity(self.max_num_other_objects);
        let mut other_rgbs = Vec::with_capacity(self.max_num_other_objects);
        let mut other_object_pad_mask = Vec::with_capacity(self.max_num_other_objects);
        for name in &other_objects {
            let (cloud_xyz, cloud_rgb) = self.segment_object(&scene, &object_ids, name, rng)?;
            other_xyzs.push(cloud_xyz);
            other_rgbs.push(cloud_rgb);
            other_object_pad_mask.push(0);
        }

        // goal poses of the reconstructed cloud centers
        let solver = if self.use_structure_frame {
            GoalPoseSolver::structure_frame(&goal.shape)?
        } else {
            GoalPoseSolver::world_frame()
        };

        let mut obj_xyztheta_inputs = Vec::with_capacity(self.max_num_objects);
        let mut obj_xyztheta_outputs = Vec::with_capacity(self.max_num_objects);
        let mut goal_obj_poses = Vec::with_capacity(self.max_num_objects);
        let mut current_obj_poses = Vec::with_capacity(self.max_num_objects);
        for (name, center) in izip!(&target_objects, &cloud_centers) {
            let goal_pose = episode.object_pose(name, 0)?;
            let current_pose = episode.object_pose(name, step)?;
            let target_pose = solver.solve(&goal_pose, &current_pose, *center, name)?;

            let vector = pose_vector(&target_pose);
            obj_xyztheta_outputs.push(vector);
            obj_xyztheta_inputs.push(vector);

            if options.inference_mode {
                goal_obj_poses.push(Some(goal_pose));
                current_obj_poses.push(Some(current_pose));
            }
        }

        let mut inference = if options.inference_mode {
            Some(self.reconstruct_goal_scene(
                episode,
                &scene,
                &target_objects,
                &other_objects,
                &object_ids,
                rng,
            )?)
        } else {
            None
        };

        // pad target and other slots up to capacity
        for _ in num_targets..self.max_num_objects {
            xyzs.push(Tensor::zeros(&[self.num_pts as i64, 3], FLOAT_CPU));
            rgbs.push(Tensor::zeros(&[self.num_pts as i64, 3], FLOAT_CPU));
            object_pad_mask.push(1);
            obj_xyztheta_outputs.push([IGNORE_LABEL; 12]);
            obj_xyztheta_inputs.push([0.0; 12]);
            if options.inference_mode {
                goal_obj_poses.push(None);
                current_obj_poses.push(None);
            }
        }
        for _ in other_objects.len()..self.max_num_other_objects {
            other_xyzs.push(Tensor::zeros(&[self.num_pts as i64, 3], FLOAT_CPU));
            other_rgbs.push(Tensor::zeros(&[self.num_pts as i64, 3], FLOAT_CPU));
            other_object_pad_mask.push(1);
        }

        let (sentence, sentence_pad_mask) = build_sentence(&goal.shape);

        let token_type_index: Vec<i64> = iter::repeat(TYPE_SENTENCE)
            .take(SENTENCE_LEN)
            .chain(iter::repeat(TYPE_OTHER_OBJECT).take(self.max_num_other_objects))
            .chain(iter::repeat(TYPE_TARGET_OBJECT).take(self.max_num_objects))
            .collect();
        let position_index: Vec<i64> = (0..SENTENCE_LEN as i64)
            .chain(0..self.max_num_other_objects as i64)
            .chain(0..self.max_num_objects as i64)
            .collect();

        let structure = self.use_structure_frame.then(|| StructureFrameData {
            xyztheta: pose_vector(&pose_matrix(goal.shape.position, goal.shape.rotation)),
            position_index: vec![0],
            token_type_index: vec![TYPE_STRUCTURE],
            pad_mask: vec![0],
        });

        let mut target_names: Vec<String> = target_objects;
        if options
            .shuffle_object_index
            .unwrap_or(self.shuffle_object_index)
        {
            // permute the real slots only; the padded tail stays in place
            let mut order: Vec<usize> = (0..num_targets).collect();
            order.shuffle(rng);
            order.extend(num_targets..self.max_num_objects);

            xyzs = reorder(xyzs, &order);
            rgbs = reorder(rgbs, &order);
            object_pad_mask = reorder(object_pad_mask, &order);
            obj_xyztheta_outputs = reorder(obj_xyztheta_outputs, &order);
            obj_xyztheta_inputs = reorder(obj_xyztheta_inputs, &order);
            target_names = reorder(target_names, &order[..num_targets]);
            if options.inference_mode {
                goal_obj_poses = reorder(goal_obj_poses, &order);
                current_obj_poses = reorder(current_obj_poses, &order);
            }
        }

        if let Some(inference) = &mut inference {
            inference.goal_obj_poses = goal_obj_poses;
            inference.current_obj_poses = current_obj_poses;
            inference.target_objects = target_names;
        }

        Ok(Example {
            xyzs,
            rgbs,
            object_pad_mask,
            other_xyzs,
            other_rgbs,
            other_object_pad_mask,
            sentence,
            sentence_pad_mask,
            token_type_index,
            position_index,
            obj_xyztheta_inputs,
            obj_xyztheta_outputs,
            structure,
            inference,
            step,
            source: episode.source().to_owned(),
        })
    }

    /// Split the recorded object names into ordered target and other
    /// lists, checking the goal-specification accounting.
    fn partition_objects(
        &self,
        goal: &GoalSpecification,
        object_ids: &IndexMap<String, i64>,
    ) -> Result<(Vec<String>, Vec<String>)> {
        let all_objects: Vec<&String> = object_ids
            .keys()
            .filter(|name| name.contains("object_"))
            .sorted()
            .collect();

        let num_targets = goal.num_rearrange_objects();
        let num_others = goal.num_other_objects();
        ensure!(
            all_objects.len() == num_targets + num_others,
            "episode has {} objects but the goal specification accounts for {} (rearrange {} + other {})",
            all_objects.len(),
            num_targets + num_others,
            num_targets,
            num_others
        );
        ensure!(
            num_targets <= self.max_num_objects,
            "{} rearrange objects exceed the capacity of {}",
            num_targets,
            self.max_num_objects
        );
        ensure!(
            num_others <= self.max_num_other_objects,
            "{} anchor/distractor objects exceed the capacity of {}",
            num_others,
            self.max_num_other_objects
        );

        let mut target_objects: Vec<String> =
            all_objects[..num_targets].iter().map(|&name| name.clone()).collect();
        let other_objects: Vec<String> =
            all_objects[num_targets..].iter().map(|&name| name.clone()).collect();

        if goal.shape.kind.reverses_object_order() {
            target_objects.reverse();
        }

        Ok((target_objects, other_objects))
    }

    fn reconstruct_frame<R>(
        &self,
        episode: &dyn EpisodeReader,
        step: usize,
        rng: &mut R,
    ) -> Result<SceneFrame>
    where
        R: Rng,
    {
        if self.data_augmentation {
            self.reconstructor
                .forward(episode, CameraView::EndEffector, step, Some((&self.noise, rng)))
        } else {
            self.reconstructor
                .forward::<R>(episode, CameraView::EndEffector, step, None)
        }
    }

    fn segment_object<R>(
        &self,
        scene: &SceneFrame,
        object_ids: &IndexMap<String, i64>,
        name: &str,
        rng: &mut R,
    ) -> Result<(Tensor, Tensor)>
    where
        R: Rng,
    {
        let id = *object_ids
            .get(name)
            .ok_or_else(|| format_err!("object {:?} is missing from the id map", name))?;
        let mask = scene.seg.eq(id).logical_and(&scene.valid);
        sample_object_points(&scene.xyz, &scene.rgb, &mask, self.num_pts, name, rng)
    }

    /// Reconstruct the goal-keyframe scene and segment the target clouds
    /// out of it (inference mode only). Pose lists are filled in by the
    /// caller after shuffling.
    fn reconstruct_goal_scene<R>(
        &self,
        episode: &dyn EpisodeReader,
        current_scene: &SceneFrame,
        target_objects: &[String],
        other_objects: &[String],
        object_ids: &IndexMap<String, i64>,
        rng: &mut R,
    ) -> Result<InferenceData>
    where
        R: Rng,
    {
        let goal_scene = self.reconstruct_frame(episode, 0, rng)?;

        let mut goal_obj_xyzs = Vec::with_capacity(target_objects.len());
        let mut goal_obj_rgbs = Vec::with_capacity(target_objects.len());
        for name in target_objects.iter().chain(other_objects) {
            let (cloud_xyz, cloud_rgb) =
                self.segment_object(&goal_scene, object_ids, name, rng)?;
            if target_objects.iter().any(|target| target == name) {
                goal_obj_xyzs.push(cloud_xyz);
                goal_obj_rgbs.push(cloud_rgb);
            }
        }

        Ok(InferenceData {
            rgb: current_scene.rgb.shallow_clone(),
            goal_rgb: goal_scene.rgb,
            goal_xyz: goal_scene.xyz,
            goal_obj_xyzs,
            goal_obj_rgbs,
            goal_obj_poses: Vec::new(),
            current_obj_poses: Vec::new(),
            target_objects: Vec::new(),
        })
    }
}

/// Cloud center as a pure translation.
fn tensor_center(cloud: &Tensor) -> Vector3<f64> {
    let center: Vec<f32> = Vec::from(&cloud.mean_dim(&[0], false, Kind::Float));
    Vector3::new(center[0] as f64, center[1] as f64, center[2] as f64)
}

/// Rebuild a list in the given slot order.
fn reorder<T>(values: Vec<T>, order: &[usize]) -> Vec<T> {
    let mut slots: Vec<Option<T>> = values.into_iter().map(Some).collect();
    order
        .iter()
        .map(|&index| slots[index].take().expect("duplicate index in slot order"))
        .collect()
}
