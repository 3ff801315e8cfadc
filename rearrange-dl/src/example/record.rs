//! Assembled example records.

use crate::{
    common::*,
    example::sentence::{SentenceWord, Tokenizer},
};

/// Structure-frame fields attached when target poses are expressed
/// relative to the structure pose.
#[derive(Debug, Clone, PartialEq)]
pub struct StructureFrameData {
    /// Structure position plus row-major flattened rotation.
    pub xyztheta: [f64; 12],
    pub position_index: Vec<i64>,
    pub token_type_index: Vec<i64>,
    pub pad_mask: Vec<i64>,
}

/// Extra fields produced in inference mode for evaluation tooling.
#[derive(Debug)]
pub struct InferenceData {
    /// Colors of the current scene.
    pub rgb: Tensor,
    /// Colors and point field of the goal-keyframe scene.
    pub goal_rgb: Tensor,
    pub goal_xyz: Tensor,
    /// Per-target clouds segmented out of the goal-keyframe scene.
    pub goal_obj_xyzs: Vec<Tensor>,
    pub goal_obj_rgbs: Vec<Tensor>,
    /// Recorded goal and current poses, `None` on padded slots.
    pub goal_obj_poses: Vec<Option<Matrix4<f64>>>,
    pub current_obj_poses: Vec<Option<Matrix4<f64>>>,
    /// Target object names in sequence order.
    pub target_objects: Vec<String>,
}

/// One assembled training example before tokenization.
///
/// Per-object lists are padded to the configured capacities; pad masks
/// use 0 for real entries and 1 for padding.
#[derive(Debug)]
pub struct Example {
    /// Target-object clouds, each `[num_pts, 3]`.
    pub xyzs: Vec<Tensor>,
    pub rgbs: Vec<Tensor>,
    pub object_pad_mask: Vec<i64>,
    /// Anchor and distractor clouds.
    pub other_xyzs: Vec<Tensor>,
    pub other_rgbs: Vec<Tensor>,
    pub other_object_pad_mask: Vec<i64>,
    pub sentence: Vec<SentenceWord>,
    pub sentence_pad_mask: Vec<i64>,
    pub token_type_index: Vec<i64>,
    pub position_index: Vec<i64>,
    /// Target pose vectors fed to the model; padded slots hold zeros.
    pub obj_xyztheta_inputs: Vec<[f64; 12]>,
    /// Target pose vectors used as labels; padded slots hold the ignore
    /// sentinel on every component.
    pub obj_xyztheta_outputs: Vec<[f64; 12]>,
    pub structure: Option<StructureFrameData>,
    pub inference: Option<InferenceData>,
    /// Keyframe index the current scene was taken from.
    pub step: usize,
    /// Provenance of the episode recording.
    pub source: String,
}

/// Structure-frame tensors of one example (or, after collation, of one
/// batch with a leading batch dimension).
#[derive(Debug)]
pub struct StructureFrameTensors {
    pub position_index: Tensor,
    pub token_type_index: Tensor,
    pub pad_mask: Tensor,
    pub x_inputs: Tensor,
    pub y_inputs: Tensor,
    pub z_inputs: Tensor,
    pub theta_inputs: Tensor,
}

/// The per-field tensor form of one example.
#[derive(Debug)]
pub struct ExampleTensors {
    /// `[max_num_objects, num_pts, 3]` target clouds.
    pub xyzs: Tensor,
    pub rgbs: Tensor,
    pub object_pad_mask: Tensor,
    pub other_xyzs: Tensor,
    pub other_rgbs: Tensor,
    pub other_object_pad_mask: Tensor,
    pub sentence: Tensor,
    pub sentence_pad_mask: Tensor,
    pub token_type_index: Tensor,
    pub position_index: Tensor,
    pub obj_x_outputs: Tensor,
    pub obj_y_outputs: Tensor,
    pub obj_z_outputs: Tensor,
    pub obj_theta_outputs: Tensor,
    pub obj_x_inputs: Tensor,
    pub obj_y_inputs: Tensor,
    pub obj_z_inputs: Tensor,
    pub obj_theta_inputs: Tensor,
    pub structure: Option<StructureFrameTensors>,
    pub step: i64,
    pub source: String,
}

fn component_tensor(vectors: &[[f64; 12]], index: usize) -> Tensor {
    let values: Vec<f32> = vectors.iter().map(|vector| vector[index] as f32).collect();
    Tensor::of_slice(&values)
}

fn rotation_tensor(vectors: &[[f64; 12]]) -> Tensor {
    let values: Vec<f32> = vectors
        .iter()
        .flat_map(|vector| vector[3..].iter().map(|&value| value as f32))
        .collect();
    Tensor::of_slice(&values).view([vectors.len() as i64, 9])
}

impl Example {
    /// Tokenize the sentence and convert every field to tensors.
    pub fn into_tensors(self, tokenizer: &dyn Tokenizer) -> Result<ExampleTensors> {
        let Self {
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
            inference: _,
            step,
            source,
        } = self;

        let sentence: Vec<i64> = sentence
            .iter()
            .map(|word| tokenizer.tokenize(word))
            .try_collect()?;

        let structure = structure.map(|structure| {
            let StructureFrameData {
                xyztheta,
                position_index,
                token_type_index,
                pad_mask,
            } = structure;
            let inputs = [xyztheta];

            StructureFrameTensors {
                position_index: Tensor::of_slice(&position_index),
                token_type_index: Tensor::of_slice(&token_type_index),
                pad_mask: Tensor::of_slice(&pad_mask),
                x_inputs: component_tensor(&inputs, 0),
                y_inputs: component_tensor(&inputs, 1),
                z_inputs: component_tensor(&inputs, 2),
                theta_inputs: rotation_tensor(&inputs),
            }
        });

        Ok(ExampleTensors {
            xyzs: Tensor::stack(&xyzs, 0),
            rgbs: Tensor::stack(&rgbs, 0),
            object_pad_mask: Tensor::of_slice(&object_pad_mask),
            other_xyzs: Tensor::stack(&other_xyzs, 0),
            other_rgbs: Tensor::stack(&other_rgbs, 0),
            other_object_pad_mask: Tensor::of_slice(&other_object_pad_mask),
            sentence: Tensor::of_slice(&sentence),
            sentence_pad_mask: Tensor::of_slice(&sentence_pad_mask),
            token_type_index: Tensor::of_slice(&token_type_index),
            position_index: Tensor::of_slice(&position_index),
            obj_x_outputs: component_tensor(&obj_xyztheta_outputs, 0),
            obj_y_outputs: component_tensor(&obj_xyztheta_outputs, 1),
            obj_z_outputs: component_tensor(&obj_xyztheta_outputs, 2),
            obj_theta_outputs: rotation_tensor(&obj_xyztheta_outputs),
            obj_x_inputs: component_tensor(&obj_xyztheta_inputs, 0),
            obj_y_inputs: component_tensor(&obj_xyztheta_inputs, 1),
            obj_z_inputs: component_tensor(&obj_xyztheta_inputs, 2),
            obj_theta_inputs: rotation_tensor(&obj_xyztheta_inputs),
            structure,
            step: step as i64,
            source,
        })
    }
}
