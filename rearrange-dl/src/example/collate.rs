//! Merging assembled examples into training batches.

use crate::{common::*, example::record::{ExampleTensors, StructureFrameTensors}};

/// A collated batch.
///
/// Point-cloud fields are concatenated along the object axis (every
/// example carries a fixed object count); all other fields are stacked
/// along a new leading batch dimension. Provenance fields stay on the
/// individual examples.
#[derive(Debug)]
pub struct ExampleBatch {
    /// `[batch * max_num_objects, num_pts, 3]` target clouds.
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
}

fn cat_field<F>(examples: &[ExampleTensors], field: F) -> Tensor
where
    F: Fn(&ExampleTensors) -> &Tensor,
{
    let tensors: Vec<&Tensor> = examples.iter().map(field).collect();
    Tensor::cat(&tensors, 0)
}

fn stack_field<F>(examples: &[ExampleTensors], field: F) -> Tensor
where
    F: Fn(&ExampleTensors) -> &Tensor,
{
    let tensors: Vec<&Tensor> = examples.iter().map(field).collect();
    Tensor::stack(&tensors, 0)
}

fn stack_structure_field<F>(examples: &[ExampleTensors], field: F) -> Tensor
where
    F: Fn(&StructureFrameTensors) -> &Tensor,
{
    let tensors: Vec<&Tensor> = examples
        .iter()
        .map(|example| field(example.structure.as_ref().unwrap()))
        .collect();
    Tensor::stack(&tensors, 0)
}

/// Collate a list of examples into one batch.
///
/// Every example must share the structure-frame configuration of the
/// first one; a mixed batch is a configuration error.
pub fn collate(examples: &[ExampleTensors]) -> Result<ExampleBatch> {
    ensure!(!examples.is_empty(), "cannot collate an empty batch");

    let with_structure = examples[0].structure.is_some();
    ensure!(
        examples
            .iter()
            .all(|example| example.structure.is_some() == with_structure),
        "one batch mixes structure-frame and world-frame examples"
    );

    let structure = with_structure.then(|| StructureFrameTensors {
        position_index: stack_structure_field(examples, |s| &s.position_index),
        token_type_index: stack_structure_field(examples, |s| &s.token_type_index),
        pad_mask: stack_structure_field(examples, |s| &s.pad_mask),
        x_inputs: stack_structure_field(examples, |s| &s.x_inputs),
        y_inputs: stack_structure_field(examples, |s| &s.y_inputs),
        z_inputs: stack_structure_field(examples, |s| &s.z_inputs),
        theta_inputs: stack_structure_field(examples, |s| &s.theta_inputs),
    });

    Ok(ExampleBatch {
        xyzs: cat_field(examples, |e| &e.xyzs),
        rgbs: cat_field(examples, |e| &e.rgbs),
        object_pad_mask: stack_field(examples, |e| &e.object_pad_mask),
        other_xyzs: cat_field(examples, |e| &e.other_xyzs),
        other_rgbs: cat_field(examples, |e| &e.other_rgbs),
        other_object_pad_mask: stack_field(examples, |e| &e.other_object_pad_mask),
        sentence: stack_field(examples, |e| &e.sentence),
        sentence_pad_mask: stack_field(examples, |e| &e.sentence_pad_mask),
        token_type_index: stack_field(examples, |e| &e.token_type_index),
        position_index: stack_field(examples, |e| &e.position_index),
        obj_x_outputs: stack_field(examples, |e| &e.obj_x_outputs),
        obj_y_outputs: stack_field(examples, |e| &e.obj_y_outputs),
        obj_z_outputs: stack_field(examples, |e| &e.obj_z_outputs),
        obj_theta_outputs: stack_field(examples, |e| &e.obj_theta_outputs),
        obj_x_inputs: stack_field(examples, |e| &e.obj_x_inputs),
        obj_y_inputs: stack_field(examples, |e| &e.obj_y_inputs),
        obj_z_inputs: stack_field(examples, |e| &e.obj_z_inputs),
        obj_theta_inputs: stack_field(examples, |e| &e.obj_theta_inputs),
        structure,
    })
}
