//! End-to-end assembly and collation over a synthetic episode.

use anyhow::Result;
use indexmap::IndexMap;
use nalgebra::{Matrix4, Vector3};
use rand::{rngs::StdRng, SeedableRng};
use rearrange_dl::{
    dataset::{CameraView, MemoryEpisode, MemoryFrame},
    error::DataError,
    example::{
        collate, AssembleOptions, ExampleAssembler, ExampleAssemblerInit, ExampleTensors,
        SentenceWord, TokenRole, Tokenizer,
    },
};
use scene_goodies::CameraIntrinsics;
use std::{collections::HashMap, num::NonZeroUsize};
use tch::{kind::FLOAT_CPU, IndexOp, Tensor};

const HEIGHT: i64 = 24;
const WIDTH: i64 = 32;
const NUM_PTS: usize = 64;
const NUM_OBJECTS: usize = 5;

/// Tokenizer stub mapping every role to a small fixed id.
struct RoleTokenizer;

impl Tokenizer for RoleTokenizer {
    fn tokenize(&self, word: &SentenceWord) -> Result<i64> {
        Ok(match word {
            SentenceWord::Pad => 0,
            SentenceWord::Value { role, .. } => match role {
                TokenRole::Shape => 1,
                TokenRole::Rotation => 2,
                TokenRole::PositionX => 3,
                TokenRole::PositionY => 4,
                TokenRole::Radius => 5,
            },
        })
    }
}

fn translation(x: f64, y: f64, z: f64) -> Matrix4<f64> {
    Matrix4::new_translation(&Vector3::new(x, y, z))
}

/// One frame with five 3×3 object blocks at depth 1m on an invalid
/// background. `broken_object` zeroes the depth under that object.
fn synthetic_frame(broken_object: Option<usize>) -> MemoryFrame {
    let mut seg = vec![0i64; (HEIGHT * WIDTH) as usize];
    let mut raw_depth = vec![0i64; (HEIGHT * WIDTH) as usize];

    for object in 0..NUM_OBJECTS {
        let col_start = 2 + 6 * object as i64;
        for row in 2..5 {
            for col in col_start..col_start + 3 {
                let pixel = (row * WIDTH + col) as usize;
                seg[pixel] = object as i64 + 1;
                raw_depth[pixel] = if broken_object == Some(object) {
                    0
                } else {
                    // decodes to 1m with bounds (0, 2)
                    10000
                };
            }
        }
    }

    MemoryFrame {
        rgba: Tensor::ones(&[HEIGHT, WIDTH, 4], FLOAT_CPU) * 255.0,
        raw_depth: Tensor::of_slice(&raw_depth).view([HEIGHT, WIDTH]),
        depth_bounds: (0.0, 2.0),
        segmentation: Tensor::of_slice(&seg).view([HEIGHT, WIDTH]),
        camera_pose: Matrix4::identity(),
    }
}

fn synthetic_episode(goal_specification: &str, broken_object: Option<usize>) -> MemoryEpisode {
    let mut frames = HashMap::new();
    frames.insert(
        CameraView::EndEffector,
        (0..4).map(|_| synthetic_frame(broken_object)).collect(),
    );

    let mut intrinsics = HashMap::new();
    intrinsics.insert(
        CameraView::EndEffector,
        CameraIntrinsics::new(HEIGHT as usize, WIDTH as usize, 10.0, 10.0, 16.0, 12.0).unwrap(),
    );

    let mut object_ids = IndexMap::new();
    for object in 0..NUM_OBJECTS {
        object_ids.insert(format!("object_{:02}", object), object as i64 + 1);
    }
    // non-object ids are ignored by the assembler
    object_ids.insert("robot".to_owned(), 99);

    let mut object_poses = HashMap::new();
    for object in 0..NUM_OBJECTS {
        // the goal keyframe shifts object k by k meters along x; the
        // current pose is the identity
        object_poses.insert(
            format!("object_{:02}", object),
            vec![
                translation(object as f64, 0.0, 0.0),
                Matrix4::identity(),
                Matrix4::identity(),
                Matrix4::identity(),
            ],
        );
    }

    MemoryEpisode {
        source: "episode_000".to_owned(),
        frames,
        intrinsics,
        ee_camera_pose: Matrix4::identity(),
        object_ids,
        object_poses,
        goal_specification: goal_specification.to_owned(),
    }
}

fn circle_goal() -> &'static str {
    r#"{
        "rearrange": {"objects": ["object_00", "object_01", "object_02"]},
        "anchor": {"objects": ["object_03"]},
        "distract": {"objects": ["object_04"]},
        "shape": {
            "type": "circle",
            "radius": 0.25,
            "position": [0.4, 0.1, 0.0],
            "rotation": [0.0, 0.0, 0.5]
        }
    }"#
}

fn tower_goal() -> &'static str {
    r#"{
        "rearrange": {"objects": ["object_00", "object_01", "object_02"]},
        "anchor": {"objects": ["object_03"]},
        "distract": {"objects": ["object_04"]},
        "shape": {
            "type": "tower",
            "position": [0.4, 0.1, 0.0],
            "rotation": [0.0, 0.0, 0.5]
        }
    }"#
}

fn assembler(use_structure_frame: bool) -> ExampleAssembler {
    ExampleAssemblerInit {
        num_pts: NonZeroUsize::new(NUM_PTS).unwrap(),
        use_structure_frame,
        data_augmentation: false,
        ..Default::default()
    }
    .build()
    .unwrap()
}

fn cloud_mean_x(cloud: &Tensor) -> f64 {
    let xs: Vec<f32> = Vec::from(&cloud.i((.., 0)));
    xs.iter().map(|&x| x as f64).sum::<f64>() / xs.len() as f64
}

#[test]
fn circle_example_matches_expected_layout() -> Result<()> {
    let episode = synthetic_episode(circle_goal(), None);
    let mut rng = StdRng::seed_from_u64(0);

    let example = assembler(false).assemble(&episode, &mut rng)?;

    assert_eq!(example.object_pad_mask, vec![0, 0, 0, 1, 1, 1, 1]);
    assert_eq!(example.other_object_pad_mask, vec![0, 0, 1, 1, 1]);
    assert_eq!(example.sentence_pad_mask, vec![0; 5]);
    assert_eq!(example.sentence.len(), 5);
    assert_eq!(example.step, 3);
    assert_eq!(example.source, "episode_000");

    // zones: 5 sentence slots, 5 other-object slots, 7 target slots
    let mut expected_types = vec![0i64; 5];
    expected_types.extend(vec![1i64; 5]);
    expected_types.extend(vec![2i64; 7]);
    assert_eq!(example.token_type_index, expected_types);

    let mut expected_positions: Vec<i64> = (0..5).collect();
    expected_positions.extend(0..5);
    expected_positions.extend(0..7);
    assert_eq!(example.position_index, expected_positions);

    // circle reverses the recorded target order: slots hold objects 2, 1, 0,
    // and each goal pose shifts the reconstructed center by the object index
    for (slot, expected_shift) in [(0usize, 2.0f64), (1, 1.0), (2, 0.0)] {
        let produced = example.obj_xyztheta_outputs[slot][0];
        let expected = cloud_mean_x(&example.xyzs[slot]) + expected_shift;
        assert!(
            (produced - expected).abs() < 1e-4,
            "slot {}: {} vs {}",
            slot,
            produced,
            expected
        );
    }

    // padded outputs carry the ignore sentinel, padded inputs zeros
    for slot in 3..7 {
        assert_eq!(example.obj_xyztheta_outputs[slot], [-100.0; 12]);
        assert_eq!(example.obj_xyztheta_inputs[slot], [0.0; 12]);
    }

    let tensors = example.into_tensors(&RoleTokenizer)?;
    assert_eq!(tensors.xyzs.size(), &[7, NUM_PTS as i64, 3]);
    assert_eq!(tensors.other_xyzs.size(), &[5, NUM_PTS as i64, 3]);
    assert_eq!(Vec::<i64>::from(&tensors.sentence), vec![1, 2, 3, 4, 5]);
    assert_eq!(tensors.obj_theta_outputs.size(), &[7, 9]);
    assert!(tensors.structure.is_none());

    Ok(())
}

#[test]
fn tower_example_keeps_order_and_pads_the_sentence() -> Result<()> {
    let episode = synthetic_episode(tower_goal(), None);
    let mut rng = StdRng::seed_from_u64(0);

    let example = assembler(false).assemble(&episode, &mut rng)?;

    assert_eq!(example.sentence_pad_mask, vec![0, 0, 0, 0, 1]);
    assert_eq!(example.sentence[4], SentenceWord::Pad);

    // recorded order is preserved: slot k holds object k
    for slot in 0..3 {
        let produced = example.obj_xyztheta_outputs[slot][0];
        let expected = cloud_mean_x(&example.xyzs[slot]) + slot as f64;
        assert!((produced - expected).abs() < 1e-4);
    }

    let tensors = example.into_tensors(&RoleTokenizer)?;
    assert_eq!(Vec::<i64>::from(&tensors.sentence), vec![1, 2, 3, 4, 0]);

    Ok(())
}

#[test]
fn shuffling_permutes_only_real_target_slots() -> Result<()> {
    let episode = synthetic_episode(circle_goal(), None);
    let mut rng = StdRng::seed_from_u64(11);

    let options = AssembleOptions {
        shuffle_object_index: Some(true),
        ..Default::default()
    };
    let example = assembler(false).assemble_with(&episode, options, &mut rng)?;

    // the padded tail keeps its trailing positions
    assert_eq!(example.object_pad_mask[3..], [1, 1, 1, 1]);

    // every real slot still pairs its cloud with its pose vector
    let mut shifts = Vec::new();
    for slot in 0..3 {
        let shift = example.obj_xyztheta_outputs[slot][0] - cloud_mean_x(&example.xyzs[slot]);
        shifts.push(shift.round() as i64);
    }
    shifts.sort_unstable();
    assert_eq!(shifts, vec![0, 1, 2]);

    Ok(())
}

#[test]
fn disabled_augmentation_is_bit_exact() -> Result<()> {
    let episode = synthetic_episode(circle_goal(), None);

    let first = assembler(false).assemble(&episode, &mut StdRng::seed_from_u64(1))?;
    let second = assembler(false).assemble(&episode, &mut StdRng::seed_from_u64(2))?;

    for (lhs, rhs) in first.xyzs.iter().zip(&second.xyzs) {
        assert_eq!(
            Vec::<f32>::from(&lhs.view([-1])),
            Vec::<f32>::from(&rhs.view([-1]))
        );
    }

    Ok(())
}

#[test]
fn augmentation_is_reproducible_from_the_seed() -> Result<()> {
    let episode = synthetic_episode(circle_goal(), None);
    let noisy_assembler = ExampleAssemblerInit {
        num_pts: NonZeroUsize::new(NUM_PTS).unwrap(),
        data_augmentation: true,
        ..Default::default()
    }
    .build()?;

    let run = |seed: u64| -> Result<Vec<f32>> {
        let example = noisy_assembler.assemble(&episode, &mut StdRng::seed_from_u64(seed))?;
        Ok(Vec::from(&example.xyzs[0].view([-1])))
    };

    assert_eq!(run(5)?, run(5)?);
    assert_ne!(run(5)?, run(6)?);

    Ok(())
}

#[test]
fn collation_concatenates_clouds_and_stacks_the_rest() -> Result<()> {
    let episode = synthetic_episode(circle_goal(), None);
    let worker = assembler(false);

    let examples: Vec<ExampleTensors> = (0..2)
        .map(|seed| {
            worker
                .assemble(&episode, &mut StdRng::seed_from_u64(seed))?
                .into_tensors(&RoleTokenizer)
        })
        .collect::<Result<_>>()?;

    let batch = collate(&examples)?;
    assert_eq!(batch.xyzs.size(), &[14, NUM_PTS as i64, 3]);
    assert_eq!(batch.other_xyzs.size(), &[10, NUM_PTS as i64, 3]);
    assert_eq!(batch.object_pad_mask.size(), &[2, 7]);
    assert_eq!(batch.sentence.size(), &[2, 5]);
    assert_eq!(batch.obj_theta_outputs.size(), &[2, 7, 9]);
    assert!(batch.structure.is_none());

    Ok(())
}

#[test]
fn structure_frame_fields_are_carried_and_collated() -> Result<()> {
    let episode = synthetic_episode(circle_goal(), None);
    let worker = assembler(true);

    let example = worker.assemble(&episode, &mut StdRng::seed_from_u64(0))?;
    let structure = example.structure.as_ref().expect("structure fields");
    assert_eq!(structure.token_type_index, vec![3]);
    assert_eq!(structure.position_index, vec![0]);
    assert_eq!(structure.pad_mask, vec![0]);
    assert_eq!(structure.xyztheta[0], 0.4);
    assert_eq!(structure.xyztheta[1], 0.1);

    let examples: Vec<ExampleTensors> = (0..2)
        .map(|seed| {
            worker
                .assemble(&episode, &mut StdRng::seed_from_u64(seed))?
                .into_tensors(&RoleTokenizer)
        })
        .collect::<Result<_>>()?;
    let batch = collate(&examples)?;

    let structure = batch.structure.expect("structure batch fields");
    assert_eq!(structure.theta_inputs.size(), &[2, 1, 9]);
    assert_eq!(structure.pad_mask.size(), &[2, 1]);

    Ok(())
}

#[test]
fn mixed_frame_modes_cannot_share_a_batch() -> Result<()> {
    let episode = synthetic_episode(circle_goal(), None);

    let world = assembler(false)
        .assemble(&episode, &mut StdRng::seed_from_u64(0))?
        .into_tensors(&RoleTokenizer)?;
    let relative = assembler(true)
        .assemble(&episode, &mut StdRng::seed_from_u64(0))?
        .into_tensors(&RoleTokenizer)?;

    assert!(collate(&[world, relative]).is_err());

    Ok(())
}

#[test]
fn capacity_overflow_is_a_configuration_error() {
    let episode = synthetic_episode(circle_goal(), None);
    let tiny = ExampleAssemblerInit {
        max_num_objects: 2,
        num_pts: NonZeroUsize::new(NUM_PTS).unwrap(),
        data_augmentation: false,
        ..Default::default()
    }
    .build()
    .unwrap();

    let err = tiny
        .assemble(&episode, &mut StdRng::seed_from_u64(0))
        .unwrap_err();
    assert!(err.to_string().contains("exceed"), "{}", err);
}

#[test]
fn object_accounting_mismatch_is_a_configuration_error() {
    // the goal specification accounts for 4 objects, the episode has 5
    let goal = r#"{
        "rearrange": {"objects": ["object_00", "object_01"]},
        "anchor": {"objects": []},
        "distract": {"objects": ["object_03", "object_04"]},
        "shape": {
            "type": "circle",
            "radius": 0.25,
            "position": [0.4, 0.1, 0.0],
            "rotation": [0.0, 0.0, 0.5]
        }
    }"#;
    let episode = synthetic_episode(goal, None);

    let err = assembler(false)
        .assemble(&episode, &mut StdRng::seed_from_u64(0))
        .unwrap_err();
    assert!(err.to_string().contains("accounts for"), "{}", err);
}

#[test]
fn occluded_object_rejects_the_example_as_a_data_error() {
    let episode = synthetic_episode(circle_goal(), Some(1));

    let err = assembler(false)
        .assemble(&episode, &mut StdRng::seed_from_u64(0))
        .unwrap_err();
    match err.downcast_ref::<DataError>() {
        Some(DataError::EmptyObjectMask { object }) => assert_eq!(object, "object_01"),
        other => panic!("unexpected error class: {:?}", other),
    }
}

#[test]
fn inference_mode_carries_the_goal_scene() -> Result<()> {
    let episode = synthetic_episode(circle_goal(), None);
    let options = AssembleOptions {
        inference_mode: true,
        ..Default::default()
    };

    let example =
        assembler(false).assemble_with(&episode, options, &mut StdRng::seed_from_u64(0))?;
    let inference = example.inference.expect("inference fields");

    assert_eq!(inference.goal_obj_xyzs.len(), 3);
    assert_eq!(inference.goal_obj_xyzs[0].size(), &[NUM_PTS as i64, 3]);
    assert_eq!(inference.goal_obj_poses.len(), 7);
    assert!(inference.goal_obj_poses[..3].iter().all(Option::is_some));
    assert!(inference.goal_obj_poses[3..].iter().all(Option::is_none));
    assert_eq!(
        inference.target_objects,
        vec!["object_02", "object_01", "object_00"]
    );
    assert_eq!(inference.goal_xyz.size(), &[HEIGHT, WIDTH, 3]);

    Ok(())
}
