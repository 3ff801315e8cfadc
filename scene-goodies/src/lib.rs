//! Camera and rigid-transform helpers for recorded robot scenes.

pub mod camera;
mod common;
pub mod transform;

pub use camera::*;
pub use transform::*;
