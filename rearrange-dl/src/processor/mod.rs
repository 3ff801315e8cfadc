//! Scene processing building blocks.

pub mod noise;
pub mod pose;
pub mod reconstruct;
pub mod segment;

pub use noise::*;
pub use pose::*;
pub use reconstruct::*;
pub use segment::*;
