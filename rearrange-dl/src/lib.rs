//! Training-example preparation for the object-rearrangement sequence model.

mod common;
pub mod dataset;
pub mod error;
pub mod example;
pub mod processor;
