//! Example assembly, tensor conversion, and batching.

pub mod assemble;
pub mod collate;
pub mod record;
pub mod sentence;

pub use assemble::*;
pub use collate::*;
pub use record::*;
pub use sentence::*;
