//! Episode recordings and their symbolic goal specifications.

pub mod episode;
pub mod goal;

pub use episode::*;
pub use goal::*;
