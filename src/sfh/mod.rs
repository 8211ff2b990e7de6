//! SFH reconstruction: time grids, cascades and the cache-backed entry point.

pub mod cascade;
pub mod grid;
pub mod reconstruct;

pub use cascade::*;
pub use grid::*;
pub use reconstruct::*;
