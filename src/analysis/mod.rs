//! Post-processing of a fitted SFH: mass-consistent resampling and transition times.

pub mod quench;
pub mod resample;

pub use quench::*;
pub use resample::*;
