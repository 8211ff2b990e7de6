//! Input/output helpers.
//!
//! - run configuration JSON (`config`)
//! - CSV ingest of results, templates and kernels (`ingest`)
//! - track, sweep and mass-growth exports (`export`)

pub mod config;
pub mod export;
pub mod ingest;

pub use config::*;
pub use export::*;
pub use ingest::*;
