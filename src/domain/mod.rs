//! Domain types shared across the precompute, reconstruction and analysis stages.
//!
//! Keep these free of I/O: they describe *what* is being computed, not how it is
//! loaded or persisted.

pub mod types;

pub use types::*;
