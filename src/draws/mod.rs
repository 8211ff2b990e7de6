//! Random-draw cache: keys, storage backends and the precompute pass.

pub mod file;
pub mod key;
pub mod prepare;
pub mod store;

pub use file::*;
pub use key::*;
pub use prepare::*;
pub use store::*;
