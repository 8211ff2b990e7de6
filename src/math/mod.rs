//! Numerical building blocks: spacing, covariance kernels, sampling, cosmology.

pub mod cosmology;
pub mod kernel;
pub mod mass_return;
pub mod mvn;
pub mod spacing;

pub use cosmology::*;
pub use kernel::*;
pub use mass_return::*;
pub use mvn::*;
pub use spacing::*;
