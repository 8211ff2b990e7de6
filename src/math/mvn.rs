//! Zero-mean multivariate normal sampling.
//!
//! We factor the covariance once as `Σ = L Lᵀ` and draw `x = L z` with
//! `z ~ N(0, I)`:
//!
//! - Cholesky first (the common, strictly positive-definite case).
//! - Symmetric eigendecomposition otherwise, so positive *semi*-definite
//!   matrices (e.g. a zero amplitude) still sample: `L = Q √Λ`.
//! - Eigenvalues below `-PSD_TOL · max|λ|` mean the matrix is not a covariance.
//!   That is reported as a numerical error, never papered over.

use nalgebra::{Cholesky, DMatrix, SymmetricEigen};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::error::AppError;

/// Relative tolerance for negative eigenvalues caused by round-off.
const PSD_TOL: f64 = 1e-10;

#[derive(Debug, Clone)]
pub struct MultivariateNormal {
    factor: DMatrix<f64>,
}

impl MultivariateNormal {
    /// Factor a covariance matrix for sampling.
    pub fn zero_mean(cov: DMatrix<f64>) -> Result<Self, AppError> {
        if !cov.is_square() {
            return Err(AppError::numeric(format!(
                "Covariance matrix must be square (got {}x{}).",
                cov.nrows(),
                cov.ncols()
            )));
        }
        if let Some((idx, v)) = cov.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(AppError::numeric(format!(
                "Covariance matrix has a non-finite entry at flat index {idx}: {v}."
            )));
        }

        if let Some(chol) = Cholesky::new(cov.clone()) {
            return Ok(Self {
                factor: chol.l(),
            });
        }

        let eig = SymmetricEigen::new(cov);
        let scale = eig.eigenvalues.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        let min = eig.eigenvalues.iter().cloned().fold(f64::INFINITY, f64::min);
        if min < -PSD_TOL * scale.max(f64::MIN_POSITIVE) {
            return Err(AppError::numeric(format!(
                "Covariance matrix is not positive semi-definite (min eigenvalue {min:.6e}, \
                 max |eigenvalue| {scale:.6e}); check the regulator parameters."
            )));
        }

        let roots = eig.eigenvalues.map(|v| v.max(0.0).sqrt());
        let factor = &eig.eigenvectors * DMatrix::from_diagonal(&roots);
        Ok(Self { factor })
    }

    pub fn dim(&self) -> usize {
        self.factor.nrows()
    }

    /// Draw `n` independent vectors as the columns of a `(dim, n)` matrix.
    pub fn sample_columns<R: Rng + ?Sized>(&self, rng: &mut R, n: usize) -> DMatrix<f64> {
        let z = DMatrix::<f64>::from_fn(self.dim(), n, |_, _| StandardNormal.sample(&mut *rng));
        &self.factor * z
    }
}
