//! Covariance kernel of the regulator SFH model.
//!
//! The log-SFR fluctuations are the sum of two stationary processes, so the
//! covariance between two bins depends only on the lag `τ = |t_i - t_j|`:
//!
//! - regulator term (self-regulation with correlated inflow):
//!   `σ_reg² / (τ_in - τ_eq) · (τ_in e^{-τ/τ_in} - τ_eq e^{-τ/τ_eq})`
//! - dynamical (GMC) term: `σ_dyn² e^{-τ/τ_dyn}`
//!
//! The regulator term is 0/0 at `τ_in = τ_eq`; its limit is
//! `σ_reg² (1 + τ/τ_eq) e^{-τ/τ_eq}`. We switch to the limit when the two
//! timescales agree to within a relative `EQUAL_TAU_REL`, where the general form
//! loses precision to cancellation anyway.
//!
//! Positive-semidefiniteness is a property of the physical model, not checked here;
//! the sampler in `math::mvn` reports an invalid matrix.

use nalgebra::DMatrix;

use crate::domain::RegulatorParams;

const EQUAL_TAU_REL: f64 = 1e-9;

/// Regulator covariance at lag `lag`.
pub fn regulator_term(lag: f64, sigma_reg: f64, tau_eq: f64, tau_in: f64) -> f64 {
    let var = sigma_reg * sigma_reg;
    if (tau_in - tau_eq).abs() <= EQUAL_TAU_REL * tau_eq.abs().max(tau_in.abs()) {
        return var * (1.0 + lag / tau_eq) * (-lag / tau_eq).exp();
    }
    var / (tau_in - tau_eq) * (tau_in * (-lag / tau_in).exp() - tau_eq * (-lag / tau_eq).exp())
}

/// GMC covariance at lag `lag`.
pub fn dynamical_term(lag: f64, sigma_dyn: f64, tau_dyn: f64) -> f64 {
    sigma_dyn * sigma_dyn * (-lag / tau_dyn).exp()
}

/// Full covariance at lag `lag`.
pub fn covariance_at(lag: f64, params: &RegulatorParams) -> f64 {
    regulator_term(
        lag,
        params.sigma_reg,
        f64::from(params.tau_eq),
        f64::from(params.tau_in),
    ) + dynamical_term(lag, params.sigma_dyn, f64::from(params.tau_dyn))
}

/// Build the covariance matrix over the given bin centers (Myr).
pub fn build_covariance(centers: &[f64], params: &RegulatorParams) -> DMatrix<f64> {
    let n = centers.len();
    let mut cov = DMatrix::<f64>::zeros(n, n);
    for i in 0..n {
        for j in i..n {
            let value = covariance_at((centers[i] - centers[j]).abs(), params);
            cov[(i, j)] = value;
            cov[(j, i)] = value;
        }
    }
    cov
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn params() -> RegulatorParams {
        RegulatorParams {
            sigma_reg: 1.0,
            tau_eq: 500,
            tau_in: 150,
            sigma_dyn: 0.24,
            tau_dyn: 5,
        }
    }

    #[test]
    fn general_form_converges_to_equal_tau_limit() {
        let tau_eq = 300.0;
        for &lag in &[0.0, 10.0, 250.0, 1200.0] {
            let limit = regulator_term(lag, 0.8, tau_eq, tau_eq);
            for &delta in &[1e-2, 1e-3, 1e-4] {
                let near = regulator_term(lag, 0.8, tau_eq, tau_eq + delta);
                assert_relative_eq!(near, limit, max_relative = 1e-4);
            }
        }
    }

    #[test]
    fn zero_lag_variance_is_sum_of_amplitudes() {
        let p = params();
        let v = covariance_at(0.0, &p);
        assert_relative_eq!(v, 1.0 + 0.24 * 0.24, epsilon = 1e-12);
    }

    #[test]
    fn matrix_is_symmetric_and_psd_for_small_grids() {
        let centers = [5.0, 495.0, 985.0, 1475.0, 1965.0, 1980.0, 1995.0];
        let cov = build_covariance(&centers, &params());
        assert_eq!(cov, cov.transpose());

        let eig = nalgebra::SymmetricEigen::new(cov);
        let min = eig.eigenvalues.iter().cloned().fold(f64::INFINITY, f64::min);
        assert!(min >= -1e-10, "min eigenvalue {min}");
    }

    #[test]
    fn covariance_decays_with_lag() {
        let p = params();
        let near = covariance_at(10.0, &p);
        let far = covariance_at(1000.0, &p);
        assert!(near > far && far > 0.0);
    }
}
