//! Stellar mass-return kernel: the fraction of mass formed `k` Myr ago that is
//! still in stars today.

use crate::error::AppError;

/// Timescale of the analytic mass-loss law (Myr).
const LOSS_TIMESCALE_MYR: f64 = 1.4;
/// Amplitude of the analytic mass-loss law.
const LOSS_AMPLITUDE: f64 = 0.05;

#[derive(Debug, Clone, PartialEq)]
pub enum MassReturnKernel {
    /// `1 - 0.05 ln(1 + t / 1.4 Myr)` (Behroozi et al. 2013).
    Analytic,
    /// Retained fraction per Myr of age, starting at age 0.
    Tabulated(Vec<f64>),
}

impl MassReturnKernel {
    /// Retained fraction for ages `0..n` Myr.
    pub fn values(&self, n: usize) -> Result<Vec<f64>, AppError> {
        match self {
            MassReturnKernel::Analytic => Ok((0..n)
                .map(|k| 1.0 - LOSS_AMPLITUDE * (1.0 + k as f64 / LOSS_TIMESCALE_MYR).ln())
                .collect()),
            MassReturnKernel::Tabulated(table) => {
                if table.len() < n {
                    return Err(AppError::data(format!(
                        "Mass-return table covers {} Myr but {n} Myr are needed.",
                        table.len()
                    )));
                }
                Ok(table[..n].to_vec())
            }
        }
    }

    pub fn label(&self) -> String {
        match self {
            MassReturnKernel::Analytic => "analytic (Behroozi+13)".to_string(),
            MassReturnKernel::Tabulated(t) => format!("tabulated ({} Myr)", t.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn analytic_kernel_starts_at_one_and_decays() {
        let k = MassReturnKernel::Analytic.values(10_000).unwrap();
        assert_eq!(k[0], 1.0);
        assert!(k.windows(2).all(|w| w[1] < w[0]));
        // About 40% of the mass is returned after 10 Gyr.
        assert_relative_eq!(k[9_999], 0.558, epsilon = 0.01);
    }

    #[test]
    fn short_table_is_a_data_error() {
        let table = MassReturnKernel::Tabulated(vec![1.0, 0.9]);
        assert_eq!(table.values(2).unwrap(), vec![1.0, 0.9]);
        assert_eq!(table.values(3).unwrap_err().exit_code(), 3);
    }
}
