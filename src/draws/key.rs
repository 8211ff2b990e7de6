//! Draw-cache keys.
//!
//! Float parameters are quantised to integer ticks of `1e-4` before they enter a key,
//! so two keys are equal exactly when their file names are equal.

use std::fmt;
use std::path::PathBuf;

use crate::domain::{RegulatorParams, StochasticFamily};
use crate::error::AppError;

/// A float stored as integer ticks of `1e-4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Quantized(i64);

impl Quantized {
    pub const TICKS_PER_UNIT: i64 = 10_000;

    pub fn new(value: f64) -> Result<Self, AppError> {
        let ticks = (value * Self::TICKS_PER_UNIT as f64).round();
        if !ticks.is_finite() || ticks.abs() > i64::MAX as f64 / 2.0 {
            return Err(AppError::config(format!(
                "Cannot use {value} in a cache key (must be finite)."
            )));
        }
        Ok(Self(ticks as i64))
    }

    pub fn ticks(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Quantized {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let unit = Self::TICKS_PER_UNIT as u64;
        write!(f, "{sign}{}.{:04}", abs / unit, abs % unit)
    }
}

/// Group of entries purged together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Non-parametric change draws, keyed by bin count.
    Changes,
    /// Regulator log-level draws, keyed by the full parameter tuple.
    Regulator,
}

impl Namespace {
    /// Namespace holding a family's draws.
    pub fn of_family(family: StochasticFamily) -> Self {
        match family {
            StochasticFamily::Nonparametric => Namespace::Changes,
            StochasticFamily::Regulator => Namespace::Regulator,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::Changes => "RandomChange",
            Namespace::Regulator => "SFH",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawKey {
    Changes {
        n_levels: usize,
    },
    Regulator {
        age_form: u32,
        n_levels: usize,
        sigma_reg: Quantized,
        tau_eq: u32,
        tau_in: u32,
        sigma_dyn: Quantized,
        tau_dyn: u32,
    },
}

impl DrawKey {
    pub fn changes(n_levels: usize) -> Self {
        DrawKey::Changes { n_levels }
    }

    pub fn regulator(age_form: u32, n_levels: usize, params: &RegulatorParams) -> Result<Self, AppError> {
        Ok(DrawKey::Regulator {
            age_form,
            n_levels,
            sigma_reg: Quantized::new(params.sigma_reg)?,
            tau_eq: params.tau_eq,
            tau_in: params.tau_in,
            sigma_dyn: Quantized::new(params.sigma_dyn)?,
            tau_dyn: params.tau_dyn,
        })
    }

    pub fn namespace(&self) -> Namespace {
        match self {
            DrawKey::Changes { .. } => Namespace::Changes,
            DrawKey::Regulator { .. } => Namespace::Regulator,
        }
    }

    /// Path of the entry relative to the store root.
    pub fn relative_path(&self) -> PathBuf {
        match self {
            DrawKey::Changes { n_levels } => {
                PathBuf::from(Namespace::Changes.as_str()).join(format!("{n_levels}.json"))
            }
            DrawKey::Regulator { .. } => PathBuf::from(format!("{self}.json")),
        }
    }
}

impl fmt::Display for DrawKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DrawKey::Changes { n_levels } => write!(f, "{}/{n_levels}", Namespace::Changes.as_str()),
            DrawKey::Regulator {
                age_form,
                n_levels,
                sigma_reg,
                tau_eq,
                tau_in,
                sigma_dyn,
                tau_dyn,
            } => write!(
                f,
                "{}_{age_form}_{n_levels}_{sigma_reg}_{tau_eq}_{tau_in}_{sigma_dyn}_{tau_dyn}",
                Namespace::Regulator.as_str()
            ),
        }
    }
}
