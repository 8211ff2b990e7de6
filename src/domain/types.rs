//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - read from the JSON run configuration
//! - passed by value between the precompute, reconstruction and analysis stages
//! - exported to JSON/CSV for downstream tools

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Which SFH module the configuration selects.
///
/// The serialized names match the module names used by the host configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SfhModule {
    /// Compounding-from-formation non-parametric SFH (older draw layout).
    #[serde(rename = "sfhnonparam")]
    NonparametricLegacy,
    /// Compounding-from-observation non-parametric SFH.
    #[serde(rename = "sfhstochastic_nonparametric", alias = "sfhstohastic_nonparametric")]
    Nonparametric,
    /// Regulator-model SFH with absolute log-levels per bin.
    #[serde(rename = "sfhstochastic_regulator", alias = "sfhstohastic_regulator")]
    Regulator,
}

impl SfhModule {
    pub fn display_name(self) -> &'static str {
        match self {
            SfhModule::NonparametricLegacy => "sfhnonparam",
            SfhModule::Nonparametric => "sfhstochastic_nonparametric",
            SfhModule::Regulator => "sfhstochastic_regulator",
        }
    }

    /// Draw-cache family backing this module.
    pub fn family(self) -> StochasticFamily {
        match self {
            SfhModule::NonparametricLegacy | SfhModule::Nonparametric => StochasticFamily::Nonparametric,
            SfhModule::Regulator => StochasticFamily::Regulator,
        }
    }

    /// Smallest bin count the module can build edges for.
    pub fn min_levels(self) -> usize {
        match self {
            SfhModule::NonparametricLegacy => 2,
            SfhModule::Nonparametric => 3,
            SfhModule::Regulator => 1,
        }
    }

    /// Number of cached values per model for a given bin count.
    pub fn draw_len(self, n_levels: usize) -> usize {
        match self {
            SfhModule::NonparametricLegacy => n_levels + 1,
            SfhModule::Nonparametric => n_levels,
            SfhModule::Regulator => n_levels + 1,
        }
    }
}

/// Draw-cache family. Switching family invalidates the other family's draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StochasticFamily {
    Nonparametric,
    Regulator,
}

impl StochasticFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            StochasticFamily::Nonparametric => "nonparametric",
            StochasticFamily::Regulator => "regulator",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "nonparametric" => Some(StochasticFamily::Nonparametric),
            "regulator" => Some(StochasticFamily::Regulator),
            _ => None,
        }
    }
}

/// Fixed recent-time bins of the regulator time grid (Myr of look-back).
///
/// The last bin spans `[age - final_bin, age]`, the one before it
/// `[age - recent_edge, age - final_bin]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSpec {
    pub final_bin: u32,
    pub recent_edge: u32,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self {
            final_bin: 10,
            recent_edge: 30,
        }
    }
}

/// Physical parameters of the regulator model for one cache entry.
///
/// Timescales are integer Myr; amplitudes are unitless.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegulatorParams {
    /// Overall variance of the self-regulated process.
    pub sigma_reg: f64,
    /// Equilibrium timescale.
    pub tau_eq: u32,
    /// Inflow correlation timescale.
    pub tau_in: u32,
    /// Giant-molecular-cloud variability.
    pub sigma_dyn: f64,
    /// GMC dynamical lifetime.
    pub tau_dyn: u32,
}

impl Default for RegulatorParams {
    fn default() -> Self {
        Self {
            sigma_reg: 1.0,
            tau_eq: 500,
            tau_in: 150,
            sigma_dyn: 0.24,
            tau_dyn: 5,
        }
    }
}

/// Normalisation applied at the end of every reconstruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Normalisation {
    /// Divide through so the SFH forms one solar mass.
    Unit,
    /// Multiply the raw SFH and its integral by a fixed amplitude.
    Amplitude(f64),
}

/// Reconstruction policy plus the parameters only that policy needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SfhVariant {
    LegacyNonparametric { last_bin: u32 },
    Nonparametric { last_bin: u32 },
    Regulator(RegulatorParams),
}

impl SfhVariant {
    pub fn module(&self) -> SfhModule {
        match self {
            SfhVariant::LegacyNonparametric { .. } => SfhModule::NonparametricLegacy,
            SfhVariant::Nonparametric { .. } => SfhModule::Nonparametric,
            SfhVariant::Regulator(_) => SfhModule::Regulator,
        }
    }
}

/// One model evaluation: a parameter combination and the draw column to use.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelInstance {
    pub variant: SfhVariant,
    /// Look-back time of formation (Myr).
    pub age_form: u32,
    pub n_levels: usize,
    pub model_index: usize,
    pub normalisation: Normalisation,
    pub grid: GridSpec,
}

fn default_n_models() -> usize {
    100
}
fn default_age_form() -> Vec<u32> {
    vec![2000]
}
fn default_n_levels() -> Vec<usize> {
    vec![6]
}
fn default_last_bin() -> Vec<u32> {
    vec![30]
}
fn default_scale_factor() -> f64 {
    1.0
}
fn default_sigma_reg() -> Vec<f64> {
    vec![RegulatorParams::default().sigma_reg]
}
fn default_tau_eq() -> Vec<u32> {
    vec![RegulatorParams::default().tau_eq]
}
fn default_tau_in() -> Vec<u32> {
    vec![RegulatorParams::default().tau_in]
}
fn default_sigma_dyn() -> Vec<f64> {
    vec![RegulatorParams::default().sigma_dyn]
}
fn default_tau_dyn() -> Vec<u32> {
    vec![RegulatorParams::default().tau_dyn]
}
fn default_sfr_a() -> f64 {
    1.0
}
fn default_normalise() -> bool {
    true
}

/// SFH section of the run configuration.
///
/// Every list is a parameter sweep; the Cartesian product of the lists (times
/// `n_models` draw columns) defines the models evaluated downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SfhConfig {
    pub module: SfhModule,

    #[serde(default = "default_age_form")]
    pub age_form: Vec<u32>,
    #[serde(default = "default_n_levels", alias = "nLevels")]
    pub n_levels: Vec<usize>,
    #[serde(default = "default_n_models", alias = "nModels")]
    pub n_models: usize,

    /// Width of the most recent bin for the non-parametric modules (Myr).
    #[serde(default = "default_last_bin", alias = "lastBin")]
    pub last_bin: Vec<u32>,
    /// Scale of the Student-t change distribution (0.3 continuity, 1.0 bursty).
    #[serde(default = "default_scale_factor", alias = "scaleFactor")]
    pub scale_factor: f64,

    #[serde(default = "default_sigma_reg", alias = "sigmaReg")]
    pub sigma_reg: Vec<f64>,
    #[serde(default = "default_tau_eq", alias = "tauEq")]
    pub tau_eq: Vec<u32>,
    #[serde(default = "default_tau_in", alias = "tauIn", alias = "tau_flow", alias = "tauFlow")]
    pub tau_in: Vec<u32>,
    #[serde(default = "default_sigma_dyn", alias = "sigmaDyn")]
    pub sigma_dyn: Vec<f64>,
    #[serde(default = "default_tau_dyn", alias = "tauDyn")]
    pub tau_dyn: Vec<u32>,

    /// Amplitude used when `normalise` is false.
    #[serde(default = "default_sfr_a", alias = "sfr_A")]
    pub sfr_a: f64,
    #[serde(default = "default_normalise")]
    pub normalise: bool,

    /// Seed for the precompute pass (entropy when absent).
    #[serde(default)]
    pub seed: Option<u64>,

    #[serde(default)]
    pub grid: GridSpec,
}

impl SfhConfig {
    /// A single-valued configuration with the module defaults.
    pub fn with_module(module: SfhModule) -> Self {
        Self {
            module,
            age_form: default_age_form(),
            n_levels: default_n_levels(),
            n_models: default_n_models(),
            last_bin: default_last_bin(),
            scale_factor: default_scale_factor(),
            sigma_reg: default_sigma_reg(),
            tau_eq: default_tau_eq(),
            tau_in: default_tau_in(),
            sigma_dyn: default_sigma_dyn(),
            tau_dyn: default_tau_dyn(),
            sfr_a: default_sfr_a(),
            normalise: default_normalise(),
            seed: None,
            grid: GridSpec::default(),
        }
    }

    pub fn normalisation(&self) -> Normalisation {
        if self.normalise {
            Normalisation::Unit
        } else {
            Normalisation::Amplitude(self.sfr_a)
        }
    }

    /// Validate every parameter list. Errors are configuration errors (exit code 2).
    pub fn validate(&self) -> Result<(), AppError> {
        let module = self.module.display_name();
        if self.n_models == 0 {
            return Err(AppError::config(format!("[{module}] n_models must be >= 1.")));
        }
        non_empty(module, "age_form", &self.age_form)?;
        non_empty(module, "n_levels", &self.n_levels)?;
        if self.age_form.iter().any(|&a| a == 0) {
            return Err(AppError::config(format!("[{module}] age_form values must be > 0.")));
        }
        let min_levels = self.module.min_levels();
        if let Some(&n) = self.n_levels.iter().find(|&&n| n < min_levels) {
            return Err(AppError::config(format!(
                "[{module}] n_levels={n} is too small (minimum {min_levels})."
            )));
        }
        if !(self.sfr_a.is_finite() && self.sfr_a >= 0.0) {
            return Err(AppError::config(format!("[{module}] sfr_a must be finite and >= 0.")));
        }

        match self.module {
            SfhModule::NonparametricLegacy | SfhModule::Nonparametric => {
                non_empty(module, "last_bin", &self.last_bin)?;
                if !(self.scale_factor.is_finite() && self.scale_factor > 0.0) {
                    return Err(AppError::config(format!(
                        "[{module}] scale_factor must be finite and > 0."
                    )));
                }
                for &age in &self.age_form {
                    for &n in &self.n_levels {
                        for &last_bin in &self.last_bin {
                            let upper = nonparametric_upper_edge(self.module, age, n);
                            if last_bin == 0 || f64::from(last_bin) >= upper {
                                return Err(AppError::config(format!(
                                    "[{module}] last_bin={last_bin} must be > 0 and below {upper:.1} Myr \
                                     (age_form={age}, n_levels={n})."
                                )));
                            }
                        }
                    }
                }
            }
            SfhModule::Regulator => {
                non_empty(module, "sigma_reg", &self.sigma_reg)?;
                non_empty(module, "tau_eq", &self.tau_eq)?;
                non_empty(module, "tau_in", &self.tau_in)?;
                non_empty(module, "sigma_dyn", &self.sigma_dyn)?;
                non_empty(module, "tau_dyn", &self.tau_dyn)?;
                for params in self.regulator_combinations() {
                    validate_regulator(&params)?;
                }
                if self.grid.final_bin == 0 || self.grid.recent_edge <= self.grid.final_bin {
                    return Err(AppError::config(format!(
                        "[{module}] grid needs 0 < final_bin < recent_edge (got {} / {}).",
                        self.grid.final_bin, self.grid.recent_edge
                    )));
                }
            }
        }
        Ok(())
    }

    /// Cartesian product of the five regulator parameter lists.
    pub fn regulator_combinations(&self) -> Vec<RegulatorParams> {
        let mut out = Vec::new();
        for &sigma_reg in &self.sigma_reg {
            for &tau_eq in &self.tau_eq {
                for &tau_in in &self.tau_in {
                    for &sigma_dyn in &self.sigma_dyn {
                        for &tau_dyn in &self.tau_dyn {
                            out.push(RegulatorParams {
                                sigma_reg,
                                tau_eq,
                                tau_in,
                                sigma_dyn,
                                tau_dyn,
                            });
                        }
                    }
                }
            }
        }
        out
    }

    fn variants(&self) -> Vec<SfhVariant> {
        match self.module {
            SfhModule::NonparametricLegacy => self
                .last_bin
                .iter()
                .map(|&last_bin| SfhVariant::LegacyNonparametric { last_bin })
                .collect(),
            SfhModule::Nonparametric => self
                .last_bin
                .iter()
                .map(|&last_bin| SfhVariant::Nonparametric { last_bin })
                .collect(),
            SfhModule::Regulator => self
                .regulator_combinations()
                .into_iter()
                .map(SfhVariant::Regulator)
                .collect(),
        }
    }

    /// Number of parameter combinations (excluding the model index).
    pub fn combination_count(&self) -> usize {
        self.age_form.len() * self.n_levels.len() * self.variants().len()
    }

    /// Every model the configuration describes: combinations × model indices.
    pub fn instances(&self) -> Vec<ModelInstance> {
        let variants = self.variants();
        let mut out = Vec::with_capacity(self.combination_count() * self.n_models);
        for &age_form in &self.age_form {
            for &n_levels in &self.n_levels {
                for &variant in &variants {
                    for model_index in 0..self.n_models {
                        out.push(ModelInstance {
                            variant,
                            age_form,
                            n_levels,
                            model_index,
                            normalisation: self.normalisation(),
                            grid: self.grid,
                        });
                    }
                }
            }
        }
        out
    }

    /// A single instance built from the first value of every list, with optional overrides.
    pub fn instance(
        &self,
        model_index: usize,
        age_form: Option<u32>,
        n_levels: Option<usize>,
    ) -> Result<ModelInstance, AppError> {
        let variant = self
            .variants()
            .into_iter()
            .next()
            .ok_or_else(|| AppError::config("Configuration describes no parameter combination."))?;
        let age_form = match age_form.or_else(|| self.age_form.first().copied()) {
            Some(a) => a,
            None => return Err(AppError::config("age_form is empty.")),
        };
        let n_levels = match n_levels.or_else(|| self.n_levels.first().copied()) {
            Some(n) => n,
            None => return Err(AppError::config("n_levels is empty.")),
        };
        Ok(ModelInstance {
            variant,
            age_form,
            n_levels,
            model_index,
            normalisation: self.normalisation(),
            grid: self.grid,
        })
    }
}

/// Upper log-spacing edge of the non-parametric bin layout (Myr of look-back).
pub fn nonparametric_upper_edge(module: SfhModule, age_form: u32, n_levels: usize) -> f64 {
    let age = f64::from(age_form);
    match module {
        SfhModule::Nonparametric => age - age / n_levels as f64,
        _ => age,
    }
}

pub fn validate_regulator(params: &RegulatorParams) -> Result<(), AppError> {
    if !(params.sigma_reg.is_finite() && params.sigma_reg >= 0.0) {
        return Err(AppError::config(format!(
            "sigma_reg must be finite and >= 0 (got {}).",
            params.sigma_reg
        )));
    }
    if !(params.sigma_dyn.is_finite() && params.sigma_dyn >= 0.0) {
        return Err(AppError::config(format!(
            "sigma_dyn must be finite and >= 0 (got {}).",
            params.sigma_dyn
        )));
    }
    if params.tau_eq == 0 || params.tau_in == 0 || params.tau_dyn == 0 {
        return Err(AppError::config(format!(
            "Regulator timescales must be > 0 (tau_eq={}, tau_in={}, tau_dyn={}).",
            params.tau_eq, params.tau_in, params.tau_dyn
        )));
    }
    Ok(())
}

fn non_empty<T>(module: &str, name: &str, values: &[T]) -> Result<(), AppError> {
    if values.is_empty() {
        return Err(AppError::config(format!("[{module}] `{name}` must list at least one value.")));
    }
    Ok(())
}

/// One row of the fitting results table, as consumed by the resampler.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultsRecord {
    pub id: String,
    /// Best-fit stellar mass (Msolar).
    pub mass_best: f64,
    /// Bayesian stellar mass (Msolar).
    pub mass_bayes: f64,
    pub redshift: f64,
    /// Formation age of the best model (Myr).
    pub age_form: f64,
}

/// Template SFH written by the fitting run: time in arbitrary units, SFR in Msolar/yr.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateSfh {
    pub time: Vec<f64>,
    pub sfr: Vec<f64>,
}

/// Reconciled SFH on a 1 Myr cosmic-time axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MassGrowth {
    /// Cosmic time (Myr).
    pub cosmic_time: Vec<f64>,
    /// Star-formation rate (Msolar/yr).
    pub sfr: Vec<f64>,
    /// Stellar mass still present at each step (Msolar).
    pub mass: Vec<f64>,
    /// `log10(sfr / mass)` (1/yr).
    pub log_ssfr: Vec<f64>,
}

/// Persisted mass-growth table with unit metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MassGrowthTable {
    pub id: String,
    pub sfr: Vec<f64>,
    pub mass: Vec<f64>,
    pub cosmic_time: Vec<f64>,
    pub units: BTreeMap<String, String>,
}

impl MassGrowthTable {
    pub fn new(id: &str, growth: &MassGrowth) -> Self {
        let units = [("sfr", "Msolar/yr"), ("mass", "Msolar"), ("cosmic_time", "Myr")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            id: id.to_string(),
            sfr: growth.sfr.clone(),
            mass: growth.mass.clone(),
            cosmic_time: growth.cosmic_time.clone(),
            units,
        }
    }
}

/// Transition times found in a specific-SFR track (cosmic time, Myr).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuenchEvent {
    /// First persistent crossing below the quiescence threshold, if any.
    pub quench_time: Option<f64>,
    /// Last main-sequence crossing before `quench_time`, if resolvable.
    pub sf_turnoff_time: Option<f64>,
}

/// Exported value for an unresolved (instantaneous) main-sequence departure.
pub const INSTANT_TURNOFF: f64 = -999.0;

impl QuenchEvent {
    pub fn sf_turnoff_or_sentinel(&self) -> f64 {
        self.sf_turnoff_time.unwrap_or(INSTANT_TURNOFF)
    }
}
