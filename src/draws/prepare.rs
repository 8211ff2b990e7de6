//! Precompute pass: draw and persist every random realisation a sweep needs.
//!
//! Run once, single-threaded, before any reconstruction. The readiness marker is
//! cleared first and only set after the last entry is written.

use std::collections::BTreeSet;

use log::{debug, info};
use nalgebra::DMatrix;
use rand::Rng;
use rand_distr::{Distribution, StudentT};

use crate::domain::{SfhConfig, StochasticFamily};
use crate::draws::{DrawKey, DrawStore, Namespace};
use crate::error::AppError;
use crate::math::{MultivariateNormal, build_covariance};
use crate::sfh::build_grid;

/// Degrees of freedom of the non-parametric change distribution.
pub const CHANGE_DOF: f64 = 2.0;

#[derive(Debug, Clone, PartialEq)]
pub struct PrepareSummary {
    pub family: StochasticFamily,
    pub entries_written: usize,
    pub n_models: usize,
    /// Namespaces removed before writing.
    pub purged: Vec<Namespace>,
    /// Regulator grids that used the uniform layout.
    pub uniform_grids: usize,
}

pub fn prepare_draws<R: Rng + ?Sized>(
    config: &SfhConfig,
    store: &dyn DrawStore,
    rng: &mut R,
) -> Result<PrepareSummary, AppError> {
    config.validate()?;
    let family = config.module.family();
    store.set_ready(None)?;

    let summary = match family {
        StochasticFamily::Nonparametric => prepare_changes(config, store, rng)?,
        StochasticFamily::Regulator => prepare_regulator(config, store, rng)?,
    };

    store.set_ready(Some(family))?;
    info!(
        "prepared {} {} draw entries ({} models each) in {}",
        summary.entries_written,
        family.as_str(),
        summary.n_models,
        store.describe()
    );
    Ok(summary)
}

/// Student-t change draws, one `(n_models, row_len)` entry per bin count.
fn prepare_changes<R: Rng + ?Sized>(
    config: &SfhConfig,
    store: &dyn DrawStore,
    rng: &mut R,
) -> Result<PrepareSummary, AppError> {
    let student = StudentT::new(CHANGE_DOF)
        .map_err(|e| AppError::numeric(format!("Invalid Student-t distribution: {e}")))?;
    let levels: BTreeSet<usize> = config.n_levels.iter().copied().collect();

    for &n_levels in &levels {
        let row_len = config.module.draw_len(n_levels);
        let draws = DMatrix::<f64>::from_fn(config.n_models, row_len, |_, _| {
            student.sample(&mut *rng) * config.scale_factor
        });
        store.put(&DrawKey::changes(n_levels), &draws)?;
    }

    Ok(PrepareSummary {
        family: StochasticFamily::Nonparametric,
        entries_written: levels.len(),
        n_models: config.n_models,
        purged: Vec::new(),
        uniform_grids: 0,
    })
}

/// Correlated log-level draws, one `(bins, n_models)` entry per parameter tuple.
fn prepare_regulator<R: Rng + ?Sized>(
    config: &SfhConfig,
    store: &dyn DrawStore,
    rng: &mut R,
) -> Result<PrepareSummary, AppError> {
    store.purge(Namespace::Changes)?;

    let ages: BTreeSet<u32> = config.age_form.iter().copied().collect();
    let levels: BTreeSet<usize> = config.n_levels.iter().copied().collect();
    let combos = config.regulator_combinations();

    let mut written = 0usize;
    let mut uniform_grids = 0usize;
    for &age_form in &ages {
        for &n_levels in &levels {
            let grid = build_grid(age_form, n_levels, &config.grid)?;
            if grid.uniform_fallback {
                uniform_grids += 1;
            }
            for params in &combos {
                let key = DrawKey::regulator(age_form, n_levels, params)?;
                let cov = build_covariance(&grid.centers, params);
                let mvn = MultivariateNormal::zero_mean(cov)
                    .map_err(|e| AppError::numeric(format!("{key}: {}", e.message())))?;
                let draws = mvn.sample_columns(rng, config.n_models);
                store.put(&key, &draws)?;
                written += 1;
            }
            debug!(
                "regulator draws: age={age_form} n_levels={n_levels} bins={} combos={}",
                grid.n_bins(),
                combos.len()
            );
        }
    }

    Ok(PrepareSummary {
        family: StochasticFamily::Regulator,
        entries_written: written,
        n_models: config.n_models,
        purged: vec![Namespace::Changes],
        uniform_grids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RegulatorParams, SfhModule};
    use crate::draws::MemoryDrawStore;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn nonparametric_draws_have_model_rows_and_heavy_tails() {
        let mut config = SfhConfig::with_module(SfhModule::Nonparametric);
        config.n_levels = vec![5, 5, 8];
        config.n_models = 4000;
        let store = MemoryDrawStore::new();
        let mut rng = StdRng::seed_from_u64(11);

        let summary = prepare_draws(&config, &store, &mut rng).unwrap();
        assert_eq!(summary.entries_written, 2);
        assert_eq!(store.ready_family().unwrap(), Some(StochasticFamily::Nonparametric));

        let draws = store.get(&DrawKey::changes(5)).unwrap().unwrap();
        assert_eq!(draws.shape(), (4000, 5));

        // t(2) has median 0 and far more mass beyond 4 than a unit normal (~6e-5).
        let n = draws.len() as f64;
        let beyond = draws.iter().filter(|v| v.abs() > 4.0).count() as f64 / n;
        let positive = draws.iter().filter(|&&v| v > 0.0).count() as f64 / n;
        assert!(beyond > 0.03 && beyond < 0.09, "tail fraction {beyond}");
        assert!((positive - 0.5).abs() < 0.02, "positive fraction {positive}");
    }

    #[test]
    fn legacy_rows_carry_one_extra_value() {
        let mut config = SfhConfig::with_module(SfhModule::NonparametricLegacy);
        config.n_levels = vec![4];
        config.n_models = 3;
        let store = MemoryDrawStore::new();
        prepare_draws(&config, &store, &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(store.get(&DrawKey::changes(4)).unwrap().unwrap().shape(), (3, 5));
    }

    #[test]
    fn regulator_pass_purges_changes_and_writes_every_tuple() {
        let mut config = SfhConfig::with_module(SfhModule::Regulator);
        config.age_form = vec![1000, 2000];
        config.n_levels = vec![3];
        config.sigma_reg = vec![0.5, 1.0];
        config.n_models = 7;
        let store = MemoryDrawStore::new();
        store.put(&DrawKey::changes(3), &DMatrix::zeros(1, 3)).unwrap();
        store.set_ready(Some(StochasticFamily::Nonparametric)).unwrap();

        let summary = prepare_draws(&config, &store, &mut StdRng::seed_from_u64(5)).unwrap();
        assert_eq!(summary.entries_written, 4);
        assert_eq!(summary.purged, vec![Namespace::Changes]);
        assert!(store.get(&DrawKey::changes(3)).unwrap().is_none());
        assert_eq!(store.ready_family().unwrap(), Some(StochasticFamily::Regulator));

        let params = config.regulator_combinations()[1];
        let key = DrawKey::regulator(2000, 3, &params).unwrap();
        assert_eq!(store.get(&key).unwrap().unwrap().shape(), (4, 7));
    }

    #[test]
    fn same_seed_gives_identical_draws() {
        let mut config = SfhConfig::with_module(SfhModule::Regulator);
        config.n_levels = vec![4];
        config.n_models = 5;
        let a = MemoryDrawStore::new();
        let b = MemoryDrawStore::new();
        prepare_draws(&config, &a, &mut StdRng::seed_from_u64(9)).unwrap();
        prepare_draws(&config, &b, &mut StdRng::seed_from_u64(9)).unwrap();
        let key = DrawKey::regulator(2000, 4, &RegulatorParams::default()).unwrap();
        assert_eq!(a.get(&key).unwrap(), b.get(&key).unwrap());
    }
}
