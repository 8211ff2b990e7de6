//! SFH reconstruction from cached draws.
//!
//! A missing or unusable draw is never an error: the variant falls back to zero
//! changes (non-parametric) or unit levels (regulator), which both give a flat SFH
//! before normalisation. The returned `DrawSource` says which path was taken.

use std::fmt;

use log::{debug, warn};

use crate::domain::{ModelInstance, Normalisation, SfhVariant, StochasticFamily};
use crate::draws::{DrawKey, DrawStore};
use crate::error::AppError;
use crate::sfh::{build_grid, legacy_cascade, legacy_edges, revised_cascade, revised_edges};

/// Years per sample.
pub const YEARS_PER_STEP: f64 = 1e6;

/// Why a cached draw could not be used.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheStatus {
    /// No entry under the key.
    Missing,
    /// The store is not marked ready for this family.
    NotReady { ready: Option<StochasticFamily> },
    /// The entry holds fewer models than the requested index.
    ModelOutOfRange { index: usize, available: usize },
    /// The entry's per-model length does not match the bin layout.
    ShapeMismatch { expected: usize, found: usize },
    /// The entry exists but could not be decoded.
    Unreadable(String),
}

impl CacheStatus {
    /// Short tag for tallies.
    pub fn kind(&self) -> &'static str {
        match self {
            CacheStatus::Missing => "missing",
            CacheStatus::NotReady { .. } => "not-ready",
            CacheStatus::ModelOutOfRange { .. } => "model-out-of-range",
            CacheStatus::ShapeMismatch { .. } => "shape-mismatch",
            CacheStatus::Unreadable(_) => "unreadable",
        }
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheStatus::Missing => write!(f, "missing"),
            CacheStatus::NotReady { ready: None } => write!(f, "store not ready"),
            CacheStatus::NotReady { ready: Some(family) } => {
                write!(f, "store ready for {} draws", family.as_str())
            }
            CacheStatus::ModelOutOfRange { index, available } => {
                write!(f, "model {index} out of range ({available} available)")
            }
            CacheStatus::ShapeMismatch { expected, found } => {
                write!(f, "expected {expected} values per model, found {found}")
            }
            CacheStatus::Unreadable(reason) => write!(f, "unreadable: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawSource {
    Cached,
    Fallback(CacheStatus),
}

impl DrawSource {
    pub fn is_cached(&self) -> bool {
        matches!(self, DrawSource::Cached)
    }

    pub fn label(&self) -> String {
        match self {
            DrawSource::Cached => "cached".to_string(),
            DrawSource::Fallback(status) => format!("fallback ({status})"),
        }
    }
}

/// A reconstructed SFH: one sample per Myr from formation to observation.
#[derive(Debug, Clone, PartialEq)]
pub struct SfhTrack {
    /// Msolar/yr.
    pub sfr: Vec<f64>,
    /// Mass formed (Msolar); 1 in unit mode.
    pub integrated: f64,
    pub source: DrawSource,
}

pub fn reconstruct(store: &dyn DrawStore, instance: &ModelInstance) -> Result<SfhTrack, AppError> {
    let n = instance.n_levels;
    let age = instance.age_form;
    let (raw, source) = match instance.variant {
        SfhVariant::LegacyNonparametric { last_bin } => {
            let edges = legacy_edges(age, n, last_bin)?;
            let (changes, source) = fetch_or_flat(store, instance, DrawKey::changes(n), Layout::Rows);
            (legacy_cascade(age, &edges, &changes), source)
        }
        SfhVariant::Nonparametric { last_bin } => {
            let edges = revised_edges(age, n, last_bin)?;
            let (changes, source) = fetch_or_flat(store, instance, DrawKey::changes(n), Layout::Rows);
            (revised_cascade(age, &edges, &changes), source)
        }
        SfhVariant::Regulator(params) => {
            let grid = build_grid(age, n, &instance.grid)?;
            let key = DrawKey::regulator(age, n, &params)?;
            let (levels, source) = fetch_or_flat(store, instance, key, Layout::Columns);
            let mut sfr = vec![0.0; age as usize];
            for (i, w) in grid.edges.windows(2).enumerate() {
                sfr[w[0] as usize..w[1] as usize].fill(10f64.powf(levels[i]));
            }
            (sfr, source)
        }
    };
    normalise(raw, instance.normalisation, source)
}

/// How models are laid out in a cache entry.
#[derive(Debug, Clone, Copy)]
enum Layout {
    /// One model per row (non-parametric).
    Rows,
    /// One model per column (regulator).
    Columns,
}

impl Layout {
    /// Flat draw used when the store cannot serve one: zero changes, or unit log-levels.
    fn flat_value(self) -> f64 {
        match self {
            Layout::Rows => 0.0,
            Layout::Columns => 1.0,
        }
    }
}

fn fetch_or_flat(
    store: &dyn DrawStore,
    instance: &ModelInstance,
    key: DrawKey,
    layout: Layout,
) -> (Vec<f64>, DrawSource) {
    let expected = instance.variant.module().draw_len(instance.n_levels);
    match fetch(store, instance, &key, layout, expected) {
        Ok(values) => (values, DrawSource::Cached),
        Err(status) => {
            match &status {
                CacheStatus::Unreadable(reason) => warn!("draw store: {key} unreadable ({reason}); using flat SFH"),
                _ => debug!(
                    "draw store: {key} model {} {status}; using flat SFH",
                    instance.model_index
                ),
            }
            (vec![layout.flat_value(); expected], DrawSource::Fallback(status))
        }
    }
}

fn fetch(
    store: &dyn DrawStore,
    instance: &ModelInstance,
    key: &DrawKey,
    layout: Layout,
    expected: usize,
) -> Result<Vec<f64>, CacheStatus> {
    let family = instance.variant.module().family();
    let ready = store
        .ready_family()
        .map_err(|e| CacheStatus::Unreadable(e.message().to_string()))?;
    if ready != Some(family) {
        return Err(CacheStatus::NotReady { ready });
    }

    let draws = store
        .get(key)
        .map_err(|e| CacheStatus::Unreadable(e.message().to_string()))?
        .ok_or(CacheStatus::Missing)?;

    let (models, len) = match layout {
        Layout::Rows => (draws.nrows(), draws.ncols()),
        Layout::Columns => (draws.ncols(), draws.nrows()),
    };
    if len != expected {
        return Err(CacheStatus::ShapeMismatch { expected, found: len });
    }
    let index = instance.model_index;
    if index >= models {
        return Err(CacheStatus::ModelOutOfRange {
            index,
            available: models,
        });
    }
    Ok(match layout {
        Layout::Rows => draws.row(index).iter().copied().collect(),
        Layout::Columns => draws.column(index).iter().copied().collect(),
    })
}

fn normalise(mut sfr: Vec<f64>, normalisation: Normalisation, source: DrawSource) -> Result<SfhTrack, AppError> {
    let mut integrated = sfr.iter().sum::<f64>() * YEARS_PER_STEP;
    if !(integrated.is_finite() && integrated > 0.0) {
        return Err(AppError::numeric(format!(
            "SFH integral is {integrated}; cannot normalise (draw source: {}).",
            source.label()
        )));
    }
    match normalisation {
        Normalisation::Unit => {
            sfr.iter_mut().for_each(|v| *v /= integrated);
            integrated = 1.0;
        }
        Normalisation::Amplitude(a) => {
            sfr.iter_mut().for_each(|v| *v *= a);
            integrated *= a;
        }
    }
    Ok(SfhTrack {
        sfr,
        integrated,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{GridSpec, RegulatorParams, SfhConfig, SfhModule};
    use crate::draws::{MemoryDrawStore, prepare_draws};
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn instance(variant: SfhVariant, age_form: u32, n_levels: usize) -> ModelInstance {
        ModelInstance {
            variant,
            age_form,
            n_levels,
            model_index: 0,
            normalisation: Normalisation::Unit,
            grid: GridSpec::default(),
        }
    }

    fn integral(sfr: &[f64]) -> f64 {
        sfr.iter().sum::<f64>() * YEARS_PER_STEP
    }

    #[test]
    fn every_variant_normalises_to_unit_mass() {
        for module in [SfhModule::NonparametricLegacy, SfhModule::Nonparametric, SfhModule::Regulator] {
            let mut config = SfhConfig::with_module(module);
            config.n_models = 3;
            let store = MemoryDrawStore::new();
            prepare_draws(&config, &store, &mut StdRng::seed_from_u64(3)).unwrap();
            for inst in config.instances() {
                let track = reconstruct(&store, &inst).unwrap();
                assert!(track.source.is_cached(), "{module:?}: {:?}", track.source);
                assert_eq!(track.integrated, 1.0);
                assert_relative_eq!(integral(&track.sfr), 1.0, max_relative = 1e-10);
            }
        }
    }

    #[test]
    fn output_lengths_follow_module() {
        let store = MemoryDrawStore::new();
        let np = reconstruct(&store, &instance(SfhVariant::Nonparametric { last_bin: 30 }, 1500, 5)).unwrap();
        assert_eq!(np.sfr.len(), 1501);
        let reg = reconstruct(&store, &instance(SfhVariant::Regulator(RegulatorParams::default()), 1500, 5)).unwrap();
        assert_eq!(reg.sfr.len(), 1500);
    }

    #[test]
    fn empty_store_falls_back_to_flat_sfh() {
        let store = MemoryDrawStore::new();
        let inst = instance(SfhVariant::LegacyNonparametric { last_bin: 30 }, 800, 4);
        let track = reconstruct(&store, &inst).unwrap();
        assert_eq!(
            track.source,
            DrawSource::Fallback(CacheStatus::NotReady { ready: None })
        );
        let first = track.sfr[0];
        assert!(track.sfr.iter().all(|&v| (v - first).abs() < 1e-18));
        assert_relative_eq!(first, 1.0 / (801.0 * 1e6), max_relative = 1e-12);

        store.set_ready(Some(StochasticFamily::Nonparametric)).unwrap();
        let track = reconstruct(&store, &inst).unwrap();
        assert_eq!(track.source, DrawSource::Fallback(CacheStatus::Missing));
    }

    #[test]
    fn regulator_fallback_uses_unit_log_levels() {
        let store = MemoryDrawStore::new();
        let mut inst = instance(SfhVariant::Regulator(RegulatorParams::default()), 100, 1);
        inst.normalisation = Normalisation::Amplitude(2.5);
        let track = reconstruct(&store, &inst).unwrap();
        assert!(!track.source.is_cached());
        assert_eq!(track.sfr.len(), 100);
        for &v in &track.sfr {
            assert_relative_eq!(v, 25.0, max_relative = 1e-12);
        }
        assert_relative_eq!(track.integrated, 100.0 * 10.0 * 2.5 * 1e6, max_relative = 1e-12);
    }

    #[test]
    fn shape_and_index_problems_are_reported() {
        let store = MemoryDrawStore::new();
        store.set_ready(Some(StochasticFamily::Nonparametric)).unwrap();
        // Legacy rows (n + 1) read by the revised module (n).
        store.put(&DrawKey::changes(4), &DMatrix::from_element(2, 5, 0.1)).unwrap();

        let mut inst = instance(SfhVariant::Nonparametric { last_bin: 30 }, 1000, 4);
        let track = reconstruct(&store, &inst).unwrap();
        assert_eq!(
            track.source,
            DrawSource::Fallback(CacheStatus::ShapeMismatch { expected: 4, found: 5 })
        );

        inst.variant = SfhVariant::LegacyNonparametric { last_bin: 30 };
        inst.model_index = 2;
        let track = reconstruct(&store, &inst).unwrap();
        assert_eq!(
            track.source,
            DrawSource::Fallback(CacheStatus::ModelOutOfRange { index: 2, available: 2 })
        );

        inst.model_index = 1;
        assert!(reconstruct(&store, &inst).unwrap().source.is_cached());
    }

    #[test]
    fn other_family_marker_is_not_ready() {
        let store = MemoryDrawStore::new();
        store.set_ready(Some(StochasticFamily::Nonparametric)).unwrap();
        let inst = instance(SfhVariant::Regulator(RegulatorParams::default()), 1000, 3);
        let track = reconstruct(&store, &inst).unwrap();
        assert_eq!(
            track.source,
            DrawSource::Fallback(CacheStatus::NotReady {
                ready: Some(StochasticFamily::Nonparametric)
            })
        );
        assert!(track.sfr.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn regulator_levels_are_exponentiated_per_bin() {
        let store = MemoryDrawStore::new();
        let params = RegulatorParams::default();
        let key = DrawKey::regulator(100, 1, &params).unwrap();
        // Grid for age 100 and one bin: edges 0, 90, 100.
        store.put(&key, &DMatrix::from_column_slice(2, 1, &[0.0, 1.0])).unwrap();
        store.set_ready(Some(StochasticFamily::Regulator)).unwrap();

        let mut inst = instance(SfhVariant::Regulator(params), 100, 1);
        inst.normalisation = Normalisation::Amplitude(2.0);
        let track = reconstruct(&store, &inst).unwrap();
        assert!(track.source.is_cached());
        assert_relative_eq!(track.sfr[0], 2.0);
        assert_relative_eq!(track.sfr[89], 2.0);
        assert_relative_eq!(track.sfr[90], 20.0);
        assert_relative_eq!(track.sfr[99], 20.0);
        // Raw integral: (90 + 10·10) Myr at 1 Msolar/yr, times the amplitude.
        assert_relative_eq!(track.integrated, 2.0 * 190.0 * 1e6);
    }

    #[test]
    fn reconstruction_is_deterministic_for_a_fixed_store() {
        let mut config = SfhConfig::with_module(SfhModule::Nonparametric);
        config.n_models = 2;
        let store = MemoryDrawStore::new();
        prepare_draws(&config, &store, &mut StdRng::seed_from_u64(21)).unwrap();
        let inst = config.instance(1, None, None).unwrap();
        let a = reconstruct(&store, &inst).unwrap();
        let b = reconstruct(&store, &inst).unwrap();
        assert_eq!(a.sfr, b.sfr);
        assert_eq!(a.integrated.to_bits(), b.integrated.to_bits());
    }

    #[test]
    fn zero_amplitude_keeps_zero_integral() {
        let store = MemoryDrawStore::new();
        let mut inst = instance(SfhVariant::Nonparametric { last_bin: 30 }, 300, 3);
        inst.normalisation = Normalisation::Amplitude(0.0);
        let track = reconstruct(&store, &inst).unwrap();
        assert_eq!(track.integrated, 0.0);
        assert!(track.sfr.iter().all(|&v| v == 0.0));
    }
}
