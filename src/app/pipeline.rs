//! Shared workflows behind the subcommands.
//!
//! precompute -> reconstruct (one instance or a parallel sweep)
//! results + template -> reconcile -> quench detection
//!
//! Handlers in `app` only load inputs, call these and print.

use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;

use crate::analysis::{detect_quench, reconcile};
use crate::domain::{ModelInstance, ResultsRecord, SfhConfig, StochasticFamily, TemplateSfh};
use crate::draws::{DrawStore, Namespace, PrepareSummary, prepare_draws};
use crate::error::AppError;
use crate::io::load_template;
use crate::math::{Cosmology, MassReturnKernel};
use crate::report::{ObjectAnalysis, SkippedObject, SweepRow};
use crate::sfh::{SfhTrack, reconstruct};

/// Placeholder in a template path that is replaced by the object id.
pub const ID_PLACEHOLDER: &str = "{id}";

/// Run the precompute pass. `seed` overrides the configuration's seed.
pub fn run_prepare(config: &SfhConfig, store: &dyn DrawStore, seed: Option<u64>) -> Result<PrepareSummary, AppError> {
    let seed = seed.or(config.seed);
    let mut rng = match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => {
            debug!("no seed given; drawing from entropy");
            StdRng::from_entropy()
        }
    };
    prepare_draws(config, store, &mut rng)
}

/// Delete a family's draws. If that family is marked ready the marker is cleared
/// first, so readers fall back instead of seeing a partial store.
/// Returns whether the marker was cleared.
pub fn run_purge(store: &dyn DrawStore, family: StochasticFamily) -> Result<bool, AppError> {
    let cleared = store.ready_family()? == Some(family);
    if cleared {
        store.set_ready(None)?;
    }
    let namespace = Namespace::of_family(family);
    store.purge(namespace)?;
    info!("purged {} draws from {}", namespace.as_str(), store.describe());
    Ok(cleared)
}

/// Reconstruct one instance of the configuration.
pub fn run_reconstruct(
    config: &SfhConfig,
    store: &dyn DrawStore,
    model_index: usize,
    age_form: Option<u32>,
    n_levels: Option<usize>,
) -> Result<(ModelInstance, SfhTrack), AppError> {
    let instance = config.instance(model_index, age_form, n_levels)?;
    let track = reconstruct(store, &instance)?;
    Ok((instance, track))
}

/// Reconstruct every instance in parallel. The first hard error aborts the sweep.
pub fn run_sweep(config: &SfhConfig, store: &dyn DrawStore) -> Result<Vec<SweepRow>, AppError> {
    config.validate()?;
    let instances = config.instances();
    info!("sweeping {} instances", instances.len());

    instances
        .into_par_iter()
        .map(|instance| -> Result<SweepRow, AppError> {
            let track = reconstruct(store, &instance)?;
            let peak_sfr = track.sfr.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            Ok(SweepRow {
                instance,
                integrated: track.integrated,
                peak_sfr,
                source: track.source,
            })
        })
        .collect()
}

/// Where the template SFH of each object comes from.
#[derive(Debug, Clone)]
pub enum TemplateSource {
    /// One template shared by every object.
    Shared(TemplateSfh),
    /// A path pattern containing `{id}`.
    PerObject(String),
}

impl TemplateSource {
    /// Load a shared template now, or defer per-object loading.
    pub fn open(path: &str) -> Result<Self, AppError> {
        if path.contains(ID_PLACEHOLDER) {
            Ok(TemplateSource::PerObject(path.to_string()))
        } else {
            Ok(TemplateSource::Shared(load_template(Path::new(path))?))
        }
    }

    fn for_object(&self, id: &str) -> Result<TemplateSfh, AppError> {
        match self {
            TemplateSource::Shared(t) => Ok(t.clone()),
            TemplateSource::PerObject(pattern) => {
                load_template(&PathBuf::from(pattern.replace(ID_PLACEHOLDER, id)))
            }
        }
    }
}

/// Outputs of a quenching analysis over many objects.
#[derive(Debug, Clone, Default)]
pub struct QuenchRun {
    pub analyses: Vec<ObjectAnalysis>,
    pub skipped: Vec<SkippedObject>,
}

/// Reconcile and analyse one object.
pub fn analyse_object(
    record: &ResultsRecord,
    template: &TemplateSfh,
    cosmology: &Cosmology,
    kernel: &MassReturnKernel,
) -> Result<ObjectAnalysis, AppError> {
    let growth = reconcile(template, record, cosmology, kernel)?;
    let event = detect_quench(&growth.cosmic_time, &growth.log_ssfr)?;
    Ok(ObjectAnalysis {
        record: record.clone(),
        growth,
        event,
    })
}

/// Analyse every record in parallel. Objects that fail are skipped and reported,
/// in input order.
pub fn run_quench(
    records: &[ResultsRecord],
    templates: &TemplateSource,
    cosmology: &Cosmology,
    kernel: &MassReturnKernel,
) -> QuenchRun {
    let outcomes: Vec<Result<ObjectAnalysis, SkippedObject>> = records
        .par_iter()
        .map(|record| {
            templates
                .for_object(&record.id)
                .and_then(|template| analyse_object(record, &template, cosmology, kernel))
                .map_err(|e| SkippedObject {
                    id: record.id.clone(),
                    message: e.message().to_string(),
                })
        })
        .collect();

    let mut run = QuenchRun::default();
    for outcome in outcomes {
        match outcome {
            Ok(a) => run.analyses.push(a),
            Err(s) => {
                warn!("skipping object {}: {}", s.id, s.message);
                run.skipped.push(s);
            }
        }
    }
    info!(
        "analysed {} objects ({} skipped)",
        run.analyses.len(),
        run.skipped.len()
    );
    run
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SfhModule, StochasticFamily};
    use crate::draws::MemoryDrawStore;
    use approx::assert_relative_eq;

    fn regulator_config() -> SfhConfig {
        let mut config = SfhConfig::with_module(SfhModule::Regulator);
        config.age_form = vec![200];
        config.n_levels = vec![3];
        config.n_models = 2;
        config.seed = Some(7);
        config
    }

    fn record(id: &str, age_form: f64) -> ResultsRecord {
        ResultsRecord {
            id: id.to_string(),
            mass_best: 1e10,
            mass_bayes: 2e10,
            redshift: 0.5,
            age_form,
        }
    }

    #[test]
    fn prepare_reconstruct_reconcile_detect() {
        let config = regulator_config();
        let store = MemoryDrawStore::new();
        run_prepare(&config, &store, None).unwrap();
        assert_eq!(store.ready_family().unwrap(), Some(StochasticFamily::Regulator));

        let (instance, track) = run_reconstruct(&config, &store, 1, None, None).unwrap();
        assert_eq!(instance.model_index, 1);
        assert!(track.source.is_cached());
        assert_eq!(track.sfr.len(), 200);
        assert_relative_eq!(track.integrated, 1.0, max_relative = 1e-9);

        let template = TemplateSfh {
            time: (0..track.sfr.len()).map(|i| i as f64).collect(),
            sfr: track.sfr.clone(),
        };
        let analysis = analyse_object(
            &record("g1", 200.0),
            &template,
            &Cosmology::default(),
            &MassReturnKernel::Analytic,
        )
        .unwrap();
        let mass = &analysis.growth.mass;
        assert_relative_eq!(mass[mass.len() - 1], 2e10, max_relative = 1e-9);
        assert!(analysis.growth.cosmic_time[0] > 0.0);
        if let Some(q) = analysis.event.quench_time {
            assert!(analysis.growth.cosmic_time.contains(&q));
        }
    }

    #[test]
    fn sweep_covers_every_instance_and_reports_fallbacks() {
        let config = regulator_config();
        let store = MemoryDrawStore::new();

        let cold = run_sweep(&config, &store).unwrap();
        assert_eq!(cold.len(), 2);
        assert!(cold.iter().all(|r| !r.source.is_cached()));

        run_prepare(&config, &store, Some(3)).unwrap();
        let warm = run_sweep(&config, &store).unwrap();
        assert!(warm.iter().all(|r| r.source.is_cached()));
        for row in &warm {
            assert_relative_eq!(row.integrated, 1.0, max_relative = 1e-9);
            assert!(row.peak_sfr > 0.0);
        }
    }

    #[test]
    fn seed_argument_overrides_config_seed() {
        let config = regulator_config();
        let a = MemoryDrawStore::new();
        let b = MemoryDrawStore::new();
        run_prepare(&config, &a, Some(11)).unwrap();
        run_prepare(&config, &b, Some(11)).unwrap();
        let (_, ta) = run_reconstruct(&config, &a, 0, None, None).unwrap();
        let (_, tb) = run_reconstruct(&config, &b, 0, None, None).unwrap();
        assert_eq!(ta.sfr, tb.sfr);
    }

    #[test]
    fn purging_the_ready_family_clears_the_marker() {
        let config = regulator_config();
        let store = MemoryDrawStore::new();
        run_prepare(&config, &store, None).unwrap();
        assert!(!store.is_empty());

        assert!(!run_purge(&store, StochasticFamily::Nonparametric).unwrap());
        assert_eq!(store.ready_family().unwrap(), Some(StochasticFamily::Regulator));
        assert!(!store.is_empty());

        assert!(run_purge(&store, StochasticFamily::Regulator).unwrap());
        assert_eq!(store.ready_family().unwrap(), None);
        assert!(store.is_empty());

        let (_, track) = run_reconstruct(&config, &store, 0, None, None).unwrap();
        assert!(!track.source.is_cached());
    }

    #[test]
    fn failing_objects_are_skipped_in_order() {
        let template = TemplateSfh {
            time: vec![0.0, 50.0, 100.0],
            sfr: vec![1.0, 1.0, 1.0],
        };
        let records = vec![record("ok", 100.0), record("bad", -1.0)];
        let run = run_quench(
            &records,
            &TemplateSource::Shared(template),
            &Cosmology::default(),
            &MassReturnKernel::Analytic,
        );
        assert_eq!(run.analyses.len(), 1);
        assert_eq!(run.analyses[0].record.id, "ok");
        assert_eq!(run.skipped.len(), 1);
        assert_eq!(run.skipped[0].id, "bad");
    }

    #[test]
    fn per_object_templates_are_resolved_by_id() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sfh_g1.csv"), "time,sfr\n0,1\n50,1\n100,1\n").unwrap();
        let pattern = dir.path().join("sfh_{id}.csv").display().to_string();
        let source = TemplateSource::open(&pattern).unwrap();
        assert!(matches!(source, TemplateSource::PerObject(_)));

        let records = vec![record("g1", 100.0), record("g2", 100.0)];
        let run = run_quench(&records, &source, &Cosmology::default(), &MassReturnKernel::Analytic);
        assert_eq!(run.analyses.len(), 1);
        assert_eq!(run.skipped[0].id, "g2");
    }
}
