//! Mass-consistency resampling of a template SFH onto cosmic time.
//!
//! The fitting run stores its best SFH on an arbitrary time axis (maximum 1) and
//! normalises it with the best-fit mass. Here we:
//!
//! 1. stretch the template over `[age(z) - age_form, age(z)]` and resample it onto a
//!    1 Myr grid by nearest neighbour,
//! 2. rescale to the Bayesian mass convention,
//! 3. correct for stellar mass loss so the mass still in stars at observation is
//!    exactly `mass_bayes`,
//! 4. accumulate the surviving mass at every step and form `log10(SFR / M)`.

use rayon::prelude::*;

use crate::domain::{MassGrowth, ResultsRecord, TemplateSfh};
use crate::error::AppError;
use crate::math::{Cosmology, MassReturnKernel};
use crate::sfh::YEARS_PER_STEP;

pub fn reconcile(
    template: &TemplateSfh,
    record: &ResultsRecord,
    cosmology: &Cosmology,
    kernel: &MassReturnKernel,
) -> Result<MassGrowth, AppError> {
    validate_inputs(template, record)?;

    let cosmic_age = cosmology.age_myr(record.redshift)?;
    let t_max = template.time.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let onset = cosmic_age - record.age_form;
    let spaced: Vec<f64> = template
        .time
        .iter()
        .map(|&t| t * record.age_form / t_max + onset)
        .collect();

    let start = spaced[0].round_ties_even();
    let end = spaced[spaced.len() - 1].round_ties_even();
    if !(end >= start) {
        return Err(AppError::data(format!("[{}] Rescaled template spans no whole Myr ({start}..{end}).", record.id)));
    }
    let n = (end - start) as usize + 1;
    let cosmic_time: Vec<f64> = (0..n).map(|i| start + i as f64).collect();

    let mass_ratio = record.mass_bayes / record.mass_best;
    let mut sfr: Vec<f64> = cosmic_time
        .iter()
        .map(|&t| template.sfr[nearest_index(&spaced, t)] * mass_ratio)
        .collect();

    let retained = kernel.values(n)?;
    let surviving = YEARS_PER_STEP
        * retained
            .iter()
            .zip(sfr.iter().rev())
            .map(|(k, s)| k * s)
            .sum::<f64>();
    if !(surviving.is_finite() && surviving > 0.0) {
        return Err(AppError::numeric(format!(
            "[{}] Surviving stellar mass of the resampled SFH is {surviving}; cannot rescale.",
            record.id
        )));
    }
    let correction = record.mass_bayes / surviving;
    sfr.iter_mut().for_each(|v| *v *= correction);

    let mass: Vec<f64> = (0..n)
        .into_par_iter()
        .map(|i| {
            YEARS_PER_STEP
                * sfr[..=i]
                    .iter()
                    .zip(retained[..=i].iter().rev())
                    .map(|(s, k)| s * k)
                    .sum::<f64>()
        })
        .collect();

    // No stars formed yet: sSFR is undefined, treat it as fully quiescent.
    let log_ssfr = sfr
        .iter()
        .zip(&mass)
        .map(|(s, m)| if *m > 0.0 { (s / m).log10() } else { f64::NEG_INFINITY })
        .collect();

    Ok(MassGrowth {
        cosmic_time,
        sfr,
        mass,
        log_ssfr,
    })
}

/// Index of the sample in `sorted` closest to `x`; the first one on ties.
pub fn nearest_index(sorted: &[f64], x: f64) -> usize {
    let upper = sorted.partition_point(|&s| s < x);
    let mut best = if upper == 0 {
        0
    } else if upper == sorted.len() {
        sorted.len() - 1
    } else if x - sorted[upper - 1] <= sorted[upper] - x {
        upper - 1
    } else {
        upper
    };
    while best > 0 && sorted[best - 1] == sorted[best] {
        best -= 1;
    }
    best
}

fn validate_inputs(template: &TemplateSfh, record: &ResultsRecord) -> Result<(), AppError> {
    let id = &record.id;
    if template.time.is_empty() {
        return Err(AppError::data("Template SFH has no samples."));
    }
    if template.time.len() != template.sfr.len() {
        return Err(AppError::data(format!(
            "Template SFH has {} times but {} SFR values.",
            template.time.len(),
            template.sfr.len()
        )));
    }
    if template.time.iter().chain(&template.sfr).any(|v| !v.is_finite()) {
        return Err(AppError::data("Template SFH contains non-finite values."));
    }
    if template.time.windows(2).any(|w| w[1] < w[0]) {
        return Err(AppError::data("Template SFH times must be non-decreasing."));
    }
    if template.time.iter().all(|&t| t <= 0.0) {
        return Err(AppError::data("Template SFH time axis has no positive maximum."));
    }
    for (name, v) in [
        ("best stellar mass", record.mass_best),
        ("bayesian stellar mass", record.mass_bayes),
        ("formation age", record.age_form),
    ] {
        if !(v.is_finite() && v > 0.0) {
            return Err(AppError::data(format!("[{id}] {name} must be finite and > 0 (got {v}).")));
        }
    }
    Ok(())
}
