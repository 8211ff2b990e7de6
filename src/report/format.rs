//! Terminal formatting for every subcommand.
//!
//! Formatting lives here so the numerical code stays free of presentation and output
//! changes stay localized.

use crate::domain::{INSTANT_TURNOFF, ModelInstance, Normalisation, SfhConfig, SfhModule, SfhVariant, StochasticFamily};
use crate::draws::{Namespace, PrepareSummary};
use crate::report::{ObjectAnalysis, SkippedObject, SweepRow, sweep_stats};
use crate::sfh::SfhTrack;

/// Compact description of a variant's parameters.
pub fn variant_label(variant: &SfhVariant) -> String {
    match variant {
        SfhVariant::LegacyNonparametric { last_bin } | SfhVariant::Nonparametric { last_bin } => {
            format!("last_bin={last_bin}")
        }
        SfhVariant::Regulator(p) => format!(
            "sigma_reg={:.4} tau_eq={} tau_in={} sigma_dyn={:.4} tau_dyn={}",
            p.sigma_reg, p.tau_eq, p.tau_in, p.sigma_dyn, p.tau_dyn
        ),
    }
}

fn normalisation_label(n: Normalisation) -> String {
    match n {
        Normalisation::Unit => "unit mass".to_string(),
        Normalisation::Amplitude(a) => format!("amplitude sfr_a={a}"),
    }
}

/// Summary printed by `sfh check`.
pub fn format_check(config: &SfhConfig, store: &str, ready: Option<StochasticFamily>) -> String {
    let mut out = String::new();
    out.push_str("=== sfh - configuration check ===\n");
    out.push_str(&format!("Module: {}\n", config.module.display_name()));
    out.push_str(&format!("Ages (Myr): {}\n", fmt_list(&config.age_form)));
    out.push_str(&format!("Bins: {}\n", fmt_list(&config.n_levels)));
    match config.module {
        SfhModule::NonparametricLegacy | SfhModule::Nonparametric => {
            out.push_str(&format!(
                "Last bin (Myr): {} | scale_factor={}\n",
                fmt_list(&config.last_bin),
                config.scale_factor
            ));
        }
        SfhModule::Regulator => {
            out.push_str(&format!(
                "Regulator: sigma_reg={} tau_eq={} tau_in={} sigma_dyn={} tau_dyn={}\n",
                fmt_list(&config.sigma_reg),
                fmt_list(&config.tau_eq),
                fmt_list(&config.tau_in),
                fmt_list(&config.sigma_dyn),
                fmt_list(&config.tau_dyn)
            ));
            out.push_str(&format!(
                "Grid: final_bin={} recent_edge={}\n",
                config.grid.final_bin, config.grid.recent_edge
            ));
        }
    }
    out.push_str(&format!("Normalisation: {}\n", normalisation_label(config.normalisation())));
    out.push_str(&format!(
        "Combinations: {} x {} models = {} instances\n",
        config.combination_count(),
        config.n_models,
        config.combination_count() * config.n_models
    ));

    let family = config.module.family();
    let status = match ready {
        Some(f) if f == family => "ready".to_string(),
        Some(f) => format!("holds {} draws (run `sfh prepare`)", f.as_str()),
        None => "not prepared (reconstruction will use flat SFHs)".to_string(),
    };
    out.push_str(&format!("Draw store: {store} | {status}\n"));
    out
}

/// Summary printed by `sfh prepare`.
pub fn format_prepare(summary: &PrepareSummary, store: &str, seed: Option<u64>, elapsed_secs: f64) -> String {
    let mut out = String::new();
    out.push_str("=== sfh - precompute ===\n");
    out.push_str(&format!("Family: {}\n", summary.family.as_str()));
    out.push_str(&format!("Store: {store}\n"));
    out.push_str(&format!(
        "Seed: {}\n",
        seed.map(|s| s.to_string()).unwrap_or_else(|| "entropy".to_string())
    ));
    out.push_str(&format!(
        "Entries written: {} ({} models each)\n",
        summary.entries_written, summary.n_models
    ));
    for ns in &summary.purged {
        out.push_str(&format!("Purged: {}\n", ns.as_str()));
    }
    if summary.uniform_grids > 0 {
        out.push_str(&format!("Uniform-fallback grids: {}\n", summary.uniform_grids));
    }
    out.push_str(&format!("Elapsed: {elapsed_secs:.2}s\n"));
    out
}

/// Summary printed by `sfh purge`.
pub fn format_purge(family: StochasticFamily, store: &str, marker_cleared: bool) -> String {
    let mut out = String::new();
    out.push_str("=== sfh - purge ===\n");
    out.push_str(&format!(
        "Removed {} draws ({}) from {store}\n",
        family.as_str(),
        Namespace::of_family(family).as_str()
    ));
    if marker_cleared {
        out.push_str("Readiness marker cleared (run `sfh prepare` again).\n");
    }
    out
}

/// Summary printed by `sfh reconstruct`.
pub fn format_track(instance: &ModelInstance, track: &SfhTrack) -> String {
    let mut out = String::new();
    out.push_str("=== sfh - reconstruction ===\n");
    out.push_str(&format!(
        "Module: {} ({})\n",
        instance.variant.module().display_name(),
        variant_label(&instance.variant)
    ));
    out.push_str(&format!(
        "age_form={} Myr | n_levels={} | model={}\n",
        instance.age_form, instance.n_levels, instance.model_index
    ));
    out.push_str(&format!("Draws: {}\n", track.source.label()));
    out.push_str(&format!("Samples: {} (1 Myr each)\n", track.sfr.len()));

    let (min, max) = min_max(&track.sfr);
    out.push_str(&format!("SFR range: [{min:.4e}, {max:.4e}] Msolar/yr\n"));
    out.push_str(&format!(
        "Integrated: {:.6e} Msolar ({})\n",
        track.integrated,
        normalisation_label(instance.normalisation)
    ));

    // Ten evenly spaced samples, formation first.
    let n = track.sfr.len();
    if n > 0 {
        out.push_str("\nSamples (Myr since formation -> SFR):\n");
        let picks = 10.min(n);
        for k in 0..picks {
            let i = if picks == 1 { 0 } else { k * (n - 1) / (picks - 1) };
            out.push_str(&format!("  {i:>6}  {:.6e}\n", track.sfr[i]));
        }
    }
    out
}

/// Summary printed by `sfh sweep`.
pub fn format_sweep(rows: &[SweepRow], elapsed_secs: f64) -> String {
    let stats = sweep_stats(rows);
    let mut out = String::new();
    out.push_str("=== sfh - sweep ===\n");
    out.push_str(&format!(
        "Instances: {} | cached: {} | fallback: {}\n",
        stats.total,
        stats.cached,
        stats.total - stats.cached
    ));
    for (kind, count) in &stats.fallbacks {
        out.push_str(&format!("  fallback {kind}: {count}\n"));
    }

    if !rows.is_empty() {
        let integrals: Vec<f64> = rows.iter().map(|r| r.integrated).collect();
        let peaks: Vec<f64> = rows.iter().map(|r| r.peak_sfr).collect();
        let (imin, imax) = min_max(&integrals);
        let (pmin, pmax) = min_max(&peaks);
        out.push_str(&format!("Integrated mass: [{imin:.6e}, {imax:.6e}] Msolar\n"));
        out.push_str(&format!("Peak SFR: [{pmin:.4e}, {pmax:.4e}] Msolar/yr\n"));
    }
    out.push_str(&format!("Elapsed: {elapsed_secs:.2}s\n"));
    out
}

/// Per-object table printed by `sfh quench`.
pub fn format_quench(analyses: &[ObjectAnalysis], skipped: &[SkippedObject], kernel: &str) -> String {
    let mut out = String::new();
    out.push_str("=== sfh - quenching analysis ===\n");
    out.push_str(&format!("Mass-return kernel: {kernel}\n\n"));

    out.push_str(
        format!(
            "{:<20} {:>10} {:>12} {:>12} {:>12} {:>12}\n",
            "id", "z", "M_bayes", "t_start", "t_quench", "t_turnoff"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(
        format!(
            "{:-<20} {:-<10} {:-<12} {:-<12} {:-<12} {:-<12}\n",
            "", "", "", "", "", ""
        )
        .trim_end(),
    );
    out.push('\n');

    for a in analyses {
        let start = a.growth.cosmic_time.first().copied().unwrap_or(f64::NAN);
        let quench = a
            .event
            .quench_time
            .map(|t| format!("{t:.0}"))
            .unwrap_or_else(|| "-".to_string());
        let turnoff = match a.event.quench_time {
            Some(_) => format!("{:.0}", a.event.sf_turnoff_or_sentinel()),
            None => "-".to_string(),
        };
        out.push_str(
            format!(
                "{:<20} {:>10.4} {:>12.4e} {:>12.0} {:>12} {:>12}\n",
                truncate(&a.record.id, 20),
                a.record.redshift,
                a.record.mass_bayes,
                start,
                quench,
                turnoff
            )
            .trim_end(),
        );
        out.push('\n');
    }

    let quenched = analyses.iter().filter(|a| a.event.quench_time.is_some()).count();
    let instant = analyses
        .iter()
        .filter(|a| a.event.quench_time.is_some() && a.event.sf_turnoff_or_sentinel() == INSTANT_TURNOFF)
        .count();
    out.push_str(&format!(
        "\nQuenched: {quenched}/{} (instantaneous turn-off: {instant})\n",
        analyses.len()
    ));
    for s in skipped {
        out.push_str(&format!("  (skipped {}) {}\n", s.id, s.message));
    }
    out
}

fn min_max(values: &[f64]) -> (f64, f64) {
    values.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
        (lo.min(v), hi.max(v))
    })
}

fn fmt_list<T: std::fmt::Display>(v: &[T]) -> String {
    let parts: Vec<String> = v.iter().map(|x| x.to_string()).collect();
    format!("[{}]", parts.join(", "))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}
