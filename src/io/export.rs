//! Exports: single tracks and sweep summaries as CSV, mass-growth tables as JSON.
//!
//! CSVs are plain and header-first so they load directly in spreadsheets or pandas.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::domain::{MassGrowthTable, ModelInstance};
use crate::error::AppError;
use crate::report::{ObjectAnalysis, SweepRow, variant_label};
use crate::sfh::SfhTrack;

fn create(path: &Path, what: &str) -> Result<BufWriter<File>, AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::config(format!("Failed to create {what} '{}': {e}", path.display())))?;
    Ok(BufWriter::new(file))
}

fn write_err(what: &str) -> impl Fn(std::io::Error) -> AppError + '_ {
    move |e| AppError::config(format!("Failed to write {what}: {e}"))
}

/// Write one reconstructed SFH, formation first.
pub fn write_track_csv(path: &Path, instance: &ModelInstance, track: &SfhTrack) -> Result<(), AppError> {
    let mut w = create(path, "track CSV")?;
    let err = write_err("track CSV");

    writeln!(
        w,
        "# module={} {} age_form={} n_levels={} model={} integrated={:.10e} draws={}",
        instance.variant.module().display_name(),
        variant_label(&instance.variant),
        instance.age_form,
        instance.n_levels,
        instance.model_index,
        track.integrated,
        track.source.label()
    )
    .map_err(&err)?;
    writeln!(w, "time_myr,sfr").map_err(&err)?;
    for (i, v) in track.sfr.iter().enumerate() {
        writeln!(w, "{i},{v:.10e}").map_err(&err)?;
    }
    w.flush().map_err(&err)?;
    Ok(())
}

/// Write one row per swept instance.
pub fn write_sweep_csv(path: &Path, rows: &[SweepRow]) -> Result<(), AppError> {
    let mut w = create(path, "sweep CSV")?;
    let err = write_err("sweep CSV");

    writeln!(w, "module,params,age_form,n_levels,model_index,integrated,peak_sfr,source").map_err(&err)?;
    for r in rows {
        let inst = &r.instance;
        writeln!(
            w,
            "{},{},{},{},{},{:.10e},{:.10e},{}",
            inst.variant.module().display_name(),
            variant_label(&inst.variant),
            inst.age_form,
            inst.n_levels,
            inst.model_index,
            r.integrated,
            r.peak_sfr,
            r.source.label().replace(',', ";")
        )
        .map_err(&err)?;
    }
    w.flush().map_err(&err)?;
    Ok(())
}

/// Mass-growth table plus the transition times detected on it.
#[derive(Debug, Serialize)]
pub struct GrowthExport {
    #[serde(flatten)]
    pub table: MassGrowthTable,
    pub quench_time: Option<f64>,
    /// `-999` when the departure is not resolved.
    pub sf_turnoff_time: Option<f64>,
}

impl GrowthExport {
    pub fn new(analysis: &ObjectAnalysis) -> Self {
        let event = &analysis.event;
        Self {
            table: MassGrowthTable::new(&analysis.record.id, &analysis.growth),
            quench_time: event.quench_time,
            sf_turnoff_time: event.quench_time.map(|_| event.sf_turnoff_or_sentinel()),
        }
    }
}

/// Write every object's growth table as a JSON array.
pub fn write_growth_json(path: &Path, analyses: &[ObjectAnalysis]) -> Result<(), AppError> {
    let w = create(path, "mass-growth JSON")?;
    let exports: Vec<GrowthExport> = analyses.iter().map(GrowthExport::new).collect();
    serde_json::to_writer_pretty(w, &exports)
        .map_err(|e| AppError::config(format!("Failed to write mass-growth JSON: {e}")))?;
    Ok(())
}
