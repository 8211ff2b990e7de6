//! Reporting: per-run result records and their terminal formatting.

use std::collections::BTreeMap;

use crate::domain::{MassGrowth, ModelInstance, QuenchEvent, ResultsRecord};
use crate::sfh::DrawSource;

pub mod format;

pub use format::*;

/// One reconstructed instance of a sweep.
#[derive(Debug, Clone)]
pub struct SweepRow {
    pub instance: ModelInstance,
    pub integrated: f64,
    pub peak_sfr: f64,
    pub source: DrawSource,
}

/// Cached/fallback tallies over a sweep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepStats {
    pub total: usize,
    pub cached: usize,
    /// `CacheStatus::kind` -> count.
    pub fallbacks: BTreeMap<String, usize>,
}

pub fn sweep_stats(rows: &[SweepRow]) -> SweepStats {
    let mut stats = SweepStats {
        total: rows.len(),
        ..SweepStats::default()
    };
    for row in rows {
        match &row.source {
            DrawSource::Cached => stats.cached += 1,
            DrawSource::Fallback(status) => {
                *stats.fallbacks.entry(status.kind().to_string()).or_insert(0) += 1;
            }
        }
    }
    stats
}

/// Reconciled growth history and transition times of one fitted object.
#[derive(Debug, Clone)]
pub struct ObjectAnalysis {
    pub record: ResultsRecord,
    pub growth: MassGrowth,
    pub event: QuenchEvent,
}

/// An object the analysis could not process.
#[derive(Debug, Clone)]
pub struct SkippedObject {
    pub id: String,
    pub message: String,
}
