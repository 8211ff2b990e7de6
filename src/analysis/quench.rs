//! Quiescence and main-sequence departure times from a specific-SFR track.
//!
//! Thresholds scale with the age of the universe at each step:
//!
//! - quiescent below `log10(0.2 / t)` (t in yr)
//! - main sequence above `log10(1 / t)`
//!
//! A drop below the quiescent threshold only counts as quenching if the track stays
//! down for longer than 20% of the crossing time, or never comes back.

use crate::domain::QuenchEvent;
use crate::error::AppError;

/// Quiescent threshold numerator (`sSFR · t`).
pub const QUIESCENT_SSFR_AGE: f64 = 0.2;
/// Main-sequence threshold numerator.
pub const MAIN_SEQUENCE_SSFR_AGE: f64 = 1.0;
/// Minimum excursion below the quiescent threshold, as a fraction of its start time.
pub const PERSISTENCE_FRACTION: f64 = 0.2;
/// Upward crossings at or before this time (Myr) are ignored.
const FORMATION_GUARD_MYR: f64 = 1.0;

const YEARS_PER_MYR: f64 = 1e6;

pub fn detect_quench(cosmic_time: &[f64], log_ssfr: &[f64]) -> Result<QuenchEvent, AppError> {
    if cosmic_time.len() != log_ssfr.len() {
        return Err(AppError::data(format!(
            "sSFR track has {} times but {} values.",
            cosmic_time.len(),
            log_ssfr.len()
        )));
    }
    if cosmic_time.len() < 2 {
        return Err(AppError::data("sSFR track needs at least two samples."));
    }
    if let Some(t) = cosmic_time.iter().find(|t| !(t.is_finite() && **t > 0.0)) {
        return Err(AppError::data(format!("Cosmic times must be finite and > 0 (got {t}).")));
    }

    if log_ssfr.iter().any(|v| v.is_nan()) {
        return Err(AppError::data("sSFR track contains NaN values."));
    }

    let quench_time = find_quench(cosmic_time, log_ssfr);
    let sf_turnoff_time = quench_time.and_then(|q| find_turnoff(cosmic_time, log_ssfr, q));
    Ok(QuenchEvent {
        quench_time,
        sf_turnoff_time,
    })
}

fn offsets(cosmic_time: &[f64], log_ssfr: &[f64], numerator: f64) -> Vec<f64> {
    cosmic_time
        .iter()
        .zip(log_ssfr)
        .map(|(&t, &s)| s - (numerator / (t * YEARS_PER_MYR)).log10())
        .collect()
}

fn find_quench(cosmic_time: &[f64], log_ssfr: &[f64]) -> Option<f64> {
    let diff = offsets(cosmic_time, log_ssfr, QUIESCENT_SSFR_AGE);
    let last = cosmic_time.len() - 1;

    let mut downs = Vec::new();
    let mut ups = Vec::new();
    for i in 1..last {
        if diff[i] * diff[i + 1] < 0.0 {
            if diff[i] > diff[i + 1] {
                downs.push(cosmic_time[i]);
            } else if cosmic_time[i] > FORMATION_GUARD_MYR {
                ups.push(cosmic_time[i]);
            }
        }
    }
    let end = cosmic_time[last];
    ups.push(end);

    downs.into_iter().find(|&down| {
        let up = ups.iter().copied().find(|&u| u > down).unwrap_or(end);
        up == end || up - down > PERSISTENCE_FRACTION * down
    })
}

/// Last main-sequence crossing strictly before `quench_time`.
fn find_turnoff(cosmic_time: &[f64], log_ssfr: &[f64], quench_time: f64) -> Option<f64> {
    let diff = offsets(cosmic_time, log_ssfr, MAIN_SEQUENCE_SSFR_AGE);
    (0..cosmic_time.len() - 1)
        .rev()
        .find(|&i| cosmic_time[i] < quench_time && diff[i] * diff[i + 1] < 0.0)
        .map(|i| cosmic_time[i])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::INSTANT_TURNOFF;

    fn times() -> Vec<f64> {
        (1..=3000).map(f64::from).collect()
    }

    fn quiescent(t: f64) -> f64 {
        (0.2 / (t * 1e6)).log10()
    }

    fn main_sequence(t: f64) -> f64 {
        (1.0 / (t * 1e6)).log10()
    }

    #[test]
    fn single_persistent_drop_is_the_quench_time() {
        let t = times();
        let ssfr: Vec<f64> = t.iter().map(|&t| if t <= 1000.0 { -9.0 } else { -12.0 }).collect();
        let event = detect_quench(&t, &ssfr).unwrap();
        assert_eq!(event.quench_time, Some(1000.0));
    }

    #[test]
    fn brief_dip_is_skipped_for_later_persistent_drop() {
        let t = times();
        let ssfr: Vec<f64> = t
            .iter()
            .map(|&t| {
                let below = (t > 1000.0 && t <= 1100.0) || t > 2000.0;
                quiescent(t) + if below { -0.5 } else { 0.5 }
            })
            .collect();
        let event = detect_quench(&t, &ssfr).unwrap();
        assert_eq!(event.quench_time, Some(2000.0));
    }

    #[test]
    fn long_dip_counts_even_if_track_recovers() {
        let t = times();
        let ssfr: Vec<f64> = t
            .iter()
            .map(|&t| quiescent(t) + if t > 1000.0 && t <= 1300.0 { -0.5 } else { 0.5 })
            .collect();
        let event = detect_quench(&t, &ssfr).unwrap();
        assert_eq!(event.quench_time, Some(1000.0));
    }

    #[test]
    fn no_main_sequence_crossing_gives_instant_turnoff() {
        let t = times();
        // Between the two thresholds, then quiescent after 1000 Myr.
        let ssfr: Vec<f64> = t
            .iter()
            .map(|&t| if t <= 1000.0 { main_sequence(t) - 0.3 } else { main_sequence(t) - 2.0 })
            .collect();
        let event = detect_quench(&t, &ssfr).unwrap();
        assert_eq!(event.quench_time, Some(1000.0));
        assert_eq!(event.sf_turnoff_time, None);
        assert_eq!(event.sf_turnoff_or_sentinel(), INSTANT_TURNOFF);
    }

    #[test]
    fn turnoff_is_last_main_sequence_crossing_before_quench() {
        let t = times();
        let ssfr: Vec<f64> = t
            .iter()
            .map(|&t| {
                if t <= 600.0 {
                    main_sequence(t) + 0.5
                } else if t <= 1500.0 {
                    quiescent(t) + 0.3
                } else {
                    quiescent(t) - 1.0
                }
            })
            .collect();
        let event = detect_quench(&t, &ssfr).unwrap();
        assert_eq!(event.quench_time, Some(1500.0));
        assert_eq!(event.sf_turnoff_time, Some(600.0));
    }

    #[test]
    fn never_quenched_track_reports_nothing() {
        let t = times();
        let ssfr: Vec<f64> = t.iter().map(|&t| main_sequence(t) + 0.2).collect();
        let event = detect_quench(&t, &ssfr).unwrap();
        assert_eq!(event.quench_time, None);
        assert_eq!(event.sf_turnoff_time, None);
    }

    #[test]
    fn invalid_tracks_are_data_errors() {
        assert_eq!(detect_quench(&[1.0, 2.0], &[-9.0]).unwrap_err().exit_code(), 3);
        assert_eq!(detect_quench(&[0.0, 2.0], &[-9.0, -9.0]).unwrap_err().exit_code(), 3);
        assert_eq!(detect_quench(&[5.0], &[-9.0]).unwrap_err().exit_code(), 3);
        assert_eq!(detect_quench(&[1.0, 2.0], &[f64::NAN, -9.0]).unwrap_err().exit_code(), 3);
    }
}
