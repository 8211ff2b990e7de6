//! Multiplicative-cascade SFHs for the non-parametric modules.
//!
//! Both layouts work in look-back time (index 0 = observation, index `age` =
//! formation) on `age + 1` samples and flip the result at the end, so the returned
//! array runs from formation to observation.

use crate::error::AppError;
use crate::math::{log_space, truncate_all};

/// Look-back edges `[age, .., last_bin, 0]` of the legacy layout (`n_levels + 1` values).
pub fn legacy_edges(age_form: u32, n_levels: usize, last_bin: u32) -> Result<Vec<i64>, AppError> {
    let mut edges = truncate_all(&log_space(f64::from(last_bin), f64::from(age_form), n_levels)?);
    edges.reverse();
    edges.push(0);
    Ok(edges)
}

/// Look-back edges `[age, .., 0]` of the revised layout (`n_levels + 1` values).
///
/// The log-spaced part runs from `last_bin` to `age - age / n_levels`. If its two most
/// recent interior edges land closer than `last_bin`, it is redone with half that gap
/// as the lower end.
pub fn revised_edges(age_form: u32, n_levels: usize, last_bin: u32) -> Result<Vec<i64>, AppError> {
    if n_levels < 3 {
        return Err(AppError::config(format!(
            "The non-parametric layout needs at least 3 bins (got {n_levels})."
        )));
    }
    let age = f64::from(age_form);
    let upper = age - age / n_levels as f64;
    let steps = n_levels - 1;

    let mut inner = truncate_all(&log_space(f64::from(last_bin), upper, steps)?);
    inner.reverse();
    let gap = (inner[steps - 2] - inner[steps - 1]).abs();
    if gap < i64::from(last_bin) {
        let lower = (gap as f64 / 2.0).max(0.5);
        inner = truncate_all(&log_space(lower, upper, steps)?);
        inner.reverse();
    }

    let mut edges = Vec::with_capacity(n_levels + 1);
    edges.push(i64::from(age_form));
    edges.extend(inner);
    edges.push(0);
    Ok(edges)
}

/// Walk from formation toward observation: every segment takes the level at its
/// older edge divided by `10^change`.
pub fn legacy_cascade(age_form: u32, edges: &[i64], changes: &[f64]) -> Vec<f64> {
    let mut lookback = vec![1.0; age_form as usize + 1];
    for (k, &change) in changes.iter().enumerate().take(edges.len() - 1) {
        let level = lookback[edges[k] as usize] / 10f64.powf(change);
        fill(&mut lookback, edges[k + 1], edges[k], level);
    }
    lookback.reverse();
    lookback
}

/// Walk from observation toward formation: the most recent segment has level 1 and
/// each older segment divides the previous level by `10^change`. The formation sample
/// belongs to the oldest segment.
pub fn revised_cascade(age_form: u32, edges: &[i64], changes: &[f64]) -> Vec<f64> {
    let mut lookback = vec![1.0; age_form as usize + 1];
    let segments = edges.len() - 1;
    let mut level = 1.0;
    for s in 0..segments {
        if s > 0 {
            level /= 10f64.powf(changes[s - 1]);
        }
        let lo = edges[segments - s];
        let hi = if s + 1 == segments {
            edges[0] + 1
        } else {
            edges[segments - s - 1]
        };
        fill(&mut lookback, lo, hi, level);
    }
    lookback.reverse();
    lookback
}

fn fill(values: &mut [f64], lo: i64, hi: i64, level: f64) {
    let lo = lo.max(0) as usize;
    let hi = (hi.max(0) as usize).min(values.len());
    if lo < hi {
        values[lo..hi].fill(level);
    }
}
