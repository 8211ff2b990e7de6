//! Regulator time grid.
//!
//! Edges are whole Myr of time since formation, from `0` to `age_max`. The two most
//! recent bins are fixed (`[age - recent_edge, age - final_bin]` and
//! `[age - final_bin, age]`); the older part is split into `n_bins` linear steps.
//!
//! When the earliest bin would come out narrower than `final_bin` (short ages, many
//! bins), the grid is rebuilt as `n_bins + 1` uniform bins over the whole range.

use log::debug;

use crate::domain::GridSpec;
use crate::error::AppError;
use crate::math::{lin_space, truncate_all};

#[derive(Debug, Clone, PartialEq)]
pub struct TimeGrid {
    /// `n_bins + 2` strictly increasing edges, `edges[0] == 0`, last == `age_max`.
    pub edges: Vec<u32>,
    /// Bin midpoints (Myr); the covariance kernel's time coordinates.
    pub centers: Vec<f64>,
    /// Whether the uniform layout was used.
    pub uniform_fallback: bool,
}

impl TimeGrid {
    pub fn n_bins(&self) -> usize {
        self.centers.len()
    }
}

pub fn build_grid(age_max: u32, n_bins: usize, layout: &GridSpec) -> Result<TimeGrid, AppError> {
    if age_max == 0 || n_bins == 0 {
        return Err(AppError::config(format!(
            "Time grid needs age_max > 0 and n_bins > 0 (got {age_max}, {n_bins})."
        )));
    }
    let age = f64::from(age_max);

    let mut lookback = lin_space(age, f64::from(layout.recent_edge), n_bins);
    lookback.push(f64::from(layout.final_bin));
    lookback.push(0.0);
    let mut edges = to_edges(age_max, &lookback);

    let mut uniform_fallback = false;
    if edges[1] - edges[0] < i64::from(layout.final_bin) {
        debug!(
            "time grid: first bin of {} Myr is below {} Myr (age={age_max}, n_bins={n_bins}); using uniform bins",
            edges[1] - edges[0],
            layout.final_bin
        );
        edges = to_edges(age_max, &lin_space(age, 0.0, n_bins + 2));
        uniform_fallback = true;
    }

    if let Some(w) = edges.windows(2).find(|w| w[1] <= w[0]) {
        return Err(AppError::config(format!(
            "Time grid for age={age_max} Myr and n_bins={n_bins} has an empty bin at {}..{} Myr; \
             use fewer bins or an older formation age.",
            w[0], w[1]
        )));
    }

    let edges: Vec<u32> = edges.into_iter().map(|e| e as u32).collect();
    let centers = edges
        .windows(2)
        .map(|w| 0.5 * (f64::from(w[0]) + f64::from(w[1])))
        .collect();

    Ok(TimeGrid {
        edges,
        centers,
        uniform_fallback,
    })
}

fn to_edges(age_max: u32, lookback: &[f64]) -> Vec<i64> {
    let age = i64::from(age_max);
    truncate_all(lookback).into_iter().map(|lb| age - lb).collect()
}
