//! Point spacing helpers used by the SFH bin layouts.
//!
//! Both helpers pin the endpoints exactly. The bin layouts truncate these values to
//! whole Myr, and `exp(ln(x))` can land just below an integer endpoint, which would
//! otherwise shift an edge by one.

use crate::error::AppError;

/// Generate `steps` log-spaced points between `min` and `max` (inclusive).
pub fn log_space(min: f64, max: f64, steps: usize) -> Result<Vec<f64>, AppError> {
    if !(min.is_finite() && max.is_finite() && min > 0.0 && max > 0.0 && max > min) {
        return Err(AppError::config(format!(
            "Invalid log-spacing range: min={min}, max={max} (must be finite, >0, and max>min)."
        )));
    }
    if steps < 2 {
        return Err(AppError::config("Log spacing needs at least 2 points."));
    }

    let ln_min = min.ln();
    let ln_max = max.ln();
    let step = (ln_max - ln_min) / (steps as f64 - 1.0);

    let mut out = Vec::with_capacity(steps);
    for i in 0..steps {
        out.push((ln_min + step * i as f64).exp());
    }
    out[0] = min;
    out[steps - 1] = max;
    Ok(out)
}

/// Generate `steps` linearly spaced points from `start` to `end` (inclusive).
///
/// `start > end` is allowed and yields a descending sequence. A single step returns `[start]`.
pub fn lin_space(start: f64, end: f64, steps: usize) -> Vec<f64> {
    match steps {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (steps as f64 - 1.0);
            let mut out: Vec<f64> = (0..steps).map(|i| start + step * i as f64).collect();
            out[steps - 1] = end;
            out
        }
    }
}

/// Truncate toward zero into whole Myr.
pub fn truncate_all(values: &[f64]) -> Vec<i64> {
    values.iter().map(|&v| v.trunc() as i64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_space_includes_endpoints() {
        let v = log_space(30.0, 2000.0, 5).unwrap();
        assert_eq!(v[0], 30.0);
        assert_eq!(v[4], 2000.0);
        assert!(v.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn log_space_rejects_inverted_range() {
        assert_eq!(log_space(10.0, 5.0, 4).unwrap_err().exit_code(), 2);
        assert!(log_space(1.0, 5.0, 1).is_err());
    }

    #[test]
    fn lin_space_descending_hits_end() {
        let v = lin_space(1000.0, 30.0, 4);
        assert_eq!(v.len(), 4);
        assert_eq!(v[0], 1000.0);
        assert_eq!(v[3], 30.0);
        assert!(v.windows(2).all(|w| w[0] > w[1]));
        assert_eq!(lin_space(7.0, 0.0, 1), vec![7.0]);
    }

    #[test]
    fn truncation_matches_integer_cast() {
        assert_eq!(truncate_all(&[676.66, 30.0, 0.99]), vec![676, 30, 0]);
    }
}
