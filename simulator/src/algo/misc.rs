//! Interpolation helpers shared by the efficiency models.
//!
//! Two flavours are provided:
//!
//! - **Linear**: straight-line interpolation over a sorted table, used to
//!   evaluate a resampled PDE curve at an arbitrary photon wavelength.
//! - **Power law**: interpolation in log-log space between two bracketing
//!   samples, which is how detection efficiency curves are resampled since
//!   they vary multiplicatively with wavelength.

use thiserror::Error;

/// Errors that can occur during table interpolation.
#[derive(Error, Debug, PartialEq)]
pub enum InterpError {
    #[error("Value {0} is out of bounds for interpolation range [{1}, {2}]")]
    OutOfBounds(f64, f64, f64),
    #[error("Input vectors must have at least 2 points")]
    InsufficientData,
    #[error("Input vectors must have the same length")]
    MismatchedLengths,
}

/// Linear interpolation through the two points `(x0, y0)` and `(x1, y1)`.
///
/// The caller guarantees `x0 != x1`.
pub fn linear_between(x: f64, (x0, y0): (f64, f64), (x1, y1): (f64, f64)) -> f64 {
    let slope = (y1 - y0) / (x1 - x0);
    y0 + slope * (x - x0)
}

/// Power-law (log-log) interpolation through `(x0, y0)` and `(x1, y1)`.
///
/// Evaluates
/// ```text
/// ln(y) = [ln(y0)·ln(x1/x) + ln(y1)·ln(x/x0)] / ln(x1/x0)
/// ```
/// and returns `exp(ln(y))`. Abscissae must be strictly positive. The result
/// is NaN when an ordinate is negative, or when an ordinate is zero and `x`
/// sits exactly on the opposite bracket end; callers are expected to check.
pub fn power_law_between(x: f64, (x0, y0): (f64, f64), (x1, y1): (f64, f64)) -> f64 {
    let log_y = (y0.ln() * (x1 / x).ln() + y1.ln() * (x / x0).ln()) / (x1 / x0).ln();
    log_y.exp()
}

/// Linear interpolation over a sorted table using binary search.
///
/// `xs` must be sorted in ascending order; this is an invariant of every
/// table built inside this crate and is only checked in debug builds.
///
/// # Examples
///
/// ```rust
/// use sipm::algo::misc::interp;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let xs = vec![400.0, 500.0, 600.0];
/// let ys = vec![0.2, 0.4, 0.3];
///
/// assert!((interp(450.0, &xs, &ys)? - 0.3).abs() < 1e-12);
/// assert_eq!(interp(500.0, &xs, &ys)?, 0.4);
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// * `InterpError::OutOfBounds` - x is outside `[xs[0], xs[n-1]]`
/// * `InterpError::InsufficientData` - fewer than 2 points
/// * `InterpError::MismatchedLengths` - `xs` and `ys` differ in length
pub fn interp(x: f64, xs: &[f64], ys: &[f64]) -> Result<f64, InterpError> {
    if xs.len() != ys.len() {
        return Err(InterpError::MismatchedLengths);
    }
    if xs.len() < 2 {
        return Err(InterpError::InsufficientData);
    }
    debug_assert!(xs.windows(2).all(|w| w[0] < w[1]), "table must be sorted");

    let min_x = xs[0];
    let max_x = xs[xs.len() - 1];
    if !(min_x..=max_x).contains(&x) {
        return Err(InterpError::OutOfBounds(x, min_x, max_x));
    }

    // First index strictly above x; x >= min_x so this is at least 1
    let upper = xs.partition_point(|&probe| probe <= x);
    if upper == xs.len() {
        return Ok(ys[xs.len() - 1]);
    }
    let lower = upper - 1;

    Ok(linear_between(
        x,
        (xs[lower], ys[lower]),
        (xs[upper], ys[upper]),
    ))
}
