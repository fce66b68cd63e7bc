//! # Marcenko-Pastur Law
//!
//! $$
//! \lambda_\pm=\sigma^2\left(1\pm\sqrt{1/q}\right)^2,\qquad q=T/N
//! $$
//!
//! Limiting eigenvalue density of the correlation matrix of `N` independent series with
//! variance `σ²` observed `T` times.

use ndarray::Array1;

/// Support `[λ₋, λ₊]` of the density.
pub fn support(variance: f64, q: f64) -> (f64, f64) {
  let r = (1.0 / q).sqrt();
  (variance * (1.0 - r).powi(2), variance * (1.0 + r).powi(2))
}

/// Largest eigenvalue attainable by noise, `λ₊`.
pub fn max_eigenvalue(variance: f64, q: f64) -> f64 {
  support(variance, q).1
}

/// Density evaluated on `n_points` evenly spaced points spanning the support.
///
/// Returns `(grid, pdf)`. The endpoints evaluate to zero.
pub fn pdf(variance: f64, q: f64, n_points: usize) -> (Array1<f64>, Array1<f64>) {
  let (lo, hi) = support(variance, q);
  let grid = Array1::linspace(lo, hi, n_points);
  let density = grid.mapv(|x| {
    let band = ((hi - x) * (x - lo)).max(0.0);
    if x > 0.0 {
      q / (2.0 * std::f64::consts::PI * variance * x) * band.sqrt()
    } else {
      0.0
    }
  });
  (grid, density)
}
