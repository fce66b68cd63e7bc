//! # Gaussian Kernel Density
//!
//! $$
//! \hat f_h(x)=\frac{1}{nh}\sum_{i=1}^{n}\varphi\!\left(\frac{x-x_i}{h}\right)
//! $$
//!
use std::f64::consts::PI;

use ndarray::Array1;
use ndarray::ArrayView1;

use crate::error::PortfolioError;
use crate::error::Result;
use crate::linalg::ensure_finite;

/// Bandwidth selection for [`GaussianKde`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Bandwidth {
  /// Fixed smoothing parameter `h > 0`.
  Fixed(f64),
  /// Silverman's rule of thumb, `0.9 · min(σ, IQR/1.34) · n^(-1/5)`.
  Silverman,
}

impl Default for Bandwidth {
  fn default() -> Self {
    Self::Fixed(0.01)
  }
}

/// One-dimensional Gaussian kernel density estimate.
#[derive(Clone, Debug)]
pub struct GaussianKde {
  samples: Array1<f64>,
  bandwidth: f64,
}

impl GaussianKde {
  /// Fit a KDE on `samples`.
  ///
  /// Fails on an empty or non-finite sample and on a non-positive fixed bandwidth.
  pub fn fit(samples: ArrayView1<f64>, bandwidth: Bandwidth) -> Result<Self> {
    if samples.is_empty() {
      return Err(PortfolioError::config("KDE needs at least one sample"));
    }
    ensure_finite("KDE samples", samples.iter())?;

    let h = match bandwidth {
      Bandwidth::Fixed(h) if h.is_finite() && h > 0.0 => h,
      Bandwidth::Fixed(h) => {
        return Err(PortfolioError::config(format!(
          "KDE bandwidth must be positive, got {h}"
        )))
      }
      Bandwidth::Silverman => silverman_bandwidth(samples),
    };

    Ok(Self {
      samples: samples.to_owned(),
      bandwidth: h,
    })
  }

  pub fn bandwidth(&self) -> f64 {
    self.bandwidth
  }

  /// Density at a single point.
  pub fn density(&self, x: f64) -> f64 {
    let h = self.bandwidth;
    let norm = 1.0 / (h * (2.0 * PI).sqrt() * self.samples.len() as f64);
    self
      .samples
      .iter()
      .map(|&xi| (-0.5 * ((x - xi) / h).powi(2)).exp())
      .sum::<f64>()
      * norm
  }

  /// Density on every point of `grid`.
  pub fn density_on(&self, grid: ArrayView1<f64>) -> Array1<f64> {
    grid.mapv(|x| self.density(x))
  }
}

/// Silverman's rule of thumb, floored at `1e-8`.
pub fn silverman_bandwidth(samples: ArrayView1<f64>) -> f64 {
  let n = samples.len();
  if n < 2 {
    return 1e-8;
  }

  let mean = samples.sum() / n as f64;
  let std = (samples.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64).sqrt();

  let mut sorted = samples.to_vec();
  sorted.sort_by(f64::total_cmp);
  let iqr = quantile_sorted(&sorted, 0.75) - quantile_sorted(&sorted, 0.25);

  let spread = if iqr > 0.0 { std.min(iqr / 1.34) } else { std };
  (0.9 * spread * (n as f64).powf(-0.2)).max(1e-8)
}

/// Linearly interpolated quantile `p ∈ [0, 1]` of sorted data.
fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
  match sorted.len() {
    0 => 0.0,
    1 => sorted[0],
    len => {
      let rank = p.clamp(0.0, 1.0) * (len - 1) as f64;
      let lo = rank.floor() as usize;
      let hi = rank.ceil() as usize;
      sorted[lo] + (rank - lo as f64) * (sorted[hi] - sorted[lo])
    }
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;
  use ndarray::array;
  use ndarray::Array1;

  use super::*;

  #[test]
  fn single_sample_density_is_normal_pdf() {
    let kde = GaussianKde::fit(array![0.0].view(), Bandwidth::Fixed(1.0)).unwrap();

    assert_relative_eq!(kde.density(0.0), 1.0 / (2.0 * PI).sqrt(), epsilon = 1e-12);
    assert_relative_eq!(
      kde.density(1.0),
      (-0.5_f64).exp() / (2.0 * PI).sqrt(),
      epsilon = 1e-12
    );
  }

  #[test]
  fn density_integrates_to_one() {
    let samples = array![0.8, 1.0, 1.1, 1.5, 2.4];
    let kde = GaussianKde::fit(samples.view(), Bandwidth::Fixed(0.25)).unwrap();
    let grid = Array1::linspace(-2.0, 6.0, 4001);
    let dx = grid[1] - grid[0];
    let mass = kde.density_on(grid.view()).sum() * dx;

    assert_relative_eq!(mass, 1.0, epsilon = 1e-6);
  }

  #[test]
  fn silverman_bandwidth_is_positive_and_bounded() {
    let samples = array![1.0, 2.0, 3.0, 4.0, 5.0];
    let kde = GaussianKde::fit(samples.view(), Bandwidth::Silverman).unwrap();

    assert!(kde.bandwidth() > 0.0);
    assert!(kde.bandwidth() < 10.0);
  }

  #[test]
  fn rejects_non_positive_bandwidth() {
    assert!(GaussianKde::fit(array![1.0, 2.0].view(), Bandwidth::Fixed(0.0)).is_err());
    assert!(GaussianKde::fit(Array1::<f64>::zeros(0).view(), Bandwidth::Silverman).is_err());
  }
}
