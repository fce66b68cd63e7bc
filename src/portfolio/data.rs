//! # Portfolio Data Utilities
//!
//! $$
//! \Sigma_{ij} = \sigma_i \sigma_j \rho_{ij}
//! $$
//!
//! Return tables and the conversions between covariance and correlation.

use std::collections::HashSet;

use ndarray::Array1;
use ndarray::Array2;
use ndarray::Axis;
use ndarray_stats::CorrelationExt;

use crate::error::PortfolioError;
use crate::error::Result;
use crate::linalg::ensure_finite;
use crate::linalg::ensure_square;

/// Periodic returns of a fixed asset universe, one row per date.
///
/// The column order of the table is the canonical asset order: every weight vector
/// derived from it is aligned with [`ReturnsTable::assets`].
#[derive(Clone, Debug)]
pub struct ReturnsTable {
  assets: Vec<String>,
  returns: Array2<f64>,
}

impl ReturnsTable {
  /// Build a table from asset ids and a `(T, N)` matrix of returns.
  ///
  /// Requires at least two unique assets, `T >= N + 1` rows and finite entries.
  pub fn new(assets: Vec<String>, returns: Array2<f64>) -> Result<Self> {
    let n = assets.len();
    if n < 2 {
      return Err(PortfolioError::config(format!(
        "need at least 2 assets, got {n}"
      )));
    }
    if returns.ncols() != n {
      return Err(PortfolioError::config(format!(
        "{n} asset ids but {} return columns",
        returns.ncols()
      )));
    }

    let mut seen = HashSet::with_capacity(n);
    if let Some(dup) = assets.iter().find(|a| !seen.insert(a.as_str())) {
      return Err(PortfolioError::config(format!("duplicate asset id {dup}")));
    }

    if returns.nrows() < n + 1 {
      return Err(PortfolioError::config(format!(
        "{} observations for {n} assets, need at least {}",
        returns.nrows(),
        n + 1
      )));
    }
    ensure_finite("returns", returns.iter())?;

    Ok(Self { assets, returns })
  }

  /// Build a table of simple returns `p_t / p_{t-1} - 1` from a `(T + 1, N)` price matrix.
  pub fn from_prices(assets: Vec<String>, prices: &Array2<f64>) -> Result<Self> {
    if prices.nrows() < 2 {
      return Err(PortfolioError::config("need at least two price rows"));
    }
    if prices.iter().any(|&p| !(p.is_finite() && p > 0.0)) {
      return Err(PortfolioError::config(
        "prices must be finite and strictly positive",
      ));
    }

    let (rows, cols) = prices.dim();
    let returns = Array2::from_shape_fn((rows - 1, cols), |(t, j)| {
      prices[[t + 1, j]] / prices[[t, j]] - 1.0
    });

    Self::new(assets, returns)
  }

  pub fn assets(&self) -> &[String] {
    &self.assets
  }

  pub fn returns(&self) -> &Array2<f64> {
    &self.returns
  }

  pub fn n_assets(&self) -> usize {
    self.assets.len()
  }

  pub fn n_observations(&self) -> usize {
    self.returns.nrows()
  }

  /// Observations per asset, `q = T / N`.
  pub fn q(&self) -> f64 {
    self.n_observations() as f64 / self.n_assets() as f64
  }

  /// Sample mean of each column.
  pub fn mean_returns(&self) -> Array1<f64> {
    self
      .returns
      .mean_axis(Axis(0))
      .unwrap_or_else(|| Array1::zeros(self.n_assets()))
  }

  /// Unbiased sample covariance (`ddof = 1`).
  pub fn covariance(&self) -> Result<Array2<f64>> {
    self
      .returns
      .t()
      .cov(1.0)
      .map_err(|e| PortfolioError::config(format!("covariance: {e}")))
  }

  /// Pearson correlation matrix, clamped to `[-1, 1]`.
  pub fn correlation(&self) -> Result<Array2<f64>> {
    let corr = self
      .returns
      .t()
      .pearson_correlation()
      .map_err(|e| PortfolioError::config(format!("correlation: {e}")))?;

    if corr.iter().any(|v| !v.is_finite()) {
      return Err(PortfolioError::config(
        "correlation undefined for a constant return series",
      ));
    }

    Ok(corr.mapv(|v| v.clamp(-1.0, 1.0)))
  }
}

fn outer(v: &Array1<f64>) -> Array2<f64> {
  let col = v.view().insert_axis(Axis(1));
  let row = v.view().insert_axis(Axis(0));
  col.dot(&row)
}

/// Normalise a covariance matrix to a correlation matrix.
///
/// Divides by the outer product of standard deviations and clamps to `[-1, 1]`.
/// Applying it to a correlation matrix returns the same matrix.
pub fn cov2corr(cov: &Array2<f64>) -> Result<Array2<f64>> {
  ensure_square("covariance", cov)?;
  ensure_finite("covariance", cov.iter())?;

  if let Some((i, v)) = cov
    .diag()
    .iter()
    .enumerate()
    .find(|&(_, &v)| !(v > 0.0))
  {
    return Err(PortfolioError::config(format!(
      "asset {i} has non-positive variance {v}"
    )));
  }

  let std = cov.diag().mapv(f64::sqrt);
  let corr = cov / &outer(&std);
  Ok(corr.mapv(|v| v.clamp(-1.0, 1.0)))
}

/// Rescale a correlation matrix by per-asset standard deviations.
pub fn corr2cov(corr: &Array2<f64>, std: &Array1<f64>) -> Result<Array2<f64>> {
  let n = ensure_square("correlation", corr)?;
  if std.len() != n {
    return Err(PortfolioError::config(format!(
      "{} standard deviations for a {n}x{n} correlation matrix",
      std.len()
    )));
  }
  Ok(corr * &outer(std))
}
