//! # Errors
//!
//! Hard failures of the allocation routines. A noise-variance search that falls back
//! to its default is not an error; it is reported on [`crate::portfolio::NoiseFit`].

use thiserror::Error;

/// Errors raised by the optimizers, the denoiser and the input validation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PortfolioError {
  /// Requested target return or risk lies outside the feasible region.
  #[error("invalid target: {0}")]
  InvalidTarget(String),
  /// Covariance or KKT matrix is not invertible.
  #[error("numerically singular matrix: {0}")]
  NumericalSingularity(String),
  /// Malformed input: shapes, asset counts, zero variances, bad parameters.
  #[error("configuration error: {0}")]
  Configuration(String),
  /// Long-only validation rejected a solution.
  #[error("weight {weight} of asset {index} is negative")]
  NegativeWeight { index: usize, weight: f64 },
}

impl PortfolioError {
  pub(crate) fn config(msg: impl Into<String>) -> Self {
    Self::Configuration(msg.into())
  }

  pub(crate) fn singular(msg: impl Into<String>) -> Self {
    Self::NumericalSingularity(msg.into())
  }

  pub(crate) fn target(msg: impl Into<String>) -> Self {
    Self::InvalidTarget(msg.into())
  }
}

pub type Result<T> = std::result::Result<T, PortfolioError>;
