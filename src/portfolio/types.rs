//! # Portfolio Types
//!
//! $$
//! \mu_p=\mathbf{w}^\top\mu,\qquad \sigma_p=\sqrt{\mathbf{w}^\top\Sigma\mathbf{w}}
//! $$
//!
//! Shared enums and result containers for portfolio optimization.

use std::str::FromStr;

use ndarray::Array1;
use ndarray::Array2;

use crate::error::PortfolioError;
use crate::error::Result;
use crate::linalg::quad_form;

/// Supported allocation methods.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OptimizerMethod {
  /// Global minimum-variance portfolio from the closed-form frontier.
  #[default]
  MinVariance,
  /// Frontier portfolio hitting a target expected return.
  TargetReturn,
  /// Tangency portfolio against the risk-free rate.
  MaxSharpe,
  /// Hierarchical Risk Parity (Lopez de Prado).
  Hrp,
  /// Weights proportional to inverse asset variance.
  InverseVariance,
  /// Target-return portfolio solved through the KKT system.
  QuadraticProgram,
}

impl FromStr for OptimizerMethod {
  type Err = PortfolioError;

  fn from_str(s: &str) -> Result<Self> {
    match s.to_lowercase().as_str() {
      "min-variance" | "minvariance" | "gmv" => Ok(Self::MinVariance),
      "target-return" | "markowitz" => Ok(Self::TargetReturn),
      "max-sharpe" | "tangency" => Ok(Self::MaxSharpe),
      "hrp" => Ok(Self::Hrp),
      "inv-var" | "inverse-variance" => Ok(Self::InverseVariance),
      "qp" | "quadratic-program" => Ok(Self::QuadraticProgram),
      other => Err(PortfolioError::config(format!(
        "unknown optimizer method {other:?}"
      ))),
    }
  }
}

/// Output of a portfolio optimization run.
#[derive(Clone, Debug, Default)]
pub struct PortfolioResult {
  /// Final portfolio weights, aligned with the input asset order.
  pub weights: Array1<f64>,
  /// Model expected portfolio return.
  pub expected_return: f64,
  /// Model portfolio volatility.
  pub volatility: f64,
  /// Sharpe ratio computed as `(expected_return - risk_free) / volatility`.
  pub sharpe: f64,
}

impl PortfolioResult {
  /// Summarise `weights` under the moments `(mu, cov)`.
  pub fn from_weights(
    weights: Array1<f64>,
    mu: &Array1<f64>,
    cov: &Array2<f64>,
    risk_free: f64,
  ) -> Self {
    let expected_return = weights.dot(mu);
    let volatility = quad_form(&weights, cov).max(0.0).sqrt();
    let sharpe = if volatility > 1e-15 {
      (expected_return - risk_free) / volatility
    } else {
      0.0
    };

    Self {
      weights,
      expected_return,
      volatility,
      sharpe,
    }
  }
}

/// One sample of the efficient frontier.
#[derive(Clone, Debug)]
pub struct FrontierPoint {
  pub expected_return: f64,
  pub risk: f64,
  pub weights: Array1<f64>,
}

/// Efficient frontier sampled in ascending target return.
#[derive(Clone, Debug, Default)]
pub struct EfficientFrontierCurve {
  pub points: Vec<FrontierPoint>,
}

impl EfficientFrontierCurve {
  pub fn len(&self) -> usize {
    self.points.len()
  }

  pub fn is_empty(&self) -> bool {
    self.points.is_empty()
  }

  pub fn returns(&self) -> Array1<f64> {
    self.points.iter().map(|p| p.expected_return).collect()
  }

  pub fn risks(&self) -> Array1<f64> {
    self.points.iter().map(|p| p.risk).collect()
  }

  pub fn weights(&self) -> Vec<Array1<f64>> {
    self.points.iter().map(|p| p.weights.clone()).collect()
  }

  /// Split into the aligned `(returns, risks, weights)` sequences.
  pub fn into_parts(self) -> (Array1<f64>, Array1<f64>, Vec<Array1<f64>>) {
    let returns = self.returns();
    let risks = self.risks();
    let weights = self.points.into_iter().map(|p| p.weights).collect();
    (returns, risks, weights)
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::array;

  use super::*;

  #[test]
  fn method_parses_aliases() {
    assert_eq!("HRP".parse::<OptimizerMethod>().unwrap(), OptimizerMethod::Hrp);
    assert_eq!(
      "gmv".parse::<OptimizerMethod>().unwrap(),
      OptimizerMethod::MinVariance
    );
    assert!("cvar".parse::<OptimizerMethod>().is_err());
  }

  #[test]
  fn result_summarises_weights() {
    let mu = array![0.1, 0.2];
    let cov = array![[0.04, 0.0], [0.0, 0.09]];
    let res = PortfolioResult::from_weights(array![0.5, 0.5], &mu, &cov, 0.05);

    assert_abs_diff_eq!(res.expected_return, 0.15, epsilon = 1e-12);
    assert_abs_diff_eq!(res.volatility, (0.0325_f64).sqrt(), epsilon = 1e-12);
    assert_abs_diff_eq!(res.sharpe, 0.1 / (0.0325_f64).sqrt(), epsilon = 1e-12);
  }
}
