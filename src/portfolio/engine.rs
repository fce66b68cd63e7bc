//! # Portfolio Engine
//!
//! $$
//! \mathbf{w}^\* = \operatorname{Optimize}\big(\hat\mu, \operatorname{Denoise}(\hat\Sigma)\big)
//! $$
//!
//! High-level orchestration: estimate moments from a returns table, optionally clean the
//! covariance, then dispatch to the selected allocator.

use ndarray::Array1;
use ndarray::Array2;
use tracing::info;

use super::data::ReturnsTable;
use super::denoise::DenoiseConfig;
use super::denoise::Denoiser;
use super::denoise::NoiseFit;
use super::hrp::inverse_variance_weights;
use super::hrp::HierarchicalRiskParity;
use super::hrp::Linkage;
use super::markowitz::ensure_long_only;
use super::markowitz::Markowitz;
use super::qp::efficient_return_qp;
use super::types::EfficientFrontierCurve;
use super::types::OptimizerMethod;
use super::types::PortfolioResult;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::linalg::ensure_square;

/// Runtime configuration for [`PortfolioEngine`].
#[derive(Clone, Copy, Debug)]
pub struct PortfolioEngineConfig {
  /// Optimizer used by [`PortfolioEngine::optimize`].
  pub method: OptimizerMethod,
  /// Clean the sample covariance before optimizing.
  pub denoise: Option<DenoiseConfig>,
  /// Target return, required by return-constrained optimizers.
  pub target_return: Option<f64>,
  /// Risk-free rate used for the tangency portfolio and Sharpe ratios.
  pub risk_free: f64,
  /// Reject solutions with short positions.
  pub long_only: bool,
  /// Dendrogram linkage for HRP.
  pub linkage: Linkage,
}

impl Default for PortfolioEngineConfig {
  fn default() -> Self {
    Self {
      method: OptimizerMethod::MinVariance,
      denoise: None,
      target_return: None,
      risk_free: 0.0,
      long_only: false,
      linkage: Linkage::Ward,
    }
  }
}

/// Result of [`PortfolioEngine::optimize`].
#[derive(Clone, Debug)]
pub struct EngineRun {
  pub portfolio: PortfolioResult,
  /// Present when the covariance went through the denoiser.
  pub noise_fit: Option<NoiseFit>,
}

/// Single entry point from historical returns to weights.
#[derive(Clone, Debug, Default)]
pub struct PortfolioEngine {
  config: PortfolioEngineConfig,
}

impl PortfolioEngine {
  /// Construct a new engine with explicit configuration.
  pub fn new(config: PortfolioEngineConfig) -> Self {
    Self { config }
  }

  /// Borrow engine configuration.
  pub fn config(&self) -> &PortfolioEngineConfig {
    &self.config
  }

  /// Sample covariance of `table`, denoised when configured.
  pub fn estimate_covariance(&self, table: &ReturnsTable) -> Result<(Array2<f64>, Option<NoiseFit>)> {
    let cov = table.covariance()?;
    match self.config.denoise {
      Some(denoise) => {
        let cleaned = Denoiser::from_returns(table, denoise)?.denoise_covariance(&cov)?;
        Ok((cleaned.matrix, Some(cleaned.fit)))
      }
      None => Ok((cov, None)),
    }
  }

  /// Estimate moments from `table` and optimize with the configured method.
  pub fn optimize(&self, table: &ReturnsTable) -> Result<EngineRun> {
    let mu = table.mean_returns();
    let (cov, noise_fit) = self.estimate_covariance(table)?;
    let portfolio = self.optimize_moments(&mu, &cov)?;

    info!(
      method = ?self.config.method,
      n_assets = table.n_assets(),
      n_observations = table.n_observations(),
      denoised = noise_fit.is_some(),
      expected_return = portfolio.expected_return,
      volatility = portfolio.volatility,
      "portfolio optimized"
    );

    Ok(EngineRun {
      portfolio,
      noise_fit,
    })
  }

  /// Optimize directly on supplied moments. No denoising is applied.
  pub fn optimize_moments(&self, mu: &Array1<f64>, cov: &Array2<f64>) -> Result<PortfolioResult> {
    let n = ensure_square("covariance", cov)?;
    if n == 0 || mu.len() != n {
      return Err(PortfolioError::config(format!(
        "{} expected returns for {n} assets",
        mu.len()
      )));
    }

    let cfg = &self.config;
    let weights = match cfg.method {
      OptimizerMethod::MinVariance => self.markowitz(mu, cov)?.optimal_risk(0.0)?,
      OptimizerMethod::TargetReturn => self.markowitz(mu, cov)?.optimal_return(self.target()?)?,
      OptimizerMethod::MaxSharpe => self.markowitz(mu, cov)?.max_sharpe(cfg.risk_free)?,
      OptimizerMethod::Hrp => HierarchicalRiskParity::new(cfg.linkage).allocate(cov)?.weights,
      OptimizerMethod::InverseVariance => inverse_variance_weights(cov)?,
      OptimizerMethod::QuadraticProgram => {
        let w = efficient_return_qp(mu, cov, self.target()?)?;
        if cfg.long_only {
          ensure_long_only(&w)?;
        }
        w
      }
    };

    Ok(PortfolioResult::from_weights(weights, mu, cov, cfg.risk_free))
  }

  /// Efficient frontier of the (optionally denoised) sample moments of `table`.
  pub fn efficient_frontier(&self, table: &ReturnsTable, n_points: usize) -> Result<EfficientFrontierCurve> {
    let mu = table.mean_returns();
    let (cov, _) = self.estimate_covariance(table)?;
    let curve = self.markowitz(&mu, &cov)?.efficient_curve(n_points)?;
    info!(n_points = curve.len(), "efficient frontier sampled");
    Ok(curve)
  }

  fn markowitz(&self, mu: &Array1<f64>, cov: &Array2<f64>) -> Result<Markowitz> {
    Ok(Markowitz::new(mu.clone(), cov.clone())?.long_only(self.config.long_only))
  }

  fn target(&self) -> Result<f64> {
    self.config.target_return.ok_or_else(|| {
      PortfolioError::config(format!(
        "{:?} needs a target return",
        self.config.method
      ))
    })
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::array;
  use ndarray::Axis;
  use ndarray_rand::RandomExt;
  use rand::rngs::StdRng;
  use rand::SeedableRng;
  use rand_distr::StandardNormal;

  use super::*;
  use crate::stats::Bandwidth;

  fn engine(method: OptimizerMethod) -> PortfolioEngine {
    PortfolioEngine::new(PortfolioEngineConfig {
      method,
      ..PortfolioEngineConfig::default()
    })
  }

  fn sample_table(seed: u64) -> ReturnsTable {
    let mut rng = StdRng::seed_from_u64(seed);
    let drift = array![0.0002, 0.0004, 0.0006, 0.0008, 0.0010];
    let shocks = Array2::<f64>::random_using((750, 5), StandardNormal, &mut rng) * 0.01;
    let returns = shocks + &drift.insert_axis(Axis(0));
    let names = ["AAA", "BBB", "CCC", "DDD", "EEE"]
      .iter()
      .map(|s| s.to_string())
      .collect();
    ReturnsTable::new(names, returns).unwrap()
  }

  #[test]
  fn uncorrelated_equal_returns_agree_across_methods() {
    let mu = Array1::from_elem(4, 0.08);
    let cov = Array2::from_diag(&array![0.04, 0.09, 0.01, 0.16]);
    let inv = cov.diag().mapv(|v| 1.0 / v);
    let expected = &inv / inv.sum();

    for method in [
      OptimizerMethod::MinVariance,
      OptimizerMethod::InverseVariance,
      OptimizerMethod::Hrp,
    ] {
      let res = engine(method).optimize_moments(&mu, &cov).unwrap();
      assert_abs_diff_eq!(res.weights, expected, epsilon = 1e-10);
      assert_abs_diff_eq!(res.expected_return, 0.08, epsilon = 1e-12);
    }
  }

  #[test]
  fn kkt_and_closed_form_targets_agree() {
    let mu = array![0.05, 0.10, 0.15];
    let cov = array![[0.04, 0.01, 0.0], [0.01, 0.09, 0.02], [0.0, 0.02, 0.16]];
    let run = |method| {
      PortfolioEngine::new(PortfolioEngineConfig {
        method,
        target_return: Some(0.11),
        ..PortfolioEngineConfig::default()
      })
      .optimize_moments(&mu, &cov)
      .unwrap()
    };

    let closed = run(OptimizerMethod::TargetReturn);
    let kkt = run(OptimizerMethod::QuadraticProgram);
    assert_abs_diff_eq!(closed.weights, kkt.weights, epsilon = 1e-10);
    assert_abs_diff_eq!(closed.expected_return, 0.11, epsilon = 1e-12);
  }

  #[test]
  fn long_only_rejects_shorting_targets() {
    let mu = array![0.05, 0.10, 0.15];
    let cov = array![[0.04, 0.01, 0.0], [0.01, 0.09, 0.02], [0.0, 0.02, 0.16]];

    for method in [OptimizerMethod::TargetReturn, OptimizerMethod::QuadraticProgram] {
      let strict = PortfolioEngine::new(PortfolioEngineConfig {
        method,
        target_return: Some(0.2),
        long_only: true,
        ..PortfolioEngineConfig::default()
      });
      assert!(matches!(
        strict.optimize_moments(&mu, &cov),
        Err(PortfolioError::NegativeWeight { .. })
      ));
    }
  }

  #[test]
  fn target_methods_need_a_target() {
    let mu = array![0.05, 0.10];
    let cov = Array2::from_diag(&array![0.04, 0.09]);

    assert!(matches!(
      engine(OptimizerMethod::TargetReturn).optimize_moments(&mu, &cov),
      Err(PortfolioError::Configuration(_))
    ));
    assert!(matches!(
      engine(OptimizerMethod::MinVariance).optimize_moments(&array![0.1], &cov),
      Err(PortfolioError::Configuration(_))
    ));
  }

  #[test]
  fn optimize_from_returns_with_denoising() -> anyhow::Result<()> {
    let table = sample_table(17);
    let engine = PortfolioEngine::new(PortfolioEngineConfig {
      method: OptimizerMethod::Hrp,
      denoise: Some(DenoiseConfig {
        bandwidth: Bandwidth::Fixed(0.25),
        ..DenoiseConfig::default()
      }),
      ..PortfolioEngineConfig::default()
    });
    let run = engine.optimize(&table)?;

    assert!(run.noise_fit.is_some());
    assert_eq!(run.portfolio.weights.len(), 5);
    assert!(run.portfolio.weights.iter().all(|&w| w >= 0.0));
    assert_abs_diff_eq!(run.portfolio.weights.sum(), 1.0, epsilon = 1e-12);

    let (cov, _) = engine.estimate_covariance(&table)?;
    assert_abs_diff_eq!(cov.diag(), table.covariance()?.diag(), epsilon = 1e-14);
    Ok(())
  }

  #[test]
  fn frontier_from_returns() -> anyhow::Result<()> {
    let table = sample_table(23);
    let curve = engine(OptimizerMethod::MinVariance).efficient_frontier(&table, 25)?;
    let risks = curve.risks();

    assert_eq!(curve.len(), 25);
    for pair in risks.windows(2) {
      assert!(pair[1] >= pair[0] - 1e-12);
    }
    Ok(())
  }
}
