//! # Closed-Form Mean-Variance Frontier
//!
//! $$
//! \mathbf{w}(t)=\frac{W\mathbf{e}}{C}+\frac{t}{2}\left(W\mu-\frac{A}{C}W\mathbf{e}\right),
//! \qquad W=\Sigma^{-1}
//! $$
//!
//! Two-fund decomposition of the fully invested mean-variance problem
//! `min wᵀΣw s.t. wᵀe = 1, wᵀμ = r`. The scalars
//! `A = eᵀWμ`, `B = μᵀWμ`, `C = eᵀWe` and `D = BC − A²` characterise the whole frontier,
//! so every query after construction is `O(N)` or `O(N²)`.
//!
//! Weights are unconstrained in sign. [`Markowitz::long_only`] turns on a post-hoc check
//! that rejects solutions with short positions.

use ndarray::Array1;
use ndarray::Array2;
use ndarray_stats::QuantileExt;
use tracing::debug;

use super::types::EfficientFrontierCurve;
use super::types::FrontierPoint;
use super::types::PortfolioResult;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::linalg::cholesky_solve;
use crate::linalg::ensure_finite;
use crate::linalg::ensure_square;
use crate::linalg::is_symmetric;
use crate::linalg::quad_form;

/// Relative tolerance used for target feasibility and frontier degeneracy.
pub const FRONTIER_EPS: f64 = 1e-12;

/// Weights below this value fail the long-only check.
const NEGATIVE_WEIGHT_TOL: f64 = -1e-12;

/// Scalars of the efficient frontier hyperbola.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrontierConstants {
  /// `eᵀ Σ⁻¹ μ`
  pub a: f64,
  /// `μᵀ Σ⁻¹ μ`
  pub b: f64,
  /// `eᵀ Σ⁻¹ e`
  pub c: f64,
  /// `BC − A²`
  pub d: f64,
}

/// Analytic mean-variance solver bound to one `(μ, Σ)` pair.
#[derive(Clone, Debug)]
pub struct Markowitz {
  mu: Array1<f64>,
  cov: Array2<f64>,
  we: Array1<f64>,
  wm: Array1<f64>,
  constants: FrontierConstants,
  long_only: bool,
}

impl Markowitz {
  /// Precompute `Σ⁻¹e`, `Σ⁻¹μ` and the frontier constants.
  ///
  /// `Σ` must be symmetric positive definite; otherwise the call fails with
  /// [`PortfolioError::NumericalSingularity`].
  pub fn new(mu: Array1<f64>, cov: Array2<f64>) -> Result<Self> {
    let n = ensure_square("covariance", &cov)?;
    if n == 0 || mu.len() != n {
      return Err(PortfolioError::config(format!(
        "{} expected returns for a {n}x{n} covariance",
        mu.len()
      )));
    }
    ensure_finite("expected returns", mu.iter())?;
    ensure_finite("covariance", cov.iter())?;

    let scale = cov.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    if !is_symmetric(&cov, 1e-10 * scale.max(1.0)) {
      return Err(PortfolioError::config("covariance must be symmetric"));
    }

    let mut rhs = Array2::<f64>::ones((n, 2));
    rhs.column_mut(1).assign(&mu);
    let solved = cholesky_solve(&cov, &rhs)?;
    let we = solved.column(0).to_owned();
    let wm = solved.column(1).to_owned();

    let a = wm.sum();
    let b = mu.dot(&wm);
    let c = we.sum();
    let d = b * c - a * a;
    debug!(a, b, c, d, n_assets = n, "frontier constants");

    Ok(Self {
      mu,
      cov,
      we,
      wm,
      constants: FrontierConstants { a, b, c, d },
      long_only: false,
    })
  }

  /// Reject solutions with negative weights when `enabled`.
  pub fn long_only(mut self, enabled: bool) -> Self {
    self.long_only = enabled;
    self
  }

  /// Frontier constants `A`, `B`, `C`, `D`.
  pub fn constants(&self) -> FrontierConstants {
    self.constants
  }

  /// Number of assets the solver was built for.
  pub fn n_assets(&self) -> usize {
    self.mu.len()
  }

  /// Expected return of the global minimum-variance portfolio, `A/C`.
  pub fn start_return(&self) -> f64 {
    self.constants.a / self.constants.c
  }

  /// Global minimum-variance weights `Σ⁻¹e / C`.
  pub fn min_variance_weights(&self) -> Array1<f64> {
    &self.we / self.constants.c
  }

  /// `true` when all assets share one return direction (`D ≈ 0`) and the frontier
  /// collapses to the minimum-variance point.
  pub fn is_degenerate(&self) -> bool {
    let FrontierConstants { b, c, d, .. } = self.constants;
    d <= FRONTIER_EPS * (b * c).abs()
  }

  /// Two-fund portfolio for the risk parameter `target_risk >= 0`.
  ///
  /// `target_risk = 0` is the minimum-variance portfolio; larger values tilt toward the
  /// tangency direction along the efficient branch.
  pub fn optimal_risk(&self, target_risk: f64) -> Result<Array1<f64>> {
    if !target_risk.is_finite() || target_risk < 0.0 {
      return Err(PortfolioError::target(format!(
        "target risk must be finite and non-negative, got {target_risk}"
      )));
    }

    let w = self.two_fund(target_risk);
    self.check_long_only(&w)?;
    Ok(w)
  }

  /// Frontier portfolio with expected return `target_return`.
  ///
  /// Fails with [`PortfolioError::InvalidTarget`] below the minimum-variance return and,
  /// on a degenerate frontier, for any return other than it.
  pub fn optimal_return(&self, target_return: f64) -> Result<Array1<f64>> {
    let target_risk = self.risk_parameter(target_return)?;
    self.optimal_risk(target_risk)
  }

  /// Volatility of the frontier portfolio at `target_return`,
  /// `sqrt((C r² − 2 A r + B) / D)`.
  pub fn frontier_risk(&self, target_return: f64) -> Result<f64> {
    self.risk_parameter(target_return)?;
    let FrontierConstants { a, b, c, d } = self.constants;

    if self.is_degenerate() {
      return Ok((1.0 / c).sqrt());
    }

    let hyperbola = c * target_return * target_return - 2.0 * a * target_return + b;
    Ok((hyperbola / d).max(0.0).sqrt())
  }

  /// Sample `n_points` target returns evenly from `A/C` to `max(μ)`.
  ///
  /// Risk is non-decreasing along the returned curve.
  pub fn efficient_curve(&self, n_points: usize) -> Result<EfficientFrontierCurve> {
    if n_points < 2 {
      return Err(PortfolioError::config(format!(
        "efficient curve needs at least 2 points, got {n_points}"
      )));
    }
    self.ensure_frontier()?;

    let start = self.start_return();
    let end = *self
      .mu
      .max()
      .map_err(|e| PortfolioError::config(format!("expected returns: {e}")))?;
    if end <= start + self.return_tolerance() {
      return Err(PortfolioError::target(format!(
        "largest expected return {end} does not exceed the minimum-variance return {start}"
      )));
    }

    let targets = Array1::linspace(start, end, n_points);
    self.curve_at(targets.iter().copied())
  }

  /// Sample `n_steps` target returns `A/C + i · step`.
  pub fn efficient_curve_with_step(&self, step: f64, n_steps: usize) -> Result<EfficientFrontierCurve> {
    if !(step.is_finite() && step > 0.0) || n_steps == 0 {
      return Err(PortfolioError::config(format!(
        "invalid frontier sampling step={step} n_steps={n_steps}"
      )));
    }
    self.ensure_frontier()?;

    let start = self.start_return();
    self.curve_at((0..n_steps).map(|i| start + step * i as f64))
  }

  /// Tangency portfolio `(Σ⁻¹μ − r_f Σ⁻¹e) / (A − r_f C)`.
  pub fn max_sharpe(&self, risk_free: f64) -> Result<Array1<f64>> {
    let FrontierConstants { a, c, .. } = self.constants;
    let excess = a - risk_free * c;
    if !(excess > FRONTIER_EPS * a.abs().max(c * risk_free.abs()).max(1.0)) {
      return Err(PortfolioError::target(format!(
        "risk-free rate {risk_free} is not below the minimum-variance return {}",
        self.start_return()
      )));
    }

    let w = (&self.wm - &(&self.we * risk_free)) / excess;
    self.check_long_only(&w)?;
    Ok(w)
  }

  /// Summary statistics of `weights` under the solver's moments.
  pub fn portfolio(&self, weights: Array1<f64>, risk_free: f64) -> PortfolioResult {
    PortfolioResult::from_weights(weights, &self.mu, &self.cov, risk_free)
  }

  fn two_fund(&self, target_risk: f64) -> Array1<f64> {
    let FrontierConstants { a, c, .. } = self.constants;
    let tilt = &self.wm - &(&self.we * (a / c));
    &self.we / c + &(tilt * (target_risk / 2.0))
  }

  fn return_tolerance(&self) -> f64 {
    FRONTIER_EPS * self.start_return().abs().max(1.0)
  }

  /// Map a target return onto the risk parametrisation `2 (r − A/C) C / D`.
  fn risk_parameter(&self, target_return: f64) -> Result<f64> {
    if !target_return.is_finite() {
      return Err(PortfolioError::target(format!(
        "target return must be finite, got {target_return}"
      )));
    }

    let start = self.start_return();
    let tol = self.return_tolerance();
    if target_return < start - tol {
      return Err(PortfolioError::target(format!(
        "target return {target_return} is below the minimum-variance return {start}"
      )));
    }

    if self.is_degenerate() {
      if (target_return - start).abs() <= tol {
        return Ok(0.0);
      }
      return Err(PortfolioError::target(format!(
        "degenerate frontier: only the return {start} is attainable"
      )));
    }

    let FrontierConstants { c, d, .. } = self.constants;
    Ok((2.0 * (target_return - start) * c / d).max(0.0))
  }

  fn ensure_frontier(&self) -> Result<()> {
    if self.is_degenerate() {
      return Err(PortfolioError::target(
        "degenerate frontier: expected returns are collinear with the unit vector",
      ));
    }
    Ok(())
  }

  fn curve_at(&self, targets: impl Iterator<Item = f64>) -> Result<EfficientFrontierCurve> {
    let points = targets
      .map(|r| {
        let weights = self.two_fund(self.risk_parameter(r)?);
        let risk = quad_form(&weights, &self.cov).max(0.0).sqrt();
        Ok(FrontierPoint {
          expected_return: r,
          risk,
          weights,
        })
      })
      .collect::<Result<Vec<_>>>()?;

    Ok(EfficientFrontierCurve { points })
  }

  fn check_long_only(&self, w: &Array1<f64>) -> Result<()> {
    if self.long_only {
      ensure_long_only(w)?;
    }
    Ok(())
  }
}

/// Fail with [`PortfolioError::NegativeWeight`] on the first weight below `-1e-12`.
pub fn ensure_long_only(w: &Array1<f64>) -> Result<()> {
  match w.iter().position(|&x| x < NEGATIVE_WEIGHT_TOL) {
    Some(index) => Err(PortfolioError::NegativeWeight {
      index,
      weight: w[index],
    }),
    None => Ok(()),
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use approx::assert_relative_eq;
  use ndarray::array;
  use ndarray::Array2;
  use ndarray_rand::RandomExt;
  use rand::rngs::StdRng;
  use rand::SeedableRng;
  use rand_distr::StandardNormal;
  use rand_distr::Uniform;

  use super::*;
  use crate::portfolio::qp::efficient_return_qp;

  fn three_assets() -> Markowitz {
    let mu = array![0.05, 0.10, 0.15];
    let cov = array![[0.04, 0.01, 0.0], [0.01, 0.09, 0.02], [0.0, 0.02, 0.16]];
    Markowitz::new(mu, cov).unwrap()
  }

  fn random_problem(rng: &mut StdRng, n: usize) -> (Array1<f64>, Array2<f64>) {
    let x = Array2::<f64>::random_using((4 * n, n), StandardNormal, rng);
    let cov = x.t().dot(&x) / (4 * n) as f64 * 0.01 + Array2::<f64>::eye(n) * 1e-3;
    let mu = Array1::random_using(n, Uniform::new(-0.05, 0.2), rng);
    (mu, cov)
  }

  #[test]
  fn zero_risk_equals_min_variance_return() {
    let mut rng = StdRng::seed_from_u64(7);
    for n in 2..8 {
      let (mu, cov) = random_problem(&mut rng, n);
      let m = Markowitz::new(mu, cov).unwrap();
      let by_risk = m.optimal_risk(0.0).unwrap();
      let by_return = m.optimal_return(m.start_return()).unwrap();

      assert_abs_diff_eq!(by_risk, by_return, epsilon = 1e-10);
      assert_abs_diff_eq!(by_risk, m.min_variance_weights(), epsilon = 1e-10);
      assert_abs_diff_eq!(by_risk.sum(), 1.0, epsilon = 1e-10);
    }
  }

  #[test]
  fn efficient_curve_risk_is_non_decreasing() {
    let mut rng = StdRng::seed_from_u64(11);
    for n_points in [2, 3, 25] {
      let (mu, cov) = random_problem(&mut rng, 5);
      let m = Markowitz::new(mu.clone(), cov).unwrap();
      let curve = m.efficient_curve(n_points).unwrap();
      let (returns, risks, weights) = curve.into_parts();

      assert_eq!(returns.len(), n_points);
      assert_abs_diff_eq!(returns[0], m.start_return(), epsilon = 1e-12);
      assert_abs_diff_eq!(returns[n_points - 1], *mu.max().unwrap(), epsilon = 1e-12);
      assert_relative_eq!(risks[0], (1.0 / m.constants().c).sqrt(), epsilon = 1e-9);

      for i in 1..n_points {
        assert!(returns[i] > returns[i - 1]);
        assert!(risks[i] >= risks[i - 1] - 1e-12);
      }
      for (w, r) in weights.iter().zip(returns.iter()) {
        assert_abs_diff_eq!(w.sum(), 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(w.dot(&mu), *r, epsilon = 1e-9);
      }
    }
  }

  #[test]
  fn stepped_curve_starts_at_min_variance() {
    let m = three_assets();
    let curve = m.efficient_curve_with_step(0.01, 5).unwrap();

    assert_eq!(curve.len(), 5);
    assert_abs_diff_eq!(curve.returns()[4] - curve.returns()[0], 0.04, epsilon = 1e-12);
    assert!(m.efficient_curve_with_step(0.0, 5).is_err());
  }

  #[test]
  fn target_below_min_variance_is_invalid() {
    let m = three_assets();
    let start = m.start_return();

    assert!(matches!(
      m.optimal_return(start - 1e-6),
      Err(PortfolioError::InvalidTarget(_))
    ));
    assert!(m.optimal_return(start - 1e-15).is_ok());
    assert!(matches!(
      m.optimal_risk(-0.1),
      Err(PortfolioError::InvalidTarget(_))
    ));
  }

  #[test]
  fn optimal_return_matches_kkt_solution() {
    let m = three_assets();
    let mu = array![0.05, 0.10, 0.15];
    let cov = array![[0.04, 0.01, 0.0], [0.01, 0.09, 0.02], [0.0, 0.02, 0.16]];

    for target in [0.09, 0.11, 0.14] {
      let closed = m.optimal_return(target).unwrap();
      let kkt = efficient_return_qp(&mu, &cov, target).unwrap();

      assert_abs_diff_eq!(closed, kkt, epsilon = 1e-10);
      assert_abs_diff_eq!(closed.dot(&mu), target, epsilon = 1e-12);
      assert_relative_eq!(
        m.frontier_risk(target).unwrap(),
        m.portfolio(closed, 0.0).volatility,
        epsilon = 1e-10
      );
    }
  }

  #[test]
  fn long_only_check_rejects_short_positions() {
    let m = three_assets();
    let shorted = m.optimal_return(0.2).unwrap();
    assert!(shorted.iter().any(|&w| w < 0.0));

    let strict = three_assets().long_only(true);
    assert!(matches!(
      strict.optimal_return(0.2),
      Err(PortfolioError::NegativeWeight { .. })
    ));
    assert!(strict.optimal_return(strict.start_return()).is_ok());
  }

  #[test]
  fn singular_covariance_is_rejected() {
    let err = Markowitz::new(array![0.1, 0.2], array![[1.0, 1.0], [1.0, 1.0]]).unwrap_err();
    assert!(matches!(err, PortfolioError::NumericalSingularity(_)));

    let err = Markowitz::new(array![0.1], array![[1.0, 0.0], [0.0, 1.0]]).unwrap_err();
    assert!(matches!(err, PortfolioError::Configuration(_)));
  }

  #[test]
  fn equal_returns_collapse_the_frontier() {
    let cov = Array2::from_diag(&array![0.04, 0.09, 0.01, 0.16]);
    let m = Markowitz::new(Array1::from_elem(4, 0.08), cov).unwrap();

    assert!(m.is_degenerate());
    assert_abs_diff_eq!(m.start_return(), 0.08, epsilon = 1e-12);
    assert!(m.optimal_return(0.08).is_ok());
    assert!(matches!(
      m.optimal_return(0.1),
      Err(PortfolioError::InvalidTarget(_))
    ));
    assert!(m.efficient_curve(10).is_err());
  }

  #[test]
  fn tangency_portfolio_for_uncorrelated_assets() {
    let m = Markowitz::new(array![0.1, 0.2], Array2::from_diag(&array![0.04, 0.09])).unwrap();
    let w = m.max_sharpe(0.02).unwrap();

    assert_abs_diff_eq!(w, array![0.5, 0.5], epsilon = 1e-12);
    assert!(m.max_sharpe(0.5).is_err());
  }
}
