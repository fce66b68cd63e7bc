//! # Random Portfolios
//!
//! $$
//! \mathbf{w}=\frac{\mathbf{u}}{\mathbf{1}^\top\mathbf{u}},\qquad u_i\sim\mathcal{U}(0,1)
//! $$
//!
//! Monte Carlo cloud of long-only portfolios under fixed moments. Every draw uses its
//! own generator seeded from `(seed, index)`, so the cloud does not depend on how rayon
//! schedules the work.

use impl_new_derive::ImplNew;
use ndarray::Array1;
use ndarray::Array2;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::Uniform;
use rayon::prelude::*;
use tracing::debug;

use super::types::PortfolioResult;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::linalg::ensure_finite;
use crate::linalg::ensure_square;

/// Odd multiplier spreading draw indices across the seed space.
const SEED_STRIDE: u64 = 0xD134_2543_DE82_EF95;

#[derive(ImplNew, Clone, Copy, Debug)]
pub struct RandomPortfolios {
  /// Number of portfolios drawn.
  pub n_portfolios: usize,
  /// Base seed.
  pub seed: u64,
}

impl RandomPortfolios {
  /// Draw `n_portfolios` fully invested long-only portfolios and summarise each one.
  pub fn simulate(&self, mu: &Array1<f64>, cov: &Array2<f64>) -> Result<Vec<PortfolioResult>> {
    let n = ensure_square("covariance", cov)?;
    if n == 0 || mu.len() != n {
      return Err(PortfolioError::config(format!(
        "{} expected returns for {n} assets",
        mu.len()
      )));
    }
    ensure_finite("expected returns", mu.iter())?;
    ensure_finite("covariance", cov.iter())?;

    let draws = (0..self.n_portfolios)
      .into_par_iter()
      .map(|idx| {
        let mut rng = StdRng::seed_from_u64(
          self
            .seed
            .wrapping_add(SEED_STRIDE.wrapping_mul((idx as u64).wrapping_add(1))),
        );
        let raw = Array1::random_using(n, Uniform::new(0.0, 1.0), &mut rng);
        let total = raw.sum();
        let weights = if total > 0.0 {
          raw / total
        } else {
          Array1::from_elem(n, 1.0 / n as f64)
        };
        PortfolioResult::from_weights(weights, mu, cov, 0.0)
      })
      .collect::<Vec<_>>();

    debug!(n_portfolios = draws.len(), seed = self.seed, "random portfolios drawn");
    Ok(draws)
  }

  /// Least volatile of the simulated portfolios, `None` when none were drawn.
  pub fn min_volatility(&self, mu: &Array1<f64>, cov: &Array2<f64>) -> Result<Option<PortfolioResult>> {
    let draws = self.simulate(mu, cov)?;
    Ok(
      draws
        .into_iter()
        .min_by(|a, b| a.volatility.total_cmp(&b.volatility)),
    )
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::array;

  use super::*;
  use crate::portfolio::markowitz::Markowitz;

  fn moments() -> (Array1<f64>, Array2<f64>) {
    (
      array![0.05, 0.10, 0.15],
      array![[0.04, 0.01, 0.0], [0.01, 0.09, 0.02], [0.0, 0.02, 0.16]],
    )
  }

  #[test]
  fn draws_are_long_only_and_fully_invested() {
    let (mu, cov) = moments();
    let draws = RandomPortfolios::new(500, 11).simulate(&mu, &cov).unwrap();

    assert_eq!(draws.len(), 500);
    for p in &draws {
      assert!(p.weights.iter().all(|&w| w >= 0.0));
      assert_abs_diff_eq!(p.weights.sum(), 1.0, epsilon = 1e-12);
      assert!(p.expected_return >= 0.05 - 1e-12 && p.expected_return <= 0.15 + 1e-12);
    }
  }

  #[test]
  fn same_seed_same_cloud() {
    let (mu, cov) = moments();
    let a = RandomPortfolios::new(64, 3).simulate(&mu, &cov).unwrap();
    let b = RandomPortfolios::new(64, 3).simulate(&mu, &cov).unwrap();

    for (x, y) in a.iter().zip(&b) {
      assert_eq!(x.weights, y.weights);
    }
  }

  #[test]
  fn adjacent_seeds_give_disjoint_clouds() {
    let (mu, cov) = moments();
    let a = RandomPortfolios::new(64, 3).simulate(&mu, &cov).unwrap();
    let b = RandomPortfolios::new(64, 4).simulate(&mu, &cov).unwrap();

    for x in &a {
      assert!(b.iter().all(|y| x.weights != y.weights));
    }
  }

  #[test]
  fn cloud_never_beats_the_minimum_variance_portfolio() {
    let (mu, cov) = moments();
    let gmv = Markowitz::new(mu.clone(), cov.clone()).unwrap();
    let floor = gmv.portfolio(gmv.min_variance_weights(), 0.0).volatility;
    let best = RandomPortfolios::new(2_000, 5)
      .min_volatility(&mu, &cov)
      .unwrap()
      .unwrap();

    assert!(best.volatility >= floor - 1e-12);
  }

  #[test]
  fn empty_cloud_has_no_minimum() {
    let (mu, cov) = moments();
    assert!(RandomPortfolios::new(0, 1)
      .min_volatility(&mu, &cov)
      .unwrap()
      .is_none());
  }
}
