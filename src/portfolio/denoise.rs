//! # Random-Matrix Denoising
//!
//! $$
//! \hat\sigma^2=\arg\min_{\sigma^2\in(0,1)}\ \frac{1}{M}\sum_{m=1}^{M}
//! \Big(\hat f_{\mathrm{KDE}}(\lambda_m)-f_{\mathrm{MP}}(\lambda_m;\sigma^2,q)\Big)^2,
//! \qquad \lambda_{\max}=\hat\sigma^2\left(1+\sqrt{1/q}\right)^2
//! $$
//!
//! Eigenvalues of an empirical correlation matrix above `λ_max` are kept as signal; the
//! rest are consistent with pure noise and are either flattened to their mean or shrunk
//! toward the diagonal.

use argmin::core::CostFunction;
use argmin::core::Executor;
use argmin::core::State;
use argmin::core::TerminationReason;
use argmin::solver::brent::BrentOpt;
use ndarray::s;
use ndarray::Array1;
use ndarray::Array2;
use tracing::debug;
use tracing::warn;

pub use super::data::corr2cov;
pub use super::data::cov2corr;
use super::data::ReturnsTable;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::linalg::ensure_finite;
use crate::linalg::ensure_square;
use crate::linalg::is_symmetric;
use crate::linalg::reconstruct;
use crate::linalg::symmetric_eigen_desc;
use crate::stats::marcenko_pastur;
pub use crate::stats::marcenko_pastur::max_eigenvalue;
pub use crate::stats::marcenko_pastur::pdf as marcenko_pastur_pdf;
use crate::stats::Bandwidth;
use crate::stats::GaussianKde;

/// Search interval for the noise variance.
pub const VARIANCE_BOUNDS: (f64, f64) = (1e-5, 1.0 - 1e-5);

/// Variance used when the search does not converge.
pub const FALLBACK_VARIANCE: f64 = 1.0;

/// Upper bound on the Marcenko-Pastur grid size.
const MAX_GRID_POINTS: usize = 1_000;

/// How the noise eigenvalues are cleaned.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum DenoiseMethod {
  /// Replace every noise eigenvalue by their mean, preserving the trace.
  #[default]
  ConstantResidual,
  /// Keep `alpha` of the noise block's off-diagonal mass and all of its diagonal.
  Shrinkage { alpha: f64 },
}

/// Runtime configuration for [`Denoiser`].
#[derive(Clone, Copy, Debug)]
pub struct DenoiseConfig {
  /// Kernel bandwidth of the empirical eigenvalue density.
  pub bandwidth: Bandwidth,
  /// Cleaning rule for noise eigenvalues.
  pub method: DenoiseMethod,
  /// Iteration cap of the noise-variance search.
  pub max_iters: u64,
}

impl Default for DenoiseConfig {
  fn default() -> Self {
    Self {
      bandwidth: Bandwidth::default(),
      method: DenoiseMethod::ConstantResidual,
      max_iters: 100,
    }
  }
}

/// Outcome of the Marcenko-Pastur fit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoiseFit {
  /// Fitted noise variance `σ²`.
  pub variance: f64,
  /// Largest eigenvalue explained by noise.
  pub lambda_max: f64,
  /// Number of eigenvalues above `lambda_max`.
  pub n_facts: usize,
  /// `false` when the search failed and [`FALLBACK_VARIANCE`] was used.
  pub converged: bool,
}

/// Cleaned matrix with the spectrum and fit it was derived from.
#[derive(Clone, Debug)]
pub struct Denoised {
  pub matrix: Array2<f64>,
  /// Eigenvalues of the input correlation matrix, descending.
  pub eigenvalues: Array1<f64>,
  pub fit: NoiseFit,
}

/// Marcenko-Pastur eigenvalue denoiser for matrices estimated from `q = T/N`
/// observations per asset.
#[derive(Clone, Copy, Debug)]
pub struct Denoiser {
  q: f64,
  config: DenoiseConfig,
}

struct SpectrumMismatch {
  kde: GaussianKde,
  q: f64,
  n_points: usize,
}

impl CostFunction for SpectrumMismatch {
  type Param = f64;
  type Output = f64;

  fn cost(&self, variance: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
    let (grid, theory) = marcenko_pastur::pdf(*variance, self.q, self.n_points);
    let empirical = self.kde.density_on(grid.view());
    let mse = (&empirical - &theory).mapv(|x| x * x).mean();
    Ok(mse.unwrap_or(f64::INFINITY))
  }
}

impl Denoiser {
  /// Fails unless `q > 1`, a fixed bandwidth is positive and a shrinkage `alpha` lies
  /// in `[0, 1]`.
  pub fn new(q: f64, config: DenoiseConfig) -> Result<Self> {
    if !(q.is_finite() && q > 1.0) {
      return Err(PortfolioError::config(format!(
        "denoising needs q = T/N > 1, got {q}"
      )));
    }
    if let Bandwidth::Fixed(h) = config.bandwidth {
      if !(h.is_finite() && h > 0.0) {
        return Err(PortfolioError::config(format!(
          "bandwidth must be positive, got {h}"
        )));
      }
    }
    if let DenoiseMethod::Shrinkage { alpha } = config.method {
      if !(0.0..=1.0).contains(&alpha) {
        return Err(PortfolioError::config(format!(
          "shrinkage alpha must lie in [0, 1], got {alpha}"
        )));
      }
    }
    if config.max_iters == 0 {
      return Err(PortfolioError::config("max_iters must be at least 1"));
    }

    Ok(Self { q, config })
  }

  /// Denoiser with `q` taken from the shape of `table`.
  pub fn from_returns(table: &ReturnsTable, config: DenoiseConfig) -> Result<Self> {
    Self::new(table.q(), config)
  }

  pub fn q(&self) -> f64 {
    self.q
  }

  pub fn config(&self) -> &DenoiseConfig {
    &self.config
  }

  /// Fit the noise variance to a spectrum and count the signal eigenvalues.
  ///
  /// Never fails on a non-converging search: the variance falls back to
  /// [`FALLBACK_VARIANCE`], `converged` is cleared and a warning is logged.
  pub fn fit_noise(&self, eigenvalues: &Array1<f64>) -> Result<NoiseFit> {
    let kde = GaussianKde::fit(eigenvalues.view(), self.config.bandwidth)?;
    let n_obs = (self.q * eigenvalues.len() as f64).round() as usize;
    let problem = SpectrumMismatch {
      kde,
      q: self.q,
      n_points: n_obs.clamp(2, MAX_GRID_POINTS),
    };

    let (lo, hi) = VARIANCE_BOUNDS;
    let outcome = Executor::new(problem, BrentOpt::new(lo, hi))
      .configure(|state| state.max_iters(self.config.max_iters))
      .run();

    let fitted = match outcome {
      Ok(res) => {
        let state = res.state();
        let converged = matches!(
          state.get_termination_reason(),
          Some(TerminationReason::SolverConverged)
        );
        state
          .get_best_param()
          .copied()
          .filter(|v| converged && v.is_finite())
      }
      Err(err) => {
        debug!(%err, "noise variance search errored");
        None
      }
    };

    let (variance, converged) = match fitted {
      Some(v) => (v, true),
      None => {
        warn!(
          q = self.q,
          fallback = FALLBACK_VARIANCE,
          "noise variance search did not converge, falling back to the default"
        );
        (FALLBACK_VARIANCE, false)
      }
    };

    let lambda_max = marcenko_pastur::max_eigenvalue(variance, self.q);
    let n_facts = eigenvalues.iter().filter(|&&e| e > lambda_max).count();
    debug!(variance, lambda_max, n_facts, converged, "marcenko-pastur fit");

    Ok(NoiseFit {
      variance,
      lambda_max,
      n_facts,
      converged,
    })
  }

  /// Clean a correlation matrix. The result is symmetric, finite, has a unit diagonal
  /// and entries in `[-1, 1]`.
  pub fn denoise_correlation(&self, corr: &Array2<f64>) -> Result<Denoised> {
    let n = ensure_square("correlation", corr)?;
    if n == 0 {
      return Err(PortfolioError::config("correlation matrix is empty"));
    }
    ensure_finite("correlation", corr.iter())?;
    if !is_symmetric(corr, 1e-10) {
      return Err(PortfolioError::config("correlation matrix must be symmetric"));
    }

    let (values, vectors) = symmetric_eigen_desc(corr)?;
    let fit = self.fit_noise(&values)?;

    let cleaned = match self.config.method {
      DenoiseMethod::ConstantResidual => constant_residual(&values, &vectors, fit.n_facts),
      DenoiseMethod::Shrinkage { alpha } => shrink_residual(&values, &vectors, fit.n_facts, alpha),
    };
    let symmetric = (&cleaned + &cleaned.t()) / 2.0;
    let matrix = cov2corr(&symmetric)?;
    ensure_finite("denoised correlation", matrix.iter())?;

    Ok(Denoised {
      matrix,
      eigenvalues: values,
      fit,
    })
  }

  /// Clean a covariance matrix through its correlation, keeping the original variances.
  pub fn denoise_covariance(&self, cov: &Array2<f64>) -> Result<Denoised> {
    let corr = cov2corr(cov)?;
    let std = cov.diag().mapv(f64::sqrt);
    let denoised = self.denoise_correlation(&corr)?;

    Ok(Denoised {
      matrix: corr2cov(&denoised.matrix, &std)?,
      ..denoised
    })
  }
}

fn constant_residual(values: &Array1<f64>, vectors: &Array2<f64>, n_facts: usize) -> Array2<f64> {
  let mut flattened = values.clone();
  let n = values.len();
  if n_facts < n {
    let mean = values.slice(s![n_facts..]).sum() / (n - n_facts) as f64;
    flattened.slice_mut(s![n_facts..]).fill(mean);
  }
  reconstruct(&flattened, vectors)
}

fn shrink_residual(
  values: &Array1<f64>,
  vectors: &Array2<f64>,
  n_facts: usize,
  alpha: f64,
) -> Array2<f64> {
  let signal = reconstruct(
    &values.slice(s![..n_facts]).to_owned(),
    &vectors.slice(s![.., ..n_facts]).to_owned(),
  );
  let noise = reconstruct(
    &values.slice(s![n_facts..]).to_owned(),
    &vectors.slice(s![.., n_facts..]).to_owned(),
  );
  let noise_diag = Array2::from_diag(&noise.diag());

  signal + &(noise * alpha) + &(noise_diag * (1.0 - alpha))
}
