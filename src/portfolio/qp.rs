//! # Equality-Constrained Quadratic Programs
//!
//! $$
//! \begin{bmatrix} B & A^\top \\ A & 0 \end{bmatrix}
//! \begin{bmatrix} \mathbf{x} \\ \boldsymbol\lambda \end{bmatrix}
//! =
//! \begin{bmatrix} \mathbf{b} \\ \mathbf{c} \end{bmatrix}
//! $$
//!
//! Quadratic objective with Hessian `B`, linear term `b` and equality constraints
//! `A x = c`, solved in one pass through its KKT (saddle-point) system.

use ndarray::s;
use ndarray::Array1;
use ndarray::Array2;

use crate::error::PortfolioError;
use crate::error::Result;
use crate::linalg::ensure_finite;
use crate::linalg::ensure_square;
use crate::linalg::lu_solve;

/// Primal solution and Lagrange multipliers of a [`QuadraticProgram`].
#[derive(Clone, Debug)]
pub struct QpSolution {
  /// Primal solution, `n` entries.
  pub x: Array1<f64>,
  /// Lagrange multipliers, one per constraint.
  pub lambda: Array1<f64>,
}

/// `min xᵀBx − bᵀx` subject to `A x = c`, with `n` variables and `m` constraints.
#[derive(Clone, Debug)]
pub struct QuadraticProgram {
  hessian: Array2<f64>,
  constraints: Array2<f64>,
  targets: Array1<f64>,
  linear: Array1<f64>,
}

impl QuadraticProgram {
  /// `hessian` is `n×n`, `constraints` is `m×n`, `targets` has `m` entries.
  /// The linear term defaults to zero.
  pub fn new(hessian: Array2<f64>, constraints: Array2<f64>, targets: Array1<f64>) -> Result<Self> {
    let n = ensure_square("Hessian", &hessian)?;
    if n == 0 {
      return Err(PortfolioError::config("quadratic program has no variables"));
    }
    if constraints.ncols() != n {
      return Err(PortfolioError::config(format!(
        "constraint matrix has {} columns, expected {n}",
        constraints.ncols()
      )));
    }
    if constraints.nrows() != targets.len() {
      return Err(PortfolioError::config(format!(
        "{} constraints but {} targets",
        constraints.nrows(),
        targets.len()
      )));
    }
    ensure_finite("Hessian", hessian.iter())?;
    ensure_finite("constraint matrix", constraints.iter())?;
    ensure_finite("constraint targets", targets.iter())?;

    Ok(Self {
      hessian,
      constraints,
      targets,
      linear: Array1::zeros(n),
    })
  }

  /// Set the linear term `b`.
  pub fn with_linear_term(mut self, linear: Array1<f64>) -> Result<Self> {
    if linear.len() != self.n_variables() {
      return Err(PortfolioError::config(format!(
        "linear term has {} entries, expected {}",
        linear.len(),
        self.n_variables()
      )));
    }
    ensure_finite("linear term", linear.iter())?;
    self.linear = linear;
    Ok(self)
  }

  pub fn n_variables(&self) -> usize {
    self.hessian.nrows()
  }

  pub fn n_constraints(&self) -> usize {
    self.constraints.nrows()
  }

  /// Saddle-point matrix `[[B, Aᵀ], [A, 0]]` and right-hand side `[b; c]`.
  pub fn kkt_system(&self) -> (Array2<f64>, Array1<f64>) {
    let (n, m) = (self.n_variables(), self.n_constraints());
    let mut kkt = Array2::<f64>::zeros((n + m, n + m));

    kkt.slice_mut(s![..n, ..n]).assign(&self.hessian);
    kkt.slice_mut(s![..n, n..]).assign(&self.constraints.t());
    kkt.slice_mut(s![n.., ..n]).assign(&self.constraints);

    let mut rhs = Array1::<f64>::zeros(n + m);
    rhs.slice_mut(s![..n]).assign(&self.linear);
    rhs.slice_mut(s![n..]).assign(&self.targets);
    (kkt, rhs)
  }

  /// Solve the KKT system.
  ///
  /// Fails with [`PortfolioError::NumericalSingularity`] when the saddle-point matrix is
  /// not invertible, e.g. linearly dependent constraints.
  pub fn solve(&self) -> Result<QpSolution> {
    let (kkt, rhs) = self.kkt_system();
    let z = lu_solve(&kkt, rhs.view())?;
    let n = self.n_variables();

    Ok(QpSolution {
      x: z.slice(s![..n]).to_owned(),
      lambda: z.slice(s![n..]).to_owned(),
    })
  }
}

/// Global minimum-variance weights: `B = 2Σ`, `A = 1ᵀ`, `c = 1`.
pub fn min_variance_qp(cov: &Array2<f64>) -> Result<Array1<f64>> {
  let n = ensure_square("covariance", cov)?;
  let qp = QuadraticProgram::new(cov * 2.0, Array2::ones((1, n)), Array1::ones(1))?;
  Ok(qp.solve()?.x)
}

/// Fully invested weights of minimum variance with expected return `target`.
pub fn efficient_return_qp(mu: &Array1<f64>, cov: &Array2<f64>, target: f64) -> Result<Array1<f64>> {
  let n = ensure_square("covariance", cov)?;
  if mu.len() != n {
    return Err(PortfolioError::config(format!(
      "{} expected returns for {n} assets",
      mu.len()
    )));
  }

  let mut constraints = Array2::<f64>::ones((2, n));
  constraints.row_mut(1).assign(mu);
  let qp = QuadraticProgram::new(cov * 2.0, constraints, ndarray::array![1.0, target])?;
  Ok(qp.solve()?.x)
}
