//! # Dense Linear Algebra
//!
//! $$
//! \Sigma = Q \Lambda Q^\top, \qquad A\mathbf{x} = \mathbf{b}
//! $$
//!
//! Thin bridge between `ndarray` inputs and `nalgebra` decompositions. Nothing in the
//! crate forms an explicit inverse; every `Σ⁻¹·v` is a Cholesky or LU solve.

use approx::AbsDiffEq;
use nalgebra::DMatrix;
use nalgebra::DVector;
use nalgebra::SymmetricEigen;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;

use crate::error::PortfolioError;
use crate::error::Result;

/// Smallest admissible ratio between the smallest and the largest LU pivot.
pub const PIVOT_TOLERANCE: f64 = 1e-12;

const EIGEN_MAX_ITERS: usize = 10_000;

pub fn to_dmatrix(a: &Array2<f64>) -> DMatrix<f64> {
  DMatrix::from_fn(a.nrows(), a.ncols(), |i, j| a[[i, j]])
}

pub fn to_array2(m: &DMatrix<f64>) -> Array2<f64> {
  Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

/// Check that `m` is square and return its dimension.
pub fn ensure_square(name: &str, m: &Array2<f64>) -> Result<usize> {
  if m.nrows() != m.ncols() {
    return Err(PortfolioError::config(format!(
      "{name} must be square, got {}x{}",
      m.nrows(),
      m.ncols()
    )));
  }
  Ok(m.nrows())
}

/// Check that every entry of `values` is finite.
pub fn ensure_finite<'a>(name: &str, values: impl IntoIterator<Item = &'a f64>) -> Result<()> {
  if values.into_iter().all(|v| v.is_finite()) {
    Ok(())
  } else {
    Err(PortfolioError::config(format!(
      "{name} contains non-finite values"
    )))
  }
}

pub fn is_symmetric(m: &Array2<f64>, tol: f64) -> bool {
  m.nrows() == m.ncols() && m.abs_diff_eq(&m.t(), tol)
}

/// `wᵀ M w`.
pub fn quad_form(w: &Array1<f64>, m: &Array2<f64>) -> f64 {
  w.dot(&m.dot(w))
}

/// Solve `A X = B` for symmetric positive-definite `A`.
pub fn cholesky_solve(a: &Array2<f64>, rhs: &Array2<f64>) -> Result<Array2<f64>> {
  let chol = to_dmatrix(a)
    .cholesky()
    .ok_or_else(|| PortfolioError::singular("matrix is not positive definite"))?;
  let x = chol.solve(&to_dmatrix(rhs));

  if x.iter().any(|v| !v.is_finite()) {
    return Err(PortfolioError::singular(
      "Cholesky solve produced non-finite values",
    ));
  }

  Ok(to_array2(&x))
}

/// Solve the square system `A x = b` by LU with partial pivoting.
///
/// A pivot smaller than [`PIVOT_TOLERANCE`] times the largest pivot is treated as a
/// zero pivot, so rank-deficient systems fail instead of returning amplified round-off.
pub fn lu_solve(a: &Array2<f64>, b: ArrayView1<f64>) -> Result<Array1<f64>> {
  let n = ensure_square("system matrix", a)?;
  if b.len() != n {
    return Err(PortfolioError::config(format!(
      "right-hand side has length {}, expected {n}",
      b.len()
    )));
  }

  let lu = to_dmatrix(a).lu();
  let pivots = lu.u().diagonal();
  let largest = pivots.amax();
  let smallest = pivots.amin();
  if !(largest > 0.0) || smallest <= PIVOT_TOLERANCE * largest {
    return Err(PortfolioError::singular(format!(
      "pivot ratio {:.3e} below tolerance",
      if largest > 0.0 { smallest / largest } else { 0.0 }
    )));
  }

  let rhs = DVector::from_iterator(n, b.iter().copied());
  let x = lu
    .solve(&rhs)
    .ok_or_else(|| PortfolioError::singular("LU solve failed"))?;

  if x.iter().any(|v| !v.is_finite()) {
    return Err(PortfolioError::singular("LU solve produced non-finite values"));
  }

  Ok(Array1::from_iter(x.iter().copied()))
}

/// Eigendecomposition of a symmetric matrix with eigenvalues sorted in descending order.
///
/// Column `k` of the returned matrix is the eigenvector of the `k`-th eigenvalue.
pub fn symmetric_eigen_desc(m: &Array2<f64>) -> Result<(Array1<f64>, Array2<f64>)> {
  let n = ensure_square("matrix", m)?;
  let eig = SymmetricEigen::try_new(to_dmatrix(m), f64::EPSILON, EIGEN_MAX_ITERS)
    .ok_or_else(|| PortfolioError::singular("eigendecomposition did not converge"))?;

  let mut order: Vec<usize> = (0..n).collect();
  order.sort_by(|&i, &j| eig.eigenvalues[j].total_cmp(&eig.eigenvalues[i]));

  let values = Array1::from_iter(order.iter().map(|&i| eig.eigenvalues[i]));
  let vectors = Array2::from_shape_fn((n, n), |(r, c)| eig.eigenvectors[(r, order[c])]);

  if values.iter().chain(vectors.iter()).any(|v| !v.is_finite()) {
    return Err(PortfolioError::singular(
      "eigendecomposition produced non-finite values",
    ));
  }

  Ok((values, vectors))
}

/// `V diag(λ) Vᵀ` for eigenvectors stored column-wise.
pub fn reconstruct(values: &Array1<f64>, vectors: &Array2<f64>) -> Array2<f64> {
  let scaled = vectors * values;
  scaled.dot(&vectors.t())
}
