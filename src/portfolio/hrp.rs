//! # Hierarchical Risk Parity
//!
//! $$
//! \alpha = 1-\frac{V_L}{V_L+V_R},\qquad V_\ast=\tilde{\mathbf{w}}_\ast^\top\Sigma_\ast\tilde{\mathbf{w}}_\ast,
//! \qquad \tilde w_i \propto \sigma_i^{-2}
//! $$
//!
//! Lopez de Prado's allocator: seriate the assets with an agglomerative clustering of
//! correlation distances, then split the seriated list in halves and share capital
//! between siblings in inverse proportion to their inverse-variance cluster risk.
//! The covariance matrix is never inverted, so weights stay non-negative and sum to one
//! however badly conditioned the off-diagonal block is.

use ndarray::Array1;
use ndarray::Array2;
use ndarray::Axis;
use tracing::debug;

use super::data::cov2corr;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::linalg::ensure_finite;
use crate::linalg::ensure_square;
use crate::linalg::quad_form;

/// Merge rule for the seriation dendrogram.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Linkage {
  /// Ward's minimum-variance merge on Euclidean distances between distance-matrix rows.
  #[default]
  Ward,
  /// Nearest-neighbour merge on the correlation distances themselves.
  Single,
}

/// Weights together with the seriated asset order they were derived from.
#[derive(Clone, Debug)]
pub struct HrpAllocation {
  /// Weights in the original asset order.
  pub weights: Array1<f64>,
  /// Seriated order, correlated assets adjacent.
  pub order: Vec<usize>,
}

/// Hierarchical Risk Parity allocator.
#[derive(Clone, Copy, Debug, Default)]
pub struct HierarchicalRiskParity {
  linkage: Linkage,
}

impl HierarchicalRiskParity {
  /// Construct an allocator with the given dendrogram linkage.
  pub fn new(linkage: Linkage) -> Self {
    Self { linkage }
  }

  /// Linkage used for seriation.
  pub fn linkage(&self) -> Linkage {
    self.linkage
  }

  /// Allocate across the assets of `cov`.
  ///
  /// Every asset needs a strictly positive variance; a zero variance would make the
  /// inverse-variance step divide by zero and is reported as
  /// [`PortfolioError::Configuration`].
  pub fn allocate(&self, cov: &Array2<f64>) -> Result<HrpAllocation> {
    let n = ensure_square("covariance", cov)?;
    if n == 0 {
      return Err(PortfolioError::config("covariance has no assets"));
    }
    ensure_finite("covariance", cov.iter())?;

    let corr = cov2corr(cov)?;
    let order = self.seriate(&corr);
    debug!(?order, linkage = ?self.linkage, "hrp seriation");

    let weights = recursive_bisection(cov, &order)?;
    Ok(HrpAllocation { weights, order })
  }

  /// Leaf order of the dendrogram built on `corr`.
  pub fn seriate(&self, corr: &Array2<f64>) -> Vec<usize> {
    let dist = correlation_distance(corr);
    match self.linkage {
      Linkage::Single => agglomerate(&dist, Linkage::Single),
      Linkage::Ward => agglomerate(&row_distances(&dist), Linkage::Ward),
    }
  }
}

/// `d_ij = sqrt((1 − ρ_ij) / 2)`.
pub fn correlation_distance(corr: &Array2<f64>) -> Array2<f64> {
  corr.mapv(|c| ((1.0 - c).max(0.0) / 2.0).sqrt())
}

/// Weights proportional to `1 / σ_i²`.
pub fn inverse_variance_weights(cov: &Array2<f64>) -> Result<Array1<f64>> {
  ensure_square("covariance", cov)?;
  let diag = cov.diag();

  if let Some((i, v)) = diag
    .iter()
    .enumerate()
    .find(|&(_, &v)| !(v.is_finite() && v > 0.0))
  {
    return Err(PortfolioError::config(format!(
      "asset {i} has variance {v}, inverse-variance weighting needs it positive"
    )));
  }

  let inv = diag.mapv(|v| 1.0 / v);
  let total = inv.sum();
  Ok(inv / total)
}

/// Euclidean distance between the rows of a distance matrix.
fn row_distances(dist: &Array2<f64>) -> Array2<f64> {
  let n = dist.nrows();
  Array2::from_shape_fn((n, n), |(i, j)| {
    (&dist.row(i) - &dist.row(j))
      .mapv(|x| x * x)
      .sum()
      .sqrt()
  })
}

fn agglomerate(dist: &Array2<f64>, linkage: Linkage) -> Vec<usize> {
  let n = dist.nrows();
  if n <= 1 {
    return (0..n).collect();
  }

  let mut d = dist.clone();
  let mut active = vec![true; n];
  let mut size = vec![1usize; n];
  let mut node_id: Vec<usize> = (0..n).collect();
  let mut children: Vec<(usize, usize)> = Vec::with_capacity(n - 1);

  for step in 0..(n - 1) {
    let mut min_d = f64::INFINITY;
    let (mut mi, mut mj) = (0, 0);

    for i in 0..n {
      if !active[i] {
        continue;
      }
      for j in (i + 1)..n {
        if active[j] && d[[i, j]] < min_d {
          min_d = d[[i, j]];
          mi = i;
          mj = j;
        }
      }
    }

    // All remaining distances are NaN or infinite: merge the first two live clusters.
    if !min_d.is_finite() {
      let mut live = (0..n).filter(|&k| active[k]);
      mi = live.next().unwrap_or(0);
      mj = live.next().unwrap_or(mi);
      min_d = 0.0;
    }

    children.push((node_id[mi], node_id[mj]));

    for k in 0..n {
      if !active[k] || k == mi || k == mj {
        continue;
      }
      let merged = match linkage {
        Linkage::Single => d[[mi, k]].min(d[[mj, k]]),
        Linkage::Ward => {
          let (ni, nj, nk) = (size[mi] as f64, size[mj] as f64, size[k] as f64);
          let num = (ni + nk) * d[[mi, k]].powi(2) + (nj + nk) * d[[mj, k]].powi(2)
            - nk * min_d.powi(2);
          (num / (ni + nj + nk)).max(0.0).sqrt()
        }
      };
      d[[mi, k]] = merged;
      d[[k, mi]] = merged;
    }

    size[mi] += size[mj];
    active[mj] = false;
    node_id[mi] = n + step;
  }

  let mut order = Vec::with_capacity(n);
  let mut stack = vec![2 * n - 2];
  while let Some(node) = stack.pop() {
    if node < n {
      order.push(node);
    } else {
      let (left, right) = children[node - n];
      stack.push(right);
      stack.push(left);
    }
  }
  order
}

fn cluster_variance(cov: &Array2<f64>, members: &[usize]) -> Result<f64> {
  let sub = cov.select(Axis(0), members).select(Axis(1), members);
  let w = inverse_variance_weights(&sub)?;
  Ok(quad_form(&w, &sub))
}

/// Split the seriated list level by level, scaling each sibling pair by its
/// allocation factor. Left halves take the floor of odd sizes.
fn recursive_bisection(cov: &Array2<f64>, order: &[usize]) -> Result<Array1<f64>> {
  let mut weights = Array1::<f64>::ones(cov.nrows());
  let mut clusters: Vec<&[usize]> = vec![order];

  while !clusters.is_empty() {
    clusters = clusters
      .iter()
      .copied()
      .filter(|c| c.len() > 1)
      .flat_map(|c| {
        let mid = c.len() / 2;
        [&c[..mid], &c[mid..]]
      })
      .collect();

    for pair in clusters.chunks_exact(2) {
      let (left, right) = (pair[0], pair[1]);
      let var_left = cluster_variance(cov, left)?;
      let var_right = cluster_variance(cov, right)?;

      // A non-positive side would push alpha outside [0, 1].
      if ![var_left, var_right].iter().all(|v| v.is_finite() && *v > 0.0) {
        return Err(PortfolioError::config(format!(
          "degenerate cluster split {left:?} | {right:?}: variances {var_left} and {var_right}"
        )));
      }

      let alpha = 1.0 - var_left / (var_left + var_right);
      for &i in left {
        weights[i] *= alpha;
      }
      for &i in right {
        weights[i] *= 1.0 - alpha;
      }
    }
  }

  Ok(weights)
}
