//! # allocation-rs
//!
//! $$
//! \mathbf{w}^\* = \arg\min_{\mathbf{w}} \ \mathbf{w}^\top \Sigma \mathbf{w}
//! \quad \text{s.t.} \quad \mathbf{w}^\top \mathbf{1} = 1
//! $$
//!
//! Portfolio allocation from historical return statistics.
//!
//! ## Modules
//!
//! | Module        | Description                                                                 |
//! |---------------|-----------------------------------------------------------------------------|
//! | [`portfolio`] | Markowitz frontier, KKT quadratic programs, HRP, RMT denoising, engine.     |
//! | [`stats`]     | Kernel density estimation and the Marcenko-Pastur law.                      |
//! | [`linalg`]    | Dense solves and eigendecompositions over `ndarray` inputs.                 |
//! | [`error`]     | Crate error type.                                                           |
//!
//! Every optimizer is a pure function of its numeric inputs. Weight vectors are
//! always aligned with the asset order of the covariance matrix they were built from.

pub mod error;
pub mod linalg;
pub mod portfolio;
pub mod stats;

pub use error::PortfolioError;
pub use error::Result;
