//! # Portfolio
//!
//! $$
//! \sigma_p^2 = \mathbf{w}^\top \Sigma \mathbf{w}
//! $$
//!
//! Covariance estimation and cleaning, mean-variance and hierarchical allocators.

pub mod data;
pub mod denoise;
pub mod engine;
pub mod hrp;
pub mod markowitz;
pub mod monte_carlo;
pub mod qp;
pub mod types;

pub use data::corr2cov;
pub use data::cov2corr;
pub use data::ReturnsTable;
pub use denoise::DenoiseConfig;
pub use denoise::DenoiseMethod;
pub use denoise::Denoised;
pub use denoise::Denoiser;
pub use denoise::NoiseFit;
pub use engine::EngineRun;
pub use engine::PortfolioEngine;
pub use engine::PortfolioEngineConfig;
pub use hrp::inverse_variance_weights;
pub use hrp::HierarchicalRiskParity;
pub use hrp::HrpAllocation;
pub use hrp::Linkage;
pub use markowitz::FrontierConstants;
pub use markowitz::Markowitz;
pub use monte_carlo::RandomPortfolios;
pub use qp::efficient_return_qp;
pub use qp::min_variance_qp;
pub use qp::QpSolution;
pub use qp::QuadraticProgram;
pub use types::EfficientFrontierCurve;
pub use types::FrontierPoint;
pub use types::OptimizerMethod;
pub use types::PortfolioResult;
