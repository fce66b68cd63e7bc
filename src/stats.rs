//! # Stats
//!
//! $$
//! f_{\mathrm{MP}}(\lambda)=\frac{q}{2\pi\sigma^2\lambda}\sqrt{(\lambda_+-\lambda)(\lambda-\lambda_-)}
//! $$
//!
//! Density tools used by the eigenvalue denoiser.
pub mod gaussian_kde;
pub mod marcenko_pastur;

pub use gaussian_kde::Bandwidth;
pub use gaussian_kde::GaussianKde;
