//! Spectral linear mixed model.
//!
//! Works with y ~ N(X beta, sigma2 (h2 K + (1 - h2) I)) in the eigenbasis of
//! K, where the covariance is diagonal:
//! - `spectral`: the kernel at a fixed h2 (or log delta)
//! - `product`: a' K^-1 b style products of rotated matrices
//! - `likelihood`: ML and REML profile likelihoods
//! - `h2_search`: grid + Brent search for h2

pub mod h2_search;
pub mod likelihood;
pub mod product;
pub mod spectral;

pub use h2_search::{find_h2, H2Result, H2SearchConfig};
pub use likelihood::{loglikelihood_ml, loglikelihood_reml, MlFit, RemlFit};
pub use product::KernelProduct;
pub use spectral::SpectralKernel;
