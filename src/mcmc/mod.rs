//! The MCMC driver that ties the species tree, gene trees, likelihood and
//! proposals together into a runnable burn-in + sampling loop.

pub mod config;
pub mod driver;

pub use config::Config;
