//! Bayesian inference of species trees, delimitations and population
//! parameters under the multispecies coalescent.

pub mod cli;
pub mod containers;
pub mod errors;
pub mod io;
pub mod likelihood;
pub mod mcmc;
pub mod prior;
pub mod proposals;
pub mod rng;
pub mod tree;

pub use errors::Error;
