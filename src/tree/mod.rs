//! The shared species/gene tree data model.

pub mod gene;
pub mod species;

pub use gene::{GeneNode, GeneTree};
pub use species::{SpeciesNode, SpeciesTree};
