//! Locus likelihood under JC69 with a Felsenstein pruning recursion over a
//! gene tree.

pub mod jc69;
pub mod locus;
pub mod maps;

pub use locus::Locus;
