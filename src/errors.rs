use std::path::PathBuf;

use thiserror::Error;

/// Typed errors for the MSC inference engine.
///
/// Input-parsing variants (`InputParse`, `InvalidNewick`, `UnevenAlignment`,
/// `IllegalCharacter`) carry file/line or byte-offset context and abort
/// startup. `Numeric` and `InvariantViolation` indicate a corrupted
/// invariant during MCMC and are always fatal. `Io`/`Csv` wrap the
/// underlying I/O failures.
#[derive(Error, Debug)]
pub enum Error {
    #[error("parse error in {path}:{line}: {msg}")]
    InputParse {
        path: PathBuf,
        line: usize,
        msg: String,
    },

    #[error("invalid rooted Newick tree: {msg}")]
    InvalidNewick { msg: String },

    #[error("duplicate species label: {label}")]
    DuplicateLabel { label: String },

    #[error("species '{species}' referenced by individual '{individual}' not found in species tree")]
    UnknownSpecies { individual: String, species: String },

    #[error("duplicate individual label in map file: {individual}")]
    DuplicateIndividual { individual: String },

    #[error("species tree is not ultrametric: population '{label}' has tau {tau} >= parent tau {parent_tau}")]
    NonUltrametric {
        label: String,
        tau: f64,
        parent_tau: f64,
    },

    #[error("population '{label}' requires theta because it has coalescent events, but none was set")]
    MissingTheta { label: String },

    #[error("alignment '{locus}' has sequences of unequal length ({expected} vs {found})")]
    UnevenAlignment {
        locus: String,
        expected: usize,
        found: usize,
    },

    #[error("illegal or unprintable character {byte:#04x} at {context}")]
    IllegalCharacter { byte: u8, context: String },

    #[error("non-finite value encountered in {what}: {value}; this indicates a corrupted invariant")]
    Numeric { what: String, value: f64 },

    #[error("invariant violated: {msg}")]
    InvariantViolation { msg: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
