//! Input/output: Newick species trees, PHYLIP/FASTA alignments, map files,
//! and the CSV trace output.

pub mod mapfile;
pub mod msa;
pub mod newick;
pub mod trace;
