//! The multispecies-coalescent log-prior on gene-tree topology and node ages
//! given the species tree: for every population and locus, the standard
//! Kingman-coalescent likelihood of the coalescent times observed in that
//! population.

use crate::tree::species::SpeciesTree;

/// `n choose 2`, as an `f64` since it always multiplies a rate.
fn choose2(n: usize) -> f64 {
    (n * n.saturating_sub(1)) as f64 / 2.0
}

/// Recompute `s.logpr_contrib[locus]` from its event list and return the new
/// value.
///
/// Events are stored keyed by absolute gene-node time; `n = seqin_count`
/// lineages entered the population at `tau`, and `k_i = n - i + 1` lineages
/// are present just before the `i`-th coalescence.
pub fn update_logprob_contrib(species_tree: &mut SpeciesTree, population: usize, locus: usize) -> f64 {
    let tau = species_tree.nodes[population].tau;
    let tau_top = species_tree.parent_tau(population);
    let n = species_tree.nodes[population].seqin_count[locus];
    let two_over_theta = 2.0
        / species_tree.nodes[population]
            .theta
            .expect("population must have theta before its log-prior can be evaluated");

    let events: Vec<f64> = species_tree.nodes[population].event[locus]
        .iter()
        .map(|(_, t)| t)
        .collect();
    let m = events.len();

    let mut logpr = 0.0;
    let mut t_prev = tau;
    for (i, &t_i) in events.iter().enumerate() {
        let k_i = (n - i) as f64; // n - (i+1) + 1, i 0-based
        logpr += two_over_theta.ln() - choose2(k_i as usize) * (t_i - t_prev) * two_over_theta;
        t_prev = t_i;
    }

    if tau_top.is_finite() {
        let k_last = n - m;
        logpr -= choose2(k_last) * (tau_top - t_prev) * two_over_theta;
    }

    species_tree.nodes[population].logpr_contrib[locus] = logpr;
    logpr
}

/// Sum every population's per-locus contribution for `locus`, i.e. the
/// full-locus MSC log-prior `G.logpr`.
pub fn locus_logpr(species_tree: &SpeciesTree, locus: usize) -> f64 {
    species_tree
        .nodes
        .iter()
        .map(|node| node.logpr_contrib[locus])
        .sum()
}

/// Recompute every population's contribution for `locus` from scratch and
/// return the total. Used when initializing a gene tree or after a proposal
/// that touches every population (e.g. rescaling all of `theta`).
pub fn recompute_locus(species_tree: &mut SpeciesTree, locus: usize) -> f64 {
    let n = species_tree.len();
    let mut total = 0.0;
    for population in 0..n {
        total += update_logprob_contrib(species_tree, population, locus);
    }
    total
}
