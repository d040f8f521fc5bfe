//! `gtree_propose_ages`: perturb a single gene-tree internal node's
//! coalescent age.

use crate::errors::Error;
use crate::likelihood::Locus;
use crate::prior;
use crate::proposals::{reflect, Finetune};
use crate::rng::Rng;
use crate::tree::gene::GeneTree;
use crate::tree::species::SpeciesTree;

/// Propose a new age for a uniformly chosen internal node of `gene_tree`,
/// accept or reject by the Metropolis-Hastings ratio, and return whether the
/// move was accepted. On rejection every piece of mutated state (the node's
/// time, its population's event list, the affected CLVs and the population's
/// prior contribution) is brought back to its pre-proposal value.
pub fn propose(
    species_tree: &mut SpeciesTree,
    gene_tree: &mut GeneTree,
    locus: &mut Locus,
    locus_index: usize,
    finetune: &mut Finetune,
    rng: &mut Rng,
) -> Result<bool, Error> {
    if gene_tree.internal_count() == 0 {
        return Ok(false);
    }
    let idx = gene_tree.tip_count + rng.uniform_index(gene_tree.internal_count());
    let node = &gene_tree.nodes[idx];
    let pop = node.pop;
    let left = node.left.unwrap();
    let right = node.right.unwrap();

    let t_lo = gene_tree.nodes[left]
        .time
        .max(gene_tree.nodes[right].time)
        .max(species_tree.nodes[pop].tau);
    let t_hi = node
        .parent
        .map(|p| gene_tree.nodes[p].time)
        .unwrap_or(f64::INFINITY)
        .min(species_tree.parent_tau(pop));

    let old_time = node.time;
    let old_logl = gene_tree.logl;
    let old_contrib = species_tree.nodes[pop].logpr_contrib[locus_index];
    let handle = gene_tree.nodes[idx].event.expect("internal node must own an event handle");

    let eps = rng.uniform_range(-finetune.step / 2.0, finetune.step / 2.0);
    let new_time = reflect(old_time + eps, t_lo, t_hi);

    species_tree.nodes[pop].event[locus_index].rekey(handle, new_time);
    gene_tree.nodes[idx].time = new_time;
    gene_tree.invalidate_path_to_root(idx);

    let new_logl = locus.log_likelihood(gene_tree)?;
    let new_contrib = prior::update_logprob_contrib(species_tree, pop, locus_index);

    let delta = (new_logl - old_logl) + (new_contrib - old_contrib);
    let accept = delta >= 0.0 || rng.uniform().ln() < delta;

    if accept {
        gene_tree.logl = new_logl;
        finetune.record(true);
        Ok(true)
    } else {
        species_tree.nodes[pop].event[locus_index].rekey(handle, old_time);
        gene_tree.nodes[idx].time = old_time;
        gene_tree.invalidate_path_to_root(idx);
        gene_tree.logl = locus.log_likelihood(gene_tree)?;
        prior::update_logprob_contrib(species_tree, pop, locus_index);
        finetune.record(false);
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::gene::{build_initial, TipAssignment};

    #[test]
    fn proposed_age_stays_within_the_feasible_interval() {
        let mut stree = SpeciesTree::from_newick("(A);").unwrap();
        stree.nodes[0].theta = Some(0.01);
        stree.allocate_loci(1);

        let tips = vec![
            TipAssignment { species: 0, label: "a1" },
            TipAssignment { species: 0, label: "a2" },
            TipAssignment { species: 0, label: "a3" },
        ];
        let mut rng = Rng::from_seed(7);
        let mut gtree = build_initial(&mut stree, 0, &tips, &mut rng).unwrap();
        let mut locus = Locus::new(
            vec![vec![1, 1, 1], vec![2, 2, 2], vec![1, 2, 1]],
            vec![1.0, 1.0, 1.0],
        );
        locus.log_likelihood(&mut gtree).unwrap();

        let mut finetune = Finetune::new(0.05);
        for _ in 0..20 {
            age_move_respects_bounds(&mut stree, &mut gtree, &mut locus, &mut finetune, &mut rng);
        }
    }

    fn age_move_respects_bounds(
        stree: &mut SpeciesTree,
        gtree: &mut GeneTree,
        locus: &mut Locus,
        finetune: &mut Finetune,
        rng: &mut Rng,
    ) {
        propose(stree, gtree, locus, 0, finetune, rng).unwrap();
        for idx in 0..gtree.nodes.len() {
            if !gtree.nodes[idx].is_tip() {
                let (l, r) = (gtree.nodes[idx].left.unwrap(), gtree.nodes[idx].right.unwrap());
                assert!(gtree.nodes[idx].time > gtree.nodes[l].time);
                assert!(gtree.nodes[idx].time > gtree.nodes[r].time);
            }
        }
    }
}
