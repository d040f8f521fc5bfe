//! `stree_propose_tau`: perturb a single internal species-tree node's
//! divergence time.
//!
//! Rescaling gene ages: every gene-tree node whose population is `s` has its
//! age affinely rescaled so that its position relative to `[tau, tau_top]`
//! is preserved after `tau` moves to `tau'` (`tau_top` held fixed). This
//! keeps every such node inside `s`'s span without having to walk the event
//! list node-by-node choosing which ones move.

use crate::errors::Error;
use crate::likelihood::Locus;
use crate::prior;
use crate::proposals::{reflect, Finetune};
use crate::rng::Rng;
use crate::tree::gene::GeneTree;
use crate::tree::species::SpeciesTree;

/// One locus's working state, bundled so [`propose`] can touch every locus
/// that might have gene nodes inside the perturbed population.
pub struct LocusState<'a> {
    pub gene_tree: &'a mut GeneTree,
    pub locus: &'a mut Locus,
}

pub fn propose(
    species_tree: &mut SpeciesTree,
    population: usize,
    tau_alpha: f64,
    tau_beta: f64,
    loci: &mut [LocusState<'_>],
    finetune: &mut Finetune,
    rng: &mut Rng,
) -> Result<bool, Error> {
    if species_tree.nodes[population].is_tip() {
        return Ok(false);
    }
    let left = species_tree.nodes[population].left.unwrap();
    let right = species_tree.nodes[population].right.unwrap();
    let tau_lo = species_tree.nodes[left].tau.max(species_tree.nodes[right].tau);
    let is_root = species_tree.is_root(population);
    let tau_top = species_tree.parent_tau(population);

    let old_tau = species_tree.nodes[population].tau;
    let eps = rng.uniform_range(-finetune.step / 2.0, finetune.step / 2.0);
    let new_tau = if is_root {
        let mut x = old_tau + eps;
        if x < tau_lo {
            x = 2.0 * tau_lo - x;
        }
        x
    } else {
        reflect(old_tau + eps, tau_lo, tau_top)
    };

    let scale = if is_root {
        1.0 // the root population has no finite upper boundary to anchor on
    } else {
        (tau_top - new_tau) / (tau_top - old_tau)
    };

    let prior_diff = if is_root {
        (tau_alpha - 1.0) * (new_tau.ln() - old_tau.ln()) - tau_beta * (new_tau - old_tau)
    } else {
        0.0
    };

    let old_total_logl: f64 = loci.iter().map(|l| l.gene_tree.logl).sum();
    let old_total_contrib = total_prior(species_tree);

    let mut touched: Vec<Vec<(usize, f64)>> = Vec::with_capacity(loci.len());
    for (locus_index, state) in loci.iter_mut().enumerate() {
        let mut this_touched = Vec::new();
        if !is_root {
            for idx in 0..state.gene_tree.len() {
                let node = &state.gene_tree.nodes[idx];
                if node.is_tip() || node.pop != population {
                    continue;
                }
                let old_time = node.time;
                this_touched.push((idx, old_time));
                let new_time = new_tau + (old_time - old_tau) * scale;
                state.gene_tree.nodes[idx].time = new_time;
                let handle = state.gene_tree.nodes[idx]
                    .event
                    .expect("internal node must own an event handle");
                species_tree.nodes[population].event[locus_index].rekey(handle, new_time);
            }
        }
        touched.push(this_touched);
    }

    species_tree.nodes[population].tau = new_tau;

    let locus_count = species_tree.locus_count;
    for locus in 0..locus_count {
        prior::update_logprob_contrib(species_tree, population, locus);
        if left != population {
            prior::update_logprob_contrib(species_tree, left, locus);
        }
        if right != population {
            prior::update_logprob_contrib(species_tree, right, locus);
        }
    }

    for state in loci.iter_mut() {
        state.gene_tree.invalidate_all();
    }
    let mut new_total_logl = 0.0;
    for state in loci.iter_mut() {
        let logl = state.locus.log_likelihood(state.gene_tree)?;
        state.gene_tree.logl = logl;
        new_total_logl += logl;
    }
    let new_total_contrib = total_prior(species_tree);

    let n_touched: usize = touched.iter().map(|v| v.len()).sum();
    let jacobian = if scale > 0.0 { n_touched as f64 * scale.ln() } else { 0.0 };

    let delta = (new_total_logl - old_total_logl) + (new_total_contrib - old_total_contrib)
        + jacobian
        + prior_diff;
    let accept = delta >= 0.0 || rng.uniform().ln() < delta;

    if accept {
        finetune.record(true);
        Ok(true)
    } else {
        species_tree.nodes[population].tau = old_tau;
        for (locus_index, (state, this_touched)) in loci.iter_mut().zip(touched.iter()).enumerate() {
            for &(idx, old_time) in this_touched {
                state.gene_tree.nodes[idx].time = old_time;
                let handle = state.gene_tree.nodes[idx].event.unwrap();
                species_tree.nodes[population].event[locus_index].rekey(handle, old_time);
            }
            state.gene_tree.invalidate_all();
            state.gene_tree.logl = state.locus.log_likelihood(state.gene_tree)?;
        }
        for locus in 0..locus_count {
            prior::update_logprob_contrib(species_tree, population, locus);
            if left != population {
                prior::update_logprob_contrib(species_tree, left, locus);
            }
            if right != population {
                prior::update_logprob_contrib(species_tree, right, locus);
            }
        }
        finetune.record(false);
        Ok(false)
    }
}

fn total_prior(species_tree: &SpeciesTree) -> f64 {
    let mut total = 0.0;
    for locus in 0..species_tree.locus_count {
        total += prior::locus_logpr(species_tree, locus);
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::gene::{build_initial, TipAssignment};

    #[test]
    fn proposed_tau_stays_below_the_root_and_above_its_children() {
        let mut stree = SpeciesTree::from_newick("((A,B),C);").unwrap();
        for node in &mut stree.nodes {
            node.theta = Some(0.01);
        }
        let mut rng = Rng::from_seed(11);
        stree.init_tau(2.0, 200.0, &mut rng);
        stree.allocate_loci(1);

        let tips = vec![
            TipAssignment { species: stree.tip_labels.get("A").unwrap(), label: "a1" },
            TipAssignment { species: stree.tip_labels.get("B").unwrap(), label: "b1" },
            TipAssignment { species: stree.tip_labels.get("C").unwrap(), label: "c1" },
        ];
        let mut gtree = build_initial(&mut stree, 0, &tips, &mut rng).unwrap();
        let mut locus = Locus::new(vec![vec![1], vec![2], vec![4]], vec![1.0]);
        gtree.logl = locus.log_likelihood(&mut gtree).unwrap();
        for locus_idx in 0..1 {
            prior::update_logprob_contrib(&mut stree, stree.tip_labels.get("A").unwrap(), locus_idx);
        }

        let internal = (0..stree.nodes.len())
            .find(|&i| !stree.nodes[i].is_tip() && !stree.is_root(i))
            .expect("tree has a non-root internal node");
        let mut finetune = Finetune::new(0.02);
        let mut loci = vec![LocusState { gene_tree: &mut gtree, locus: &mut locus }];
        propose(&mut stree, internal, 2.0, 200.0, &mut loci, &mut finetune, &mut rng).unwrap();

        let (left, right) = (stree.nodes[internal].left.unwrap(), stree.nodes[internal].right.unwrap());
        let tau_lo = stree.nodes[left].tau.max(stree.nodes[right].tau);
        assert!(stree.nodes[internal].tau >= tau_lo);
        assert!(stree.nodes[internal].tau <= stree.parent_tau(internal));
    }
}
