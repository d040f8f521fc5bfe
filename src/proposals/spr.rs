//! `gtree_propose_spr`: detach a random gene-tree subtree and regraft it
//! onto a randomly chosen feasible edge elsewhere in the tree.
//!
//! The node removed from its old position is reused as the new attachment
//! point rather than deleted and recreated, so node indices never change
//! across the move: `p`, the parent of the detached subtree's root `u`, is
//! spliced out of its old position (its sibling takes its place) and
//! spliced back in at the chosen regraft edge with a freshly drawn age.

use crate::errors::Error;
use crate::likelihood::Locus;
use crate::prior;
use crate::proposals::Finetune;
use crate::rng::Rng;
use crate::tree::gene::{recompute_seqin_counts, GeneTree};
use crate::tree::species::SpeciesTree;

struct Detached {
    u: usize,
    p: usize,
    sibling: usize,
    grandparent: Option<usize>,
    old_p_time: f64,
    old_p_pop: usize,
}

/// A candidate regraft edge: the edge above `below`, feasible if its time
/// range intersects `[tau_floor, +inf)` in a population ancestral to (or
/// equal to) `u`'s own population. `hi` is clamped to `pop`'s own parent tau
/// so a node regrafted at this candidate never ends up older than the
/// population it's assigned to allows.
struct Candidate {
    below: usize,
    lo: f64,
    hi: f64,
    pop: usize,
}

pub fn propose(
    species_tree: &mut SpeciesTree,
    gene_tree: &mut GeneTree,
    locus: &mut Locus,
    locus_index: usize,
    finetune: &mut Finetune,
    rng: &mut Rng,
) -> Result<bool, Error> {
    let non_root: Vec<usize> = (0..gene_tree.len()).filter(|&i| i != gene_tree.root).collect();
    if non_root.len() < 2 {
        return Ok(false);
    }
    let u = non_root[rng.uniform_index(non_root.len())];
    let p = gene_tree.nodes[u].parent.unwrap();
    let sibling = {
        let (l, r) = (gene_tree.nodes[p].left.unwrap(), gene_tree.nodes[p].right.unwrap());
        if l == u {
            r
        } else {
            l
        }
    };
    let grandparent = gene_tree.nodes[p].parent;
    let detached = Detached {
        u,
        p,
        sibling,
        grandparent,
        old_p_time: gene_tree.nodes[p].time,
        old_p_pop: gene_tree.nodes[p].pop,
    };

    let descendants = subtree_indices(gene_tree, u);
    let candidates = feasible_edges(species_tree, gene_tree, u, p, &descendants);
    if candidates.is_empty() {
        return Ok(false);
    }
    let old_candidate_count = feasible_edges_from(species_tree, gene_tree, detached.old_p_pop, u, p, &descendants).len();

    let choice = &candidates[rng.uniform_index(candidates.len())];
    let lo = choice.lo.max(species_tree.nodes[gene_tree.nodes[u].pop].tau);
    let hi = choice.hi;
    let new_time = if hi > lo {
        rng.uniform_range(lo, hi)
    } else {
        lo
    };

    let old_logl = gene_tree.logl;
    let old_total_contrib = total_prior(species_tree);

    // detach: sibling takes p's old place
    detach(gene_tree, &detached);
    // regraft: p is reinserted between `choice.below` and its old parent
    regraft(gene_tree, p, u, choice.below, new_time, choice.pop);

    gene_tree.invalidate_all();
    recompute_seqin_counts(species_tree, gene_tree, locus_index);
    rebuild_population_event_list(species_tree, gene_tree, locus_index);

    let locus_count = species_tree.locus_count;
    for l in 0..locus_count {
        for population in 0..species_tree.len() {
            prior::update_logprob_contrib(species_tree, population, l);
        }
    }

    let new_logl = locus.log_likelihood(gene_tree)?;
    gene_tree.logl = new_logl;
    let new_total_contrib = total_prior(species_tree);

    let new_candidate_count =
        feasible_edges_from(species_tree, gene_tree, choice.pop, u, p, &descendants).len();
    let hastings = (old_candidate_count.max(1) as f64).ln() - (new_candidate_count.max(1) as f64).ln();

    let delta = (new_logl - old_logl) + (new_total_contrib - old_total_contrib) + hastings;
    let accept = delta >= 0.0 || rng.uniform().ln() < delta;

    if accept {
        finetune.record(true);
        Ok(true)
    } else {
        // revert: restore p's old position wholesale
        undo_detach_and_regraft(gene_tree, &detached);
        gene_tree.invalidate_all();
        recompute_seqin_counts(species_tree, gene_tree, locus_index);
        rebuild_population_event_list(species_tree, gene_tree, locus_index);
        for l in 0..locus_count {
            for population in 0..species_tree.len() {
                prior::update_logprob_contrib(species_tree, population, l);
            }
        }
        gene_tree.logl = locus.log_likelihood(gene_tree)?;
        finetune.record(false);
        Ok(false)
    }
}

fn subtree_indices(gene_tree: &GeneTree, root: usize) -> Vec<usize> {
    let mut out = Vec::new();
    let mut stack = vec![root];
    while let Some(idx) = stack.pop() {
        out.push(idx);
        if let Some(l) = gene_tree.nodes[idx].left {
            stack.push(l);
        }
        if let Some(r) = gene_tree.nodes[idx].right {
            stack.push(r);
        }
    }
    out
}

fn detach(gene_tree: &mut GeneTree, d: &Detached) {
    match d.grandparent {
        Some(gp) => {
            let (l, r) = (gene_tree.nodes[gp].left.unwrap(), gene_tree.nodes[gp].right.unwrap());
            if l == d.p {
                gene_tree.nodes[gp].left = Some(d.sibling);
            } else {
                debug_assert_eq!(r, d.p);
                gene_tree.nodes[gp].right = Some(d.sibling);
            }
            gene_tree.nodes[d.sibling].parent = Some(gp);
        }
        None => {
            gene_tree.nodes[d.sibling].parent = None;
            gene_tree.root = d.sibling;
        }
    }
}

fn regraft(gene_tree: &mut GeneTree, p: usize, u: usize, below: usize, new_time: f64, new_pop: usize) {
    let old_parent_of_below = gene_tree.nodes[below].parent;
    match old_parent_of_below {
        Some(op) => {
            let (l, r) = (gene_tree.nodes[op].left.unwrap(), gene_tree.nodes[op].right.unwrap());
            if l == below {
                gene_tree.nodes[op].left = Some(p);
            } else {
                debug_assert_eq!(r, below);
                gene_tree.nodes[op].right = Some(p);
            }
            gene_tree.nodes[p].parent = Some(op);
        }
        None => {
            gene_tree.nodes[p].parent = None;
            gene_tree.root = p;
        }
    }
    gene_tree.nodes[p].left = Some(u);
    gene_tree.nodes[p].right = Some(below);
    gene_tree.nodes[u].parent = Some(p);
    gene_tree.nodes[below].parent = Some(p);
    gene_tree.nodes[p].time = new_time;
    gene_tree.nodes[p].old_time = new_time;
    gene_tree.nodes[p].pop = new_pop;
}

fn undo_detach_and_regraft(gene_tree: &mut GeneTree, d: &Detached) {
    // pull p back out of wherever the trial regraft put it
    let p_parent = gene_tree.nodes[d.p].parent;
    let p_other_child = if gene_tree.nodes[d.p].left == Some(d.u) {
        gene_tree.nodes[d.p].right.unwrap()
    } else {
        gene_tree.nodes[d.p].left.unwrap()
    };
    match p_parent {
        Some(pp) => {
            let (l, r) = (gene_tree.nodes[pp].left.unwrap(), gene_tree.nodes[pp].right.unwrap());
            if l == d.p {
                gene_tree.nodes[pp].left = Some(p_other_child);
            } else {
                debug_assert_eq!(r, d.p);
                gene_tree.nodes[pp].right = Some(p_other_child);
            }
            gene_tree.nodes[p_other_child].parent = Some(pp);
        }
        None => {
            gene_tree.nodes[p_other_child].parent = None;
            gene_tree.root = p_other_child;
        }
    }

    // reinsert p at its original position between d.sibling and d.grandparent
    match d.grandparent {
        Some(gp) => {
            let (l, r) = (gene_tree.nodes[gp].left.unwrap(), gene_tree.nodes[gp].right.unwrap());
            if l == d.sibling {
                gene_tree.nodes[gp].left = Some(d.p);
            } else {
                debug_assert_eq!(r, d.sibling);
                gene_tree.nodes[gp].right = Some(d.p);
            }
            gene_tree.nodes[d.p].parent = Some(gp);
        }
        None => {
            gene_tree.nodes[d.p].parent = None;
            gene_tree.root = d.p;
        }
    }
    gene_tree.nodes[d.p].left = Some(d.u);
    gene_tree.nodes[d.p].right = Some(d.sibling);
    gene_tree.nodes[d.u].parent = Some(d.p);
    gene_tree.nodes[d.sibling].parent = Some(d.p);
    gene_tree.nodes[d.p].time = d.old_p_time;
    gene_tree.nodes[d.p].old_time = d.old_p_time;
    gene_tree.nodes[d.p].pop = d.old_p_pop;
}

fn feasible_edges(
    species_tree: &SpeciesTree,
    gene_tree: &GeneTree,
    u: usize,
    p: usize,
    descendants: &[usize],
) -> Vec<Candidate> {
    feasible_edges_from(species_tree, gene_tree, gene_tree.nodes[u].pop, u, p, descendants)
}

fn feasible_edges_from(
    species_tree: &SpeciesTree,
    gene_tree: &GeneTree,
    u_pop: usize,
    u: usize,
    p: usize,
    descendants: &[usize],
) -> Vec<Candidate> {
    let u_tau = species_tree.nodes[u_pop].tau;
    let mut out = Vec::new();
    for idx in 0..gene_tree.len() {
        if idx == u || idx == p || descendants.contains(&idx) {
            continue;
        }
        let node = &gene_tree.nodes[idx];
        let pop = node.pop;
        if !species_tree.pptable.is_ancestor(u_pop, pop) {
            continue;
        }
        let lo = node.time.max(u_tau);
        let edge_hi = node.parent.map(|pp| gene_tree.nodes[pp].time).unwrap_or(f64::INFINITY);
        // clamp to this candidate's own population ceiling: the edge above
        // `idx` may run higher than `pop`'s parent tau if it crosses a
        // population boundary, but a node regrafted with population `pop`
        // must keep `time < pop.parent.tau` (invariant 1).
        let hi = edge_hi.min(species_tree.parent_tau(pop));
        if hi >= lo {
            out.push(Candidate {
                below: idx,
                lo,
                hi,
                pop,
            });
        }
    }
    out
}

fn total_prior(species_tree: &SpeciesTree) -> f64 {
    let mut total = 0.0;
    for locus in 0..species_tree.locus_count {
        total += prior::locus_logpr(species_tree, locus);
    }
    total
}

fn rebuild_population_event_list(species_tree: &mut SpeciesTree, gene_tree: &mut GeneTree, locus_index: usize) {
    for population in &mut species_tree.nodes {
        population.event[locus_index] = crate::containers::EventList::new();
    }
    for idx in 0..gene_tree.len() {
        if gene_tree.nodes[idx].is_tip() {
            continue;
        }
        let pop = gene_tree.nodes[idx].pop;
        let time = gene_tree.nodes[idx].time;
        let handle = species_tree.nodes[pop].event[locus_index].insert(time, idx);
        gene_tree.nodes[idx].event = Some(handle);
    }
}
