//! `proposal_mixing`: scale every time and population size in the model by a
//! single common factor. A cheap, high-mobility move that helps
//! decorrelate tau and theta from gene ages, which otherwise tend to move
//! together only very slowly under the other proposals.

use crate::errors::Error;
use crate::likelihood::Locus;
use crate::prior;
use crate::proposals::Finetune;
use crate::rng::Rng;
use crate::tree::gene::GeneTree;
use crate::tree::species::SpeciesTree;

pub struct LocusState<'a> {
    pub gene_tree: &'a mut GeneTree,
    pub locus: &'a mut Locus,
}

#[allow(clippy::too_many_arguments)]
pub fn propose(
    species_tree: &mut SpeciesTree,
    loci: &mut [LocusState<'_>],
    theta_alpha: f64,
    theta_beta: f64,
    tau_alpha: f64,
    tau_beta: f64,
    finetune: &mut Finetune,
    rng: &mut Rng,
) -> Result<bool, Error> {
    let u = rng.uniform();
    let c = (finetune.step * (u - 0.5)).exp();
    let log_c = c.ln();

    let old_taus: Vec<f64> = species_tree.nodes.iter().map(|n| n.tau).collect();
    let old_thetas: Vec<Option<f64>> = species_tree.nodes.iter().map(|n| n.theta).collect();
    let old_contribs: Vec<Vec<f64>> = species_tree
        .nodes
        .iter()
        .map(|n| n.logpr_contrib.clone())
        .collect();
    let old_total_logl: f64 = loci.iter().map(|l| l.gene_tree.logl).sum();
    let old_total_contrib = old_contribs.iter().flatten().sum::<f64>();

    let n_tau = species_tree.nodes.iter().filter(|n| !n.is_tip()).count();
    let n_theta = species_tree
        .nodes
        .iter()
        .filter(|n| n.theta.is_some())
        .count();
    let n_gene_internal: usize = loci.iter().map(|l| l.gene_tree.internal_count()).sum();

    let root_tau_old = species_tree.nodes[species_tree.root].tau;
    let root_tau_new = root_tau_old * c;
    let mut prior_diff = (tau_alpha - 1.0) * (root_tau_new.ln() - root_tau_old.ln())
        - tau_beta * (root_tau_new - root_tau_old);
    for node in &species_tree.nodes {
        if let Some(theta) = node.theta {
            let theta_new = theta * c;
            prior_diff += (theta_alpha - 1.0) * (theta_new.ln() - theta.ln())
                - theta_beta * (theta_new - theta);
        }
    }

    for node in &mut species_tree.nodes {
        if !node.is_tip() {
            node.tau *= c;
        }
        if let Some(theta) = node.theta {
            node.theta = Some(theta * c);
        }
    }

    let mut old_gene_times: Vec<Vec<(usize, f64)>> = Vec::with_capacity(loci.len());
    for state in loci.iter_mut() {
        let mut saved = Vec::new();
        for idx in 0..state.gene_tree.len() {
            if state.gene_tree.nodes[idx].is_tip() {
                continue;
            }
            let old_time = state.gene_tree.nodes[idx].time;
            saved.push((idx, old_time));
            state.gene_tree.nodes[idx].time = old_time * c;
        }
        state.gene_tree.invalidate_all();
        old_gene_times.push(saved);
    }

    rebuild_event_lists(species_tree, loci);

    let locus_count = species_tree.locus_count;
    for locus in 0..locus_count {
        for population in 0..species_tree.nodes.len() {
            prior::update_logprob_contrib(species_tree, population, locus);
        }
    }

    let mut new_total_logl = 0.0;
    for state in loci.iter_mut() {
        let logl = state.locus.log_likelihood(state.gene_tree)?;
        state.gene_tree.logl = logl;
        new_total_logl += logl;
    }
    let new_total_contrib: f64 = species_tree
        .nodes
        .iter()
        .flat_map(|n| n.logpr_contrib.iter())
        .sum();

    let move_count = (n_tau + n_theta + n_gene_internal) as f64;
    let jacobian = move_count * log_c;

    let delta =
        (new_total_logl - old_total_logl) + (new_total_contrib - old_total_contrib) + jacobian - prior_diff;
    let accept = delta >= 0.0 || rng.uniform().ln() < delta;

    if accept {
        finetune.record(true);
        Ok(true)
    } else {
        for (node, (tau, theta)) in species_tree
            .nodes
            .iter_mut()
            .zip(old_taus.iter().zip(old_thetas.iter()))
        {
            node.tau = *tau;
            node.theta = *theta;
        }
        for (node, contrib) in species_tree.nodes.iter_mut().zip(old_contribs.into_iter()) {
            node.logpr_contrib = contrib;
        }
        for (state, saved) in loci.iter_mut().zip(old_gene_times.iter()) {
            for &(idx, old_time) in saved {
                state.gene_tree.nodes[idx].time = old_time;
            }
            state.gene_tree.invalidate_all();
        }
        rebuild_event_lists(species_tree, loci);
        for state in loci.iter_mut() {
            state.gene_tree.logl = state.locus.log_likelihood(state.gene_tree)?;
        }
        finetune.record(false);
        Ok(false)
    }
}

/// Rebuild every population's per-locus event list from the current gene
/// trees, wholesale -- simpler and just as correct as incrementally rekeying
/// every touched node when every node's time has changed at once.
fn rebuild_event_lists(species_tree: &mut SpeciesTree, loci: &mut [LocusState<'_>]) {
    for population in &mut species_tree.nodes {
        for list in &mut population.event {
            *list = crate::containers::EventList::new();
        }
    }
    for (locus_index, state) in loci.iter_mut().enumerate() {
        for idx in 0..state.gene_tree.len() {
            if state.gene_tree.nodes[idx].is_tip() {
                continue;
            }
            let pop = state.gene_tree.nodes[idx].pop;
            let time = state.gene_tree.nodes[idx].time;
            let handle = species_tree.nodes[pop].event[locus_index].insert(time, idx);
            state.gene_tree.nodes[idx].event = Some(handle);
        }
    }
}
