//! The gene tree `G` for a single locus: a rooted binary tree whose nodes
//! are tagged with the species population they reside in and, for internal
//! nodes, a coalescent age.

use crate::containers::EventHandle;
use crate::errors::Error;
use crate::rng::Rng;
use crate::tree::species::SpeciesTree;

#[derive(Debug, Clone)]
pub struct GeneNode {
    pub label: Option<String>,
    pub parent: Option<usize>,
    pub left: Option<usize>,
    pub right: Option<usize>,

    pub time: f64,
    pub old_time: f64,

    /// The species population this node currently resides in.
    pub pop: usize,
    /// Back-reference into `pop`'s event list, `None` for tips.
    pub event: Option<EventHandle>,

    pub node_index: usize,
    pub clv_index: usize,
    pub scaler_index: Option<usize>,
    pub pmatrix_index: usize,
    pub clv_valid: bool,
    pub mark: i32,
}

impl GeneNode {
    pub fn is_tip(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }
}

pub struct GeneTree {
    pub nodes: Vec<GeneNode>,
    pub root: usize,
    pub tip_count: usize,

    pub logl: f64,
    pub old_logl: f64,
    pub logpr: f64,
    pub old_logpr: f64,
}

impl GeneTree {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn internal_count(&self) -> usize {
        self.nodes.len() - self.tip_count
    }

    /// Mark `idx` and every ancestor up to the root as having an invalid CLV.
    /// Likelihood recomputation later walks post-order and recomputes only
    /// invalid nodes.
    pub fn invalidate_path_to_root(&mut self, mut idx: usize) {
        loop {
            self.nodes[idx].clv_valid = false;
            match self.nodes[idx].parent {
                Some(p) => idx = p,
                None => break,
            }
        }
    }

    /// Mark every internal node's CLV invalid, e.g. after a proposal (such as
    /// mixing) that rescales every branch length in the tree at once.
    pub fn invalidate_all(&mut self) {
        for node in &mut self.nodes {
            if !node.is_tip() {
                node.clv_valid = false;
            }
        }
    }

    /// Post-order traversal (children before parents), used by the pruning
    /// recursion and by any whole-tree recomputation.
    pub fn postorder(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![(self.root, false)];
        while let Some((idx, visited)) = stack.pop() {
            if visited {
                order.push(idx);
                continue;
            }
            let node = &self.nodes[idx];
            if node.is_tip() {
                order.push(idx);
            } else {
                stack.push((idx, true));
                stack.push((node.right.unwrap(), false));
                stack.push((node.left.unwrap(), false));
            }
        }
        order
    }

    /// Branch length above `idx`, i.e. `parent.time - idx.time`. Panics at
    /// the root, which has no incoming branch.
    pub fn branch_length(&self, idx: usize) -> f64 {
        let parent = self.nodes[idx]
            .parent
            .expect("bug: branch_length called on the root");
        self.nodes[parent].time - self.nodes[idx].time
    }
}

/// One gene lineage entering species population construction: its current
/// node index and the species tip it was sampled from.
pub struct TipAssignment<'a> {
    pub species: usize,
    pub label: &'a str,
}

/// Build an initial gene tree for one locus, simulating coalescence within
/// each population along a post-order walk of the species tree under the
/// standard Kingman n-coalescent.
///
/// `tips` gives, in CLV order, the species each sampled sequence belongs to.
/// Node indices for tips equal their position in `tips` (so `clv_index ==
/// node_index` for every tip, matching the locus's CLV layout).
pub fn build_initial(
    species_tree: &mut SpeciesTree,
    locus: usize,
    tips: &[TipAssignment],
    rng: &mut Rng,
) -> Result<GeneTree, Error> {
    let tip_count = tips.len();
    let mut nodes = Vec::with_capacity(tip_count * 2 - 1);

    for (i, tip) in tips.iter().enumerate() {
        nodes.push(GeneNode {
            label: Some(tip.label.to_string()),
            parent: None,
            left: None,
            right: None,
            time: 0.0,
            old_time: 0.0,
            pop: tip.species,
            event: None,
            node_index: i,
            clv_index: i,
            scaler_index: None,
            pmatrix_index: i,
            clv_valid: true,
            mark: 0,
        });
    }

    let mut lineages: Vec<Vec<usize>> = vec![Vec::new(); species_tree.len()];
    for (i, tip) in tips.iter().enumerate() {
        lineages[tip.species].push(i);
    }

    let post_order = species_postorder(species_tree);
    let mut next_index = tip_count;
    let mut next_scaler = 0usize;
    let mut gene_root = None;

    for s in post_order {
        species_tree.nodes[s].seqin_count[locus] = lineages[s].len();

        let mut active = std::mem::take(&mut lineages[s]);
        let tau_top = species_tree.parent_tau(s);
        let is_root_pop = species_tree.is_root(s);
        let mut t = species_tree.nodes[s].tau;

        if active.len() >= 2 && species_tree.nodes[s].theta.is_none() {
            return Err(Error::MissingTheta {
                label: species_tree.nodes[s]
                    .label
                    .clone()
                    .unwrap_or_else(|| format!("#{}", s)),
            });
        }

        loop {
            let k = active.len();
            if k <= 1 {
                break;
            }
            let theta = species_tree.nodes[s].theta.unwrap();
            let rate = (k * (k - 1)) as f64 / theta;
            let wait = rng.exponential(rate);
            let t_next = t + wait;
            if !is_root_pop && t_next >= tau_top {
                break;
            }

            let i = rng.uniform_index(k);
            let mut j = rng.uniform_index(k - 1);
            if j >= i {
                j += 1;
            }
            let (lo, hi) = (i.min(j), i.max(j));
            let right_idx = active.remove(hi);
            let left_idx = active.remove(lo);

            let new_idx = next_index;
            next_index += 1;
            nodes.push(GeneNode {
                label: None,
                parent: None,
                left: Some(left_idx),
                right: Some(right_idx),
                time: t_next,
                old_time: t_next,
                pop: s,
                event: None,
                node_index: new_idx,
                clv_index: new_idx,
                scaler_index: Some(next_scaler),
                pmatrix_index: new_idx,
                clv_valid: false,
                mark: 0,
            });
            next_scaler += 1;
            nodes[left_idx].parent = Some(new_idx);
            nodes[right_idx].parent = Some(new_idx);

            let handle = species_tree.nodes[s].event[locus].insert(t_next, new_idx);
            nodes[new_idx].event = Some(handle);

            active.push(new_idx);
            t = t_next;
        }

        match species_tree.nodes[s].parent {
            Some(parent) => lineages[parent].extend(active),
            None => {
                debug_assert_eq!(active.len(), 1, "root population must fully coalesce");
                gene_root = Some(active[0]);
            }
        }
    }

    let root = gene_root.expect("species tree always has a root population");
    Ok(GeneTree {
        nodes,
        root,
        tip_count,
        logl: 0.0,
        old_logl: 0.0,
        logpr: 0.0,
        old_logpr: 0.0,
    })
}

/// Recompute `seqin_count[*][locus]` from the gene tree's current `pop`
/// assignments: a lineage enters a population either as a tip directly
/// sampled from it, or via a child edge that crosses from a descendant
/// population into it. Used after a topology change (SPR) instead of
/// tracking the delta incrementally.
pub fn recompute_seqin_counts(species_tree: &mut SpeciesTree, gene_tree: &GeneTree, locus: usize) {
    let mut counts = vec![0usize; species_tree.len()];
    for node in &gene_tree.nodes {
        if node.is_tip() {
            counts[node.pop] += 1;
            continue;
        }
        for child in [node.left, node.right].into_iter().flatten() {
            if gene_tree.nodes[child].pop != node.pop {
                counts[node.pop] += 1;
            }
        }
    }
    for (population, count) in counts.into_iter().enumerate() {
        species_tree.nodes[population].seqin_count[locus] = count;
    }
}

fn species_postorder(species_tree: &SpeciesTree) -> Vec<usize> {
    let mut order = Vec::with_capacity(species_tree.len());
    let mut stack = vec![(species_tree.root, false)];
    while let Some((idx, visited)) = stack.pop() {
        if visited {
            order.push(idx);
            continue;
        }
        let node = &species_tree.nodes[idx];
        if node.is_tip() {
            order.push(idx);
        } else {
            stack.push((idx, true));
            stack.push((node.right.unwrap(), false));
            stack.push((node.left.unwrap(), false));
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_species_tree(n_tips: usize, theta: f64) -> (SpeciesTree, Vec<String>) {
        let mut tree = SpeciesTree::from_newick("(A);").unwrap();
        tree.nodes[0].theta = Some(theta);
        tree.allocate_loci(1);
        let labels: Vec<String> = (0..n_tips).map(|i| format!("seq{}", i)).collect();
        (tree, labels)
    }

    #[test]
    fn builds_valid_coalescent_history_in_one_population() {
        let (mut tree, labels) = single_species_tree(5, 0.01);
        let tips: Vec<TipAssignment> = labels
            .iter()
            .map(|l| TipAssignment { species: 0, label: l })
            .collect();
        let mut rng = Rng::from_seed(3);
        let gtree = build_initial(&mut tree, 0, &tips, &mut rng).unwrap();

        assert_eq!(gtree.tip_count, 5);
        assert_eq!(gtree.nodes.len(), 9);
        for idx in 0..gtree.nodes.len() {
            let node = &gtree.nodes[idx];
            if !node.is_tip() {
                let (l, r) = (node.left.unwrap(), node.right.unwrap());
                assert!(node.time > gtree.nodes[l].time);
                assert!(node.time > gtree.nodes[r].time);
            }
            assert!(node.time >= tree.nodes[node.pop].tau);
        }
    }

    #[test]
    fn two_species_keeps_lineages_within_their_population_until_ancestor() {
        let mut tree = SpeciesTree::from_newick("(A,B);").unwrap();
        for node in &mut tree.nodes {
            node.theta = Some(0.01);
        }
        tree.init_tau(2.0, 2000.0, &mut Rng::from_seed(5));
        tree.allocate_loci(1);

        let tips = vec![
            TipAssignment { species: 0, label: "a1" },
            TipAssignment { species: 0, label: "a2" },
            TipAssignment { species: 1, label: "b1" },
            TipAssignment { species: 1, label: "b2" },
        ];
        let mut rng = Rng::from_seed(9);
        let gtree = build_initial(&mut tree, 0, &tips, &mut rng).unwrap();

        // No internal node below the root population may combine a lineage
        // that started in species A with one that started in species B.
        let root_pop = tree.root;
        for node in &gtree.nodes {
            if !node.is_tip() && node.pop != root_pop {
                assert!(node.pop == 0 || node.pop == 1);
            }
        }
    }

    #[test]
    fn missing_theta_with_multiple_lineages_is_an_error() {
        let mut tree = SpeciesTree::from_newick("(A);").unwrap();
        tree.allocate_loci(1);
        let tips = vec![
            TipAssignment { species: 0, label: "a1" },
            TipAssignment { species: 0, label: "a2" },
        ];
        let mut rng = Rng::from_seed(1);
        let err = build_initial(&mut tree, 0, &tips, &mut rng).unwrap_err();
        assert!(matches!(err, Error::MissingTheta { .. }));
    }
}
