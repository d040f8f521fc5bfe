//! The species tree `S`: a rooted binary tree with a `theta` on every
//! population and a `tau` on every internal node, plus the per-population,
//! per-locus coalescent bookkeeping MCMC proposals read and update.

use std::collections::HashMap;
use std::f64;

use bv::BitVec;

use crate::containers::{EventHandle, EventList, LabelMap};
use crate::errors::Error;
use crate::io::newick::RawNode;
use crate::rng::Rng;

/// A population in the species tree.
#[derive(Debug)]
pub struct SpeciesNode {
    pub label: Option<String>,
    pub parent: Option<usize>,
    pub left: Option<usize>,
    pub right: Option<usize>,

    pub tau: f64,
    pub old_tau: f64,
    pub theta: Option<f64>,
    pub old_theta: Option<f64>,

    pub leaves: usize,
    pub node_index: usize,

    /// Per-locus ordered coalescent-event lists (keyed by gene-node time).
    pub event: Vec<EventList<usize>>,
    pub seqin_count: Vec<usize>,
    pub logpr_contrib: Vec<f64>,
    pub old_logpr_contrib: Vec<f64>,
}

impl SpeciesNode {
    pub fn is_tip(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }

    /// Cached event-list length for `locus`, per spec's `event_count` field.
    pub fn event_count(&self, locus: usize) -> usize {
        self.event[locus].len()
    }
}

/// `pptable[a][b]` is true iff population `b` lies on the path from `a` to
/// the root (inclusive). Stored as a packed bit matrix to keep the whole
/// table cache-resident even for trees with hundreds of populations.
pub struct AncestorTable {
    bits: BitVec<u8>,
    n: usize,
}

impl AncestorTable {
    fn new(n: usize) -> Self {
        AncestorTable {
            bits: BitVec::new_fill(false, (n * n) as u64),
            n,
        }
    }

    fn set(&mut self, a: usize, b: usize) {
        self.bits.set((a * self.n + b) as u64, true);
    }

    pub fn is_ancestor(&self, a: usize, b: usize) -> bool {
        self.bits.get((a * self.n + b) as u64)
    }
}

pub struct SpeciesTree {
    pub nodes: Vec<SpeciesNode>,
    pub root: usize,
    pub pptable: AncestorTable,
    pub tip_count: usize,
    pub locus_count: usize,
    pub tip_labels: LabelMap,
}

impl SpeciesTree {
    /// Parse a rooted binary Newick string into a species tree with
    /// uninitialized tau/theta (both default to 0.0/None); call
    /// [`SpeciesTree::init_tau`] and [`SpeciesTree::init_theta`] afterwards.
    pub fn from_newick(input: &str) -> Result<Self, Error> {
        let raw = crate::io::newick::parse(input)?;
        Self::from_raw(&raw)
    }

    fn from_raw(raw: &RawNode) -> Result<Self, Error> {
        let mut nodes = Vec::new();
        let mut tip_labels = LabelMap::new();
        let root = build_recursive(raw, None, &mut nodes, &mut tip_labels)?;

        let tip_count = nodes.iter().filter(|n| n.is_tip()).count();
        let n = nodes.len();
        let mut tree = SpeciesTree {
            nodes,
            root,
            pptable: AncestorTable::new(n),
            tip_count,
            locus_count: 0,
            tip_labels,
        };
        tree.build_pptable();
        Ok(tree)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// τ of `idx`'s parent, or `+inf` at the root.
    pub fn parent_tau(&self, idx: usize) -> f64 {
        match self.nodes[idx].parent {
            Some(p) => self.nodes[p].tau,
            None => f64::INFINITY,
        }
    }

    pub fn is_root(&self, idx: usize) -> bool {
        idx == self.root
    }

    /// Allocate per-locus arrays once the number of loci is known.
    pub fn allocate_loci(&mut self, locus_count: usize) {
        self.locus_count = locus_count;
        for node in &mut self.nodes {
            node.event = (0..locus_count).map(|_| EventList::new()).collect();
            node.seqin_count = vec![0; locus_count];
            node.logpr_contrib = vec![0.0; locus_count];
            node.old_logpr_contrib = vec![0.0; locus_count];
        }
    }

    /// θ initialization: `Gamma(alpha, beta)` i.i.d. at every population.
    pub fn init_theta(&mut self, alpha: f64, beta: f64, rng: &mut Rng) {
        for node in &mut self.nodes {
            let theta = rng.gamma(alpha, beta);
            node.theta = Some(theta);
            node.old_theta = Some(theta);
        }
    }

    /// τ initialization: root from `Gamma(alpha, beta)`; every other internal
    /// node uniform in `(0, tau_parent)`, visited in pre-order so that a
    /// parent's τ is always drawn before its children's.
    pub fn init_tau(&mut self, alpha: f64, beta: f64, rng: &mut Rng) {
        let root_tau = rng.gamma(alpha, beta);
        self.nodes[self.root].tau = root_tau;
        self.nodes[self.root].old_tau = root_tau;

        let mut stack = vec![self.root];
        while let Some(idx) = stack.pop() {
            let (left, right) = (self.nodes[idx].left, self.nodes[idx].right);
            let parent_tau = self.nodes[idx].tau;
            for child in [left, right].into_iter().flatten() {
                if !self.nodes[child].is_tip() {
                    let tau = rng.uniform_range(0.0, parent_tau);
                    self.nodes[child].tau = tau;
                    self.nodes[child].old_tau = tau;
                    stack.push(child);
                }
            }
        }
    }

    /// Build the ancestor table with a single post-order pass.
    pub fn build_pptable(&mut self) {
        let n = self.nodes.len();
        self.pptable = AncestorTable::new(n);
        for a in 0..n {
            self.pptable.set(a, a);
            let mut cur = self.nodes[a].parent;
            while let Some(p) = cur {
                self.pptable.set(a, p);
                cur = self.nodes[p].parent;
            }
        }
    }

    /// Verify the ultrametricity invariant: every node's τ is strictly less
    /// than its parent's τ.
    pub fn check_ultrametric(&self) -> Result<(), Error> {
        for node in &self.nodes {
            if let Some(parent) = node.parent {
                if node.tau >= self.nodes[parent].tau {
                    return Err(Error::NonUltrametric {
                        label: node.label.clone().unwrap_or_default(),
                        tau: node.tau,
                        parent_tau: self.nodes[parent].tau,
                    });
                }
            }
        }
        Ok(())
    }

    /// Dump the current species tree as a rooted binary Newick string with
    /// tau as branch lengths.
    pub fn to_newick(&self) -> String {
        let mut s = String::new();
        self.write_newick(self.root, &mut s);
        s.push(';');
        s
    }

    fn write_newick(&self, idx: usize, out: &mut String) {
        let node = &self.nodes[idx];
        if node.is_tip() {
            out.push_str(node.label.as_deref().unwrap_or(""));
        } else {
            out.push('(');
            self.write_newick(node.left.unwrap(), out);
            out.push(',');
            self.write_newick(node.right.unwrap(), out);
            out.push(')');
        }
        let length = match node.parent {
            Some(p) => self.nodes[p].tau - node.tau,
            None => 0.0,
        };
        out.push_str(&format!(":{}", length));
    }
}

fn build_recursive(
    raw: &RawNode,
    parent: Option<usize>,
    nodes: &mut Vec<SpeciesNode>,
    tip_labels: &mut LabelMap,
) -> Result<usize, Error> {
    if raw.is_tip() {
        let label = raw.label.clone().expect("validated by newick parser");
        let idx = nodes.len();
        if !tip_labels.insert(label.clone(), idx) {
            return Err(Error::DuplicateLabel { label });
        }
        nodes.push(SpeciesNode {
            label: Some(label),
            parent,
            left: None,
            right: None,
            tau: 0.0,
            old_tau: 0.0,
            theta: None,
            old_theta: None,
            leaves: 1,
            node_index: idx,
            event: Vec::new(),
            seqin_count: Vec::new(),
            logpr_contrib: Vec::new(),
            old_logpr_contrib: Vec::new(),
        });
        Ok(idx)
    } else {
        // reserve this node's slot before recursing so that `parent` indices
        // assigned to children point at a real (if incomplete) node
        let idx = nodes.len();
        nodes.push(SpeciesNode {
            label: raw.label.clone(),
            parent,
            left: None,
            right: None,
            tau: 0.0,
            old_tau: 0.0,
            theta: None,
            old_theta: None,
            leaves: 0,
            node_index: idx,
            event: Vec::new(),
            seqin_count: Vec::new(),
            logpr_contrib: Vec::new(),
            old_logpr_contrib: Vec::new(),
        });
        let left = build_recursive(&raw.children[0], Some(idx), nodes, tip_labels)?;
        let right = build_recursive(&raw.children[1], Some(idx), nodes, tip_labels)?;
        nodes[idx].left = Some(left);
        nodes[idx].right = Some(right);
        nodes[idx].leaves = nodes[left].leaves + nodes[right].leaves;
        Ok(idx)
    }
}

/// Build a species→individual-count map keyed by species label, validating
/// that every species referenced in a map file exists in the tree.
pub fn validate_species_map(
    tree: &SpeciesTree,
    map: &HashMap<String, String>,
) -> Result<(), Error> {
    for (individual, species) in map {
        if !tree.tip_labels.contains(species) {
            return Err(Error::UnknownSpecies {
                individual: individual.clone(),
                species: species.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_pre_order_and_assigns_parents() {
        let tree = SpeciesTree::from_newick("((A,B),C);").unwrap();
        assert_eq!(tree.tip_count, 3);
        assert_eq!(tree.nodes.len(), 5);
        // build_recursive reserves each internal node's slot before
        // recursing into its children, so internal nodes get lower indices
        // than the tips beneath them: root=0, (A,B)=1, then A=2, B=3, C=4.
        let tip_indices: Vec<usize> = (0..tree.nodes.len())
            .filter(|&i| tree.nodes[i].is_tip())
            .collect();
        assert_eq!(tip_indices, vec![2, 3, 4]);
        assert_eq!(tree.nodes[tree.root].leaves, 3);
    }

    #[test]
    fn rejects_duplicate_labels() {
        let err = SpeciesTree::from_newick("((A,B),A);").unwrap_err();
        assert!(matches!(err, Error::DuplicateLabel { .. }));
    }

    #[test]
    fn trivial_single_species_tree() {
        let tree = SpeciesTree::from_newick("(A);").unwrap();
        assert_eq!(tree.nodes.len(), 1);
        assert_eq!(tree.tip_count, 1);
        assert!(tree.nodes[0].is_tip());
        assert!(tree.is_root(0));
    }

    #[test]
    fn pptable_reflects_ancestry() {
        let tree = SpeciesTree::from_newick("((A,B),C);").unwrap();
        let a = tree.tip_labels.get("A").unwrap();
        let root = tree.root;
        assert!(tree.pptable.is_ancestor(a, root));
        assert!(tree.pptable.is_ancestor(a, a));
        let c = tree.tip_labels.get("C").unwrap();
        assert!(!tree.pptable.is_ancestor(a, c));
    }

    #[test]
    fn tau_init_preserves_ultrametricity() {
        let mut tree = SpeciesTree::from_newick("((A,B),C);").unwrap();
        let mut rng = Rng::from_seed(1);
        tree.init_tau(2.0, 2000.0, &mut rng);
        tree.check_ultrametric().unwrap();
    }

    #[test]
    fn theta_init_sets_every_population() {
        let mut tree = SpeciesTree::from_newick("((A,B),C);").unwrap();
        let mut rng = Rng::from_seed(1);
        tree.init_theta(3.0, 300.0, &mut rng);
        assert!(tree.nodes.iter().all(|n| n.theta.is_some()));
    }

    #[test]
    fn parent_tau_is_infinite_at_root() {
        let tree = SpeciesTree::from_newick("((A,B),C);").unwrap();
        assert_eq!(tree.parent_tau(tree.root), f64::INFINITY);
    }
}
