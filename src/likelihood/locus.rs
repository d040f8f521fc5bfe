//! Per-locus conditional likelihood vectors and the Felsenstein pruning
//! recursion.
//!
//! Scaling follows the usual numerical-underflow guard: whenever every entry
//! of a site's CLV drops below [`SCALE_THRESHOLD`], the whole site is
//! multiplied by [`SCALE_FACTOR`] and a per-site counter is bumped. The
//! counters accumulate up the tree so the root can undo them in log space.

use crate::errors::Error;
use crate::likelihood::jc69;
use crate::likelihood::maps::compatible_states;
use crate::tree::gene::GeneTree;

/// Matches the reference implementation's `PLL_SCALE_THRESHOLD` /
/// `PLL_SCALE_FACTOR`: large enough that underflow in `f64` arithmetic is
/// vanishingly unlikely between rescale events, small enough that several
/// rescales can happen before overflowing back out.
pub const SCALE_THRESHOLD: f64 = 1e-270;
pub const SCALE_FACTOR: f64 = 1.157_920_892_373_162e77; // 2^256

const STATES: usize = 4;
const FREQ: f64 = 0.25;

/// One locus: a compressed alignment (site patterns + weights) plus the CLV,
/// probability-matrix and scaling buffers needed to compute its
/// log-likelihood under a given gene tree.
pub struct Locus {
    /// Number of distinct site patterns after compression.
    pub site_count: usize,
    pub pattern_weights: Vec<f64>,
    pub tip_count: usize,
    /// `tip_codes[clv_index][site]`: the 4-bit ambiguity code observed at
    /// tip `clv_index`, site `site`.
    tip_codes: Vec<Vec<u8>>,
    /// CLV storage indexed by `clv_index`, flattened `[site * STATES + state]`.
    clv: Vec<Vec<f64>>,
    /// Per-site cumulative scaling-event counts, indexed by `scaler_index`.
    scale_buffer: Vec<Vec<u32>>,
}

impl Locus {
    /// `tip_codes[i]` holds the 4-bit ambiguity code at every site for tip
    /// `i`, all the same length (the compressed alignment's site count).
    pub fn new(tip_codes: Vec<Vec<u8>>, pattern_weights: Vec<f64>) -> Self {
        let tip_count = tip_codes.len();
        let site_count = pattern_weights.len();
        debug_assert!(tip_codes.iter().all(|codes| codes.len() == site_count));
        Locus {
            site_count,
            pattern_weights,
            tip_count,
            tip_codes,
            clv: Vec::new(),
            scale_buffer: Vec::new(),
        }
    }

    fn tip_clv_vector(&self, clv_index: usize, site: usize) -> [f64; STATES] {
        let compatible = compatible_states(self.tip_codes[clv_index][site]);
        let mut v = [0.0; STATES];
        for s in 0..STATES {
            v[s] = if compatible[s] { 1.0 } else { 0.0 };
        }
        v
    }

    /// Recompute every CLV marked invalid (and anything above it) along a
    /// post-order walk, then return the locus log-likelihood under
    /// `gene_tree`'s current branch lengths. Tip-tip pairs use a 16x16
    /// lookup table of pre-combined probabilities in place of two explicit
    /// matrix-vector products per site.
    pub fn log_likelihood(&mut self, gene_tree: &mut GeneTree) -> Result<f64, Error> {
        let n = gene_tree.len();
        if self.clv.len() < n {
            self.clv.resize_with(n, Vec::new);
        }
        let scaler_slots = gene_tree
            .nodes
            .iter()
            .filter_map(|node| node.scaler_index)
            .count();
        if self.scale_buffer.len() < scaler_slots {
            self.scale_buffer.resize_with(scaler_slots, Vec::new);
        }

        for idx in gene_tree.postorder() {
            if gene_tree.nodes[idx].clv_valid {
                continue;
            }
            if gene_tree.nodes[idx].is_tip() {
                gene_tree.nodes[idx].clv_valid = true;
                continue;
            }
            self.update_internal_clv(gene_tree, idx);
            gene_tree.nodes[idx].clv_valid = true;
        }

        self.root_log_likelihood(gene_tree)
    }

    fn update_internal_clv(&mut self, gene_tree: &GeneTree, idx: usize) {
        let node = &gene_tree.nodes[idx];
        let left = node.left.unwrap();
        let right = node.right.unwrap();
        let bl_left = gene_tree.branch_length(left);
        let bl_right = gene_tree.branch_length(right);
        let p_left = jc69::pmatrix(bl_left);
        let p_right = jc69::pmatrix(bl_right);

        let left_clv_idx = gene_tree.nodes[left].clv_index;
        let right_clv_idx = gene_tree.nodes[right].clv_index;
        let left_is_tip = gene_tree.nodes[left].is_tip();
        let right_is_tip = gene_tree.nodes[right].is_tip();
        let out_clv_idx = node.clv_index;
        let scaler_idx = node.scaler_index;

        let left_scale = scale_counts_for(&self.scale_buffer, gene_tree.nodes[left].scaler_index, self.site_count);
        let right_scale = scale_counts_for(&self.scale_buffer, gene_tree.nodes[right].scaler_index, self.site_count);

        let tiptip = if left_is_tip && right_is_tip {
            Some(build_tiptip_lookup(&p_left, &p_right))
        } else {
            None
        };

        let mut out = vec![0.0; self.site_count * STATES];
        let mut out_scale = vec![0u32; self.site_count];

        for site in 0..self.site_count {
            let site_out = &mut out[site * STATES..site * STATES + STATES];
            if let Some(table) = &tiptip {
                let lc = self.tip_codes[left_clv_idx][site] as usize;
                let rc = self.tip_codes[right_clv_idx][site] as usize;
                site_out.copy_from_slice(&table[lc][rc]);
            } else {
                let left_in = if left_is_tip {
                    self.tip_clv_vector(left_clv_idx, site)
                } else {
                    let base = site * STATES;
                    let src = &self.clv[left_clv_idx][base..base + STATES];
                    [src[0], src[1], src[2], src[3]]
                };
                let right_in = if right_is_tip {
                    self.tip_clv_vector(right_clv_idx, site)
                } else {
                    let base = site * STATES;
                    let src = &self.clv[right_clv_idx][base..base + STATES];
                    [src[0], src[1], src[2], src[3]]
                };
                for s in 0..STATES {
                    let sum_left: f64 = (0..STATES).map(|t| p_left[s][t] * left_in[t]).sum();
                    let sum_right: f64 = (0..STATES).map(|t| p_right[s][t] * right_in[t]).sum();
                    site_out[s] = sum_left * sum_right;
                }
            }

            let mut count = left_scale[site] + right_scale[site];
            while site_out.iter().all(|&x| x < SCALE_THRESHOLD) && site_out.iter().any(|&x| x > 0.0) {
                for x in site_out.iter_mut() {
                    *x *= SCALE_FACTOR;
                }
                count += 1;
            }
            out_scale[site] = count;
        }

        self.clv[out_clv_idx] = out;
        if let Some(scaler_idx) = scaler_idx {
            self.scale_buffer[scaler_idx] = out_scale;
        }
    }

    fn root_log_likelihood(&self, gene_tree: &GeneTree) -> Result<f64, Error> {
        let root = &gene_tree.nodes[gene_tree.root];
        let root_clv = &self.clv[root.clv_index];
        let root_scale = scale_counts_for(&self.scale_buffer, root.scaler_index, self.site_count);
        let log_scale_factor = SCALE_FACTOR.ln();

        let mut logl = 0.0;
        for site in 0..self.site_count {
            let base = site * STATES;
            let site_lk: f64 = (0..STATES).map(|s| FREQ * root_clv[base + s]).sum();
            if site_lk <= 0.0 {
                return Err(Error::Numeric {
                    what: "site likelihood".to_string(),
                    value: site_lk,
                });
            }
            let site_logl = site_lk.ln() - root_scale[site] as f64 * log_scale_factor;
            logl += self.pattern_weights[site] * site_logl;
        }
        Ok(logl)
    }
}

fn scale_counts_for(
    scale_buffer: &[Vec<u32>],
    scaler_index: Option<usize>,
    site_count: usize,
) -> Vec<u32> {
    match scaler_index {
        Some(idx) if !scale_buffer[idx].is_empty() => scale_buffer[idx].clone(),
        _ => vec![0; site_count],
    }
}

fn tip_vector(p: &[[f64; 4]; 4], code: u8) -> [f64; STATES] {
    let compatible = compatible_states(code);
    let mut out = [0.0; STATES];
    for s in 0..STATES {
        out[s] = (0..STATES)
            .filter(|&t| compatible[t])
            .map(|t| p[s][t])
            .sum();
    }
    out
}

/// `table[left_code][right_code]` holds the per-state product of the two
/// children's partial likelihoods, for every combination of the 16 possible
/// ambiguity codes -- computed once per pair of branch lengths, reused
/// across every site that shares the same pair of tip states.
fn build_tiptip_lookup(p_left: &[[f64; 4]; 4], p_right: &[[f64; 4]; 4]) -> [[[f64; STATES]; 16]; 16] {
    let mut table = [[[0.0; STATES]; 16]; 16];
    for lc in 0..16u8 {
        let tl = tip_vector(p_left, lc);
        for rc in 0..16u8 {
            let tr = tip_vector(p_right, rc);
            for s in 0..STATES {
                table[lc as usize][rc as usize][s] = tl[s] * tr[s];
            }
        }
    }
    table
}
