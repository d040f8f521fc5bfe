//! The Jukes-Cantor (1969) substitution model: equal base frequencies, equal
//! substitution rates. The transition probability matrix has a closed form,
//! so no matrix exponential is needed.

/// `P(bl)[i][j]` is the probability of ending in state `j` after branch
/// length `bl`, given state `i` at the start of the branch.
pub fn pmatrix(bl: f64) -> [[f64; 4]; 4] {
    debug_assert!(bl >= 0.0, "branch length must be non-negative");
    let exp_term = (-4.0 * bl / 3.0).exp();
    let same = 0.25 + 0.75 * exp_term;
    let diff = 0.25 - 0.25 * exp_term;
    let mut m = [[diff; 4]; 4];
    for i in 0..4 {
        m[i][i] = same;
    }
    m
}
