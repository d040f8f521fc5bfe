//! End-to-end exercise of the simplest possible run: one population, one
//! locus, two tips. Covers construction, the initial likelihood and prior,
//! and one MCMC proposal, the way the teacher's integration tests exercise a
//! full read-call-trace path rather than a single unit.

use phybayes::likelihood::Locus;
use phybayes::prior;
use phybayes::proposals::{age, Finetune};
use phybayes::rng::Rng;
use phybayes::tree::gene::{build_initial, TipAssignment};
use phybayes::tree::species::SpeciesTree;

#[test]
fn single_population_two_tips_end_to_end() {
    let mut species_tree = SpeciesTree::from_newick("(A);").unwrap();
    species_tree.nodes[0].theta = Some(0.01);
    species_tree.allocate_loci(1);

    let tips = vec![
        TipAssignment { species: 0, label: "a1" },
        TipAssignment { species: 0, label: "a2" },
    ];
    let mut rng = Rng::from_seed(42);
    let mut gene_tree = build_initial(&mut species_tree, 0, &tips, &mut rng).unwrap();
    assert_eq!(gene_tree.nodes.len(), 3);
    assert_eq!(species_tree.nodes[0].seqin_count[0], 2);

    // every site is identical between the two tips, so the two-tip,
    // tip-tip-lookup code path is exercised directly.
    let n_sites = 20;
    let tip_a: Vec<u8> = vec![1; n_sites]; // A everywhere
    let tip_b: Vec<u8> = vec![1; n_sites];
    let weights = vec![1.0; n_sites];
    let mut locus = Locus::new(vec![tip_a, tip_b], weights);

    let logl = locus.log_likelihood(&mut gene_tree).unwrap();
    assert!(logl.is_finite());
    gene_tree.logl = logl;

    let logpr = prior::recompute_locus(&mut species_tree, 0);
    assert!(logpr.is_finite());
    gene_tree.logpr = logpr;

    // the locus prior is exactly the sum of every population's contribution.
    let summed: f64 = species_tree.nodes.iter().map(|n| n.logpr_contrib[0]).sum();
    assert!((logpr - summed).abs() < 1e-8);

    // one gene-tree age move should leave the tree internally consistent
    // regardless of whether it's accepted.
    let mut finetune = Finetune::new(0.05);
    age::propose(&mut species_tree, &mut gene_tree, &mut locus, 0, &mut finetune, &mut rng).unwrap();
    species_tree.check_ultrametric().unwrap();

    let internal = gene_tree.root;
    let (l, r) = (
        gene_tree.nodes[internal].left.unwrap(),
        gene_tree.nodes[internal].right.unwrap(),
    );
    assert!(gene_tree.nodes[internal].time > gene_tree.nodes[l].time);
    assert!(gene_tree.nodes[internal].time > gene_tree.nodes[r].time);
}

#[test]
fn species_tree_from_newick_accepts_the_single_population_tree() {
    let tree = SpeciesTree::from_newick("(A);").unwrap();
    assert_eq!(tree.len(), 1);
    assert!(tree.nodes[0].is_tip());
    assert!(tree.is_root(0));
}
