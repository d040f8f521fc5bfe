//! The MCMC driver: load inputs, initialize the species tree and every
//! locus's gene tree, run burn-in with finetune adaptation, then sample.

use std::fs;

use crate::errors::Error;
use crate::io::{mapfile, msa, trace::TraceWriter};
use crate::likelihood::Locus;
use crate::mcmc::config::Config;
use crate::prior;
use crate::proposals::{age, mixing, spr, tau, theta, Finetune};
use crate::rng::Rng;
use crate::tree::gene::{build_initial, GeneTree, TipAssignment};
use crate::tree::species::{validate_species_map, SpeciesTree};

/// One locus's fixed data and evolving state for the duration of a run.
struct LocusRun {
    gene_tree: GeneTree,
    locus: Locus,
}

/// Every move kind's adaptive step size, seeded from the CLI's
/// `finetune_*` options.
struct Finetunes {
    age: Finetune,
    spr: Finetune,
    theta: Finetune,
    tau: Finetune,
    mix: Finetune,
}

pub fn run(config: &Config) -> Result<(), Error> {
    let mut rng = Rng::from_seed(config.seed);

    let stree_text = fs::read_to_string(&config.stree)?;
    let mut species_tree = SpeciesTree::from_newick(&stree_text)?;

    let map_text = fs::read_to_string(&config.mapfile)?;
    let individual_to_species = mapfile::parse(&config.mapfile, &map_text)?;
    validate_species_map(&species_tree, &individual_to_species)?;

    let locus_count = config.msafile.len();
    species_tree.allocate_loci(locus_count);
    species_tree.init_theta(config.theta_alpha, config.theta_beta, &mut rng);
    species_tree.init_tau(config.tau_alpha, config.tau_beta, &mut rng);
    species_tree.check_ultrametric()?;
    species_tree.build_pptable();

    let mut runs = Vec::with_capacity(locus_count);
    for (locus_index, path) in config.msafile.iter().enumerate() {
        let text = fs::read_to_string(path)?;
        let alignment = msa::parse(path, &text)?;
        let (tip_codes, weights) = msa::compress(&alignment, config.cleandata)?;

        let tips: Vec<TipAssignment> = alignment
            .labels
            .iter()
            .map(|label| {
                let species = individual_to_species.get(label).ok_or_else(|| Error::UnknownSpecies {
                    individual: label.clone(),
                    species: "<unmapped>".to_string(),
                })?;
                let species_idx = species_tree.tip_labels.get(species).ok_or_else(|| Error::UnknownSpecies {
                    individual: label.clone(),
                    species: species.clone(),
                })?;
                Ok(TipAssignment { species: species_idx, label })
            })
            .collect::<Result<_, Error>>()?;

        let mut gene_tree = build_initial(&mut species_tree, locus_index, &tips, &mut rng)?;
        let mut locus = Locus::new(tip_codes, weights);
        gene_tree.logl = locus.log_likelihood(&mut gene_tree)?;
        gene_tree.logpr = prior::recompute_locus(&mut species_tree, locus_index);

        runs.push(LocusRun { gene_tree, locus });
    }

    let mut finetunes = Finetunes {
        age: Finetune::new(config.finetune_gtage),
        spr: Finetune::new(config.finetune_gtspr),
        theta: Finetune::new(config.finetune_theta),
        tau: Finetune::new(config.finetune_tau),
        mix: Finetune::new(config.finetune_mix),
    };

    log::info!(
        "initialized {} populations, {} loci; beginning {} burn-in iterations",
        species_tree.len(),
        locus_count,
        config.burnin
    );

    for iteration in 0..config.burnin {
        run_iteration(&mut species_tree, &mut runs, config, &mut finetunes, &mut rng)?;
        finetunes.age.adapt();
        finetunes.spr.adapt();
        finetunes.theta.adapt();
        finetunes.tau.adapt();
        finetunes.mix.adapt();
        if iteration % 1000 == 0 {
            log::info!("burn-in iteration {}/{}", iteration, config.burnin);
        }
    }

    let trace_file = fs::File::create(&config.mcmcfile)?;
    let mut trace = TraceWriter::new(trace_file);

    let total_sampling = config.samples * config.samplefreq;
    for iteration in 0..total_sampling {
        run_iteration(&mut species_tree, &mut runs, config, &mut finetunes, &mut rng)?;
        if (iteration + 1) % config.samplefreq == 0 {
            let sample_index = (iteration + 1) / config.samplefreq;
            let total_logl: f64 = runs.iter().map(|r| r.gene_tree.logl).sum();
            let total_logpr: f64 = (0..locus_count).map(|l| prior::locus_logpr(&species_tree, l)).sum();
            trace.write_sample(sample_index, total_logl, total_logpr, &species_tree)?;
            if sample_index % 1000 == 0 {
                log::info!("{} samples collected", sample_index);
            }
        }
    }
    trace.flush()?;

    fs::write(&config.outfile, species_tree.to_newick())?;
    log::info!("wrote final species tree to {}", config.outfile.display());

    Ok(())
}

fn run_iteration(
    species_tree: &mut SpeciesTree,
    runs: &mut [LocusRun],
    config: &Config,
    finetunes: &mut Finetunes,
    rng: &mut Rng,
) -> Result<(), Error> {
    for (locus_index, run) in runs.iter_mut().enumerate() {
        age::propose(
            species_tree,
            &mut run.gene_tree,
            &mut run.locus,
            locus_index,
            &mut finetunes.age,
            rng,
        )?;
        spr::propose(
            species_tree,
            &mut run.gene_tree,
            &mut run.locus,
            locus_index,
            &mut finetunes.spr,
            rng,
        )?;
    }

    for population in 0..species_tree.len() {
        if species_tree.nodes[population].theta.is_some() {
            theta::propose(
                species_tree,
                population,
                config.theta_alpha,
                config.theta_beta,
                &mut finetunes.theta,
                rng,
            )?;
        }
    }

    for population in 0..species_tree.len() {
        if !species_tree.nodes[population].is_tip() {
            let mut loci: Vec<tau::LocusState<'_>> = runs
                .iter_mut()
                .map(|r| tau::LocusState {
                    gene_tree: &mut r.gene_tree,
                    locus: &mut r.locus,
                })
                .collect();
            tau::propose(
                species_tree,
                population,
                config.tau_alpha,
                config.tau_beta,
                &mut loci,
                &mut finetunes.tau,
                rng,
            )?;
        }
    }

    {
        let mut loci: Vec<mixing::LocusState<'_>> = runs
            .iter_mut()
            .map(|r| mixing::LocusState {
                gene_tree: &mut r.gene_tree,
                locus: &mut r.locus,
            })
            .collect();
        mixing::propose(
            species_tree,
            &mut loci,
            config.theta_alpha,
            config.theta_beta,
            config.tau_alpha,
            config.tau_beta,
            &mut finetunes.mix,
            rng,
        )?;
    }

    Ok(())
}
