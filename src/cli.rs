//! Command-line interface, built with `structopt` the way the teacher's own
//! `Varlociraptor` enum is, validated and converted into a
//! [`crate::mcmc::Config`] at the process boundary.

use std::path::PathBuf;

use anyhow::Context;
use structopt::StructOpt;

use crate::errors::Error;
use crate::mcmc::Config;

#[derive(Debug, StructOpt, Clone)]
#[structopt(
    name = "phybayes",
    about = "Bayesian inference of species trees, delimitations and population parameters under the multispecies coalescent.",
    setting = structopt::clap::AppSettings::ColoredHelp,
)]
pub struct Opt {
    #[structopt(long, help = "RNG seed for the whole run")]
    pub seed: u64,

    #[structopt(long, parse(from_os_str), help = "Rooted binary Newick species tree")]
    pub stree: PathBuf,

    #[structopt(long, parse(from_os_str), help = "Sequence alignment(s), one per locus")]
    pub msafile: Vec<PathBuf>,

    #[structopt(long, parse(from_os_str), help = "Individual-to-species map file")]
    pub mapfile: PathBuf,

    #[structopt(long, parse(from_os_str), help = "Final species-tree Newick dump")]
    pub outfile: PathBuf,

    #[structopt(long, parse(from_os_str), help = "CSV trace output")]
    pub mcmcfile: PathBuf,

    #[structopt(long, help = "Number of samples to collect after burn-in")]
    pub samples: usize,

    #[structopt(long, help = "Iterations between retained samples")]
    pub samplefreq: usize,

    #[structopt(long, help = "Burn-in iterations used to adapt finetune step sizes")]
    pub burnin: usize,

    #[structopt(long, help = "Reset finetune step sizes to their defaults at the start of burn-in")]
    pub finetune_reset: bool,

    #[structopt(long, default_value = "1.0", help = "Initial step size for the gene-tree age move")]
    pub finetune_gtage: f64,

    #[structopt(long, default_value = "1.0", help = "Initial step size for the gene-tree SPR move")]
    pub finetune_gtspr: f64,

    #[structopt(long, default_value = "1.0", help = "Initial step size for the theta move")]
    pub finetune_theta: f64,

    #[structopt(long, default_value = "1.0", help = "Initial step size for the tau move")]
    pub finetune_tau: f64,

    #[structopt(long, default_value = "0.5", help = "Initial step size for the mixing move")]
    pub finetune_mix: f64,

    #[structopt(long, default_value = "2.0", help = "Gamma prior shape for theta")]
    pub theta_alpha: f64,

    #[structopt(long, default_value = "2000.0", help = "Gamma prior rate for theta")]
    pub theta_beta: f64,

    #[structopt(long, default_value = "2.0", help = "Gamma prior shape for the root tau")]
    pub tau_alpha: f64,

    #[structopt(long, default_value = "2000.0", help = "Gamma prior rate for the root tau")]
    pub tau_beta: f64,

    #[structopt(long, help = "Drop sites with any ambiguous or gap character")]
    pub cleandata: bool,

    #[structopt(long, help = "Enable species-delimitation proposals (Non-goal in this build)")]
    pub delimit: bool,

    #[structopt(long, help = "Reorder loci by decreasing informativeness before sampling")]
    pub reorder: bool,
}

impl Opt {
    /// Validate and convert the parsed CLI options into a runnable
    /// [`Config`]. Narrow startup-time validation only; per-locus and
    /// per-tree validation happens where the relevant data is loaded.
    pub fn into_config(self) -> Result<Config, Error> {
        if self.samplefreq == 0 {
            return Err(Error::InvariantViolation {
                msg: "--samplefreq must be at least 1".to_string(),
            });
        }
        if self.msafile.is_empty() {
            return Err(Error::InvariantViolation {
                msg: "at least one --msafile is required".to_string(),
            });
        }
        if self.delimit {
            return Err(Error::InvariantViolation {
                msg: "species delimitation is not supported by this build".to_string(),
            });
        }
        Ok(Config {
            seed: self.seed,
            stree: self.stree,
            msafile: self.msafile,
            mapfile: self.mapfile,
            outfile: self.outfile,
            mcmcfile: self.mcmcfile,
            samples: self.samples,
            samplefreq: self.samplefreq,
            burnin: self.burnin,
            finetune_reset: self.finetune_reset,
            finetune_gtage: self.finetune_gtage,
            finetune_gtspr: self.finetune_gtspr,
            finetune_theta: self.finetune_theta,
            finetune_tau: self.finetune_tau,
            finetune_mix: self.finetune_mix,
            theta_alpha: self.theta_alpha,
            theta_beta: self.theta_beta,
            tau_alpha: self.tau_alpha,
            tau_beta: self.tau_beta,
            cleandata: self.cleandata,
            reorder: self.reorder,
        })
    }
}

/// Run the full pipeline for a parsed `Opt`, at the `anyhow::Result`
/// boundary the teacher draws between `cli::run` and the library beneath it.
pub fn run(opt: Opt) -> anyhow::Result<()> {
    let config = opt.into_config().context("invalid configuration")?;
    crate::mcmc::driver::run(&config)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_opt() -> Opt {
        Opt {
            seed: 1,
            stree: PathBuf::from("s.nwk"),
            msafile: vec![PathBuf::from("a.phy")],
            mapfile: PathBuf::from("map.txt"),
            outfile: PathBuf::from("out.nwk"),
            mcmcfile: PathBuf::from("mcmc.csv"),
            samples: 100,
            samplefreq: 2,
            burnin: 10,
            finetune_reset: false,
            finetune_gtage: 1.0,
            finetune_gtspr: 1.0,
            finetune_theta: 1.0,
            finetune_tau: 1.0,
            finetune_mix: 0.5,
            theta_alpha: 2.0,
            theta_beta: 2000.0,
            tau_alpha: 2.0,
            tau_beta: 2000.0,
            cleandata: false,
            delimit: false,
            reorder: false,
        }
    }

    #[test]
    fn rejects_zero_samplefreq() {
        let mut opt = base_opt();
        opt.samplefreq = 0;
        assert!(opt.into_config().is_err());
    }

    #[test]
    fn rejects_empty_msafile_list() {
        let mut opt = base_opt();
        opt.msafile = Vec::new();
        assert!(opt.into_config().is_err());
    }

    #[test]
    fn rejects_delimit() {
        let mut opt = base_opt();
        opt.delimit = true;
        assert!(opt.into_config().is_err());
    }

    #[test]
    fn accepts_a_well_formed_option_set() {
        assert!(base_opt().into_config().is_ok());
    }
}
