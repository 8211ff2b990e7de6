//! Command-line parsing for the stochastic SFH pipeline.
//!
//! Parsing and dispatch stay separate from the numerical code; handlers live in `app`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::StochasticFamily;

/// Default draw-store directory.
pub const DEFAULT_STORE: &str = "out/SFHs";

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "sfh", version, about = "Stochastic star-formation histories: draws, reconstruction, quenching")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Validate a configuration and report draw-store readiness.
    Check(StoreArgs),
    /// Generate and store the random draws for a configuration.
    Prepare(PrepareArgs),
    /// Reconstruct a single SFH instance.
    Reconstruct(ReconstructArgs),
    /// Reconstruct every instance of a configuration in parallel.
    Sweep(SweepArgs),
    /// Reconcile fitted SFHs with fitted masses and detect quenching.
    Quench(QuenchArgs),
    /// Delete one family's stored draws (clears readiness first).
    Purge(PurgeArgs),
}

/// Configuration and draw-store location shared by the SFH subcommands.
#[derive(Debug, Args, Clone)]
pub struct StoreArgs {
    /// Run configuration (JSON).
    #[arg(long, value_name = "JSON")]
    pub config: PathBuf,

    /// Draw-store directory.
    #[arg(long, value_name = "DIR", default_value = DEFAULT_STORE)]
    pub store: PathBuf,
}

#[derive(Debug, Args, Clone)]
pub struct PrepareArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Seed for the draws (overrides the configuration's `seed`).
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Debug, Args, Clone)]
pub struct ReconstructArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Model index (column of the stored draws).
    #[arg(long, default_value_t = 0)]
    pub model_index: usize,

    /// Formation age in Myr (defaults to the first configured value).
    #[arg(long)]
    pub age_form: Option<u32>,

    /// Number of bins (defaults to the first configured value).
    #[arg(long)]
    pub n_levels: Option<usize>,

    /// Export the track to CSV.
    #[arg(long, value_name = "CSV")]
    pub export: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct SweepArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Export one summary row per instance to CSV.
    #[arg(long, value_name = "CSV")]
    pub export: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct QuenchArgs {
    /// Fit results table (CSV).
    #[arg(long, value_name = "CSV")]
    pub results: PathBuf,

    /// Template SFH (CSV with `time,sfr`). `{id}` is replaced by each object id.
    #[arg(long, value_name = "CSV")]
    pub template: String,

    /// Only analyse this object.
    #[arg(long)]
    pub id: Option<String>,

    /// Tabulated mass-return kernel (CSV, column `retained`); analytic when absent.
    #[arg(long, value_name = "CSV")]
    pub kernel: Option<PathBuf>,

    /// Export mass-growth tables to JSON.
    #[arg(long, value_name = "JSON")]
    pub export: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct PurgeArgs {
    /// Draw-store directory.
    #[arg(long, value_name = "DIR", default_value = DEFAULT_STORE)]
    pub store: PathBuf,

    /// Family whose draws are deleted (`nonparametric` or `regulator`).
    #[arg(long, value_parser = parse_family)]
    pub family: StochasticFamily,
}

fn parse_family(s: &str) -> Result<StochasticFamily, String> {
    StochasticFamily::parse(s).ok_or_else(|| format!("unknown family `{s}` (expected nonparametric or regulator)"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconstruct_flags_parse() {
        let cli = Cli::parse_from([
            "sfh",
            "reconstruct",
            "--config",
            "cfg.json",
            "--model-index",
            "7",
            "--age-form",
            "1500",
        ]);
        match cli.command {
            Command::Reconstruct(args) => {
                assert_eq!(args.model_index, 7);
                assert_eq!(args.age_form, Some(1500));
                assert_eq!(args.n_levels, None);
                assert_eq!(args.store.store, PathBuf::from(DEFAULT_STORE));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn quench_requires_results_and_template() {
        assert!(Cli::try_parse_from(["sfh", "quench", "--results", "r.csv"]).is_err());
        let cli = Cli::try_parse_from(["sfh", "quench", "--results", "r.csv", "--template", "sfh_{id}.csv"]).unwrap();
        assert!(matches!(cli.command, Command::Quench(ref a) if a.template == "sfh_{id}.csv"));
    }

    #[test]
    fn purge_family_is_parsed() {
        let cli = Cli::try_parse_from(["sfh", "purge", "--family", "regulator"]).unwrap();
        assert!(matches!(cli.command, Command::Purge(ref a) if a.family == StochasticFamily::Regulator));
        assert!(Cli::try_parse_from(["sfh", "purge", "--family", "delayed"]).is_err());
    }
}
