//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments and initialises logging
//! - loads configuration and inputs
//! - runs the requested workflow from `pipeline`
//! - prints reports and writes optional exports

use std::path::Path;
use std::time::Instant;

use chrono::Local;
use clap::Parser;
use log::{info, warn};

use crate::cli::{Command, PrepareArgs, PurgeArgs, QuenchArgs, ReconstructArgs, StoreArgs, SweepArgs};
use crate::draws::{DrawStore, FileDrawStore};
use crate::error::AppError;
use crate::math::{Cosmology, MassReturnKernel};

pub mod pipeline;

/// Entry point for the `sfh` binary.
pub fn run() -> Result<(), AppError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = crate::cli::Cli::parse();

    let started = Local::now();
    let clock = Instant::now();
    info!("sfh started at {}", started.format("%Y-%m-%d %H:%M:%S"));

    let result = match cli.command {
        Command::Check(args) => handle_check(args),
        Command::Prepare(args) => handle_prepare(args),
        Command::Reconstruct(args) => handle_reconstruct(args),
        Command::Sweep(args) => handle_sweep(args),
        Command::Quench(args) => handle_quench(args),
        Command::Purge(args) => handle_purge(args),
    };

    info!(
        "sfh finished at {} ({:.2}s)",
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        clock.elapsed().as_secs_f64()
    );
    result
}

fn open_store(args: &StoreArgs) -> Result<(crate::domain::SfhConfig, FileDrawStore), AppError> {
    let config = crate::io::load_config(&args.config)?;
    Ok((config, FileDrawStore::new(&args.store)))
}

fn handle_check(args: StoreArgs) -> Result<(), AppError> {
    let (config, store) = open_store(&args)?;
    // A missing store directory just means nothing has been prepared yet.
    let ready = store.ready_family()?;
    println!(
        "{}",
        crate::report::format_check(&config, &store.describe(), ready)
    );
    Ok(())
}

fn handle_prepare(args: PrepareArgs) -> Result<(), AppError> {
    let (config, store) = open_store(&args.store)?;
    let clock = Instant::now();
    let summary = pipeline::run_prepare(&config, &store, args.seed)?;
    println!(
        "{}",
        crate::report::format_prepare(
            &summary,
            &store.describe(),
            args.seed.or(config.seed),
            clock.elapsed().as_secs_f64()
        )
    );
    Ok(())
}

fn handle_purge(args: PurgeArgs) -> Result<(), AppError> {
    let store = FileDrawStore::new(&args.store);
    let cleared = pipeline::run_purge(&store, args.family)?;
    println!(
        "{}",
        crate::report::format_purge(args.family, &store.describe(), cleared)
    );
    Ok(())
}

fn handle_reconstruct(args: ReconstructArgs) -> Result<(), AppError> {
    let (config, store) = open_store(&args.store)?;
    let (instance, track) =
        pipeline::run_reconstruct(&config, &store, args.model_index, args.age_form, args.n_levels)?;
    println!("{}", crate::report::format_track(&instance, &track));

    if let Some(path) = &args.export {
        crate::io::write_track_csv(path, &instance, &track)?;
        info!("wrote track to {}", path.display());
    }
    Ok(())
}

fn handle_sweep(args: SweepArgs) -> Result<(), AppError> {
    let (config, store) = open_store(&args.store)?;
    let clock = Instant::now();
    let rows = pipeline::run_sweep(&config, &store)?;
    println!(
        "{}",
        crate::report::format_sweep(&rows, clock.elapsed().as_secs_f64())
    );

    if let Some(path) = &args.export {
        crate::io::write_sweep_csv(path, &rows)?;
        info!("wrote {} sweep rows to {}", rows.len(), path.display());
    }
    Ok(())
}

fn handle_quench(args: QuenchArgs) -> Result<(), AppError> {
    let ingest = crate::io::load_results(&args.results)?;
    for e in &ingest.row_errors {
        warn!(
            "results line {} ({}): {}",
            e.line,
            e.id.as_deref().unwrap_or("?"),
            e.message
        );
    }

    let mut records = ingest.records;
    if let Some(id) = &args.id {
        records.retain(|r| &r.id == id);
        if records.is_empty() {
            return Err(AppError::data(format!("Object `{id}` not found in '{}'.", args.results.display())));
        }
    }

    let kernel = match &args.kernel {
        Some(path) => crate::io::load_kernel(path)?,
        None => MassReturnKernel::Analytic,
    };
    let templates = pipeline::TemplateSource::open(&args.template)?;
    let run = pipeline::run_quench(&records, &templates, &Cosmology::default(), &kernel);

    println!(
        "{}",
        crate::report::format_quench(&run.analyses, &run.skipped, &kernel.label())
    );

    if let Some(path) = &args.export {
        write_growth(path, &run)?;
    }
    if run.analyses.is_empty() {
        return Err(AppError::data("No object could be analysed."));
    }
    Ok(())
}

fn write_growth(path: &Path, run: &pipeline::QuenchRun) -> Result<(), AppError> {
    crate::io::write_growth_json(path, &run.analyses)?;
    info!(
        "wrote {} mass-growth tables to {}",
        run.analyses.len(),
        path.display()
    );
    Ok(())
}
