//! ksu-forge - flag-driven GKI kernel builder.
//!
//! Flags come from the environment (`KSU_VARIANT`, `USE_SUSFS`, `USE_LXC`,
//! `LTO`, `MASS_BUILD`), optionally preloaded from `.env`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use ksu_forge::config;
use ksu_forge::config::flags::RawFlags;
use ksu_forge::config::loader;
use ksu_forge::orchestrator::{self, BuildPipeline, WorkLayout};
use ksu_forge::{FeatureSelection, LogCollector};

#[derive(Parser)]
#[command(name = "ksu-forge")]
#[command(about = "Flag-driven GKI kernel builder")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline (default)
    Build,

    /// Print the patch plan for the current flags without touching anything
    Plan {
        /// Kernel series (major.minor). Read from the fetched source when omitted.
        #[arg(long)]
        series: Option<String>,
    },
}

fn work_dir() -> PathBuf {
    std::env::var("WORK_DIR")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Build) {
        Commands::Build => build(cli.verbose),
        Commands::Plan { series } => print_plan(series),
    }
}

fn build(verbose: bool) -> Result<()> {
    let layout = WorkLayout::new(&work_dir());
    let level = if verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info };

    // Every line from here on reaches the run log
    let collector = LogCollector::new(&layout.logs, level)
        .map_err(anyhow::Error::msg)
        .context("Failed to initialize run log")?;
    collector.install().context("Failed to install logger")?;
    let collector = Arc::new(collector);
    log::info!("[Main] ksu-forge {} logging to {}", ksu_forge::VERSION, collector.log_path().display());

    let vars = config::load_env();
    let (settings, controller) = match orchestrator::load_settings(&vars, Some(Arc::clone(&collector))) {
        Ok(loaded) => loaded,
        Err((controller, e)) => controller.trip(&e),
    };

    log::info!(
        "[Main] Variant {} LTO {}{}",
        settings.selection.variant_label(),
        settings.lto,
        if settings.reporting.mass_build { " (mass build, notifications silenced)" } else { "" }
    );

    let pipeline = BuildPipeline::new(&settings);
    match pipeline.run(controller.reporter()) {
        Ok(report) => {
            log::info!("[Main] {}", report.message.replace('\n', " | "));
            if let Err(e) = collector.flush_to_disk() {
                eprintln!("[Main] [WARNING] {}", e);
            }
            Ok(())
        }
        Err(e) => controller.trip(&e),
    }
}

fn print_plan(series: Option<String>) -> Result<()> {
    let selection = FeatureSelection::normalize(&RawFlags {
        variant: std::env::var("KSU_VARIANT").ok(),
        susfs: std::env::var("USE_SUSFS").ok(),
        lxc: std::env::var("USE_LXC").ok(),
    })?;
    let profile_path = std::env::var("KERNEL_PROFILE")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| "kernel.toml".to_string());
    let profile = loader::load_profile(PathBuf::from(profile_path).as_path())?;
    let layout = WorkLayout::new(&work_dir());

    let series = match series {
        Some(series) => series,
        None => orchestrator::read_kernel_version(&layout.source)
            .context("No --series given and no fetched kernel source to read it from")?
            .series(),
    };

    let ctx = orchestrator::plan_context(&profile, &layout, &series)?;
    let steps = ksu_forge::kernel::patcher::plan::plan(&selection, &ctx);

    println!("Plan for {} (kernel {}), {} steps:", selection.variant_label(), series, steps.len());
    for (index, step) in steps.iter().enumerate() {
        println!("{:>3}. {}", index + 1, step);
    }
    Ok(())
}
