//! KappaStat CLI

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod datacard;
mod predict;
mod report;

#[derive(Parser)]
#[command(name = "kappastat")]
#[command(about = "KappaStat - ABCD background predictions with toy-based uncertainties")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    /// Write a reproducibility bundle (inputs, outputs, meta, sha256 manifest) into this directory.
    /// The directory must be empty or not exist.
    #[arg(long, global = true)]
    bundle: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute kappas and background predictions for one ABCD method
    Predict {
        /// Analysis config (YAML, or JSON by extension)
        #[arg(short, long)]
        config: PathBuf,

        /// Yields file (JSON)
        #[arg(short, long)]
        yields: PathBuf,

        /// Method name. Defaults to the method recorded in the yields file.
        #[arg(short, long)]
        method: Option<String>,

        /// Toys per estimate (overrides the config)
        #[arg(long)]
        toys: Option<usize>,

        /// Base RNG seed (overrides the config)
        #[arg(long)]
        seed: Option<u64>,

        /// Show observed yields and data kappas in signal planes
        #[arg(long)]
        unblind: bool,

        /// Use the simulated background as pseudodata
        #[arg(long)]
        only_mc: bool,

        /// Print a fixed-width text table instead of JSON
        #[arg(long)]
        table: bool,

        /// Output file. Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the methods of an analysis config
    Methods {
        /// Analysis config (YAML, or JSON by extension)
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Compute SR/CR transfer factors and write counting datacards
    Datacard {
        /// Datacard input (JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Signal point to write. Defaults to the first one.
        #[arg(long)]
        signal: Option<String>,

        /// Output file for the selected card. Defaults to stdout.
        #[arg(short, long, conflicts_with = "out_dir")]
        output: Option<PathBuf>,

        /// Write one `datacard_<signal>.txt` per signal point into this directory.
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Toys per transfer factor
        #[arg(long, default_value_t = ks_inference::DEFAULT_N_TOYS)]
        toys: usize,

        /// Base RNG seed
        #[arg(long, default_value_t = ks_inference::DEFAULT_SEED)]
        seed: u64,
    },

    /// Print version information
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let bundle = cli.bundle.as_ref();
    match cli.command {
        Commands::Predict { config, yields, method, toys, seed, unblind, only_mc, table, output } => {
            let args = predict::PredictArgs {
                config,
                yields,
                method,
                toys,
                seed,
                unblind,
                only_mc,
                table,
            };
            predict::cmd_predict(&args, output.as_ref(), bundle)
        }
        Commands::Methods { config } => cmd_methods(&config, bundle),
        Commands::Datacard { input, signal, output, out_dir, toys, seed } => datacard::cmd_datacard(
            &input,
            signal.as_deref(),
            output.as_ref(),
            out_dir.as_ref(),
            toys,
            seed,
            bundle,
        ),
        Commands::Version => {
            println!("kappastat {}", ks_core::VERSION);
            Ok(())
        }
    }
}

fn cmd_methods(config: &PathBuf, bundle: Option<&PathBuf>) -> Result<()> {
    let cfg = ks_translate::AnalysisConfig::from_path(config)?;
    let mut methods = Vec::with_capacity(cfg.methods.len());
    for m in cfg.build_methods()? {
        let bins: Vec<usize> = (0..m.n_planes()).map(|p| m.n_bins(p)).collect();
        methods.push(serde_json::json!({
            "name": m.name(),
            "title": m.title(),
            "planes": m.n_planes(),
            "bins": bins,
            "rows": m.total_rows(),
            "first_signal_bin": m.first_signal_bin(),
            "int_nbnj": m.int_nbnj(),
        }));
    }
    let output_json = serde_json::json!({ "methods": methods });
    write_json(None, &output_json)?;
    if let Some(dir) = bundle {
        report::write_bundle(
            dir,
            "methods",
            serde_json::json!({}),
            &[("config", config.as_path())],
            &output_json,
            &[],
        )?;
    }
    Ok(())
}

pub(crate) fn write_json(output: Option<&PathBuf>, value: &serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(value)?);
    }
    Ok(())
}
