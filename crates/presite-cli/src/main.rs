mod commands;
mod input;
mod logging;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;

use commands::analyze::AnalyzeArgs;
use commands::benchmarks::BenchmarksArgs;
use commands::evaluate::EvaluateArgs;
use commands::optimize::OptimizeArgs;
use commands::sensitivity::SensitivityArgs;
use commands::simulate::SimulateArgs;
use commands::Context;

/// Pre-development real estate investment evaluation
#[derive(Parser)]
#[command(
    name = "presite",
    version,
    about = "Pre-development real estate investment evaluation",
    long_about = "Projects the cash flows of a development from the equity, horizon and \
                  use case, computes IRR, NPV, MIRR, DSCR and the residual land value, \
                  and recommends Go / No-Go against a target return. Sensitivity, \
                  Monte Carlo simulation and optimization run on the same model."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Engine configuration file (JSON or YAML)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Benchmark table file (JSON or YAML); built-in benchmarks when absent
    #[arg(long, global = true)]
    benchmarks: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a project and recommend Go / No-Go
    Evaluate(EvaluateArgs),
    /// IRR sensitivity (one-at-a-time shifts or Sobol indices)
    Sensitivity(SensitivityArgs),
    /// Monte Carlo simulation of the IRR
    Simulate(SimulateArgs),
    /// Search parameter bounds and horizons for the best IRR or NPV
    Optimize(OptimizeArgs),
    /// Run sensitivity, simulation and optimization from one input document
    Analyze(AnalyzeArgs),
    /// Show the benchmark table
    Benchmarks(BenchmarksArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn main() {
    let cli = Cli::parse();
    logging::init_tracing();

    let ctx = match Context::load(cli.config.as_deref(), cli.benchmarks.as_deref()) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    };

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Evaluate(args) => commands::evaluate::run_evaluate(args, &ctx),
        Commands::Sensitivity(args) => commands::sensitivity::run_sensitivity(args, &ctx),
        Commands::Simulate(args) => commands::simulate::run_simulate(args, &ctx),
        Commands::Optimize(args) => commands::optimize::run_optimize(args, &ctx),
        Commands::Analyze(args) => commands::analyze::run_analyze(args, &ctx),
        Commands::Benchmarks(args) => commands::benchmarks::run_benchmarks(args, &ctx),
        Commands::Version => {
            println!("presite {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
