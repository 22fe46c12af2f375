use clap::Args;
use serde_json::Value;

use presite_core::engine::{model_for, SimulationRequest};
use presite_core::monte_carlo::{simulate, UncertainParameter};

use super::{control, load_analysis, parse_distribution, Context, ProjectArgs};

/// Arguments for Monte Carlo simulation of the IRR
#[derive(Args)]
pub struct SimulateArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Uncertain parameter, as parameter=kind:args (repeatable), e.g.
    /// rent_per_m2=triangular:150,175,195
    #[arg(long = "dist", value_parser = parse_distribution)]
    pub distributions: Vec<UncertainParameter>,

    /// Number of trials
    #[arg(long, default_value = "10000")]
    pub trials: u32,

    /// Seed; a random one is drawn and reported when absent
    #[arg(long)]
    pub seed: Option<u64>,

    /// Stop after this many seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

pub fn run_simulate(args: SimulateArgs, ctx: &Context) -> Result<Value, Box<dyn std::error::Error>> {
    let doc = load_analysis(&args.project)?;
    let model = model_for(&doc.project, &ctx.table)?;

    let request = match doc.analyses.simulation {
        Some(request) => request,
        None => {
            if args.distributions.is_empty() {
                return Err("--dist is required (or provide --input)".into());
            }
            SimulationRequest {
                distributions: args.distributions,
                trials: args.trials,
                seed: args.seed,
            }
        }
    };

    let result = simulate(
        &model,
        &request.distributions,
        request.trials,
        request.seed,
        &ctx.config,
        &control(args.timeout_secs),
    )?;
    Ok(serde_json::to_value(result)?)
}
