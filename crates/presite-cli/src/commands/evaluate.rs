use clap::Args;
use serde_json::Value;

use presite_core::engine::evaluate;

use super::{load_analysis, Context, ProjectArgs};

/// Arguments for a Go / No-Go evaluation
#[derive(Args)]
pub struct EvaluateArgs {
    #[command(flatten)]
    pub project: ProjectArgs,
}

pub fn run_evaluate(args: EvaluateArgs, ctx: &Context) -> Result<Value, Box<dyn std::error::Error>> {
    let request = load_analysis(&args.project)?.project;
    let result = evaluate(&request, &ctx.table, &ctx.config)?;
    Ok(serde_json::to_value(result)?)
}
