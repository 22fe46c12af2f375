use clap::Args;
use serde::Serialize;
use serde_json::{json, Value};

use presite_core::engine::{model_for, run_analyses};
use presite_core::{ComputationOutput, PreSiteResult};

use super::{control, load_analysis, Context, ProjectArgs};

/// Arguments for running several analyses from one document
#[derive(Args)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Stop every analysis after this many seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

/// Success envelope, error message, or null when not requested.
fn outcome<T: Serialize>(
    result: Option<PreSiteResult<ComputationOutput<T>>>,
) -> Result<Value, serde_json::Error> {
    match result {
        None => Ok(Value::Null),
        Some(Ok(out)) => serde_json::to_value(out),
        Some(Err(e)) => Ok(json!({ "error": e.to_string() })),
    }
}

pub fn run_analyze(args: AnalyzeArgs, ctx: &Context) -> Result<Value, Box<dyn std::error::Error>> {
    let doc = load_analysis(&args.project)?;
    let requested = &doc.analyses;
    if requested.sensitivity.is_none()
        && requested.simulation.is_none()
        && requested.optimization.is_none()
    {
        return Err(
            "the input document requests no analyses (add sensitivity, simulation or optimization)"
                .into(),
        );
    }

    let model = model_for(&doc.project, &ctx.table)?;
    let results = run_analyses(&model, requested, &ctx.config, &control(args.timeout_secs));

    Ok(json!({
        "result": {
            "sensitivity": outcome(results.sensitivity)?,
            "simulation": outcome(results.simulation)?,
            "optimization": outcome(results.optimization)?,
        }
    }))
}
