use clap::{Args, ValueEnum};
use serde_json::Value;

use presite_core::engine::model_for;
use presite_core::optimization::{optimize_project, Objective, OptimizationRequest, VariableBound};

use super::{control, load_analysis, parse_variable, Context, ProjectArgs};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ObjectiveArg {
    Irr,
    Npv,
}

impl From<ObjectiveArg> for Objective {
    fn from(arg: ObjectiveArg) -> Self {
        match arg {
            ObjectiveArg::Irr => Objective::MaximizeIrr,
            ObjectiveArg::Npv => Objective::MaximizeNpv,
        }
    }
}

/// Arguments for project optimization
#[derive(Args)]
pub struct OptimizeArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Decision variable, as parameter:min:max (repeatable)
    #[arg(long = "var", value_parser = parse_variable)]
    pub variables: Vec<VariableBound>,

    /// Shortest horizon to try
    #[arg(long, requires = "horizon_max")]
    pub horizon_min: Option<u32>,

    /// Longest horizon to try
    #[arg(long, requires = "horizon_min")]
    pub horizon_max: Option<u32>,

    /// Quantity to maximise
    #[arg(long, default_value = "irr")]
    pub objective: ObjectiveArg,

    /// Stop after this many seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

pub fn run_optimize(args: OptimizeArgs, ctx: &Context) -> Result<Value, Box<dyn std::error::Error>> {
    let doc = load_analysis(&args.project)?;
    let model = model_for(&doc.project, &ctx.table)?;

    let request = match doc.analyses.optimization {
        Some(request) => request,
        None => OptimizationRequest {
            variables: args.variables,
            horizon_bounds: args.horizon_min.zip(args.horizon_max),
            objective: args.objective.into(),
            initial_guess: None,
        },
    };

    let result = optimize_project(&model, &request, &ctx.config, &control(args.timeout_secs))?;
    Ok(serde_json::to_value(result)?)
}
