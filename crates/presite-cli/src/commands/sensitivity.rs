use clap::{Args, ValueEnum};
use rust_decimal::Decimal;
use serde_json::Value;

use presite_core::engine::model_for;
use presite_core::sensitivity::{analyze, ParameterRange, SensitivityRequest};
use presite_core::ModelParameter;

use super::{control, load_analysis, parse_range, Context, ProjectArgs};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SensitivityMode {
    Local,
    Global,
}

/// Arguments for IRR sensitivity analysis
#[derive(Args)]
pub struct SensitivityArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// One-at-a-time shifts or Sobol variance decomposition
    #[arg(long, default_value = "local")]
    pub mode: SensitivityMode,

    /// Parameters to shift (local); all of them when omitted
    #[arg(long, value_delimiter = ',')]
    pub parameters: Vec<ModelParameter>,

    /// Relative shift for local mode (e.g. 0.10 for ±10%)
    #[arg(long)]
    pub shift: Option<Decimal>,

    /// Sampled range for global mode, as parameter:min:max (repeatable)
    #[arg(long = "range", value_parser = parse_range)]
    pub ranges: Vec<ParameterRange>,

    /// Base samples N for global mode
    #[arg(long, default_value = "1024")]
    pub samples: u32,

    /// Seed for global mode
    #[arg(long)]
    pub seed: Option<u64>,

    /// Stop after this many seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

pub fn run_sensitivity(
    args: SensitivityArgs,
    ctx: &Context,
) -> Result<Value, Box<dyn std::error::Error>> {
    let doc = load_analysis(&args.project)?;
    let model = model_for(&doc.project, &ctx.table)?;

    let request = match doc.analyses.sensitivity {
        Some(request) => request,
        None => match args.mode {
            SensitivityMode::Local => SensitivityRequest::Local {
                parameters: args.parameters,
                shift: args.shift,
            },
            SensitivityMode::Global => {
                if args.ranges.is_empty() {
                    return Err("--range is required in global mode (or provide --input)".into());
                }
                SensitivityRequest::Global {
                    ranges: args.ranges,
                    samples: args.samples,
                    seed: args.seed,
                }
            }
        },
    };

    let result = analyze(&model, &request, &ctx.config, &control(args.timeout_secs))?;
    Ok(serde_json::to_value(result)?)
}
