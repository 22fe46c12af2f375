pub mod analyze;
pub mod benchmarks;
pub mod evaluate;
pub mod optimize;
pub mod sensitivity;
pub mod simulate;

use clap::Args;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use presite_core::engine::{AnalysisRequest, EvaluationRequest};
use presite_core::monte_carlo::{Distribution, UncertainParameter};
use presite_core::optimization::VariableBound;
use presite_core::sensitivity::ParameterRange;
use presite_core::{BenchmarkTable, EngineConfig, InvestmentInputs, ModelParameter, RunControl, UseCase};

use crate::input;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

// ---------------------------------------------------------------------------
// Shared context
// ---------------------------------------------------------------------------

/// Configuration and benchmarks every command runs against.
pub struct Context {
    pub config: EngineConfig,
    pub table: BenchmarkTable,
}

impl Context {
    pub fn load(config: Option<&str>, benchmarks: Option<&str>) -> CliResult<Self> {
        let config: EngineConfig = match config {
            Some(path) => input::file::read_document(path)?,
            None => EngineConfig::default(),
        };
        let table: BenchmarkTable = match benchmarks {
            Some(path) => input::file::read_document(path)?,
            None => BenchmarkTable::default(),
        };
        config.validate()?;
        table.validate()?;
        Ok(Self { config, table })
    }
}

// ---------------------------------------------------------------------------
// Project inputs
// ---------------------------------------------------------------------------

/// Project flags shared by every command that evaluates a model.
#[derive(Args)]
pub struct ProjectArgs {
    /// Equity available, land included (e.g. 500000)
    #[arg(long)]
    pub equity: Option<Decimal>,

    /// Holding period in years
    #[arg(long)]
    pub horizon: Option<u32>,

    /// Target return (e.g. 0.15 for 15%)
    #[arg(long)]
    pub target_return: Option<Decimal>,

    /// Residential, Hospitality or MixedUse
    #[arg(long)]
    pub use_case: Option<String>,

    /// Agreed land price; defaults to the benchmark land share of equity
    #[arg(long)]
    pub land_price: Option<Decimal>,

    /// Path to a JSON or YAML input document (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,
}

impl ProjectArgs {
    fn request_from_flags(&self) -> CliResult<EvaluationRequest> {
        let use_case: UseCase = self
            .use_case
            .as_deref()
            .ok_or("--use-case is required (or provide --input)")?
            .parse()?;
        let inputs = InvestmentInputs {
            equity: self
                .equity
                .ok_or("--equity is required (or provide --input)")?,
            horizon: self
                .horizon
                .ok_or("--horizon is required (or provide --input)")?,
            target_return: self
                .target_return
                .ok_or("--target-return is required (or provide --input)")?,
            use_case,
            land_price: self.land_price,
        };
        inputs.validate()?;
        Ok(inputs.into())
    }

    /// Input document from `--input` or piped stdin, if any.
    fn document(&self) -> CliResult<Option<Value>> {
        if let Some(ref path) = self.input {
            return Ok(Some(input::file::read_document(path)?));
        }
        input::stdin::read_stdin()
    }
}

/// Run control for `--timeout-secs`; unbounded when absent.
pub fn control(timeout_secs: Option<u64>) -> RunControl {
    match timeout_secs {
        Some(secs) => RunControl::with_timeout(Duration::from_secs(secs)),
        None => RunControl::new(),
    }
}

/// Project plus any analyses, as read from an input document.
///
/// ```json
/// { "project": { "equity": "500000", "horizon": 5, ... },
///   "simulation": { "distributions": [...], "trials": 1000 } }
/// ```
#[derive(Debug, Deserialize)]
pub struct AnalysisDocument {
    pub project: EvaluationRequest,
    #[serde(flatten)]
    pub analyses: AnalysisRequest,
}

/// A document with a `project` key, or a bare project. Analyses come from
/// the document when it has them, otherwise they stay empty for the caller
/// to fill from flags.
pub fn load_analysis(project: &ProjectArgs) -> CliResult<AnalysisDocument> {
    match project.document()? {
        Some(value) if value.get("project").is_some() => Ok(serde_json::from_value(value)?),
        Some(value) => Ok(AnalysisDocument {
            project: serde_json::from_value(value)?,
            analyses: AnalysisRequest::default(),
        }),
        None => Ok(AnalysisDocument {
            project: project.request_from_flags()?,
            analyses: AnalysisRequest::default(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Flag parsers
// ---------------------------------------------------------------------------

fn split_parameter(s: &str, sep: char) -> Result<(ModelParameter, &str), String> {
    let (name, rest) = s
        .split_once(sep)
        .ok_or_else(|| format!("expected '<parameter>{sep}...', got '{s}'"))?;
    let parameter = name.parse::<ModelParameter>().map_err(|e| e.to_string())?;
    Ok((parameter, rest))
}

fn parse_numbers(s: &str, sep: char, expected: usize) -> Result<Vec<f64>, String> {
    let values = s
        .split(sep)
        .map(|v| {
            v.trim()
                .parse::<f64>()
                .map_err(|e| format!("invalid number '{v}': {e}"))
        })
        .collect::<Result<Vec<_>, _>>()?;
    if values.len() != expected {
        return Err(format!("expected {expected} numbers, got {}", values.len()));
    }
    Ok(values)
}

/// `exit_cap_rate:0.06:0.09`
pub fn parse_range(s: &str) -> Result<ParameterRange, String> {
    let (parameter, rest) = split_parameter(s, ':')?;
    let v = parse_numbers(rest, ':', 2)?;
    Ok(ParameterRange {
        parameter,
        min: v[0],
        max: v[1],
    })
}

/// `rent_per_m2:150:190`
pub fn parse_variable(s: &str) -> Result<VariableBound, String> {
    let (parameter, rest) = split_parameter(s, ':')?;
    let v = parse_numbers(rest, ':', 2)?;
    Ok(VariableBound {
        parameter,
        min: v[0],
        max: v[1],
    })
}

/// `rent_per_m2=triangular:150,175,195`, `exit_cap_rate=normal:0.07,0.005`,
/// `construction_cost=uniform:900,1100`, `rent_per_m2=lognormal:5.16,0.1`
pub fn parse_distribution(s: &str) -> Result<UncertainParameter, String> {
    let (parameter, rest) = split_parameter(s, '=')?;
    let (kind, args) = rest
        .split_once(':')
        .ok_or_else(|| format!("expected '<kind>:<args>', got '{rest}'"))?;
    let distribution = match kind.trim().to_ascii_lowercase().as_str() {
        "normal" => {
            let v = parse_numbers(args, ',', 2)?;
            Distribution::Normal {
                mean: v[0],
                std_dev: v[1],
            }
        }
        "lognormal" => {
            let v = parse_numbers(args, ',', 2)?;
            Distribution::LogNormal {
                mu: v[0],
                sigma: v[1],
            }
        }
        "triangular" => {
            let v = parse_numbers(args, ',', 3)?;
            Distribution::Triangular {
                min: v[0],
                mode: v[1],
                max: v[2],
            }
        }
        "uniform" => {
            let v = parse_numbers(args, ',', 2)?;
            Distribution::Uniform {
                min: v[0],
                max: v[1],
            }
        }
        other => return Err(format!("unknown distribution '{other}'")),
    };
    Ok(UncertainParameter {
        parameter,
        distribution,
    })
}
