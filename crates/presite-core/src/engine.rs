//! Request-level orchestration: evaluate one project, then run any
//! requested analyses side by side.

use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;

use crate::benchmarks::{BenchmarkTable, CostAssumptions, UseCaseBenchmark};
use crate::cashflow::{CashFlowSeries, DevelopmentModel, InvestmentInputs};
use crate::config::EngineConfig;
use crate::decision::{decide, Recommendation};
use crate::error::PreSiteError;
use crate::metrics::{compute_for_model, MetricsResult};
use crate::types::{with_metadata, ComputationOutput, Rate};
use crate::PreSiteResult;

#[cfg(all(feature = "sensitivity", feature = "optimization"))]
use crate::control::RunControl;
#[cfg(all(feature = "sensitivity", feature = "optimization"))]
use crate::monte_carlo::{simulate, SimulationBatch, UncertainParameter};
#[cfg(all(feature = "sensitivity", feature = "optimization"))]
use crate::optimization::{optimize_project, OptimizationRequest, ProjectOptimum};
#[cfg(all(feature = "sensitivity", feature = "optimization"))]
use crate::sensitivity::{analyze, SensitivityReport, SensitivityRequest};

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    #[serde(flatten)]
    pub inputs: InvestmentInputs,
    /// Replaces the benchmark cost assumptions for this request only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_overrides: Option<CostAssumptions>,
}

impl From<InvestmentInputs> for EvaluationRequest {
    fn from(inputs: InvestmentInputs) -> Self {
        Self {
            inputs,
            cost_overrides: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub inputs: InvestmentInputs,
    pub benchmark: UseCaseBenchmark,
    pub cash_flows: CashFlowSeries,
    pub metrics: MetricsResult,
    pub recommendation: Recommendation,
    /// IRR minus the use case's reference IRR.
    pub irr_vs_reference: Option<Rate>,
}

/// Validated model for `request`: inputs, looked-up benchmark and any cost
/// overrides.
pub fn model_for(
    request: &EvaluationRequest,
    table: &BenchmarkTable,
) -> PreSiteResult<DevelopmentModel> {
    let mut model = DevelopmentModel::new(request.inputs.clone(), table)?;
    if let Some(costs) = &request.cost_overrides {
        model = model.with_costs(costs.clone());
        model
            .benchmark
            .validate()
            .map_err(|reason| PreSiteError::InvalidInput {
                field: "cost_overrides".into(),
                reason,
            })?;
    }
    Ok(model)
}

/// Build the cash flows, compute the metrics and decide Go / No-Go.
///
/// Invalid inputs fail the request. A metric that cannot be solved is
/// reported as unavailable and surfaces as a warning.
pub fn evaluate(
    request: &EvaluationRequest,
    table: &BenchmarkTable,
    config: &EngineConfig,
) -> PreSiteResult<ComputationOutput<EvaluationReport>> {
    let start = Instant::now();
    table.validate()?;
    config.validate()?;

    let model = model_for(request, table)?;
    let cash_flows = model.build()?;
    let metrics = compute_for_model(&model, config)?;
    let warnings = metrics.warnings;
    let metrics = metrics.result;

    let target = model.inputs.target_return;
    let recommendation = decide(&metrics, target, &config.decision);
    let irr_vs_reference = metrics.irr.map(|irr| irr - model.benchmark.reference_irr);

    info!(
        use_case = %model.inputs.use_case,
        equity = %model.inputs.equity,
        horizon = model.inputs.horizon,
        irr = ?metrics.irr,
        %recommendation,
        "evaluation complete"
    );

    let report = EvaluationReport {
        inputs: model.inputs.clone(),
        benchmark: model.benchmark.clone(),
        cash_flows,
        metrics,
        recommendation,
        irr_vs_reference,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Pre-development DCF evaluation with Go/No-Go rule",
        &serde_json::json!({
            "use_case": model.inputs.use_case,
            "target_return": target,
            "decision_margin": config.decision.margin,
            "reference_irr": model.benchmark.reference_irr,
            "cost_overrides": request.cost_overrides.is_some(),
        }),
        warnings,
        elapsed,
        report,
    ))
}

// ---------------------------------------------------------------------------
// Downstream analyses
// ---------------------------------------------------------------------------

#[cfg(all(feature = "sensitivity", feature = "optimization"))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRequest {
    pub distributions: Vec<UncertainParameter>,
    pub trials: u32,
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Analyses to run on one evaluated project. Absent entries are skipped.
#[cfg(all(feature = "sensitivity", feature = "optimization"))]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    #[serde(default)]
    pub sensitivity: Option<SensitivityRequest>,
    #[serde(default)]
    pub simulation: Option<SimulationRequest>,
    #[serde(default)]
    pub optimization: Option<OptimizationRequest>,
}

/// Each analysis succeeds or fails on its own.
#[cfg(all(feature = "sensitivity", feature = "optimization"))]
#[derive(Debug)]
pub struct AnalysisResults {
    pub sensitivity: Option<PreSiteResult<ComputationOutput<SensitivityReport>>>,
    pub simulation: Option<PreSiteResult<ComputationOutput<SimulationBatch>>>,
    pub optimization: Option<PreSiteResult<ComputationOutput<ProjectOptimum>>>,
}

/// Run the requested analyses concurrently.
///
/// Every analysis gets its own copy of `model`; none can observe another.
#[cfg(all(feature = "sensitivity", feature = "optimization"))]
pub fn run_analyses(
    model: &DevelopmentModel,
    request: &AnalysisRequest,
    config: &EngineConfig,
    control: &RunControl,
) -> AnalysisResults {
    let sensitivity_model = model.clone();
    let simulation_model = model.clone();
    let optimization_model = model.clone();

    let (sensitivity, (simulation, optimization)) = rayon::join(
        || {
            request
                .sensitivity
                .as_ref()
                .map(|r| analyze(&sensitivity_model, r, config, control))
        },
        || {
            rayon::join(
                || {
                    request.simulation.as_ref().map(|r| {
                        simulate(
                            &simulation_model,
                            &r.distributions,
                            r.trials,
                            r.seed,
                            config,
                            control,
                        )
                    })
                },
                || {
                    request
                        .optimization
                        .as_ref()
                        .map(|r| optimize_project(&optimization_model, r, config, control))
                },
            )
        },
    );

    AnalysisResults {
        sensitivity,
        simulation,
        optimization,
    }
}
