use rayon::prelude::*;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

use super::solver::{minimize, Bound, OptimizationResult};
use crate::cashflow::{DevelopmentModel, MAX_HORIZON};
use crate::config::EngineConfig;
use crate::control::RunControl;
use crate::error::PreSiteError;
use crate::metrics::model_irr;
use crate::parameters::{apply_all, ModelParameter};
use crate::time_value::npv;
use crate::types::{with_metadata_f64, ComputationOutput, Money, Rate};
use crate::PreSiteResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// What to maximise. The search minimises the negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    #[default]
    MaximizeIrr,
    /// NPV at the target return.
    MaximizeNpv,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableBound {
    pub parameter: ModelParameter,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRequest {
    /// Continuous decision variables. The horizon is searched separately.
    #[serde(default)]
    pub variables: Vec<VariableBound>,
    /// Inclusive horizon range to enumerate; the base horizon when absent.
    #[serde(default)]
    pub horizon_bounds: Option<(u32, u32)>,
    #[serde(default)]
    pub objective: Objective,
    /// Start point per variable; the model's current values when absent.
    #[serde(default)]
    pub initial_guess: Option<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizedValue {
    pub parameter: ModelParameter,
    pub value: f64,
}

/// Best point found for one horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HorizonCandidate {
    pub horizon: u32,
    /// `None` when the search could not start at this horizon.
    pub search: Option<OptimizationResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectOptimum {
    pub objective: Objective,
    pub horizon: u32,
    pub values: Vec<OptimizedValue>,
    pub irr: Option<Rate>,
    pub npv: Money,
    pub target_return: Rate,
    pub meets_target: bool,
    /// Search result at the chosen horizon.
    pub result: OptimizationResult,
    pub candidates: Vec<HorizonCandidate>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn horizons(model: &DevelopmentModel, bounds: Option<(u32, u32)>) -> PreSiteResult<Vec<u32>> {
    match bounds {
        None => Ok(vec![model.inputs.horizon]),
        Some((lo, hi)) if lo >= 1 && lo <= hi && hi <= MAX_HORIZON => Ok((lo..=hi).collect()),
        Some((lo, hi)) => Err(PreSiteError::InvalidInput {
            field: "horizon_bounds".into(),
            reason: format!("[{lo}, {hi}] must satisfy 1 <= min <= max <= {MAX_HORIZON}"),
        }),
    }
}

/// Declared bounds narrowed to the parameter's valid range.
fn effective_bounds(
    model: &DevelopmentModel,
    variables: &[VariableBound],
    warnings: &mut Vec<String>,
) -> PreSiteResult<Vec<Bound>> {
    let mut bounds = Vec::with_capacity(variables.len());
    for (i, v) in variables.iter().enumerate() {
        if v.parameter == ModelParameter::Horizon {
            return Err(PreSiteError::InvalidInput {
                field: format!("variables[{i}]"),
                reason: "Use horizon_bounds to search over the horizon".into(),
            });
        }
        if variables[..i].iter().any(|w| w.parameter == v.parameter) {
            return Err(PreSiteError::InvalidInput {
                field: format!("variables[{i}]"),
                reason: format!("Parameter '{}' is listed more than once", v.parameter),
            });
        }
        if !v.min.is_finite() || !v.max.is_finite() || v.min > v.max {
            return Err(PreSiteError::InvalidInput {
                field: format!("variables[{i}]"),
                reason: "Bounds must be finite with min <= max".into(),
            });
        }
        let (lo, hi) = v.parameter.valid_range(model);
        let lo = lo.to_f64().unwrap_or(f64::MIN);
        let hi = hi.to_f64().unwrap_or(f64::MAX);
        let min = v.min.max(lo);
        let max = v.max.min(hi);
        if min > max {
            return Err(PreSiteError::InvalidInput {
                field: format!("variables[{i}]"),
                reason: format!(
                    "[{}, {}] lies outside the valid range of {}",
                    v.min, v.max, v.parameter
                ),
            });
        }
        if min != v.min || max != v.max {
            warnings.push(format!(
                "{} bounds narrowed to its valid range [{min}, {max}]",
                v.parameter
            ));
        }
        bounds.push(Bound { min, max });
    }
    Ok(bounds)
}

fn initial_guess(
    model: &DevelopmentModel,
    variables: &[VariableBound],
    requested: Option<&Vec<f64>>,
) -> PreSiteResult<Vec<f64>> {
    if let Some(guess) = requested {
        if guess.len() != variables.len() {
            return Err(PreSiteError::InvalidInput {
                field: "initial_guess".into(),
                reason: format!("Expected {} values, got {}", variables.len(), guess.len()),
            });
        }
        return Ok(guess.clone());
    }
    variables
        .iter()
        .map(|v| -> PreSiteResult<f64> {
            Ok(v.parameter.value(model)?.to_f64().unwrap_or(v.min))
        })
        .collect()
}

fn with_horizon(model: &DevelopmentModel, horizon: u32) -> DevelopmentModel {
    ModelParameter::Horizon.with_value(model, Decimal::from(horizon))
}

fn score(
    model: &DevelopmentModel,
    variables: &[VariableBound],
    x: &[f64],
    objective: Objective,
    config: &EngineConfig,
) -> f64 {
    let values: Vec<(ModelParameter, f64)> = variables
        .iter()
        .map(|v| v.parameter)
        .zip(x.iter().copied())
        .collect();
    let Ok(scenario) = apply_all(model, &values) else {
        return f64::NAN;
    };
    match objective {
        Objective::MaximizeIrr => model_irr(&scenario, &config.solver)
            .ok()
            .and_then(|r| r.to_f64())
            .map(|r| -r)
            .unwrap_or(f64::NAN),
        Objective::MaximizeNpv => {
            let scale = model.inputs.equity.to_f64().unwrap_or(1.0);
            scenario
                .build_with_land_price(scenario.land_price())
                .and_then(|s| npv(scenario.inputs.target_return, &s.flows))
                .ok()
                .and_then(|v| v.to_f64())
                .map(|v| -v / scale)
                .unwrap_or(f64::NAN)
        }
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Search the chosen parameters (and optionally the horizon) for the
/// project that maximises IRR or NPV.
///
/// Every horizon in `horizon_bounds` gets its own bounded search, run in
/// parallel, and the best one wins; ties go to the shorter horizon. The
/// underlying minimiser sees -IRR (or -NPV / equity), so a lower objective
/// is a better project. Values in the result always lie inside the
/// declared bounds. A search that does not converge still yields its best
/// point, with `result.success == false` and a warning.
pub fn optimize_project(
    model: &DevelopmentModel,
    request: &OptimizationRequest,
    config: &EngineConfig,
    control: &RunControl,
) -> PreSiteResult<ComputationOutput<ProjectOptimum>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    model.inputs.validate()?;
    config.validate()?;
    let horizons = horizons(model, request.horizon_bounds)?;
    let bounds = effective_bounds(model, &request.variables, &mut warnings)?;
    let guess = initial_guess(model, &request.variables, request.initial_guess.as_ref())?;

    let candidates: Vec<HorizonCandidate> = horizons
        .par_iter()
        .map(|&horizon| {
            let base = with_horizon(model, horizon);
            let f = |x: &[f64]| score(&base, &request.variables, x, request.objective, config);
            let search = match minimize(f, &bounds, &guess, &config.optimizer, control) {
                Ok(r) => Some(r),
                Err(e) => {
                    warn!(horizon, error = %e, "optimization could not start");
                    None
                }
            };
            HorizonCandidate { horizon, search }
        })
        .collect();

    let best = candidates
        .iter()
        .filter_map(|c| c.search.as_ref().map(|s| (c.horizon, s)))
        .filter(|(_, s)| s.objective.is_finite())
        .fold(None::<(u32, &OptimizationResult)>, |best, (h, s)| match best {
            Some((_, b)) if b.objective <= s.objective => best,
            _ => Some((h, s)),
        });

    let Some((horizon, result)) = best else {
        return Err(PreSiteError::NoIrrSolution {
            reason: "No horizon produced a finite objective from the initial guess".into(),
        });
    };
    let result = result.clone();

    if let Err(e) = result.ensure_converged() {
        warnings.push(format!("{e}; returning the best point found ({})", result.message));
    }

    let values: Vec<(ModelParameter, f64)> = request
        .variables
        .iter()
        .map(|v| v.parameter)
        .zip(result.x.iter().copied())
        .collect();
    let optimum = apply_all(&with_horizon(model, horizon), &values)?;
    let series = optimum.build_with_land_price(optimum.land_price())?;
    let target = model.inputs.target_return;
    let npv_value = npv(target, &series.flows)?;
    let irr = model_irr(&optimum, &config.solver).ok();
    let meets_target = irr.is_some_and(|r| r >= target);

    debug!(horizon, ?irr, meets_target, "project optimization finished");

    let output = ProjectOptimum {
        objective: request.objective,
        horizon,
        values: values
            .into_iter()
            .map(|(parameter, value)| OptimizedValue { parameter, value })
            .collect(),
        irr,
        npv: npv_value,
        target_return: target,
        meets_target,
        result,
        candidates,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata_f64(
        "Bounded projected-gradient search (minimises the negative objective)",
        &serde_json::json!({
            "objective": request.objective,
            "variables": request.variables,
            "horizons": horizons,
            "target_return": target,
            "max_iterations": config.optimizer.iterations(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmarks::{BenchmarkTable, UseCase};
    use crate::cashflow::InvestmentInputs;
    use rust_decimal_macros::dec;

    fn model() -> DevelopmentModel {
        let inputs =
            InvestmentInputs::new(dec!(500000), 5, dec!(0.15), UseCase::Residential).unwrap();
        DevelopmentModel::new(inputs, &BenchmarkTable::default()).unwrap()
    }

    fn request(variables: Vec<VariableBound>) -> OptimizationRequest {
        OptimizationRequest {
            variables,
            horizon_bounds: None,
            objective: Objective::MaximizeIrr,
            initial_guess: None,
        }
    }

    fn run(req: &OptimizationRequest) -> ComputationOutput<ProjectOptimum> {
        optimize_project(&model(), req, &EngineConfig::default(), &RunControl::new()).unwrap()
    }

    #[test]
    fn test_rent_pushed_to_upper_bound() {
        let out = run(&request(vec![VariableBound {
            parameter: ModelParameter::RentPerM2,
            min: 150.0,
            max: 200.0,
        }]));
        let r = &out.result;
        assert!(r.result.success, "{}", r.result.message);
        assert!((r.values[0].value - 200.0).abs() < 1e-6);
        assert!(r.meets_target);
        assert!(r.irr.unwrap() > dec!(0.179));
    }

    #[test]
    fn test_construction_cost_pushed_to_lower_bound() {
        let out = run(&request(vec![VariableBound {
            parameter: ModelParameter::ConstructionCost,
            min: 800.0,
            max: 1200.0,
        }]));
        assert!((out.result.values[0].value - 800.0).abs() < 1e-6);
    }

    #[test]
    fn test_shortest_horizon_wins_on_irr() {
        let mut req = request(Vec::new());
        req.horizon_bounds = Some((3, 10));
        let out = run(&req);
        assert_eq!(out.result.horizon, 3);
        assert_eq!(out.result.candidates.len(), 8);
    }

    #[test]
    fn test_npv_objective_prefers_more_equity() {
        let mut req = request(vec![VariableBound {
            parameter: ModelParameter::Equity,
            min: 100000.0,
            max: 1000000.0,
        }]);
        req.objective = Objective::MaximizeNpv;
        let out = run(&req);
        assert!((out.result.values[0].value - 1000000.0).abs() < 1e-3);
        assert!(out.result.npv > Decimal::ZERO);
    }

    #[test]
    fn test_horizon_variable_rejected() {
        let err = optimize_project(
            &model(),
            &request(vec![VariableBound {
                parameter: ModelParameter::Horizon,
                min: 1.0,
                max: 15.0,
            }]),
            &EngineConfig::default(),
            &RunControl::new(),
        )
        .unwrap_err();
        assert!(matches!(err, PreSiteError::InvalidInput { .. }));
    }

    #[test]
    fn test_bounds_narrowed_to_valid_range() {
        let out = run(&request(vec![VariableBound {
            parameter: ModelParameter::ExitCapRate,
            min: -0.5,
            max: 0.09,
        }]));
        let v = out.result.values[0].value;
        assert!((0.005..=0.09).contains(&v));
        assert!(out.warnings.iter().any(|w| w.contains("narrowed")));
    }

    #[test]
    fn test_result_inside_bounds_when_budget_exhausted() {
        let mut config = EngineConfig::default();
        config.optimizer.max_iterations = 1;
        let req = request(vec![
            VariableBound {
                parameter: ModelParameter::RentPerM2,
                min: 100.0,
                max: 300.0,
            },
            VariableBound {
                parameter: ModelParameter::LandShare,
                min: 0.05,
                max: 0.5,
            },
        ]);
        let out = optimize_project(&model(), &req, &config, &RunControl::new()).unwrap();
        let values = &out.result.values;
        assert!(values[0].value >= 100.0 && values[0].value <= 300.0);
        assert!(values[1].value >= 0.05 && values[1].value <= 0.5);
    }

    #[test]
    fn test_invalid_horizon_bounds_rejected() {
        let mut req = request(Vec::new());
        req.horizon_bounds = Some((0, 5));
        let err =
            optimize_project(&model(), &req, &EngineConfig::default(), &RunControl::new())
                .unwrap_err();
        assert!(matches!(err, PreSiteError::InvalidInput { .. }));
    }
}
