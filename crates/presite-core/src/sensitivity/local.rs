use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

use crate::cashflow::DevelopmentModel;
use crate::config::EngineConfig;
use crate::error::PreSiteError;
use crate::metrics::model_irr;
use crate::parameters::ModelParameter;
use crate::types::{with_metadata, ComputationOutput, Rate};
use crate::PreSiteResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Down,
    Up,
}

/// IRR after shifting one parameter in one direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalSensitivityRow {
    pub parameter: ModelParameter,
    pub direction: Direction,
    pub base_value: Decimal,
    /// Value actually used, after clamping and rounding.
    pub shifted_value: Decimal,
    pub irr: Option<Rate>,
    /// Shifted IRR minus base IRR.
    pub irr_delta: Option<Rate>,
}

/// One bar of a tornado chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TornadoEntry {
    pub parameter: ModelParameter,
    pub irr_down: Option<Rate>,
    pub irr_up: Option<Rate>,
    /// |irr_up - irr_down|; `None` when either side has no IRR.
    pub swing: Option<Rate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalSensitivityReport {
    pub base_irr: Rate,
    pub shift: Decimal,
    /// Down then up for every parameter, in request order.
    pub rows: Vec<LocalSensitivityRow>,
    /// Largest swing first.
    pub tornado: Vec<TornadoEntry>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parameters that can be read from `model`. An empty request means all of them.
fn resolve_parameters(
    model: &DevelopmentModel,
    requested: &[ModelParameter],
) -> PreSiteResult<Vec<ModelParameter>> {
    if requested.is_empty() {
        return Ok(ModelParameter::ALL
            .iter()
            .copied()
            .filter(|p| p.value(model).is_ok())
            .collect());
    }
    let mut out = Vec::with_capacity(requested.len());
    for p in requested {
        if out.contains(p) {
            return Err(PreSiteError::InvalidInput {
                field: "parameters".into(),
                reason: format!("Parameter '{p}' is listed more than once"),
            });
        }
        p.value(model)?;
        out.push(*p);
    }
    Ok(out)
}

/// Model with `parameter` moved by `shift` (relative) in `direction`.
///
/// The horizon always moves by at least one period so that both directions
/// change the project.
fn shifted_model(
    model: &DevelopmentModel,
    parameter: ModelParameter,
    base_value: Decimal,
    shift: Decimal,
    direction: Direction,
) -> DevelopmentModel {
    let factor = match direction {
        Direction::Down => Decimal::ONE - shift,
        Direction::Up => Decimal::ONE + shift,
    };
    let shifted = parameter.with_value(model, base_value * factor);
    if parameter == ModelParameter::Horizon && shifted.inputs.horizon == model.inputs.horizon {
        let step = match direction {
            Direction::Down => -Decimal::ONE,
            Direction::Up => Decimal::ONE,
        };
        return parameter.with_value(model, base_value + step);
    }
    shifted
}

fn tornado(parameters: &[ModelParameter], rows: &[LocalSensitivityRow]) -> Vec<TornadoEntry> {
    let mut entries: Vec<TornadoEntry> = parameters
        .iter()
        .map(|p| {
            let side = |d: Direction| {
                rows.iter()
                    .find(|r| r.parameter == *p && r.direction == d)
                    .and_then(|r| r.irr)
            };
            let irr_down = side(Direction::Down);
            let irr_up = side(Direction::Up);
            let swing = match (irr_down, irr_up) {
                (Some(d), Some(u)) => Some((u - d).abs()),
                _ => None,
            };
            TornadoEntry {
                parameter: *p,
                irr_down,
                irr_up,
                swing,
            }
        })
        .collect();

    // Known swings, largest first, then the unknown ones in request order.
    entries.sort_by(|a, b| match (a.swing, b.swing) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    entries
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// One-at-a-time sensitivity of IRR.
///
/// Every parameter is shifted by `shift` (default `sensitivity.shift`) down
/// and up while the others keep their base values. Shifted values are
/// clamped to the parameter's valid range. `model` is never modified.
pub fn local_sensitivity(
    model: &DevelopmentModel,
    parameters: &[ModelParameter],
    shift: Option<Decimal>,
    config: &EngineConfig,
) -> PreSiteResult<ComputationOutput<LocalSensitivityReport>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let shift = shift.unwrap_or(config.sensitivity.shift);
    if shift <= Decimal::ZERO || shift >= Decimal::ONE {
        return Err(PreSiteError::InvalidInput {
            field: "shift".into(),
            reason: "Shift must be within (0, 1)".into(),
        });
    }
    model.inputs.validate()?;
    let parameters = resolve_parameters(model, parameters)?;
    let base_irr = model_irr(model, &config.solver)?;

    let mut rows = Vec::with_capacity(parameters.len() * 2);
    for &parameter in &parameters {
        let base_value = parameter.value(model)?;
        if base_value.is_zero() {
            warnings.push(format!(
                "{parameter} is zero in the base case; a relative shift leaves it unchanged"
            ));
        }
        for direction in [Direction::Down, Direction::Up] {
            let shifted = shifted_model(model, parameter, base_value, shift, direction);
            let shifted_value = parameter.value(&shifted)?;
            let irr = match model_irr(&shifted, &config.solver) {
                Ok(r) => Some(r),
                Err(e) if e.is_recoverable() => {
                    warn!(%parameter, ?direction, error = %e, "shifted IRR unavailable");
                    warnings.push(format!("{parameter} {direction:?}: {e}"));
                    None
                }
                Err(e) => return Err(e),
            };
            rows.push(LocalSensitivityRow {
                parameter,
                direction,
                base_value,
                shifted_value,
                irr,
                irr_delta: irr.map(|r| r - base_irr),
            });
        }
    }

    let tornado = tornado(&parameters, &rows);
    debug!(
        parameters = parameters.len(),
        top = ?tornado.first().map(|t| t.parameter),
        "local sensitivity finished"
    );

    let report = LocalSensitivityReport {
        base_irr,
        shift,
        rows,
        tornado,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "One-at-a-time IRR sensitivity",
        &serde_json::json!({
            "shift": shift,
            "parameters": parameters,
            "use_case": model.inputs.use_case,
        }),
        warnings,
        elapsed,
        report,
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

    fn row(
        report: &LocalSensitivityReport,
        p: ModelParameter,
        d: Direction,
    ) -> &LocalSensitivityRow {
        report
            .rows
            .iter()
            .find(|r| r.parameter == p && r.direction == d)
            .unwrap()
    }

    #[test]
    fn test_rows_follow_request_order() {
        let params = [ModelParameter::RentPerM2, ModelParameter::ConstructionCost];
        let report = local_sensitivity(&model(), &params, None, &EngineConfig::default())
            .unwrap()
            .result;
        let order: Vec<_> = report.rows.iter().map(|r| (r.parameter, r.direction)).collect();
        assert_eq!(
            order,
            vec![
                (ModelParameter::RentPerM2, Direction::Down),
                (ModelParameter::RentPerM2, Direction::Up),
                (ModelParameter::ConstructionCost, Direction::Down),
                (ModelParameter::ConstructionCost, Direction::Up),
            ]
        );
    }

    #[test]
    fn test_rent_moves_irr_in_its_direction() {
        let report = local_sensitivity(
            &model(),
            &[ModelParameter::RentPerM2],
            None,
            &EngineConfig::default(),
        )
        .unwrap()
        .result;
        let down = row(&report, ModelParameter::RentPerM2, Direction::Down);
        let up = row(&report, ModelParameter::RentPerM2, Direction::Up);
        assert_eq!(down.shifted_value, dec!(157.5));
        assert_eq!(up.shifted_value, dec!(192.5));
        assert!(down.irr_delta.unwrap() < Decimal::ZERO);
        assert!(up.irr_delta.unwrap() > Decimal::ZERO);
    }

    #[test]
    fn test_construction_cost_moves_irr_against_it() {
        let report = local_sensitivity(
            &model(),
            &[ModelParameter::ConstructionCost],
            None,
            &EngineConfig::default(),
        )
        .unwrap()
        .result;
        assert!(row(&report, ModelParameter::ConstructionCost, Direction::Up).irr_delta.unwrap()
            < Decimal::ZERO);
    }

    #[test]
    fn test_horizon_moves_at_least_one_period() {
        let report = local_sensitivity(
            &model(),
            &[ModelParameter::Horizon],
            None,
            &EngineConfig::default(),
        )
        .unwrap()
        .result;
        assert_eq!(row(&report, ModelParameter::Horizon, Direction::Down).shifted_value, dec!(4));
        assert_eq!(row(&report, ModelParameter::Horizon, Direction::Up).shifted_value, dec!(6));
    }

    #[test]
    fn test_tornado_sorted_by_swing() {
        let report = local_sensitivity(&model(), &[], None, &EngineConfig::default())
            .unwrap()
            .result;
        let swings: Vec<Decimal> = report.tornado.iter().filter_map(|t| t.swing).collect();
        assert!(swings.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(report.tornado.len(), ModelParameter::ALL.len());
    }

    #[test]
    fn test_zero_base_value_warns() {
        let out = local_sensitivity(
            &model(),
            &[ModelParameter::IncomeGrowth],
            None,
            &EngineConfig::default(),
        )
        .unwrap();
        assert!(out.warnings.iter().any(|w| w.contains("income_growth")));
        assert_eq!(out.result.rows[0].irr_delta, Some(Decimal::ZERO));
    }

    #[test]
    fn test_base_model_unchanged() {
        let m = model();
        let before = m.clone();
        local_sensitivity(&m, &[], Some(dec!(0.25)), &EngineConfig::default()).unwrap();
        assert_eq!(m, before);
    }

    #[test]
    fn test_invalid_shift_rejected() {
        let err = local_sensitivity(&model(), &[], Some(dec!(1.5)), &EngineConfig::default())
            .unwrap_err();
        assert!(matches!(err, PreSiteError::InvalidInput { .. }));
    }

    #[test]
    fn test_duplicate_parameter_rejected() {
        let err = local_sensitivity(
            &model(),
            &[ModelParameter::Equity, ModelParameter::Equity],
            None,
            &EngineConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PreSiteError::InvalidInput { .. }));
    }
}
