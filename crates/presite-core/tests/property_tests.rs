use presite_core::benchmarks::{BenchmarkTable, UseCase};
use presite_core::cashflow::{DevelopmentModel, InvestmentInputs};
use presite_core::config::{DecisionConfig, EngineConfig, SolverSettings};
use presite_core::decision::{decide, decide_values, Recommendation};
use presite_core::engine::evaluate;
use presite_core::metrics::compute_for_model;
use presite_core::parameters::ModelParameter;
use presite_core::time_value::{irr, mirr, npv};
use proptest::prelude::*;
use rust_decimal::Decimal;

fn arb_use_case() -> impl Strategy<Value = UseCase> {
    prop_oneof![
        Just(UseCase::Residential),
        Just(UseCase::Hospitality),
        Just(UseCase::MixedUse),
    ]
}

fn model(equity: u64, horizon: u32, use_case: UseCase) -> DevelopmentModel {
    let inputs =
        InvestmentInputs::new(Decimal::from(equity), horizon, Decimal::new(15, 2), use_case)
            .unwrap();
    DevelopmentModel::new(inputs, &BenchmarkTable::default()).unwrap()
}

/// Rate in [0, 0.5] with four decimal places.
fn arb_rate() -> impl Strategy<Value = Decimal> {
    (0i64..=5000).prop_map(|bp| Decimal::new(bp, 4))
}

// ── Cash-flow shape ──────────────────────────────────────────────────────

proptest! {
    #[test]
    fn series_has_horizon_plus_one_entries(
        equity in 100_000u64..50_000_000,
        horizon in 1u32..=60,
        use_case in arb_use_case(),
    ) {
        let series = model(equity, horizon, use_case).build().unwrap();
        prop_assert_eq!(series.flows.len(), horizon as usize + 1);
        prop_assert!(series.flows[0] <= Decimal::ZERO);
        prop_assert_eq!(series.horizon(), horizon);
    }
}

// ── IRR round trip ───────────────────────────────────────────────────────

proptest! {
    #[test]
    fn npv_at_irr_is_zero(
        equity in 100_000u64..10_000_000,
        horizon in 1u32..=30,
        use_case in arb_use_case(),
    ) {
        let series = model(equity, horizon, use_case).build().unwrap();
        if let Ok(rate) = irr(&series.flows, &SolverSettings::default()) {
            let residual = npv(rate, &series.flows).unwrap();
            let relative = residual.abs() / Decimal::from(equity);
            prop_assert!(relative < Decimal::new(1, 6), "NPV at IRR {} = {}", rate, residual);
        }
    }
}

// ── MIRR bounds ──────────────────────────────────────────────────────────

proptest! {
    /// With a single outlay the MIRR sits between the reinvestment rate
    /// and the IRR.
    #[test]
    fn mirr_between_reinvestment_rate_and_irr(
        equity in 100_000u64..10_000_000,
        horizon in 2u32..=20,
        use_case in arb_use_case(),
        rate in arb_rate(),
    ) {
        let series = model(equity, horizon, use_case).build().unwrap();
        let Ok(project_irr) = irr(&series.flows, &SolverSettings::default()) else {
            return Ok(());
        };
        let m = mirr(&series.flows, rate, rate).unwrap();
        let eps = Decimal::new(1, 4);
        let lo = rate.min(project_irr) - eps;
        let hi = rate.max(project_irr) + eps;
        prop_assert!(m >= lo && m <= hi, "mirr={} rate={} irr={}", m, rate, project_irr);
    }
}

// ── Go / No-Go monotonicity ─────────────────────────────────────────────

proptest! {
    #[test]
    fn higher_irr_never_turns_go_into_no_go(
        target in arb_rate(),
        irr_low in arb_rate(),
        bump in 0i64..=5000,
        cap in 0u64..1_000_000,
    ) {
        let config = DecisionConfig::default();
        let cap = Some(Decimal::from(cap));
        let irr_high = irr_low + Decimal::new(bump, 4);
        let before = decide_values(Some(irr_low), cap, target, &config);
        let after = decide_values(Some(irr_high), cap, target, &config);
        if before == Recommendation::Go {
            prop_assert_eq!(after, Recommendation::Go);
        }
        if irr_high >= target {
            prop_assert_eq!(after, Recommendation::Go);
        }
    }
}

// ── Parameter range limits ───────────────────────────────────────────────

/// Build and evaluate `model`; either outcome is fine, a panic is not.
fn build_and_decide(model: &DevelopmentModel) -> Result<(), TestCaseError> {
    let config = EngineConfig::default();
    match model.build() {
        Ok(series) => prop_assert_eq!(series.flows.len(), model.inputs.horizon as usize + 1),
        Err(e) => prop_assert!(!e.to_string().is_empty()),
    }
    if let Ok(out) = compute_for_model(model, &config) {
        let target = model.inputs.target_return;
        let recommendation = decide(&out.result, target, &config.decision);
        if out.result.irr.is_none() || out.result.cap_on_land.is_none() {
            prop_assert_eq!(recommendation, Recommendation::Indeterminate);
        }
    }
    Ok(())
}

/// Lower end, midpoint or upper end of a parameter's valid range.
fn at_position(model: &DevelopmentModel, parameter: ModelParameter, position: u8) -> DevelopmentModel {
    let (lo, hi) = parameter.valid_range(model);
    let value = match position {
        0 => lo,
        1 => (lo + hi) / Decimal::TWO,
        _ => hi,
    };
    parameter.with_value(model, value)
}

#[test]
fn every_parameter_limit_builds_or_errors() {
    for use_case in [UseCase::Residential, UseCase::Hospitality, UseCase::MixedUse] {
        for target in [Decimal::ZERO, Decimal::TWO] {
            let inputs =
                InvestmentInputs::new(Decimal::from(500_000), 60, target, use_case).unwrap();
            let base = DevelopmentModel::new(inputs, &BenchmarkTable::default()).unwrap();
            for parameter in ModelParameter::ALL {
                for position in [0, 2] {
                    build_and_decide(&at_position(&base, parameter, position)).unwrap();
                }
            }
            let all_high = ModelParameter::ALL
                .iter()
                .fold(base.clone(), |m, p| at_position(&m, *p, 2));
            build_and_decide(&all_high).unwrap();
        }
    }
}

#[test]
fn evaluate_at_input_limits_never_panics() {
    let table = BenchmarkTable::default();
    let config = EngineConfig::default();
    for use_case in [UseCase::Residential, UseCase::Hospitality, UseCase::MixedUse] {
        for equity in [Decimal::ONE, Decimal::from(1_000_000_000_000u64)] {
            for horizon in [1, 60] {
                for target in [Decimal::ZERO, Decimal::TWO] {
                    let inputs = InvestmentInputs::new(equity, horizon, target, use_case).unwrap();
                    if let Ok(out) = evaluate(&inputs.into(), &table, &config) {
                        assert_eq!(out.result.cash_flows.flows.len(), horizon as usize + 1);
                    }
                }
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn any_mix_of_range_limits_builds_or_errors(
        use_case in arb_use_case(),
        positions in prop::collection::vec(0u8..3, ModelParameter::ALL.len()),
        target in (0i64..=200).prop_map(|pct| Decimal::new(pct, 2)),
    ) {
        let inputs = InvestmentInputs::new(Decimal::from(500_000), 30, target, use_case).unwrap();
        let base = DevelopmentModel::new(inputs, &BenchmarkTable::default()).unwrap();
        let model = ModelParameter::ALL
            .iter()
            .zip(&positions)
            .fold(base, |m, (p, pos)| at_position(&m, *p, *pos));
        build_and_decide(&model)?;
    }
}

#[cfg(feature = "optimization")]
mod optimizer_bounds {
    use presite_core::config::OptimizerSettings;
    use presite_core::control::RunControl;
    use presite_core::optimization::{minimize, Bound};
    use proptest::prelude::*;

    fn arb_bound() -> impl Strategy<Value = Bound> {
        (-100.0f64..100.0, 0.0f64..50.0).prop_map(|(min, width)| Bound {
            min,
            max: min + width,
        })
    }

    proptest! {
        #[test]
        fn result_within_bounds_even_without_convergence(
            bounds in prop::collection::vec(arb_bound(), 1..4),
            centre in -300.0f64..300.0,
            iterations in 1u32..20,
        ) {
            let guess: Vec<f64> = bounds.iter().map(|b| b.min).collect();
            let settings = OptimizerSettings {
                max_iterations: iterations,
                ..OptimizerSettings::default()
            };
            let objective = |x: &[f64]| {
                x.iter()
                    .enumerate()
                    .map(|(i, xi)| (i as f64 + 1.0) * (xi - centre).powi(2) + (3.0 * xi).sin())
                    .sum::<f64>()
            };
            let result = minimize(objective, &bounds, &guess, &settings, &RunControl::new()).unwrap();
            for (xi, b) in result.x.iter().zip(&bounds) {
                prop_assert!(*xi >= b.min && *xi <= b.max, "{} outside [{}, {}]", xi, b.min, b.max);
            }
        }
    }
}
