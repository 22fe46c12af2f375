use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

use crate::cashflow::{CashFlowSeries, DevelopmentModel};
use crate::config::{EngineConfig, SolverSettings};
use crate::error::overflow;
use crate::time_value::{bisect, irr, mirr, npv};
use crate::types::{with_metadata, ComputationOutput, Money, Multiple, Rate};
use crate::PreSiteResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Metric that could not be computed, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnavailableMetric {
    pub metric: String,
    pub reason: String,
}

/// Investment metrics of one cash-flow series at one discount rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsResult {
    pub irr: Option<Rate>,
    /// NPV at `discount_rate`.
    pub npv: Money,
    pub mirr: Option<Rate>,
    /// Year-1 NOI over annual debt service.
    pub dscr: Option<Decimal>,
    /// Highest land price at which the project still meets the discount rate.
    pub cap_on_land: Option<Money>,
    /// First operating year NOI over equity invested.
    pub cash_on_cash: Option<Rate>,
    pub discount_rate: Rate,
    pub noi_year1: Money,
    pub total_distributions: Money,
    pub equity_multiple: Option<Multiple>,
    /// Fields left `None`, with the reason.
    pub unavailable: Vec<UnavailableMetric>,
}

impl MetricsResult {
    fn mark_unavailable(&mut self, metric: &str, reason: String) {
        self.unavailable.push(UnavailableMetric {
            metric: metric.into(),
            reason,
        });
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Reduce a cash-flow series to IRR, NPV, MIRR, DSCR and cash-on-cash.
///
/// Numeric failures (no IRR, degenerate MIRR, no debt) leave the field
/// `None` and are listed in `unavailable`; only an NPV or a distribution
/// total that cannot be evaluated is an error. `cap_on_land` needs the full development model and
/// is always `None` here; see [`compute_for_model`].
pub fn compute(
    series: &CashFlowSeries,
    discount_rate: Rate,
    config: &EngineConfig,
) -> PreSiteResult<MetricsResult> {
    let flows = &series.flows;
    let npv_value = npv(discount_rate, flows)?;
    let equity = series.initial_outlay();
    let noi_year1 = series.stabilized_noi().unwrap_or(Decimal::ZERO);
    let total_distributions = series
        .total_distributions()
        .ok_or_else(|| overflow("total distributions"))?;

    let mut result = MetricsResult {
        irr: None,
        npv: npv_value,
        mirr: None,
        dscr: None,
        cap_on_land: None,
        cash_on_cash: None,
        discount_rate,
        noi_year1,
        total_distributions,
        equity_multiple: None,
        unavailable: Vec::new(),
    };

    match irr(flows, &config.solver) {
        Ok(r) => result.irr = Some(r),
        Err(e) => {
            warn!(error = %e, "IRR unavailable");
            result.mark_unavailable("irr", e.to_string());
        }
    }

    let finance_rate = config.metrics.finance_rate.unwrap_or(discount_rate);
    let reinvestment_rate = config.metrics.reinvestment_rate.unwrap_or(discount_rate);
    match mirr(flows, finance_rate, reinvestment_rate) {
        Ok(m) => result.mirr = Some(m),
        Err(e) => result.mark_unavailable("mirr", e.to_string()),
    }

    match series.annual_debt_service {
        Some(ds) if ds > Decimal::ZERO => match noi_year1.checked_div(ds) {
            Some(dscr) => result.dscr = Some(dscr),
            None => result.mark_unavailable("dscr", overflow("DSCR").to_string()),
        },
        _ => result.mark_unavailable("dscr", "debt is not modeled".into()),
    }

    if equity > Decimal::ZERO {
        result.cash_on_cash = noi_year1.checked_div(equity);
        result.equity_multiple = total_distributions.checked_div(equity);
        if result.cash_on_cash.is_none() {
            result.mark_unavailable("cash_on_cash", overflow("cash-on-cash").to_string());
        }
        if result.equity_multiple.is_none() {
            result.mark_unavailable("equity_multiple", overflow("equity multiple").to_string());
        }
    } else {
        result.mark_unavailable("cash_on_cash", "no equity invested".into());
        result.mark_unavailable("equity_multiple", "no equity invested".into());
    }

    Ok(result)
}

/// Highest land price at which the project still earns `target_return`.
///
/// Bisection on the land price over `[-equity, equity - reserve]` of the NPV
/// at the target rate. The builder's flows change sign once, so NPV at the
/// target is zero exactly where the IRR equals the target. A negative cap
/// means the project misses the target even if the land were paid for.
pub fn cap_on_land(
    model: &DevelopmentModel,
    target_return: Rate,
    settings: &SolverSettings,
) -> PreSiteResult<Money> {
    let equity = model.inputs.equity;
    let lower = -equity;
    let upper = equity - model.reserve();

    bisect(
        |land| {
            let series = model.build_with_land_price(land)?;
            npv(target_return, &series.flows)
        },
        lower,
        upper,
        settings,
        equity,
        "cap_on_land",
    )
}

/// Build the model's base case and compute every metric, land cap included.
///
/// The discount rate for NPV and the land-cap solve is the investor's target
/// return.
pub fn compute_for_model(
    model: &DevelopmentModel,
    config: &EngineConfig,
) -> PreSiteResult<ComputationOutput<MetricsResult>> {
    let start = Instant::now();
    let target = model.inputs.target_return;

    let series = model.build()?;
    let mut result = compute(&series, target, config)?;

    match cap_on_land(model, target, &config.solver) {
        Ok(cap) => result.cap_on_land = Some(cap),
        Err(e) => {
            warn!(error = %e, "cap on land unavailable");
            result.mark_unavailable("cap_on_land", e.to_string());
        }
    }

    debug!(
        irr = ?result.irr,
        npv = %result.npv,
        cap_on_land = ?result.cap_on_land,
        "metrics computed"
    );

    let warnings = result
        .unavailable
        .iter()
        .filter(|u| u.metric != "dscr")
        .map(|u| format!("{} unavailable: {}", u.metric, u.reason))
        .collect();

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Discounted cash-flow metrics (IRR, NPV, MIRR, DSCR, residual land value)",
        &serde_json::json!({
            "discount_rate": target,
            "finance_rate": config.metrics.finance_rate.unwrap_or(target),
            "reinvestment_rate": config.metrics.reinvestment_rate.unwrap_or(target),
            "land_price": series.land_price,
            "solver_tolerance": config.solver.tolerance,
        }),
        warnings,
        elapsed,
        result,
    ))
}

/// IRR of a perturbed model.
///
/// Unlike [`DevelopmentModel::build`] this accepts a land price above the
/// equity left after the reserve; the builder turns it into a project with
/// no income.
pub fn model_irr(model: &DevelopmentModel, settings: &SolverSettings) -> PreSiteResult<Rate> {
    let series = model.build_with_land_price(model.land_price())?;
    irr(&series.flows, settings)
}
