use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::benchmarks::{BenchmarkTable, CostAssumptions, UseCase, UseCaseBenchmark};
use crate::error::{overflow, PreSiteError};
use crate::types::{Money, Rate};
use crate::PreSiteResult;

/// Longest projection the builder accepts, in periods.
pub const MAX_HORIZON: u32 = 60;

/// Highest target return accepted as sane input.
pub const MAX_TARGET_RETURN: Rate = dec!(2);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The investor's request.
///
/// Fields are public so requests can be read from documents and perturbed by
/// the analyses. [`DevelopmentModel::new`] and [`DevelopmentModel::build`]
/// run [`validate`](Self::validate) again, so a value built as a struct
/// literal is checked before any cash flow is projected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestmentInputs {
    /// Equity available for the whole project, land included.
    pub equity: Money,
    /// Projection length in years.
    pub horizon: u32,
    /// Required return (0.15 = 15%).
    pub target_return: Rate,
    pub use_case: UseCase,
    /// Land price already agreed; defaults to the benchmark land share of equity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub land_price: Option<Money>,
}

impl InvestmentInputs {
    pub fn new(
        equity: Money,
        horizon: u32,
        target_return: Rate,
        use_case: UseCase,
    ) -> PreSiteResult<Self> {
        let inputs = Self {
            equity,
            horizon,
            target_return,
            use_case,
            land_price: None,
        };
        inputs.validate()?;
        Ok(inputs)
    }

    pub fn validate(&self) -> PreSiteResult<()> {
        validate_equity(self.equity)?;
        validate_horizon(self.horizon)?;
        if self.target_return < Decimal::ZERO || self.target_return > MAX_TARGET_RETURN {
            return Err(PreSiteError::InvalidTargetReturn(self.target_return));
        }
        if matches!(self.land_price, Some(l) if l < Decimal::ZERO) {
            return Err(PreSiteError::InvalidInput {
                field: "land_price".into(),
                reason: "Land price cannot be negative".into(),
            });
        }
        Ok(())
    }
}

fn validate_equity(equity: Money) -> PreSiteResult<()> {
    if equity <= Decimal::ZERO {
        return Err(PreSiteError::InvalidEquity(equity));
    }
    Ok(())
}

fn validate_horizon(horizon: u32) -> PreSiteResult<()> {
    if horizon < 1 || horizon > MAX_HORIZON {
        return Err(PreSiteError::InvalidHorizon {
            horizon,
            max: MAX_HORIZON,
        });
    }
    Ok(())
}

/// Periodic cash flows of one project configuration.
///
/// `flows[0]` is the equity outlay (never positive), `flows[1..horizon]`
/// are net operating income and `flows[horizon]` adds the disposal value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashFlowSeries {
    pub flows: Vec<Money>,
    /// NOI for periods 1..=horizon.
    pub net_operating_income: Vec<Money>,
    pub disposal_value: Money,
    pub land_price: Money,
    /// Capital left for construction after land, reserve and fixed costs.
    pub construction_budget: Money,
    pub floor_area_m2: Decimal,
    /// Annual debt service when the benchmark models debt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annual_debt_service: Option<Money>,
}

impl CashFlowSeries {
    pub fn horizon(&self) -> u32 {
        (self.flows.len().saturating_sub(1)) as u32
    }

    pub fn initial_outlay(&self) -> Money {
        self.flows.first().map(|f| -*f).unwrap_or(Decimal::ZERO)
    }

    /// NOI of the first operating period.
    pub fn stabilized_noi(&self) -> Option<Money> {
        self.net_operating_income.first().copied()
    }

    /// Sum of the positive flows; `None` when it does not fit in a Decimal.
    pub fn total_distributions(&self) -> Option<Money> {
        self.flows
            .iter()
            .filter(|f| **f > Decimal::ZERO)
            .try_fold(Decimal::ZERO, |acc, f| acc.checked_add(*f))
    }
}

// ---------------------------------------------------------------------------
// Development model
// ---------------------------------------------------------------------------

/// Investor inputs paired with the benchmark assumptions for their use case.
///
/// Owns its copy of the assumptions, so analyses can perturb one model
/// without touching another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DevelopmentModel {
    pub inputs: InvestmentInputs,
    pub benchmark: UseCaseBenchmark,
}

impl DevelopmentModel {
    pub fn new(inputs: InvestmentInputs, table: &BenchmarkTable) -> PreSiteResult<Self> {
        inputs.validate()?;
        let benchmark = table.benchmark(inputs.use_case)?.clone();
        Ok(Self { inputs, benchmark })
    }

    /// Replace the looked-up cost assumptions with caller overrides.
    pub fn with_costs(mut self, costs: CostAssumptions) -> Self {
        self.benchmark.costs = costs;
        self
    }

    pub fn reserve(&self) -> Money {
        self.inputs.equity * self.benchmark.reserve_pct
    }

    /// Land price used by the base case.
    pub fn land_price(&self) -> Money {
        self.inputs
            .land_price
            .unwrap_or(self.inputs.equity * self.benchmark.land_share)
    }

    pub fn build(&self) -> PreSiteResult<CashFlowSeries> {
        self.inputs.validate()?;
        let land = self.land_price();
        if land > self.inputs.equity - self.reserve() {
            return Err(PreSiteError::InvalidInput {
                field: "land_price".into(),
                reason: "Land price exceeds the equity left after the reserve".into(),
            });
        }
        build(&self.inputs, &self.benchmark, land)
    }

    /// Same project with a different land price; used by the land-cap solve.
    pub fn build_with_land_price(&self, land_price: Money) -> PreSiteResult<CashFlowSeries> {
        build(&self.inputs, &self.benchmark, land_price)
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Project the periodic cash flows of a development.
///
/// Equity funds land, the reserve, fixed costs and construction; what is
/// left for construction buys floor area at the benchmark cost per m².
/// Floor area earns rent, marketing and other costs are taken as fractions
/// of revenue, and the final period adds a disposal value (final NOI
/// capitalised at the exit cap rate, or an equity multiple when no cap rate
/// is set) plus the released reserve. A land price so high that nothing is
/// left for construction yields a project with no income rather than an
/// error.
pub fn build(
    inputs: &InvestmentInputs,
    benchmark: &UseCaseBenchmark,
    land_price: Money,
) -> PreSiteResult<CashFlowSeries> {
    validate_equity(inputs.equity)?;
    validate_horizon(inputs.horizon)?;

    let costs = &benchmark.costs;
    if costs.construction_cost_per_m2 <= Decimal::ZERO {
        return Err(PreSiteError::InvalidInput {
            field: "construction_cost_per_m2".into(),
            reason: "Construction cost must be positive".into(),
        });
    }

    let equity = inputs.equity;
    let reserve = equity
        .checked_mul(benchmark.reserve_pct)
        .ok_or_else(|| overflow("reserve"))?;
    let construction_budget = equity
        .checked_sub(land_price)
        .and_then(|v| v.checked_sub(reserve))
        .and_then(|v| v.checked_sub(benchmark.fixed_costs))
        .ok_or_else(|| overflow("construction budget"))?
        .max(Decimal::ZERO);
    let floor_area_m2 = construction_budget
        .checked_div(costs.construction_cost_per_m2)
        .ok_or_else(|| overflow("floor area"))?;
    let opex_ratio = costs
        .marketing_cost_pct
        .checked_add(costs.other_costs_pct)
        .ok_or_else(|| overflow("operating cost ratio"))?;
    let growth = Decimal::ONE
        .checked_add(benchmark.income_growth)
        .ok_or_else(|| overflow("income growth"))?;

    let n = inputs.horizon as usize;
    let mut net_operating_income = Vec::with_capacity(n);
    let mut revenue = floor_area_m2
        .checked_mul(benchmark.rent_per_m2)
        .ok_or_else(|| overflow("revenue in period 1"))?;
    for period in 0..n {
        if period > 0 {
            revenue = revenue
                .checked_mul(growth)
                .ok_or_else(|| overflow(format!("revenue in period {}", period + 1)))?;
        }
        let noi = revenue
            .checked_mul(opex_ratio)
            .and_then(|opex| revenue.checked_sub(opex))
            .ok_or_else(|| overflow(format!("NOI in period {}", period + 1)))?;
        net_operating_income.push(noi);
    }

    let final_noi = net_operating_income.last().copied().unwrap_or(Decimal::ZERO);
    let disposal_value = match benchmark.exit_cap_rate {
        Some(cap) if cap > Decimal::ZERO => final_noi.checked_div(cap),
        _ => equity.checked_mul(benchmark.exit_equity_multiple),
    }
    .and_then(|v| v.checked_add(reserve))
    .ok_or_else(|| overflow("disposal value"))?;

    let mut flows = Vec::with_capacity(n + 1);
    flows.push(-equity);
    for (i, noi) in net_operating_income.iter().enumerate() {
        if i == n - 1 {
            flows.push(
                noi.checked_add(disposal_value)
                    .ok_or_else(|| overflow("final period cash flow"))?,
            );
        } else {
            flows.push(*noi);
        }
    }

    let annual_debt_service = match benchmark.debt_service_ratio {
        Some(r) => Some(equity.checked_mul(r).ok_or_else(|| overflow("debt service"))?),
        None => None,
    };

    Ok(CashFlowSeries {
        flows,
        net_operating_income,
        disposal_value,
        land_price,
        construction_budget,
        floor_area_m2,
        annual_debt_service,
    })
}
