//! Named model inputs that analyses can read and perturb.
//!
//! Sensitivity, simulation and optimization all address the model through
//! [`ModelParameter`], never through ad-hoc field access, so a perturbed
//! model is always a fresh copy and always physically valid.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::cashflow::{DevelopmentModel, MAX_HORIZON};
use crate::error::PreSiteError;
use crate::PreSiteResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelParameter {
    Equity,
    /// Rounded to the nearest whole period when set.
    Horizon,
    ConstructionCost,
    MarketingCost,
    OtherCosts,
    RentPerM2,
    ExitCapRate,
    LandShare,
    IncomeGrowth,
}

impl ModelParameter {
    pub const ALL: [ModelParameter; 9] = [
        ModelParameter::Equity,
        ModelParameter::Horizon,
        ModelParameter::ConstructionCost,
        ModelParameter::MarketingCost,
        ModelParameter::OtherCosts,
        ModelParameter::RentPerM2,
        ModelParameter::ExitCapRate,
        ModelParameter::LandShare,
        ModelParameter::IncomeGrowth,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ModelParameter::Equity => "equity",
            ModelParameter::Horizon => "horizon",
            ModelParameter::ConstructionCost => "construction_cost",
            ModelParameter::MarketingCost => "marketing_cost",
            ModelParameter::OtherCosts => "other_costs",
            ModelParameter::RentPerM2 => "rent_per_m2",
            ModelParameter::ExitCapRate => "exit_cap_rate",
            ModelParameter::LandShare => "land_share",
            ModelParameter::IncomeGrowth => "income_growth",
        }
    }

    /// Current value of the parameter in `model`.
    pub fn value(self, model: &DevelopmentModel) -> PreSiteResult<Decimal> {
        let b = &model.benchmark;
        let v = match self {
            ModelParameter::Equity => model.inputs.equity,
            ModelParameter::Horizon => Decimal::from(model.inputs.horizon),
            ModelParameter::ConstructionCost => b.costs.construction_cost_per_m2,
            ModelParameter::MarketingCost => b.costs.marketing_cost_pct,
            ModelParameter::OtherCosts => b.costs.other_costs_pct,
            ModelParameter::RentPerM2 => b.rent_per_m2,
            ModelParameter::ExitCapRate => {
                b.exit_cap_rate.ok_or_else(|| PreSiteError::InvalidInput {
                    field: self.name().into(),
                    reason: "exit cap rate is not set for this use case".into(),
                })?
            }
            ModelParameter::LandShare => match model.inputs.land_price {
                Some(land) => land / model.inputs.equity,
                None => b.land_share,
            },
            ModelParameter::IncomeGrowth => b.income_growth,
        };
        Ok(v)
    }

    /// Physically valid range of the parameter given the rest of `model`.
    pub fn valid_range(self, model: &DevelopmentModel) -> (Decimal, Decimal) {
        let b = &model.benchmark;
        match self {
            ModelParameter::Equity => (dec!(1), dec!(1000000000000)),
            ModelParameter::Horizon => (Decimal::ONE, Decimal::from(MAX_HORIZON)),
            ModelParameter::ConstructionCost => (dec!(1), dec!(1000000)),
            ModelParameter::MarketingCost => {
                (Decimal::ZERO, dec!(0.99) - b.costs.other_costs_pct)
            }
            ModelParameter::OtherCosts => {
                (Decimal::ZERO, dec!(0.99) - b.costs.marketing_cost_pct)
            }
            ModelParameter::RentPerM2 => (Decimal::ZERO, dec!(1000000)),
            ModelParameter::ExitCapRate => (dec!(0.005), Decimal::ONE),
            ModelParameter::LandShare => (Decimal::ZERO, Decimal::ONE - b.reserve_pct),
            ModelParameter::IncomeGrowth => (dec!(-0.5), Decimal::ONE),
        }
    }

    /// Copy of `model` with this parameter set to `value`, clamped to the
    /// valid range.
    pub fn with_value(self, model: &DevelopmentModel, value: Decimal) -> DevelopmentModel {
        let (lo, hi) = self.valid_range(model);
        let v = value.max(lo).min(hi);
        let mut next = model.clone();
        let b = &mut next.benchmark;
        match self {
            ModelParameter::Equity => next.inputs.equity = v,
            ModelParameter::Horizon => {
                next.inputs.horizon = v
                    .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
                    .to_u32().unwrap_or(1).clamp(1, MAX_HORIZON)
            }
            ModelParameter::ConstructionCost => b.costs.construction_cost_per_m2 = v,
            ModelParameter::MarketingCost => b.costs.marketing_cost_pct = v,
            ModelParameter::OtherCosts => b.costs.other_costs_pct = v,
            ModelParameter::RentPerM2 => b.rent_per_m2 = v,
            ModelParameter::ExitCapRate => b.exit_cap_rate = Some(v),
            ModelParameter::LandShare => {
                b.land_share = v;
                next.inputs.land_price = None;
            }
            ModelParameter::IncomeGrowth => b.income_growth = v,
        }
        next
    }

    /// [`with_value`](Self::with_value) for values produced in f64.
    pub fn with_f64(self, model: &DevelopmentModel, value: f64) -> PreSiteResult<DevelopmentModel> {
        let v = Decimal::from_f64(value).ok_or_else(|| PreSiteError::InvalidInput {
            field: self.name().into(),
            reason: format!("{value} is not representable"),
        })?;
        Ok(self.with_value(model, v))
    }

    /// Clamp an f64 sample to the valid range.
    pub fn clamp_f64(self, model: &DevelopmentModel, value: f64) -> f64 {
        let (lo, hi) = self.valid_range(model);
        let lo = lo.to_f64().unwrap_or(f64::MIN);
        let hi = hi.to_f64().unwrap_or(f64::MAX);
        if value.is_nan() {
            return lo;
        }
        value.clamp(lo, hi)
    }
}

impl fmt::Display for ModelParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelParameter {
    type Err = PreSiteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace('-', "_");
        ModelParameter::ALL
            .iter()
            .copied()
            .find(|p| p.name() == key)
            .ok_or_else(|| PreSiteError::InvalidInput {
                field: "parameter".into(),
                reason: format!("unknown model parameter '{s}'"),
            })
    }
}

/// Apply several parameter values to a copy of `model`, in order.
pub fn apply_all(
    model: &DevelopmentModel,
    values: &[(ModelParameter, f64)],
) -> PreSiteResult<DevelopmentModel> {
    let mut next = model.clone();
    for (param, value) in values {
        let v = param.clamp_f64(&next, *value);
        next = param.with_f64(&next, v)?;
    }
    Ok(next)
}
