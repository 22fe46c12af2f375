//! Benchmark data: per use case reference IRR, cost assumptions and the
//! model assumptions the cash-flow builder needs.
//!
//! The table is plain data. The default is built in, but callers may load a
//! replacement (JSON or YAML) and pass it explicitly; nothing here is global.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::PreSiteError;
use crate::types::{Money, Multiple, Rate};
use crate::PreSiteResult;

/// Development use. The set is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum UseCase {
    Residential,
    Hospitality,
    MixedUse,
}

impl UseCase {
    pub const ALL: [UseCase; 3] = [UseCase::Residential, UseCase::Hospitality, UseCase::MixedUse];

    pub fn as_str(self) -> &'static str {
        match self {
            UseCase::Residential => "Residential",
            UseCase::Hospitality => "Hospitality",
            UseCase::MixedUse => "MixedUse",
        }
    }
}

impl fmt::Display for UseCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UseCase {
    type Err = PreSiteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "residential" => Ok(UseCase::Residential),
            "hospitality" => Ok(UseCase::Hospitality),
            "mixeduse" => Ok(UseCase::MixedUse),
            _ => Err(PreSiteError::UnknownUseCase(s.to_string())),
        }
    }
}

/// Development cost assumptions for one use case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostAssumptions {
    pub construction_cost_per_m2: Money,
    /// Marketing cost as a fraction of revenue.
    pub marketing_cost_pct: Rate,
    /// Other costs as a fraction of revenue.
    pub other_costs_pct: Rate,
}

/// Everything the builder needs for one use case besides the investor's
/// own inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UseCaseBenchmark {
    pub reference_irr: Rate,
    pub costs: CostAssumptions,
    /// Annual gross revenue per m² of completed floor area.
    pub rent_per_m2: Money,
    /// Capitalisation rate applied to final-year NOI at disposal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_cap_rate: Option<Rate>,
    /// Disposal value as a multiple of equity when no exit cap rate is set.
    #[serde(default = "default_equity_multiple")]
    pub exit_equity_multiple: Multiple,
    /// Default land price as a fraction of equity.
    pub land_share: Rate,
    /// Contingency reserve as a fraction of equity, released at disposal.
    pub reserve_pct: Rate,
    /// Permits, design and other fixed pre-development costs.
    pub fixed_costs: Money,
    /// Annual growth of gross revenue after the first operating year.
    #[serde(default)]
    pub income_growth: Rate,
    /// Annual debt service as a fraction of equity; `None` when debt is not modeled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debt_service_ratio: Option<Rate>,
}

fn default_equity_multiple() -> Multiple {
    Decimal::ONE
}

/// Use case → benchmark mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkTable {
    pub entries: BTreeMap<UseCase, UseCaseBenchmark>,
}

impl Default for BenchmarkTable {
    fn default() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(
            UseCase::Residential,
            UseCaseBenchmark {
                reference_irr: dec!(0.175),
                costs: CostAssumptions {
                    construction_cost_per_m2: dec!(1000),
                    marketing_cost_pct: dec!(0.05),
                    other_costs_pct: dec!(0.10),
                },
                rent_per_m2: dec!(175),
                exit_cap_rate: Some(dec!(0.07)),
                exit_equity_multiple: Decimal::ONE,
                land_share: dec!(0.20),
                reserve_pct: dec!(0.05),
                fixed_costs: dec!(25000),
                income_growth: Decimal::ZERO,
                debt_service_ratio: Some(dec!(0.08)),
            },
        );
        entries.insert(
            UseCase::Hospitality,
            UseCaseBenchmark {
                reference_irr: dec!(0.152),
                costs: CostAssumptions {
                    construction_cost_per_m2: dec!(1200),
                    marketing_cost_pct: dec!(0.06),
                    other_costs_pct: dec!(0.12),
                },
                rent_per_m2: dec!(225),
                exit_cap_rate: Some(dec!(0.08)),
                exit_equity_multiple: Decimal::ONE,
                land_share: dec!(0.20),
                reserve_pct: dec!(0.05),
                fixed_costs: dec!(40000),
                income_growth: Decimal::ZERO,
                debt_service_ratio: Some(dec!(0.08)),
            },
        );
        entries.insert(
            UseCase::MixedUse,
            UseCaseBenchmark {
                reference_irr: dec!(0.168),
                costs: CostAssumptions {
                    construction_cost_per_m2: dec!(1100),
                    marketing_cost_pct: dec!(0.055),
                    other_costs_pct: dec!(0.11),
                },
                rent_per_m2: dec!(200),
                exit_cap_rate: Some(dec!(0.075)),
                exit_equity_multiple: Decimal::ONE,
                land_share: dec!(0.20),
                reserve_pct: dec!(0.05),
                fixed_costs: dec!(30000),
                income_growth: Decimal::ZERO,
                debt_service_ratio: Some(dec!(0.08)),
            },
        );
        Self { entries }
    }
}

impl BenchmarkTable {
    pub fn benchmark(&self, use_case: UseCase) -> PreSiteResult<&UseCaseBenchmark> {
        self.entries
            .get(&use_case)
            .ok_or_else(|| PreSiteError::UnknownUseCase(use_case.to_string()))
    }

    pub fn benchmarks_for(&self, use_case: UseCase) -> PreSiteResult<CostAssumptions> {
        Ok(self.benchmark(use_case)?.costs.clone())
    }

    pub fn reference_irr(&self, use_case: UseCase) -> PreSiteResult<Rate> {
        Ok(self.benchmark(use_case)?.reference_irr)
    }

    /// Use cases present in the table, in declaration order.
    pub fn all_use_cases(&self) -> Vec<UseCase> {
        self.entries.keys().copied().collect()
    }

    /// Lookup by name, for callers holding a free-form string.
    pub fn benchmark_by_name(&self, name: &str) -> PreSiteResult<&UseCaseBenchmark> {
        self.benchmark(name.parse()?)
    }

    pub fn validate(&self) -> PreSiteResult<()> {
        for (use_case, b) in &self.entries {
            b.validate()
                .map_err(|reason| PreSiteError::InvalidInput {
                    field: format!("benchmarks.{use_case}"),
                    reason,
                })?;
        }
        Ok(())
    }
}

impl UseCaseBenchmark {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.costs.construction_cost_per_m2 <= Decimal::ZERO {
            return Err("construction_cost_per_m2 must be positive".into());
        }
        let opex = self.costs.marketing_cost_pct + self.costs.other_costs_pct;
        if self.costs.marketing_cost_pct < Decimal::ZERO
            || self.costs.other_costs_pct < Decimal::ZERO
            || opex >= Decimal::ONE
        {
            return Err("cost fractions must be non-negative and sum below 1".into());
        }
        if self.rent_per_m2 < Decimal::ZERO {
            return Err("rent_per_m2 cannot be negative".into());
        }
        if matches!(self.exit_cap_rate, Some(c) if c <= Decimal::ZERO) {
            return Err("exit_cap_rate must be positive".into());
        }
        if self.exit_equity_multiple < Decimal::ZERO {
            return Err("exit_equity_multiple cannot be negative".into());
        }
        if self.land_share < Decimal::ZERO || self.reserve_pct < Decimal::ZERO {
            return Err("land_share and reserve_pct cannot be negative".into());
        }
        if self.land_share + self.reserve_pct >= Decimal::ONE {
            return Err("land_share plus reserve_pct must stay below 1".into());
        }
        if self.fixed_costs < Decimal::ZERO {
            return Err("fixed_costs cannot be negative".into());
        }
        if self.income_growth <= dec!(-1) {
            return Err("income_growth must be greater than -100%".into());
        }
        if matches!(self.debt_service_ratio, Some(d) if d < Decimal::ZERO) {
            return Err("debt_service_ratio cannot be negative".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_table_covers_every_use_case() {
        let table = BenchmarkTable::default();
        assert_eq!(table.all_use_cases(), UseCase::ALL.to_vec());
        assert!(table.validate().is_ok());
    }

    #[test]
    fn test_reference_irrs() {
        let table = BenchmarkTable::default();
        assert_eq!(table.reference_irr(UseCase::Residential).unwrap(), dec!(0.175));
        assert_eq!(table.reference_irr(UseCase::Hospitality).unwrap(), dec!(0.152));
        assert_eq!(table.reference_irr(UseCase::MixedUse).unwrap(), dec!(0.168));
    }

    #[test]
    fn test_cost_lookup() {
        let costs = BenchmarkTable::default()
            .benchmarks_for(UseCase::Hospitality)
            .unwrap();
        assert_eq!(
            costs,
            CostAssumptions {
                construction_cost_per_m2: dec!(1200),
                marketing_cost_pct: dec!(0.06),
                other_costs_pct: dec!(0.12),
            }
        );
    }

    #[test]
    fn test_use_case_parsing() {
        assert_eq!("residential".parse::<UseCase>().unwrap(), UseCase::Residential);
        assert_eq!("Mixed-Use".parse::<UseCase>().unwrap(), UseCase::MixedUse);
        assert_eq!("mixed_use".parse::<UseCase>().unwrap(), UseCase::MixedUse);
        assert_eq!(" Hospitality ".parse::<UseCase>().unwrap(), UseCase::Hospitality);
    }

    #[test]
    fn test_unknown_use_case() {
        let err = BenchmarkTable::default()
            .benchmark_by_name("Unknown")
            .unwrap_err();
        assert!(matches!(err, PreSiteError::UnknownUseCase(ref s) if s == "Unknown"));
    }

    #[test]
    fn test_missing_entry_is_unknown_use_case() {
        let mut table = BenchmarkTable::default();
        table.entries.remove(&UseCase::MixedUse);
        let err = table.reference_irr(UseCase::MixedUse).unwrap_err();
        assert!(matches!(err, PreSiteError::UnknownUseCase(_)));
    }

    #[test]
    fn test_table_round_trips_through_json() {
        let table = BenchmarkTable::default();
        let json = serde_json::to_string(&table).unwrap();
        let back: BenchmarkTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn test_invalid_cost_fractions_rejected() {
        let mut table = BenchmarkTable::default();
        if let Some(b) = table.entries.get_mut(&UseCase::Residential) {
            b.costs.other_costs_pct = dec!(0.99);
        }
        assert!(table.validate().is_err());
    }
}
