use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::DecisionConfig;
use crate::metrics::MetricsResult;
use crate::types::Rate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recommendation {
    Go,
    NoGo,
    NeedsFurtherAnalysis,
    /// IRR or land cap could not be determined.
    Indeterminate,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Recommendation::Go => "Go",
            Recommendation::NoGo => "NoGo",
            Recommendation::NeedsFurtherAnalysis => "NeedsFurtherAnalysis",
            Recommendation::Indeterminate => "Indeterminate",
        };
        f.write_str(s)
    }
}

/// Go / No-Go rule.
///
/// - `Indeterminate` when IRR is unavailable or the land cap could not be
///   solved.
/// - `NoGo` when IRR < target - margin, or the land cap is negative.
/// - `Go` when IRR >= target and the land cap is non-negative.
/// - `NeedsFurtherAnalysis` otherwise (IRR inside the margin band).
pub fn decide(metrics: &MetricsResult, target_return: Rate, config: &DecisionConfig) -> Recommendation {
    decide_values(metrics.irr, metrics.cap_on_land, target_return, config)
}

pub fn decide_values(
    irr: Option<Rate>,
    cap_on_land: Option<Decimal>,
    target_return: Rate,
    config: &DecisionConfig,
) -> Recommendation {
    let (Some(irr), Some(cap)) = (irr, cap_on_land) else {
        return Recommendation::Indeterminate;
    };

    if irr < target_return - config.margin || cap < Decimal::ZERO {
        Recommendation::NoGo
    } else if irr >= target_return {
        Recommendation::Go
    } else {
        Recommendation::NeedsFurtherAnalysis
    }
}
