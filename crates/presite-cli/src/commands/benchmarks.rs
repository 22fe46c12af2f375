use clap::Args;
use serde_json::Value;

use presite_core::UseCase;

use super::Context;

/// Arguments for listing benchmarks
#[derive(Args)]
pub struct BenchmarksArgs {
    /// Show one use case only
    #[arg(long)]
    pub use_case: Option<String>,
}

pub fn run_benchmarks(args: BenchmarksArgs, ctx: &Context) -> Result<Value, Box<dyn std::error::Error>> {
    let Some(name) = args.use_case else {
        let results: Vec<Value> = ctx
            .table
            .entries
            .iter()
            .map(|(use_case, b)| {
                serde_json::json!({
                    "use_case": use_case,
                    "reference_irr": b.reference_irr,
                    "construction_cost_per_m2": b.costs.construction_cost_per_m2,
                    "marketing_cost_pct": b.costs.marketing_cost_pct,
                    "other_costs_pct": b.costs.other_costs_pct,
                    "rent_per_m2": b.rent_per_m2,
                    "exit_cap_rate": b.exit_cap_rate,
                    "land_share": b.land_share,
                })
            })
            .collect();
        return Ok(serde_json::json!({ "results": results }));
    };

    let use_case: UseCase = name.parse()?;
    let benchmark = ctx.table.benchmark(use_case)?;
    Ok(serde_json::json!({
        "result": {
            "use_case": use_case,
            "benchmark": benchmark,
        }
    }))
}
