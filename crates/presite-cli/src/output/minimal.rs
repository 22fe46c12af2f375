use serde_json::Value;

use super::format_cell;

/// Headline value per command, first match wins.
const PRIORITY_PATHS: [&str; 8] = [
    "recommendation",
    "statistics.median",
    "base_irr",
    "mean_irr",
    "irr",
    "metrics.irr",
    "reference_irr",
    "benchmark.reference_irr",
];

/// Print just the headline answer from the output.
pub fn print_minimal(value: &Value) {
    let result = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    for path in PRIORITY_PATHS {
        if let Some(val) = lookup(result, path).filter(|v| !v.is_null()) {
            println!("{}", format_cell(val));
            return;
        }
    }

    if let Value::Object(map) = result {
        if let Some((key, val)) = map.iter().next() {
            println!("{}: {}", key, format_cell(val));
            return;
        }
    }

    println!("{}", format_cell(result));
}

fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |v, key| v.get(key))
}
