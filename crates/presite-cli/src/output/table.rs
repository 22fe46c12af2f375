use serde_json::Value;
use tabled::{builder::Builder, Table};

use super::{flatten, format_cell};

/// Rows shown per nested table; simulation trials can run to millions.
const MAX_ROWS: usize = 25;

/// Format output as tables using the tabled crate.
pub fn print_table(value: &Value) {
    match value {
        Value::Object(map) => {
            if let Some(result) = map.get("result") {
                print_result(result, map);
            } else if let Some(Value::Array(results)) = map.get("results") {
                print_array_table(results);
            } else {
                print_result(value, &serde_json::Map::new());
            }
        }
        Value::Array(arr) => print_array_table(arr),
        _ => println!("{}", value),
    }
}

fn print_result(result: &Value, envelope: &serde_json::Map<String, Value>) {
    let mut leaves = Vec::new();
    let mut tables = Vec::new();
    flatten("", result, &mut leaves, &mut tables);

    if !leaves.is_empty() {
        let mut builder = Builder::default();
        builder.push_record(["Field", "Value"]);
        for (key, val) in &leaves {
            builder.push_record([key.clone(), format_cell(val)]);
        }
        println!("{}", Table::from(builder));
    }

    for (name, rows) in &tables {
        println!("\n{}:", name);
        print_array_table(rows);
    }

    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings {
                if let Value::String(s) = w {
                    println!("  - {}", s);
                }
            }
        }
    }

    if let Some(Value::String(meth)) = envelope.get("methodology") {
        println!("\nMethodology: {}", meth);
    }
}

fn print_array_table(arr: &[Value]) {
    if arr.is_empty() {
        println!("(empty)");
        return;
    }

    if let Some(Value::Object(first)) = arr.first() {
        let headers: Vec<String> = first.keys().cloned().collect();
        let mut builder = Builder::default();
        builder.push_record(headers.clone());

        for item in arr.iter().take(MAX_ROWS) {
            if let Value::Object(map) = item {
                let row: Vec<String> = headers
                    .iter()
                    .map(|h| map.get(h.as_str()).map(format_cell).unwrap_or_default())
                    .collect();
                builder.push_record(row);
            }
        }

        println!("{}", Table::from(builder));
        if arr.len() > MAX_ROWS {
            println!("... {} more rows (use --output json for all)", arr.len() - MAX_ROWS);
        }
    } else {
        for item in arr {
            println!("{}", format_cell(item));
        }
    }
}
