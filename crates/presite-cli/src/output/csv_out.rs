use serde_json::Value;
use std::io;

use super::{flatten, format_cell};

type StdoutWriter<'a> = csv::Writer<io::StdoutLock<'a>>;

/// Write output as CSV to stdout.
///
/// A single result becomes `field,value` rows with dotted field names; a
/// list of results, or a result whose only content is one list (such as
/// simulation trials), becomes one row per entry.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());

    let body = match value {
        Value::Object(map) => map.get("result").or_else(|| map.get("results")).unwrap_or(value),
        _ => value,
    };

    match body {
        Value::Array(arr) => write_rows(&mut wtr, arr),
        Value::Object(_) => {
            let mut leaves = Vec::new();
            let mut tables = Vec::new();
            flatten("", body, &mut leaves, &mut tables);
            let _ = wtr.write_record(["field", "value"]);
            for (key, val) in &leaves {
                let _ = wtr.write_record([key.as_str(), &format_cell(val)]);
            }
            for (name, rows) in &tables {
                let _ = wtr.write_record([name.as_str(), &format!("[{} rows]", rows.len())]);
            }
        }
        _ => {
            let _ = wtr.write_record([&format_cell(body)]);
        }
    }

    let _ = wtr.flush();
}

fn write_rows(wtr: &mut StdoutWriter<'_>, arr: &[Value]) {
    let Some(Value::Object(first)) = arr.first() else {
        for item in arr {
            let _ = wtr.write_record([&format_cell(item)]);
        }
        return;
    };

    let headers: Vec<&str> = first.keys().map(|k| k.as_str()).collect();
    let _ = wtr.write_record(&headers);
    for item in arr {
        if let Value::Object(map) = item {
            let row: Vec<String> = headers
                .iter()
                .map(|h| map.get(*h).map(format_cell).unwrap_or_default())
                .collect();
            let _ = wtr.write_record(&row);
        }
    }
}
