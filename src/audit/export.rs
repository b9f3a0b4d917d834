//! Export logged decisions as JSON or CSV.

use serde::Serialize;

use crate::error::Result;

use super::DecisionRecord;

#[derive(Serialize)]
struct ExportRow<'a> {
    id: i64,
    timestamp: &'a str,
    method: &'a str,
    target: &'a str,
    action: &'a str,
    reason: &'a str,
}

impl<'a> From<&'a DecisionRecord> for ExportRow<'a> {
    fn from(r: &'a DecisionRecord) -> Self {
        ExportRow {
            id: r.id.unwrap_or(0),
            timestamp: &r.timestamp,
            method: &r.method,
            target: &r.target,
            action: &r.action,
            reason: &r.reason,
        }
    }
}

/// Serialize decision records to a pretty-printed JSON array.
pub fn export_json(records: &[DecisionRecord]) -> Result<String> {
    let rows: Vec<ExportRow> = records.iter().map(ExportRow::from).collect();
    Ok(serde_json::to_string_pretty(&rows)?)
}

/// Serialize decision records to CSV with a header row.
pub fn export_csv(records: &[DecisionRecord]) -> String {
    let mut out = String::from("id,timestamp,method,target,action,reason\n");
    for r in records {
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            r.id.unwrap_or(0),
            csv_field(&r.timestamp),
            csv_field(&r.method),
            csv_field(&r.target),
            csv_field(&r.action),
            csv_field(&r.reason),
        ));
    }
    out
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
