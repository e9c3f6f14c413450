use anyhow::Result;
use serde_derive::Serialize;
use tabled::builder::Builder;
use tabled::settings::Style;

use crate::core::common::{LookupKind, LookupRecord};

const NONE_MSG: &str = "None";

#[derive(Debug, Serialize)]
struct LookupRow<'a> {
    query: &'a str,
    answer: Option<&'a str>,
}

/// Format an integer with thousands separators, eg `12,345`.
pub fn thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

pub fn lookup_summary_msg(kind: LookupKind, resolved: u64, failed: u64, elapsed_secs: f64) -> String {
    format!(
        "{} {} resolved in {:.2} seconds. {} failed.",
        thousands(resolved),
        kind.subject(),
        elapsed_secs,
        thousands(failed)
    )
}

pub fn lookup_table_msg(kind: LookupKind, records: &[LookupRecord]) -> String {
    let mut builder = Builder::default();
    builder.push_record(kind.headers());
    for (query, answer) in records {
        builder.push_record([query.as_str(), answer.as_deref().unwrap_or(NONE_MSG)]);
    }
    let mut table = builder.build();
    table.with(Style::modern());
    table.to_string()
}

pub fn lookup_json_msg(records: &[LookupRecord]) -> Result<String> {
    let rows: Vec<LookupRow> = records
        .iter()
        .map(|(query, answer)| LookupRow {
            query,
            answer: answer.as_deref(),
        })
        .collect();
    Ok(serde_json::to_string_pretty(&rows)?)
}

/// Centre `text` in a line of dots, or a plain dotted rule when `None`.
pub fn heading_msg(text: Option<&str>, width: usize) -> String {
    match text {
        Some(text) => format!("{:.^width$}", format!(" {text} ")),
        None => ".".repeat(width),
    }
}

/// Lay out short strings in columns, filling each column top to bottom.
///
/// `longest` overrides the detected column width so several groups can
/// share one alignment.
pub fn columnise(strings: &[String], width: usize, longest: Option<usize>) -> String {
    if strings.is_empty() {
        return String::new();
    }
    let longest = longest.unwrap_or_else(|| strings.iter().map(|s| s.len()).max().unwrap_or(0));
    let columns = (width / (longest + 1)).max(1);
    let rows = strings.len().div_ceil(columns);

    let mut lines = Vec::with_capacity(rows);
    for row in 0..rows {
        let line = strings
            .iter()
            .skip(row)
            .step_by(rows)
            .map(|s| format!("{s:<longest$}"))
            .collect::<Vec<_>>()
            .join(" ");
        lines.push(line.trim_end().to_owned());
    }
    lines.join("\n")
}

/// One line of the DNS error listing: `host -> address -> reverse`.
pub fn dns_error_msg(hostname: &str, address: Option<&str>, reverse: Option<&str>, longest: usize) -> String {
    let address = address.unwrap_or(NONE_MSG);
    let mut line = format!("{hostname:<longest$} -> {address:<15}");
    if let Some(reverse) = reverse {
        line.push_str(&format!(" -> {reverse}"));
    }
    line
}
