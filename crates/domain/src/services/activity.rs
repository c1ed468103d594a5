//! Activity feed: collects, orders, filters and exports logs and reports.

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;

use crate::models::activity::{parse_timestamp, ActivityKind, PillLog, PillReport};

/// Column order of the CSV export.
pub const LOG_CSV_HEADER: [&str; 5] = ["Timestamp", "Pill Count", "Device ID", "Status", "Uptime"];

/// Placeholder for optional columns without a value.
const MISSING: &str = "-";

/// Children of a tree node, whether the store returned it as an object or,
/// for sequential keys, as an array.
pub fn children(node: &Value) -> Vec<&Value> {
    match node {
        Value::Object(map) => map.values().collect(),
        Value::Array(items) => items.iter().filter(|v| !v.is_null()).collect(),
        _ => Vec::new(),
    }
}

/// Collects every `pill_logs` entry of every device under the device tree.
/// Entries that do not parse are skipped.
pub fn collect_logs(devices: &Value) -> Vec<PillLog> {
    let mut logs: Vec<PillLog> = children(devices)
        .into_iter()
        .filter_map(|device| device.get("pill_logs"))
        .flat_map(children)
        .filter_map(|entry| match serde_json::from_value(entry.clone()) {
            Ok(log) => Some(log),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed pill log entry");
                None
            }
        })
        .collect();
    sort_logs(&mut logs);
    logs
}

/// Collects every report under `pilldispenser/reports`.
pub fn collect_reports(reports: &Value) -> Vec<PillReport> {
    let mut reports: Vec<PillReport> = children(reports)
        .into_iter()
        .filter_map(|entry| match serde_json::from_value(entry.clone()) {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed pill report entry");
                None
            }
        })
        .collect();
    sort_reports(&mut reports);
    reports
}

/// Newest first. Unparsable timestamps go last, in their original order.
fn newest_first(a: &str, b: &str) -> Ordering {
    match (parse_timestamp(a), parse_timestamp(b)) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

pub fn sort_logs(logs: &mut [PillLog]) {
    logs.sort_by(|a, b| newest_first(&a.timestamp, &b.timestamp));
}

pub fn sort_reports(reports: &mut [PillReport]) {
    reports.sort_by(|a, b| newest_first(&a.datetime, &b.datetime));
}

fn contains_ci(haystack: Option<&str>, needle: &str) -> bool {
    haystack
        .map(|h| h.to_lowercase().contains(needle))
        .unwrap_or(false)
}

/// Logs whose device id or timestamp contains `term`, case-insensitively.
pub fn filter_logs<'a>(logs: &'a [PillLog], term: &str) -> Vec<&'a PillLog> {
    let needle = term.trim().to_lowercase();
    logs.iter()
        .filter(|log| {
            needle.is_empty()
                || contains_ci(log.device_id.as_deref(), &needle)
                || contains_ci(Some(&log.timestamp), &needle)
        })
        .collect()
}

/// Reports whose device id or description contains `term`, case-insensitively.
pub fn filter_reports<'a>(reports: &'a [PillReport], term: &str) -> Vec<&'a PillReport> {
    let needle = term.trim().to_lowercase();
    reports
        .iter()
        .filter(|report| {
            needle.is_empty()
                || contains_ci(report.device_id.as_deref(), &needle)
                || contains_ci(Some(&report.description), &needle)
        })
        .collect()
}

/// Totals shown above the activity listing. They cover every entry, not
/// only the ones matching the current search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySummary {
    pub total_logs: usize,
    pub total_reports: usize,
    pub pills_dispensed: i64,
    /// Logs stamped on the current date.
    pub today: usize,
}

impl ActivitySummary {
    pub fn new(logs: &[PillLog], reports: &[PillReport], today: NaiveDate) -> Self {
        Self {
            total_logs: logs.len(),
            total_reports: reports.len(),
            pills_dispensed: logs.iter().map(|l| l.pill_count.max(0)).sum(),
            today: logs
                .iter()
                .filter_map(|l| parse_timestamp(&l.timestamp))
                .filter(|ts| ts.date_naive() == today)
                .count(),
        }
    }
}

/// Filtered view over logs and reports.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityFeed {
    pub summary: ActivitySummary,
    pub logs: Vec<PillLog>,
    pub reports: Vec<PillReport>,
}

impl ActivityFeed {
    /// Summary over all of `logs` and `reports`; listings narrowed to
    /// `kind` and the search `term`.
    pub fn build(
        logs: &[PillLog],
        reports: &[PillReport],
        term: &str,
        kind: ActivityKind,
        today: NaiveDate,
    ) -> Self {
        let summary = ActivitySummary::new(logs, reports, today);
        let logs: Vec<PillLog> = if kind.includes_logs() {
            filter_logs(logs, term).into_iter().cloned().collect()
        } else {
            Vec::new()
        };
        let reports: Vec<PillReport> = if kind.includes_reports() {
            filter_reports(reports, term).into_iter().cloned().collect()
        } else {
            Vec::new()
        };
        Self {
            summary,
            logs,
            reports,
        }
    }
}

/// Renders logs as CSV with the fixed export columns.
pub fn export_logs_csv(logs: &[PillLog]) -> Result<String, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(LOG_CSV_HEADER)?;
    for log in logs {
        let pill_count = log.pill_count.to_string();
        writer.write_record([
            log.timestamp.as_str(),
            pill_count.as_str(),
            log.device_id.as_deref().unwrap_or(MISSING),
            log.status.as_deref().unwrap_or(MISSING),
            log.uptime.as_deref().unwrap_or(MISSING),
        ])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
