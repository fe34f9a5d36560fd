//! Reading and filtering the event log

use std::fs;
use std::path::Path;

use chrono::{DateTime, FixedOffset};
use tracing::warn;

use crate::error::{DirsyncError, DirsyncResult};

use super::LogRecord;

/// Criteria for selecting historical records. Bounds are inclusive.
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    path_contains: Option<String>,
    from: Option<DateTime<FixedOffset>>,
    to: Option<DateTime<FixedOffset>>,
}

impl LogFilter {
    pub fn new(path_contains: Option<&str>, from: Option<&str>, to: Option<&str>) -> DirsyncResult<Self> {
        Ok(Self {
            path_contains: path_contains.filter(|s| !s.is_empty()).map(str::to_string),
            from: from.filter(|s| !s.is_empty()).map(parse_timestamp).transpose()?,
            to: to.filter(|s| !s.is_empty()).map(parse_timestamp).transpose()?,
        })
    }

    pub fn matches(&self, record: &LogRecord) -> bool {
        if let Some(needle) = &self.path_contains {
            if !record.event_path.contains(needle.as_str()) {
                return false;
            }
        }

        // Records with a broken timestamp never match.
        let Ok(at) = DateTime::parse_from_rfc3339(&record.timestamp) else {
            return false;
        };
        if self.from.is_some_and(|from| at < from) {
            return false;
        }
        if self.to.is_some_and(|to| at > to) {
            return false;
        }
        true
    }

    /// Keep the matching records, in file order.
    pub fn apply(&self, records: Vec<LogRecord>) -> Vec<LogRecord> {
        records.into_iter().filter(|r| self.matches(r)).collect()
    }
}

fn parse_timestamp(value: &str) -> DirsyncResult<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value).map_err(|_| DirsyncError::InvalidTimestamp {
        value: value.to_string(),
    })
}

/// Read every well-formed record from the log at `path`.
///
/// Lines that do not parse are skipped with a warning.
pub fn load_records(path: &Path) -> DirsyncResult<Vec<LogRecord>> {
    let content = fs::read_to_string(path)?;
    let mut records = Vec::new();

    for (index, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<LogRecord>(line) {
            Ok(record) => records.push(record),
            Err(err) => warn!(line = index + 1, error = %err, "skipping malformed log line"),
        }
    }

    Ok(records)
}

/// One human-readable line per record.
pub fn format_record(record: &LogRecord) -> String {
    format!(
        "[{}] Worker {} | {} | {} | {}",
        record.timestamp, record.worker_id, record.event_type, record.event_path, record.action
    )
}
