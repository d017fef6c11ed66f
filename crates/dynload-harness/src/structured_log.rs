//! JSONL run records for `dynload-harness`.
//!
//! Every library command writes one [`LogEntry`] per invocation. The record
//! always carries `timestamp`, `trace_id`, `level` and `event`; the library
//! path, symbol, offset, outcome, error class, latency and free-form details
//! are present when they apply. [`validate_log_line`] checks a line against
//! that shape so logs from CI runs can be gated on.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    const NAMES: &'static [&'static str] = &["trace", "debug", "info", "warn", "error"];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pass,
    Fail,
    Skip,
}

impl Outcome {
    const NAMES: &'static [&'static str] = &["pass", "fail", "skip"];
}

/// Values `error_kind` may take: the `dynload` error classes plus `io` for
/// harness-side failures.
pub const ERROR_KINDS: &[&str] = &["invalid_argument", "logic", "load", "symbol", "io"];

const REQUIRED: [&str; 4] = ["timestamp", "trace_id", "level", "event"];

/// One harness operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    /// `dynload::<run_id>::<seq>`
    pub trace_id: String,
    pub level: LogLevel,
    pub event: String,

    /// Path handed to the loader.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    /// One of [`ERROR_KINDS`]; present whenever `outcome` is `fail`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ns: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl LogEntry {
    /// Record stamped with the current time. An empty `trace_id` is filled
    /// in by [`LogEmitter::emit_entry`].
    #[must_use]
    pub fn new(trace_id: impl Into<String>, level: LogLevel, event: impl Into<String>) -> Self {
        Self {
            timestamp: now_utc(),
            trace_id: trace_id.into(),
            level,
            event: event.into(),
            library: None,
            symbol: None,
            offset: None,
            outcome: None,
            error_kind: None,
            latency_ns: None,
            details: None,
        }
    }

    #[must_use]
    pub fn with_library(self, library: impl Into<String>) -> Self {
        Self {
            library: Some(library.into()),
            ..self
        }
    }

    #[must_use]
    pub fn with_symbol(self, symbol: impl Into<String>) -> Self {
        Self {
            symbol: Some(symbol.into()),
            ..self
        }
    }

    #[must_use]
    pub fn with_offset(self, offset: u64) -> Self {
        Self {
            offset: Some(offset),
            ..self
        }
    }

    #[must_use]
    pub fn with_outcome(self, outcome: Outcome) -> Self {
        Self {
            outcome: Some(outcome),
            ..self
        }
    }

    #[must_use]
    pub fn with_error_kind(self, kind: impl Into<String>) -> Self {
        Self {
            error_kind: Some(kind.into()),
            ..self
        }
    }

    #[must_use]
    pub fn with_latency_ns(self, latency_ns: u64) -> Self {
        Self {
            latency_ns: Some(latency_ns),
            ..self
        }
    }

    #[must_use]
    pub fn with_details(self, details: serde_json::Value) -> Self {
        Self {
            details: Some(details),
            ..self
        }
    }
}

// ---------------------------------------------------------------------------
// Emitter
// ---------------------------------------------------------------------------

/// Numbers records within a run and writes one JSON object per line.
pub struct LogEmitter<W: Write = BufWriter<File>> {
    out: W,
    run_id: String,
    next_seq: u64,
}

impl LogEmitter {
    /// Append to `path`, creating it if needed.
    pub fn to_file(path: &Path, run_id: &str) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(BufWriter::new(file), run_id))
    }
}

impl<W: Write> LogEmitter<W> {
    pub fn new(out: W, run_id: &str) -> Self {
        Self {
            out,
            run_id: run_id.to_string(),
            next_seq: 1,
        }
    }

    fn trace_id(&mut self) -> String {
        let id = format!("dynload::{}::{:03}", self.run_id, self.next_seq);
        self.next_seq += 1;
        id
    }

    /// Write `entry`, assigning the next trace id if it has none.
    pub fn emit_entry(&mut self, mut entry: LogEntry) -> io::Result<()> {
        if entry.trace_id.is_empty() {
            entry.trace_id = self.trace_id();
        }
        serde_json::to_writer(&mut self.out, &entry)?;
        self.out.write_all(b"\n")
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// A problem found in one line of a log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogIssue {
    pub line: usize,
    /// Offending field, or `<json>` / `<root>` when the line is not an object.
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for LogIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}: {}", self.line, self.field, self.message)
    }
}

/// Check one JSONL line and decode it.
///
/// All problems on the line are reported together.
pub fn validate_log_line(text: &str, line: usize) -> Result<LogEntry, Vec<LogIssue>> {
    let issue = |field: &str, message: String| LogIssue {
        line,
        field: field.to_string(),
        message,
    };

    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| vec![issue("<json>", e.to_string())])?;
    let Some(record) = value.as_object() else {
        return Err(vec![issue("<root>", "not a JSON object".to_string())]);
    };
    let text_field = |name: &str| record.get(name).and_then(serde_json::Value::as_str);

    let mut issues: Vec<LogIssue> = REQUIRED
        .iter()
        .filter(|name| !record.contains_key(**name))
        .map(|name| issue(*name, "missing".to_string()))
        .collect();

    let enums: [(&str, &[&str]); 3] = [
        ("level", LogLevel::NAMES),
        ("outcome", Outcome::NAMES),
        ("error_kind", ERROR_KINDS),
    ];
    for (name, allowed) in enums {
        if let Some(v) = text_field(name)
            && !allowed.contains(&v)
        {
            issues.push(issue(name, format!("'{v}' is not one of {allowed:?}")));
        }
    }

    if text_field("outcome") == Some("fail") && !record.contains_key("error_kind") {
        issues.push(issue("error_kind", "required when outcome is fail".to_string()));
    }
    if let Some(id) = text_field("trace_id")
        && !is_trace_id(id)
    {
        issues.push(issue("trace_id", format!("'{id}' is not dynload::<run>::<seq>")));
    }

    if !issues.is_empty() {
        return Err(issues);
    }
    serde_json::from_value(value).map_err(|e| vec![issue("<root>", e.to_string())])
}

fn is_trace_id(id: &str) -> bool {
    let mut parts = id.split("::");
    matches!(
        (parts.next(), parts.next(), parts.next(), parts.next()),
        (Some("dynload"), Some(run), Some(seq), None) if !run.is_empty() && !seq.is_empty()
    )
}

/// Validate every non-blank line of `path`.
///
/// Returns the number of records checked and the issues found.
pub fn validate_log_file(path: &Path) -> io::Result<(usize, Vec<LogIssue>)> {
    let mut records = 0;
    let mut issues = Vec::new();
    for (index, text) in BufReader::new(File::open(path)?).lines().enumerate() {
        let text = text?;
        if text.trim().is_empty() {
            continue;
        }
        records += 1;
        if let Err(found) = validate_log_line(text.trim(), index + 1) {
            issues.extend(found);
        }
    }
    Ok((records, issues))
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Current time as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
#[must_use]
pub fn now_utc() -> String {
    let since_epoch = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    format_utc(since_epoch.as_secs(), since_epoch.subsec_millis())
}

fn format_utc(secs: u64, millis: u32) -> String {
    let (year, month, day) = civil_from_days((secs / 86_400) as i64);
    let time_of_day = secs % 86_400;
    format!(
        "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}.{millis:03}Z",
        time_of_day / 3600,
        time_of_day % 3600 / 60,
        time_of_day % 60,
    )
}

/// Gregorian date for a day count relative to 1970-01-01 (Hinnant's algorithm).
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let shifted = days + 719_468;
    let era = shifted.div_euclid(146_097);
    let day_of_era = shifted.rem_euclid(146_097);
    let year_of_era =
        (day_of_era - day_of_era / 1460 + day_of_era / 36_524 - day_of_era / 146_096) / 365;
    let day_of_year = day_of_era - (365 * year_of_era + year_of_era / 4 - year_of_era / 100);
    let month_index = (5 * day_of_year + 2) / 153;
    let day = (day_of_year - (153 * month_index + 2) / 5 + 1) as u32;
    let month = (if month_index < 10 {
        month_index + 3
    } else {
        month_index - 9
    }) as u32;
    (year_of_era + era * 400 + i64::from(month <= 2), month, day)
}
