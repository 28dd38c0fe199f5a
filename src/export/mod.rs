// src/export/mod.rs

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveTime};
use csv::{ReaderBuilder, WriterBuilder};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::{
    fmt,
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::Path,
};
use tracing::{debug, error, info, warn};

use crate::history::SnapshotLog;

// dates are "yyyy-mm-dd" (or with '/'), times are "hh:mm:ss"; either may arrive quoted
static DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^"*(\d{4})[/-](\d{1,2})[/-](\d{1,2})"*$"#).expect("date regex should parse"));
static TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^"*(\d{1,2}):(\d{1,2}):(\d{1,2})"*$"#).expect("time regex should parse"));

/// A logged value, typed the way the spreadsheet should see it.
#[derive(Debug, Clone, PartialEq)]
pub enum SheetValue {
    Integer(i64),
    Float(f64),
    Date(NaiveDate),
    Time(NaiveTime),
    Text(String),
}

impl SheetValue {
    /// int, then float, then date, then time, otherwise the text as-is.
    pub fn from_text(s: &str) -> SheetValue {
        if let Ok(i) = s.parse::<i64>() {
            return SheetValue::Integer(i);
        }
        if let Ok(f) = s.parse::<f64>() {
            if f.is_finite() {
                return SheetValue::Float(f);
            }
        }
        if let Some(caps) = DATE_RE.captures(s) {
            let ymd = (
                caps[1].parse::<i32>(),
                caps[2].parse::<u32>(),
                caps[3].parse::<u32>(),
            );
            if let (Ok(y), Ok(m), Ok(d)) = ymd {
                if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
                    debug!(value = s, "date value");
                    return SheetValue::Date(date);
                }
            }
            warn!(value = s, "looks like a date but is not one");
        } else if let Some(caps) = TIME_RE.captures(s) {
            let hms = (
                caps[1].parse::<u32>(),
                caps[2].parse::<u32>(),
                caps[3].parse::<u32>(),
            );
            if let (Ok(h), Ok(m), Ok(sec)) = hms {
                if let Some(time) = NaiveTime::from_hms_opt(h, m, sec) {
                    debug!(value = s, "time value");
                    return SheetValue::Time(time);
                }
            }
            warn!(value = s, "looks like a time but is not one");
        }
        SheetValue::Text(s.to_string())
    }

    pub fn from_json(value: &Value) -> SheetValue {
        match value {
            Value::String(s) => SheetValue::from_text(s),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SheetValue::Integer(i),
                None => SheetValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::Bool(b) => SheetValue::Text(b.to_string()),
            Value::Null => SheetValue::Text(String::new()),
            other => SheetValue::Text(other.to_string()),
        }
    }
}

impl fmt::Display for SheetValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SheetValue::Integer(i) => write!(f, "{}", i),
            SheetValue::Float(v) => write!(f, "{}", v),
            SheetValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            SheetValue::Time(t) => write!(f, "{}", t.format("%H:%M:%S")),
            SheetValue::Text(s) => f.write_str(s),
        }
    }
}

/// Whether a header cell names a logged field. Empty and `*`-prefixed headers are
/// spreadsheet-computed columns and stay blank.
fn is_data_column(name: &str) -> bool {
    !(name.is_empty() || name.starts_with('*'))
}

/// Field names from the first row of the sheet.
pub fn read_sheet_header<P: AsRef<Path>>(sheet: P) -> Result<Vec<String>> {
    let file = File::open(&sheet)
        .with_context(|| format!("opening sheet {:?}", sheet.as_ref()))?;
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(file);
    let header = match rdr.records().next() {
        Some(record) => record.context("reading sheet header row")?,
        None => bail!("sheet {:?} has no header row", sheet.as_ref()),
    };
    Ok(header.iter().map(|h| h.trim().to_string()).collect())
}

/// Lay records out in `header` column order.
pub fn layout_rows(
    header: &[String],
    records: &[serde_json::Map<String, Value>],
) -> Vec<Vec<String>> {
    let mut rows = Vec::with_capacity(records.len());
    for (idx, record) in records.iter().enumerate() {
        let row = header
            .iter()
            .map(|field| {
                if !is_data_column(field) {
                    return String::new();
                }
                match record.get(field) {
                    Some(value) => SheetValue::from_json(value).to_string(),
                    None => {
                        error!(line = idx + 1, field = %field, "input is missing field");
                        String::new()
                    }
                }
            })
            .collect();
        rows.push(row);
    }
    rows
}

/// Append every snapshot in `log` to the CSV `sheet`, ordered by the sheet's header row.
/// Returns the number of rows appended.
#[tracing::instrument(level = "info", skip_all, fields(log = %log.path().display(), sheet = %sheet.as_ref().display()))]
pub fn export_log<P: AsRef<Path>>(log: &SnapshotLog, sheet: P) -> Result<usize> {
    let sheet = sheet.as_ref();
    let header = read_sheet_header(sheet)?;
    debug!(fields = header.len(), "sheet header");

    let records = log.read_records()?;
    let rows = layout_rows(&header, &records);

    let mut file = OpenOptions::new()
        .read(true)
        .append(true)
        .open(sheet)
        .with_context(|| format!("opening sheet {:?} for append", sheet))?;
    if !ends_with_newline(&mut file)? {
        file.write_all(b"\n")
            .with_context(|| format!("terminating last row of {:?}", sheet))?;
    }

    let mut wtr = WriterBuilder::new().has_headers(false).from_writer(file);
    for row in &rows {
        wtr.write_record(row)
            .with_context(|| format!("writing row to {:?}", sheet))?;
    }
    wtr.flush().with_context(|| format!("flushing {:?}", sheet))?;

    info!(appended = rows.len(), "exported snapshot log");
    Ok(rows.len())
}

fn ends_with_newline(file: &mut File) -> Result<bool> {
    let len = file.metadata().context("reading sheet metadata")?.len();
    if len == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}
