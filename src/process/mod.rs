// src/process/mod.rs
use anyhow::{Context, Result};
use csv::{ReaderBuilder, Trim};

use std::{fs::File, io::Read, path::Path, sync::Arc};
use tracing::{debug, trace};

pub mod cell;
pub mod raw_table;

pub use cell::Cell;
pub use raw_table::{RawTable, Row, RowEntry};

/// Column whose value keys the table.
pub const NAME_COLUMN: &str = "NAME";

/// Parse a sensor summary table: a header row followed by comma-separated data rows.
///
/// - Header names are trimmed and uppercased. Without a `NAME` column, column 0 becomes `NAME`.
/// - Short rows are padded with empty cells.
/// - Long rows grow the header with `EXTRA_0`, `EXTRA_1`, … for the rest of this parse;
///   rows read before the growth keep their narrower header.
/// - Rows with an empty identifier are keyed `<unnamed_row_N>`.
/// - A repeated identifier turns into an ordered list of rows.
///
/// Numeric coercion is applied only when `coerce_numbers` is set; otherwise every cell is text.
/// Only a stream that cannot be read or decoded is an error.
#[tracing::instrument(level = "debug", skip(reader))]
pub fn parse_sensor_table<R: Read>(reader: R, coerce_numbers: bool) -> Result<RawTable> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true) // ragged rows are handled below, not rejected
        .trim(Trim::All)
        .from_reader(reader);
    let mut records = rdr.records();

    let mut table = RawTable::default();

    // 1) header
    let header_record = match records.next() {
        Some(result) => result.context("reading sensor table header")?,
        None => {
            debug!("empty sensor table input");
            return Ok(table);
        }
    };
    let mut header: Vec<String> = header_record
        .iter()
        .map(|h| h.trim().to_uppercase())
        .collect();

    let name_idx = match header.iter().position(|h| h == NAME_COLUMN) {
        Some(i) => {
            debug!(column = i, "found NAME column");
            i
        }
        None => {
            debug!("NAME not found - forcing to column 0");
            if let Some(first) = header.first_mut() {
                *first = NAME_COLUMN.to_string();
            }
            0
        }
    };
    let declared_width = header.len();
    let mut columns: Arc<[String]> = Arc::from(header.clone());

    // 2) data rows
    for (idx, result) in records.enumerate() {
        let record = result
            .with_context(|| format!("decoding sensor table at data row {}", idx + 1))?;
        trace!(row = idx + 1, fields = record.len(), "read row");

        let mut values: Vec<String> = record.iter().map(|s| s.trim().to_string()).collect();
        if values.len() < header.len() {
            values.resize(header.len(), String::new());
        } else if values.len() > header.len() {
            while header.len() < values.len() {
                let n = header.len() - declared_width;
                header.push(format!("EXTRA_{}", n));
            }
            debug!(row = idx + 1, width = header.len(), "header extended");
            columns = Arc::from(header.clone());
        }

        let identifier = match values.get(name_idx).map(|s| s.trim()) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("<unnamed_row_{}>", table.len() + 1),
        };

        let cells = values
            .iter()
            .map(|v| {
                if coerce_numbers {
                    Cell::coerce(v)
                } else {
                    Cell::Text(v.clone())
                }
            })
            .collect();

        table.insert(identifier, Row::new(Arc::clone(&columns), values, cells));
    }

    debug!(
        identifiers = table.len(),
        rows = table.row_count(),
        "parsed sensor table"
    );
    table.set_columns(header);
    Ok(table)
}

/// Open `path` and parse it with [`parse_sensor_table`].
pub fn parse_sensor_file<P: AsRef<Path>>(path: P, coerce_numbers: bool) -> Result<RawTable> {
    let file = File::open(&path)
        .with_context(|| format!("opening sensor table {:?}", path.as_ref()))?;
    parse_sensor_table(file, coerce_numbers)
        .with_context(|| format!("parsing sensor table {:?}", path.as_ref()))
}
