use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::{
    collections::{btree_map::Entry, BTreeMap},
    sync::Arc,
};

use super::cell::Cell;

/// A single data row, keyed by the header that was in effect when it was read.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Shared with every other row parsed under the same header state.
    columns: Arc<[String]>,
    /// Field text as read, before any coercion.
    text: Vec<String>,
    values: Vec<Cell>,
}

impl Row {
    pub(crate) fn new(columns: Arc<[String]>, text: Vec<String>, values: Vec<Cell>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        debug_assert_eq!(text.len(), values.len());
        Self {
            columns,
            text,
            values,
        }
    }

    fn position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(column))
    }

    /// Look up a cell by column name (case-insensitive; headers are stored uppercase).
    pub fn get(&self, column: &str) -> Option<&Cell> {
        self.position(column).and_then(|i| self.values.get(i))
    }

    /// The field text exactly as it appeared in the input (trimmed), e.g. `65.30`.
    pub fn text(&self, column: &str) -> Option<&str> {
        self.position(column)
            .and_then(|i| self.text.get(i))
            .map(String::as_str)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Cell)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (column, cell) in self.iter() {
            map.serialize_entry(column, cell)?;
        }
        map.end()
    }
}

/// What an identifier resolves to: one row, or every row that carried it, in read order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RowEntry {
    Single(Row),
    Repeated(Vec<Row>),
}

impl RowEntry {
    fn push(&mut self, row: Row) {
        let previous = std::mem::replace(self, RowEntry::Repeated(Vec::new()));
        *self = match previous {
            RowEntry::Single(first) => RowEntry::Repeated(vec![first, row]),
            RowEntry::Repeated(mut rows) => {
                rows.push(row);
                RowEntry::Repeated(rows)
            }
        };
    }

    pub fn rows(&self) -> &[Row] {
        match self {
            RowEntry::Single(row) => std::slice::from_ref(row),
            RowEntry::Repeated(rows) => rows,
        }
    }

    pub fn is_repeated(&self) -> bool {
        matches!(self, RowEntry::Repeated(_))
    }
}

/// Sensor summary table: identifier (`NAME` column) → row(s), kept in first-seen order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    entries: BTreeMap<String, RowEntry>,
    order: Vec<String>,
    /// Effective header after the whole input was read, including any `EXTRA_n` columns.
    columns: Vec<String>,
}

impl RawTable {
    pub(crate) fn insert(&mut self, identifier: String, row: Row) {
        match self.entries.entry(identifier) {
            Entry::Vacant(slot) => {
                self.order.push(slot.key().clone());
                slot.insert(RowEntry::Single(row));
            }
            Entry::Occupied(mut slot) => slot.get_mut().push(row),
        }
    }

    pub(crate) fn set_columns(&mut self, columns: Vec<String>) {
        self.columns = columns;
    }

    pub fn get(&self, identifier: &str) -> Option<&RowEntry> {
        self.entries.get(identifier)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Identifiers in the order they first appeared.
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RowEntry)> {
        self.order
            .iter()
            .filter_map(|k| self.entries.get(k).map(|v| (k.as_str(), v)))
    }

    /// Number of distinct identifiers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total rows across all identifiers.
    pub fn row_count(&self) -> usize {
        self.entries.values().map(|e| e.rows().len()).sum()
    }
}

impl Serialize for RawTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (identifier, entry) in self.iter() {
            map.serialize_entry(identifier, entry)?;
        }
        map.end()
    }
}
