// src/mapping/mod.rs

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{collections::BTreeMap, fmt};
use tracing::{debug, warn};

use crate::process::{Cell, RawTable, Row, RowEntry};

pub mod path;

pub use path::{Segment, SourcePath};

/// Observation columns read out of a sensor table.
pub const LAST_COLUMN: &str = "LAST";
pub const AVG_COLUMN: &str = "AVG";
pub const MIN_COLUMN: &str = "MIN";
pub const MAX_COLUMN: &str = "MAX";

/// Suffixes of the two keys a daily sensor mapping derives from one destination.
pub const AVG_SUFFIX: &str = "Avg";
pub const MIN_MAX_SUFFIX: &str = "MinMax";

/// Which snapshot variant is being produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    /// Frequent snapshot of the `LAST` observation.
    RealTime,
    /// Once-a-day snapshot of AVG and MIN–MAX.
    Daily,
}

impl Cadence {
    pub fn as_str(&self) -> &str {
        match self {
            Cadence::RealTime => "realtime",
            Cadence::Daily => "daily",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "realtime" | "real-time" | "real_time" => Some(Cadence::RealTime),
            "daily" => Some(Cadence::Daily),
            _ => None,
        }
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `source → destination` pair. Written as a two-element list in config files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct FieldMapping {
    /// Row identifier (sensor tables) or nested path (remote records).
    pub source: String,
    pub dest: String,
}

impl From<(String, String)> for FieldMapping {
    fn from((source, dest): (String, String)) -> Self {
        Self { source, dest }
    }
}

impl From<FieldMapping> for (String, String) {
    fn from(m: FieldMapping) -> Self {
        (m.source, m.dest)
    }
}

/// Ordered list of field mappings. Static configuration; never mutated after load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMap(Vec<FieldMapping>);

impl FieldMap {
    pub fn new(mappings: Vec<FieldMapping>) -> Self {
        Self(mappings)
    }

    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self(
            pairs
                .iter()
                .map(|(source, dest)| FieldMapping {
                    source: source.to_string(),
                    dest: dest.to_string(),
                })
                .collect(),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldMapping> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Why a mapped field could not be produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissingReason {
    /// No row carries the identifier.
    AbsentRow,
    /// Several rows carry the identifier, so none of them is taken.
    AmbiguousRow { rows: usize },
    /// The row exists but has no such column.
    AbsentColumn(String),
    /// A nested object has no such key.
    AbsentKey(String),
    IndexOutOfRange { index: usize, len: usize },
    /// A path step tried to descend into a scalar, or used a non-numeric key on a list.
    NotIndexable(String),
    /// The path ends on a list, an object or `null`.
    NotScalar,
    InvalidPath(String),
}

impl fmt::Display for MissingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingReason::AbsentRow => f.write_str("no such row"),
            MissingReason::AmbiguousRow { rows } => {
                write!(f, "identifier appears on {} rows", rows)
            }
            MissingReason::AbsentColumn(c) => write!(f, "row has no {} column", c),
            MissingReason::AbsentKey(k) => write!(f, "no key `{}`", k),
            MissingReason::IndexOutOfRange { index, len } => {
                write!(f, "index {} out of range (len {})", index, len)
            }
            MissingReason::NotIndexable(s) => write!(f, "cannot descend into `{}`", s),
            MissingReason::NotScalar => f.write_str("value is not a scalar"),
            MissingReason::InvalidPath(e) => write!(f, "invalid path: {}", e),
        }
    }
}

/// A destination that was skipped, and where it should have come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingField {
    /// Source identifier, e.g. a sensor address.
    pub source: String,
    /// The field as named in the FieldMap.
    pub field: String,
    pub dest: String,
    pub reason: MissingReason,
}

impl fmt::Display for MissingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "device {} is missing {} ({} → {})",
            self.source, self.field, self.reason, self.dest
        )
    }
}

/// Output of one mapper pass: the values found plus every field that was skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mapped {
    pub values: BTreeMap<String, Cell>,
    pub missing: Vec<MissingField>,
}

impl Mapped {
    fn skip(&mut self, source: &str, field: &str, dest: String, reason: MissingReason) {
        warn!(source, field, dest = %dest, reason = %reason, "device is missing field");
        self.missing.push(MissingField {
            source: source.to_string(),
            field: field.to_string(),
            dest,
            reason,
        });
    }

    fn column(&mut self, source: &str, field: &str, row: &Row, column: &str, dest: String) {
        match row.get(column) {
            Some(cell) => {
                debug!(source, field, dest = %dest, value = %cell, "mapped field");
                self.values.insert(dest, cell.clone());
            }
            None => self.skip(
                source,
                field,
                dest,
                MissingReason::AbsentColumn(column.to_string()),
            ),
        }
    }
}

/// Map rows of a parsed sensor table.
///
/// Real-time stores the `LAST` cell under `dest`. Daily stores `AVG` under `<dest>Avg` and
/// `"<MIN>-<MAX>"` under `<dest>MinMax`, joined from the field text as read. An identifier
/// that appears on more than one row is reported missing.
pub fn map_sensor_table(
    map: &FieldMap,
    table: &RawTable,
    cadence: Cadence,
    source: &str,
) -> Mapped {
    let mut out = Mapped::default();

    for field in map.iter() {
        let row = match table.get(&field.source) {
            Some(RowEntry::Single(row)) => row,
            Some(RowEntry::Repeated(rows)) => {
                let reason = MissingReason::AmbiguousRow { rows: rows.len() };
                out.skip(source, &field.source, field.dest.clone(), reason);
                continue;
            }
            None => {
                out.skip(source, &field.source, field.dest.clone(), MissingReason::AbsentRow);
                continue;
            }
        };

        match cadence {
            Cadence::RealTime => {
                out.column(source, &field.source, row, LAST_COLUMN, field.dest.clone());
            }
            Cadence::Daily => {
                let avg_dest = format!("{}{}", field.dest, AVG_SUFFIX);
                out.column(source, &field.source, row, AVG_COLUMN, avg_dest);

                let range_dest = format!("{}{}", field.dest, MIN_MAX_SUFFIX);
                match (row.text(MIN_COLUMN), row.text(MAX_COLUMN)) {
                    (Some(min), Some(max)) => {
                        let range = Cell::Text(format!("{}-{}", min, max));
                        debug!(source, field = %field.source, dest = %range_dest, value = %range, "mapped field");
                        out.values.insert(range_dest, range);
                    }
                    (None, _) => out.skip(
                        source,
                        &field.source,
                        range_dest,
                        MissingReason::AbsentColumn(MIN_COLUMN.to_string()),
                    ),
                    (_, None) => out.skip(
                        source,
                        &field.source,
                        range_dest,
                        MissingReason::AbsentColumn(MAX_COLUMN.to_string()),
                    ),
                }
            }
        }
    }

    out
}

/// Map values out of a nested remote-status record. Every cadence reads the value at the
/// path as-is; the cadence only decides which FieldMap is passed in.
pub fn map_remote_record(map: &FieldMap, record: &Value, source: &str) -> Mapped {
    let mut out = Mapped::default();

    for field in map.iter() {
        let path: SourcePath = match field.source.parse() {
            Ok(p) => p,
            Err(e) => {
                out.skip(
                    source,
                    &field.source,
                    field.dest.clone(),
                    MissingReason::InvalidPath(e.to_string()),
                );
                continue;
            }
        };

        let cell = path
            .resolve(record)
            .and_then(|value| Cell::from_json(value).ok_or(MissingReason::NotScalar));
        match cell {
            Ok(cell) => {
                debug!(source, field = %field.source, dest = %field.dest, value = %cell, "mapped field");
                out.values.insert(field.dest.clone(), cell);
            }
            Err(reason) => out.skip(source, &field.source, field.dest.clone(), reason),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::parse_sensor_table;
    use anyhow::Result;
    use serde_json::json;

    const TABLE: &str = "NAME,MIN,MAX,AVG,LAST,COUNT
Inside,65.3,68.8,67.2,68.8,2095
Outside,36.8,56.9,45.6,50.2,2095
%Humidity,41.7,43.3,42.4,42.7,2095
Barometer,30.0,30.1,30.1,30.1,2095
";

    #[test]
    fn test_realtime_reads_last() -> Result<()> {
        let table = parse_sensor_table(TABLE.as_bytes(), true)?;
        let map = FieldMap::from_pairs(&[("Inside", "LItemp")]);

        let mapped = map_sensor_table(&map, &table, Cadence::RealTime, "192.168.0.100");
        assert_eq!(
            mapped.values,
            BTreeMap::from([("LItemp".to_string(), Cell::Float(68.8))])
        );
        assert!(mapped.missing.is_empty());
        Ok(())
    }

    #[test]
    fn test_daily_derives_avg_and_range() -> Result<()> {
        let table = parse_sensor_table(TABLE.as_bytes(), true)?;
        let map = FieldMap::from_pairs(&[("Inside", "LItemp"), ("Barometer", "Lbaro")]);

        let mapped = map_sensor_table(&map, &table, Cadence::Daily, "192.168.0.100");
        assert_eq!(mapped.values.get("LItempAvg"), Some(&Cell::Float(67.2)));
        assert_eq!(
            mapped.values.get("LItempMinMax"),
            Some(&Cell::Text("65.3-68.8".into()))
        );
        assert_eq!(
            mapped.values.get("LbaroMinMax"),
            Some(&Cell::Text("30.0-30.1".into()))
        );
        assert!(!mapped.values.contains_key("LItemp"));
        assert_eq!(mapped.values.len(), 4);
        Ok(())
    }

    #[test]
    fn test_daily_range_without_coercion_is_verbatim() -> Result<()> {
        let table = parse_sensor_table(TABLE.as_bytes(), false)?;
        let map = FieldMap::from_pairs(&[("Barometer", "Lbaro")]);
        let mapped = map_sensor_table(&map, &table, Cadence::Daily, "file");
        assert_eq!(
            mapped.values.get("LbaroMinMax"),
            Some(&Cell::Text("30.0-30.1".into()))
        );
        assert_eq!(mapped.values.get("LbaroAvg"), Some(&Cell::Text("30.1".into())));
        Ok(())
    }

    #[test]
    fn test_absent_row_is_skipped_not_fatal() -> Result<()> {
        let table = parse_sensor_table(TABLE.as_bytes(), true)?;
        let map = FieldMap::from_pairs(&[
            ("Inside", "LItemp"),
            ("test2", "TItemp"),
            ("%Humidity", "Lhumidity"),
        ]);

        let mapped = map_sensor_table(&map, &table, Cadence::RealTime, "192.168.0.98");
        assert_eq!(mapped.values.len(), 2);
        assert_eq!(mapped.values.get("LItemp"), Some(&Cell::Float(68.8)));
        assert_eq!(mapped.values.get("Lhumidity"), Some(&Cell::Float(42.7)));
        assert!(!mapped.values.contains_key("TItemp"));

        assert_eq!(mapped.missing.len(), 1);
        let miss = &mapped.missing[0];
        assert_eq!(miss.source, "192.168.0.98");
        assert_eq!(miss.field, "test2");
        assert_eq!(miss.reason, MissingReason::AbsentRow);
        Ok(())
    }

    #[test]
    fn test_absent_column_is_skipped() -> Result<()> {
        let table = parse_sensor_table("NAME,AVG\nInside,67.2\nOutside,45.6\n".as_bytes(), true)?;
        let map = FieldMap::from_pairs(&[("Inside", "LItemp"), ("Outside", "LOtemp")]);

        let realtime = map_sensor_table(&map, &table, Cadence::RealTime, "file");
        assert!(realtime.values.is_empty());
        assert_eq!(realtime.missing.len(), 2);
        assert_eq!(
            realtime.missing[0].reason,
            MissingReason::AbsentColumn("LAST".into())
        );

        // daily still gets the averages even though the ranges are gone
        let daily = map_sensor_table(&map, &table, Cadence::Daily, "file");
        assert_eq!(daily.values.get("LItempAvg"), Some(&Cell::Float(67.2)));
        assert_eq!(daily.values.get("LOtempAvg"), Some(&Cell::Float(45.6)));
        assert!(!daily.values.contains_key("LItempMinMax"));
        assert_eq!(daily.missing.len(), 2);
        Ok(())
    }

    #[test]
    fn test_repeated_identifier_is_reported_missing() -> Result<()> {
        let input = "NAME,MIN,MAX,AVG,LAST\n\
Inside,65.0,68.2,67.0,68.1\n\
Outside,36.8,56.9,45.6,50.2\n\
Inside,65.1,69.0,67.4,68.9\n";
        let table = parse_sensor_table(input.as_bytes(), true)?;
        let map = FieldMap::from_pairs(&[("Inside", "LItemp"), ("Outside", "LOtemp")]);

        for cadence in [Cadence::RealTime, Cadence::Daily] {
            let mapped = map_sensor_table(&map, &table, cadence, "192.168.0.100");
            assert!(mapped.values.keys().all(|k| !k.starts_with("LItemp")));
            assert!(mapped.values.keys().any(|k| k.starts_with("LOtemp")));
            assert_eq!(mapped.missing.len(), 1);
            assert_eq!(mapped.missing[0].field, "Inside");
            assert_eq!(mapped.missing[0].dest, "LItemp");
            assert_eq!(mapped.missing[0].reason, MissingReason::AmbiguousRow { rows: 2 });
        }
        Ok(())
    }

    #[test]
    fn test_daily_range_keeps_source_text() -> Result<()> {
        let table =
            parse_sensor_table("NAME,MIN,MAX,AVG\nInside,65.30,68.80,67.20\n".as_bytes(), true)?;
        let map = FieldMap::from_pairs(&[("Inside", "LItemp")]);
        let mapped = map_sensor_table(&map, &table, Cadence::Daily, "192.168.0.100");
        assert_eq!(
            mapped.values.get("LItempMinMax"),
            Some(&Cell::Text("65.30-68.80".into()))
        );
        assert_eq!(mapped.values.get("LItempAvg"), Some(&Cell::Float(67.2)));
        Ok(())
    }

    fn remote_record() -> Value {
        json!({
            "status": {
                "outdoor_temperature": 52,
                "airflow_cfm": 450,
                "blower_rpm": 610,
                "humidifier_on": false,
                "zones": [
                    {"temperature": 68, "humidity": 41, "current_activity": "home", "fan": "off"}
                ]
            },
            "energy": {
                "periods": [{"cooling": 0, "hp_heat": 12.5, "fan": 1.25}]
            }
        })
    }

    #[test]
    fn test_remote_record_mapping() {
        let map = FieldMap::from_pairs(&[
            ("status.outdoor_temperature", "OAT"),
            ("status.humidifier_on", "Humidifier"),
            ("status.zones[0].temperature", "Ztemp"),
            ("status.zones[0].current_activity", "Activity"),
            ("energy.periods[0].hp_heat", "HPHeatKWH"),
        ]);

        let mapped = map_remote_record(&map, &remote_record(), "remote");
        assert!(mapped.missing.is_empty());
        assert_eq!(mapped.values.get("OAT"), Some(&Cell::Integer(52)));
        assert_eq!(mapped.values.get("Humidifier"), Some(&Cell::Text("false".into())));
        assert_eq!(mapped.values.get("Ztemp"), Some(&Cell::Integer(68)));
        assert_eq!(mapped.values.get("Activity"), Some(&Cell::Text("home".into())));
        assert_eq!(mapped.values.get("HPHeatKWH"), Some(&Cell::Float(12.5)));
    }

    #[test]
    fn test_remote_missing_fields_are_skipped() {
        let mut record = remote_record();
        record["status"]
            .as_object_mut()
            .expect("status object")
            .remove("humidifier_on");

        let map = FieldMap::from_pairs(&[
            ("status.outdoor_temperature", "OAT"),
            ("status.humidifier_on", "Humidifier"),
            ("status.zones[1].temperature", "Z2temp"),
            ("status.zones", "Zones"),
            ("status.zones[0", "Broken"),
            ("status.blower_rpm", "BlowerRPM"),
        ]);

        let mapped = map_remote_record(&map, &record, "remote");
        assert_eq!(mapped.values.len(), 2);
        assert_eq!(mapped.values.get("OAT"), Some(&Cell::Integer(52)));
        assert_eq!(mapped.values.get("BlowerRPM"), Some(&Cell::Integer(610)));

        let reasons: Vec<_> = mapped.missing.iter().map(|m| m.reason.clone()).collect();
        assert_eq!(reasons.len(), 4);
        assert_eq!(reasons[0], MissingReason::AbsentKey("humidifier_on".into()));
        assert_eq!(reasons[1], MissingReason::IndexOutOfRange { index: 1, len: 1 });
        assert_eq!(reasons[2], MissingReason::NotScalar);
        assert!(matches!(reasons[3], MissingReason::InvalidPath(_)));
    }

    #[test]
    fn test_field_map_from_yaml_pairs() -> Result<()> {
        let map: FieldMap = serde_yaml::from_str("- [Inside, LItemp]\n- ['%Humidity', Lhumidity]\n")?;
        assert_eq!(map, FieldMap::from_pairs(&[("Inside", "LItemp"), ("%Humidity", "Lhumidity")]));
        Ok(())
    }

    #[test]
    fn test_cadence_names() {
        assert_eq!(Cadence::from_str("Daily"), Some(Cadence::Daily));
        assert_eq!(Cadence::from_str("real-time"), Some(Cadence::RealTime));
        assert_eq!(Cadence::from_str("weekly"), None);
        assert_eq!(Cadence::RealTime.to_string(), "realtime");
    }
}
