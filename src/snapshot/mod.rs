// src/snapshot/mod.rs

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, error, info};

use crate::config::CollectorConfig;
use crate::mapping::{self, Cadence, MissingField};
use crate::process::{Cell, RawTable};

pub const DATE_KEY: &str = "DATE";
pub const TIME_KEY: &str = "TIME";
/// `TIME` value of every daily snapshot.
pub const DAILY_MARKER: &str = "Daily";

/// One flat, timestamped record per collection run. Always carries `DATE` and `TIME`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Snapshot {
    fields: BTreeMap<String, Cell>,
}

impl Snapshot {
    /// An empty snapshot stamped for `cadence`: `DATE` is `at`'s date, `TIME` is
    /// `HH:MM:SS` for real-time and [`DAILY_MARKER`] for daily.
    pub fn stamped(cadence: Cadence, at: NaiveDateTime) -> Self {
        let time = match cadence {
            Cadence::RealTime => at.format("%H:%M:%S").to_string(),
            Cadence::Daily => DAILY_MARKER.to_string(),
        };
        let mut fields = BTreeMap::new();
        fields.insert(DATE_KEY.to_string(), Cell::Text(at.format("%Y-%m-%d").to_string()));
        fields.insert(TIME_KEY.to_string(), Cell::Text(time));
        Self { fields }
    }

    /// Merge mapped values; a key already present is overwritten. `DATE`/`TIME` are kept.
    pub fn merge(&mut self, values: BTreeMap<String, Cell>) {
        for (key, value) in values {
            if key == DATE_KEY || key == TIME_KEY {
                error!(key = %key, "mapped value would overwrite the snapshot stamp; dropped");
                continue;
            }
            if let Some(previous) = self.fields.insert(key.clone(), value) {
                debug!(key = %key, previous = %previous, "destination overwritten");
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Cell> {
        self.fields.get(key)
    }

    pub fn date(&self) -> &str {
        match self.fields.get(DATE_KEY) {
            Some(Cell::Text(s)) => s,
            _ => "",
        }
    }

    pub fn time(&self) -> &str {
        match self.fields.get(TIME_KEY) {
            Some(Cell::Text(s)) => s,
            _ => "",
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Cell)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of fields, `DATE` and `TIME` included.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Single-line JSON form written to the snapshot log.
    pub fn to_json_line(&self) -> Result<String> {
        serde_json::to_string(self).context("serializing snapshot")
    }
}

/// A parsed sensor table and the address it came from.
#[derive(Debug, Clone)]
pub struct SensorReading {
    pub source: String,
    pub table: RawTable,
}

/// The remote HVAC record and the identifier to report it under.
#[derive(Debug, Clone)]
pub struct RemoteReading {
    pub source: String,
    pub record: Value,
}

/// A finished snapshot plus every field that had to be left out.
#[derive(Debug, Clone)]
pub struct Assembled {
    pub snapshot: Snapshot,
    pub missing: Vec<MissingField>,
}

/// Runs the field mapper over every source of one collection run.
pub struct SnapshotAssembler<'a> {
    config: &'a CollectorConfig,
}

impl<'a> SnapshotAssembler<'a> {
    pub fn new(config: &'a CollectorConfig) -> Self {
        Self { config }
    }

    /// Sensors are merged in the order given, then the remote record; later sources win on
    /// destination collisions. A sensor address with no FieldMap contributes nothing.
    #[tracing::instrument(level = "info", skip_all, fields(cadence = %cadence, sensors = sensors.len()))]
    pub fn assemble(
        &self,
        cadence: Cadence,
        at: NaiveDateTime,
        sensors: &[SensorReading],
        remote: Option<&RemoteReading>,
    ) -> Assembled {
        let mut snapshot = Snapshot::stamped(cadence, at);
        let mut missing = Vec::new();

        for reading in sensors {
            let Some(map) = self.config.field_map_for(&reading.source) else {
                error!(source = %reading.source, "no field map exists for sensor");
                continue;
            };
            let mapped = mapping::map_sensor_table(map, &reading.table, cadence, &reading.source);
            debug!(source = %reading.source, fields = mapped.values.len(), "sensor mapped");
            snapshot.merge(mapped.values);
            missing.extend(mapped.missing);
        }

        if let Some(remote) = remote {
            let map = self.config.remote_map(cadence);
            let mapped = mapping::map_remote_record(map, &remote.record, &remote.source);
            debug!(source = %remote.source, fields = mapped.values.len(), "remote record mapped");
            snapshot.merge(mapped.values);
            missing.extend(mapped.missing);
        }

        info!(
            date = snapshot.date(),
            time = snapshot.time(),
            fields = snapshot.len(),
            missing = missing.len(),
            "snapshot assembled"
        );
        Assembled { snapshot, missing }
    }
}

/// Timestamp a run should be stamped with. Daily figures describe the day that just ended,
/// so a daily run is stamped one day back.
pub fn stamp_for(cadence: Cadence, now: NaiveDateTime) -> NaiveDateTime {
    match cadence {
        Cadence::RealTime => now,
        Cadence::Daily => now - Duration::days(1),
    }
}
