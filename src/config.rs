// src/config.rs

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};
use tracing::debug;

use crate::mapping::{Cadence, FieldMap, SourcePath};
use crate::snapshot::{DATE_KEY, TIME_KEY};

/// Environment variable naming a YAML config file.
pub const CONFIG_ENV: &str = "CLIMATELOG_CONFIG";

/// One network sensor and the rows it contributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSource {
    pub address: String,
    pub fields: FieldMap,
}

/// FieldMaps for the remote HVAC record, one per cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteMaps {
    /// Identifier reported with missing-field warnings.
    pub source: String,
    pub realtime: FieldMap,
    pub daily: FieldMap,
}

impl Default for RemoteMaps {
    fn default() -> Self {
        Self {
            source: "carrier".to_string(),
            realtime: FieldMap::from_pairs(&[
                ("status.outdoor_temperature", "OAT"),
                ("status.mode", "Mode"),
                ("status.airflow_cfm", "CFM"),
                ("status.blower_rpm", "BlowerRPM"),
                ("status.humidifier_on", "Humidifier"),
                ("status.outdoor_unit_operational_status", "ODUStatus"),
                ("status.indoor_unit_operational_status", "IDUStatus"),
                ("status.zones[0].temperature", "Ztemp"),
                ("status.zones[0].humidity", "Zhumidity"),
                ("status.zones[0].current_activity", "Activity"),
                ("status.zones[0].fan", "Fan"),
                ("status.zones[0].conditioning", "Conditioning"),
            ]),
            daily: FieldMap::from_pairs(&[
                ("status.filter_used", "FilterUsed"),
                ("energy.periods[0].cooling", "CoolKWH"),
                ("energy.periods[0].hp_heat", "HPHeatKWH"),
                ("energy.periods[0].fan", "FanKWH"),
                ("energy.periods[0].electric_heat", "EHeatKWH"),
                ("energy.periods[0].reheat", "ReheatKWH"),
                ("energy.periods[0].fan_gas", "FanGasKWH"),
                ("energy.periods[0].loop_pump", "LoopPumpKWH"),
            ]),
        }
    }
}

/// Where each cadence's snapshots are appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogPaths {
    pub realtime: PathBuf,
    pub daily: PathBuf,
}

impl Default for LogPaths {
    fn default() -> Self {
        Self {
            realtime: PathBuf::from("CarrierRealTimeData.json"),
            daily: PathBuf::from("CarrierDailyData.json"),
        }
    }
}

/// Everything the collector needs besides the data itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub sensors: Vec<SensorSource>,
    /// Source identifier assumed for a sensor table read from a file.
    pub file_source: String,
    pub remote: RemoteMaps,
    pub logs: LogPaths,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            sensors: vec![
                SensorSource {
                    address: "192.168.0.98".to_string(),
                    fields: FieldMap::from_pairs(&[("test2", "TItemp"), ("%Humidity", "Thumidity")]),
                },
                SensorSource {
                    address: "192.168.0.100".to_string(),
                    fields: FieldMap::from_pairs(&[
                        ("Inside", "LItemp"),
                        ("Outside", "LOtemp"),
                        ("%Humidity", "Lhumidity"),
                    ]),
                },
            ],
            file_source: "192.168.0.100".to_string(),
            remote: RemoteMaps::default(),
            logs: LogPaths::default(),
        }
    }
}

impl CollectorConfig {
    /// Load and validate a YAML config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {:?}", path))?;
        let config = Self::from_yaml(&text).with_context(|| format!("loading config {:?}", path))?;
        debug!(path = %path.display(), sensors = config.sensors.len(), "loaded config");
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text).context("parsing config YAML")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configs the mapper could only fail on at runtime.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for sensor in &self.sensors {
            if !seen.insert(sensor.address.as_str()) {
                bail!("sensor {} is configured twice", sensor.address);
            }
            check_destinations(&sensor.fields, &sensor.address)?;
        }

        for (cadence, map) in [
            (Cadence::RealTime, &self.remote.realtime),
            (Cadence::Daily, &self.remote.daily),
        ] {
            for field in map.iter() {
                field.source.parse::<SourcePath>().with_context(|| {
                    format!("remote {} map entry for {}", cadence, field.dest)
                })?;
            }
            check_destinations(map, &self.remote.source)?;
        }
        Ok(())
    }

    /// The FieldMap configured for a sensor address, if any.
    pub fn field_map_for(&self, address: &str) -> Option<&FieldMap> {
        self.sensors
            .iter()
            .find(|s| s.address == address)
            .map(|s| &s.fields)
    }

    pub fn sensor_addresses(&self) -> Vec<String> {
        self.sensors.iter().map(|s| s.address.clone()).collect()
    }

    pub fn remote_map(&self, cadence: Cadence) -> &FieldMap {
        match cadence {
            Cadence::RealTime => &self.remote.realtime,
            Cadence::Daily => &self.remote.daily,
        }
    }

    pub fn log_path(&self, cadence: Cadence) -> &Path {
        match cadence {
            Cadence::RealTime => &self.logs.realtime,
            Cadence::Daily => &self.logs.daily,
        }
    }
}

fn check_destinations(map: &FieldMap, source: &str) -> Result<()> {
    for field in map.iter() {
        if field.dest.is_empty() {
            bail!("{}: empty destination for {}", source, field.source);
        }
        if field.dest == DATE_KEY || field.dest == TIME_KEY {
            bail!("{}: destination {} is reserved", source, field.dest);
        }
    }
    Ok(())
}
