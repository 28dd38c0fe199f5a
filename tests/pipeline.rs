use anyhow::Result;
use chrono::NaiveDate;
use climatelog::{
    config::CollectorConfig,
    export,
    history::SnapshotLog,
    parse_sensor_table,
    snapshot::{self, RemoteReading, SensorReading, SnapshotAssembler, DAILY_MARKER},
    Cadence, Cell,
};
use serde_json::json;
use std::fs;
use tempfile::tempdir;

const LIVING_ROOM: &str = "NAME,MIN,MAX,AVG,LAST,COUNT
Inside,65.3,68.8,67.2,68.8,2095
Outside,36.8,56.9,45.6,50.2,2095
%Humidity,41.7,43.3,42.4,42.7,2095
Barometer,30.0,30.1,30.1,30.1,2095
";

// firmware that lost its "test2" row and gained an extra column
const OFFICE: &str = "name,min,max,avg,last,count
%Humidity,39.0,40.2,39.6,40.0,48,spare
";

fn carrier_record() -> serde_json::Value {
    json!([{
        "status": {
            "outdoor_temperature": 41,
            "mode": "heat",
            "airflow_cfm": 525,
            "blower_rpm": 700,
            "humidifier_on": true,
            "outdoor_unit_operational_status": "on",
            "indoor_unit_operational_status": "on",
            "filter_used": 37,
            "zones": [{
                "temperature": 68,
                "humidity": 40,
                "current_activity": "home",
                "fan": "off",
                "conditioning": "active_heat"
            }]
        },
        "energy": {
            "periods": [{
                "cooling": 0,
                "hp_heat": 18.25,
                "fan": 1.5,
                "electric_heat": 0,
                "reheat": 0,
                "fan_gas": 0,
                "loop_pump": 0
            }]
        }
    }])
}

fn readings() -> Result<Vec<SensorReading>> {
    Ok(vec![
        SensorReading {
            source: "192.168.0.98".to_string(),
            table: parse_sensor_table(OFFICE.as_bytes(), true)?,
        },
        SensorReading {
            source: "192.168.0.100".to_string(),
            table: parse_sensor_table(LIVING_ROOM.as_bytes(), true)?,
        },
    ])
}

#[test]
fn realtime_run_tolerates_missing_rows() -> Result<()> {
    let config = CollectorConfig::default();
    let remote = RemoteReading {
        source: "carrier".to_string(),
        record: climatelog::fetch::remote::single_system(carrier_record())?,
    };
    let now = NaiveDate::from_ymd_opt(2025, 12, 13)
        .and_then(|d| d.and_hms_opt(14, 30, 0))
        .expect("valid timestamp");

    let out = SnapshotAssembler::new(&config).assemble(
        Cadence::RealTime,
        snapshot::stamp_for(Cadence::RealTime, now),
        &readings()?,
        Some(&remote),
    );
    let snap = &out.snapshot;

    assert_eq!(snap.date(), "2025-12-13");
    assert_eq!(snap.time(), "14:30:00");
    assert_eq!(snap.get("Thumidity"), Some(&Cell::Float(40.0)));
    assert_eq!(snap.get("LItemp"), Some(&Cell::Float(68.8)));
    assert_eq!(snap.get("OAT"), Some(&Cell::Integer(41)));
    assert_eq!(snap.get("Humidifier"), Some(&Cell::Text("true".into())));
    assert!(snap.get("TItemp").is_none());

    assert_eq!(out.missing.len(), 1);
    assert_eq!(out.missing[0].source, "192.168.0.98");
    assert_eq!(out.missing[0].field, "test2");
    Ok(())
}

#[test]
fn daily_run_logs_and_exports() -> Result<()> {
    let tmp = tempdir()?;
    let mut config = CollectorConfig::default();
    config.logs.daily = tmp.path().join("CarrierDailyData.json");

    let remote = RemoteReading {
        source: "carrier".to_string(),
        record: climatelog::fetch::remote::single_system(carrier_record())?,
    };
    let just_after_midnight = NaiveDate::from_ymd_opt(2025, 12, 14)
        .and_then(|d| d.and_hms_opt(0, 0, 5))
        .expect("valid timestamp");

    let out = SnapshotAssembler::new(&config).assemble(
        Cadence::Daily,
        snapshot::stamp_for(Cadence::Daily, just_after_midnight),
        &readings()?,
        Some(&remote),
    );
    assert_eq!(out.snapshot.date(), "2025-12-13");
    assert_eq!(out.snapshot.time(), DAILY_MARKER);
    assert_eq!(out.snapshot.get("LItempMinMax"), Some(&Cell::Text("65.3-68.8".into())));
    assert_eq!(out.snapshot.get("ThumidityAvg"), Some(&Cell::Float(39.6)));
    assert_eq!(out.snapshot.get("HPHeatKWH"), Some(&Cell::Float(18.25)));
    assert_eq!(out.snapshot.get("FilterUsed"), Some(&Cell::Integer(37)));

    let log = SnapshotLog::new(config.log_path(Cadence::Daily));
    log.append(&out.snapshot)?;

    let sheet = tmp.path().join("Daily.csv");
    fs::write(
        &sheet,
        "DATE,TIME,LItempAvg,LItempMinMax,*Spread,HPHeatKWH,FilterUsed\n",
    )?;
    assert_eq!(export::export_log(&log, &sheet)?, 1);

    let text = fs::read_to_string(&sheet)?;
    let last = text.lines().last().expect("exported row");
    assert_eq!(last, "2025-12-13,Daily,67.2,65.3-68.8,,18.25,37");
    Ok(())
}
