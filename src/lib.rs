pub mod config;
pub mod export;
pub mod fetch;
pub mod history;
pub mod mapping;
pub mod process;
pub mod snapshot;

pub use config::CollectorConfig;
pub use mapping::{map_remote_record, map_sensor_table, Cadence, FieldMap, FieldMapping, MissingField};
pub use process::{parse_sensor_table, Cell, RawTable, Row, RowEntry};
pub use snapshot::{Assembled, RemoteReading, SensorReading, Snapshot, SnapshotAssembler};
