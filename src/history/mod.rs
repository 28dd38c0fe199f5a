// src/history/mod.rs

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::{
    fs::{self, File, OpenOptions},
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

use crate::snapshot::Snapshot;

/// Append-only log of snapshots, one JSON object per line.
pub struct SnapshotLog {
    path: PathBuf,
}

impl SnapshotLog {
    /// Refer to the log at `path`. Nothing is touched on disk until the first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one snapshot as a single line, creating the file and its directory if needed.
    pub fn append(&self, snapshot: &Snapshot) -> Result<()> {
        let line = snapshot.to_json_line()?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating log directory {:?}", parent))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening snapshot log {:?}", &self.path))?;
        writeln!(file, "{}", line)
            .with_context(|| format!("appending to snapshot log {:?}", &self.path))?;
        info!(path = %self.path.display(), fields = snapshot.len(), "snapshot appended");
        Ok(())
    }

    /// Read every record back in file order. Blank lines are skipped; a line that is not a
    /// JSON object is logged and skipped. A missing file reads as empty.
    pub fn read_records(&self) -> Result<Vec<Map<String, Value>>> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no snapshot log yet");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("opening snapshot log {:?}", &self.path))
            }
        };

        let mut records = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line =
                line.with_context(|| format!("reading {:?} line {}", &self.path, idx + 1))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(&line) {
                Ok(Value::Object(map)) => records.push(map),
                Ok(_) => warn!(line = idx + 1, "snapshot log line is not an object; skipped"),
                Err(e) => warn!(line = idx + 1, error = %e, "unparseable snapshot log line; skipped"),
            }
        }
        Ok(records)
    }
}
