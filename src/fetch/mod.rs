// src/fetch/mod.rs

use anyhow::{Context, Result};
use reqwest::Client;
use std::time::Duration;

/// Per-request timeout for sensors and the remote record.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client shared by every fetch of one collection run.
pub fn build_client() -> Result<Client> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("building HTTP client")
}

/// Module for pulling summary tables off the network sensors
pub mod sensors {
    use super::*;
    use crate::process::{parse_sensor_table, RawTable};
    use crate::snapshot::SensorReading;
    use futures::future::join_all;
    use once_cell::sync::Lazy;
    use regex::Regex;
    use tracing::{debug, error, info};
    use url::Url;

    /// Path every sensor serves its CSV summary on.
    pub const RAW_DATA_PATH: &str = "/getRawData";

    static IPV4_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r"^(?:(?:25[0-5]|2[0-4]\d|1\d{2}|[1-9]?\d)\.){3}(?:25[0-5]|2[0-4]\d|1\d{2}|[1-9]?\d)$",
        )
        .expect("IPv4 regex should parse")
    });

    /// Dotted-quad IPv4 check for sensor addresses given on the command line.
    pub fn is_ipv4_address(s: &str) -> bool {
        IPV4_RE.is_match(s)
    }

    pub fn sensor_url(address: &str) -> Result<Url> {
        let raw = format!("http://{}{}", address, RAW_DATA_PATH);
        Url::parse(&raw).with_context(|| format!("building sensor URL from {}", address))
    }

    /// GET one sensor's table and parse it with numeric coercion.
    pub async fn fetch_sensor_table(client: &Client, address: &str) -> Result<RawTable> {
        let url = sensor_url(address)?;
        debug!(url = %url, "fetching sensor table");
        let body = client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("GET {}", url))?
            .error_for_status()?
            .text()
            .await
            .with_context(|| format!("reading body from {}", url))?;
        parse_sensor_table(body.as_bytes(), true)
            .with_context(|| format!("parsing sensor table from {}", url))
    }

    /// Fetch every address concurrently. A sensor that cannot be read is logged and left
    /// out; the others still contribute.
    pub async fn fetch_all(client: &Client, addresses: &[String]) -> Vec<SensorReading> {
        let results = join_all(
            addresses
                .iter()
                .map(|address| async move { (address, fetch_sensor_table(client, address).await) }),
        )
        .await;

        let mut readings = Vec::with_capacity(results.len());
        for (address, result) in results {
            match result {
                Ok(table) => {
                    info!(address = %address, identifiers = table.len(), "sensor read");
                    readings.push(SensorReading {
                        source: address.clone(),
                        table,
                    });
                }
                Err(e) => error!(address = %address, "sensor read failed: {:#}", e),
            }
        }
        readings
    }
}

/// Module for loading the remote HVAC status/energy record
pub mod remote {
    use super::*;
    use anyhow::bail;
    use serde_json::Value;
    use std::path::Path;
    use tokio::fs;
    use tracing::{debug, info};

    /// Load the record from an `http(s)` URL or a local JSON file.
    pub async fn load_remote_record(client: &Client, location: &str) -> Result<Value> {
        let value: Value = if location.starts_with("http://") || location.starts_with("https://")
        {
            debug!(url = location, "fetching remote record");
            client
                .get(location)
                .send()
                .await
                .with_context(|| format!("GET {}", location))?
                .error_for_status()?
                .json()
                .await
                .with_context(|| format!("decoding JSON from {}", location))?
        } else {
            let path = Path::new(location);
            let text = fs::read_to_string(path)
                .await
                .with_context(|| format!("reading remote record {:?}", path))?;
            serde_json::from_str(&text)
                .with_context(|| format!("decoding remote record {:?}", path))?
        };
        let record = single_system(value)?;
        info!(location, "remote record loaded");
        Ok(record)
    }

    /// The service may answer with a list of systems; exactly one is supported.
    pub fn single_system(value: Value) -> Result<Value> {
        match value {
            Value::Object(_) => Ok(value),
            Value::Array(mut systems) if systems.len() == 1 => Ok(systems.remove(0)),
            Value::Array(systems) => bail!("HVAC service returned {} systems", systems.len()),
            other => bail!("remote record is not an object: {}", other),
        }
    }
}
