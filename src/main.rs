use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use climatelog::{
    config::{CollectorConfig, CONFIG_ENV},
    export,
    fetch::{self, remote, sensors},
    history::SnapshotLog,
    process,
    snapshot::{self, RemoteReading, SensorReading, SnapshotAssembler},
    Cadence,
};
use std::{
    env,
    io::{self, Write},
    path::PathBuf,
};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Collect HVAC and room-sensor snapshots into an append-only log"
)]
struct Cli {
    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,
    /// YAML config file (falls back to $CLIMATELOG_CONFIG, then the built-in maps)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Take one snapshot and append it to the cadence's log
    Collect(CollectArgs),
    /// Parse a sensor table and print it as JSON
    Parse {
        /// CSV file to read (stdin when omitted)
        file: Option<PathBuf>,
        /// Convert numeric-looking cells to numbers
        #[arg(short, long)]
        numeric: bool,
    },
    /// Append a snapshot log to a CSV sheet, in the sheet's header order
    Export {
        #[command(flatten)]
        cadence: CadenceFlags,
        /// Sheet whose first row names the columns
        #[arg(long)]
        sheet: PathBuf,
        /// Log to read instead of the cadence's configured log
        #[arg(long)]
        log: Option<PathBuf>,
    },
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct CadenceFlags {
    /// Real-time fields (LAST observations)
    #[arg(short = 'R', long)]
    realtime: bool,
    /// Daily fields (AVG and MIN-MAX)
    #[arg(short = 'D', long)]
    daily: bool,
}

impl CadenceFlags {
    fn cadence(&self) -> Cadence {
        if self.daily {
            Cadence::Daily
        } else {
            Cadence::RealTime
        }
    }
}

#[derive(Args)]
struct CollectArgs {
    #[command(flatten)]
    cadence: CadenceFlags,
    /// Read one sensor table from a file instead of the network
    #[arg(short, long)]
    file: Option<PathBuf>,
    /// Sensor address the file stands in for
    #[arg(long, requires = "file")]
    source: Option<String>,
    /// Only poll this sensor
    #[arg(short, long, value_parser = parse_ipv4, conflicts_with = "file")]
    ipaddr: Option<String>,
    /// Remote HVAC record: a JSON file or an http(s) URL
    #[arg(short, long)]
    remote: Option<String>,
    /// Print the snapshot instead of appending it
    #[arg(long)]
    dry_run: bool,
}

fn parse_ipv4(s: &str) -> Result<String, String> {
    if sensors::is_ipv4_address(s) {
        Ok(s.to_string())
    } else {
        Err(format!("`{}` is not an IPv4 address", s))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ─── init logging ────────────────────────────────────────────────
    let default_filter = if cli.debug { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .init();
    debug!("debug mode enabled");

    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Command::Collect(args) => collect(&config, args).await,
        Command::Parse { file, numeric } => parse(file, numeric),
        Command::Export {
            cadence,
            sheet,
            log,
        } => {
            let log_path = log.unwrap_or_else(|| config.log_path(cadence.cadence()).to_path_buf());
            let log = SnapshotLog::new(log_path);
            let appended = export::export_log(&log, &sheet)?;
            info!(appended, sheet = %sheet.display(), "export finished");
            Ok(())
        }
    }
}

fn load_config(flag: Option<&PathBuf>) -> Result<CollectorConfig> {
    let path = match flag {
        Some(p) => Some(p.clone()),
        None => env::var(CONFIG_ENV).ok().map(PathBuf::from),
    };
    match path {
        Some(p) => CollectorConfig::load(&p),
        None => {
            debug!("no config given; using built-in field maps");
            Ok(CollectorConfig::default())
        }
    }
}

async fn collect(config: &CollectorConfig, args: CollectArgs) -> Result<()> {
    let cadence = args.cadence.cadence();
    info!(cadence = %cadence, "running collection");

    let client = fetch::build_client()?;

    // the remote record is fetched while the sensors are read
    let sensor_task = async {
        if let Some(file) = &args.file {
            let source = args
                .source
                .clone()
                .unwrap_or_else(|| config.file_source.clone());
            let table = process::parse_sensor_file(file, true)?;
            Ok::<_, anyhow::Error>(vec![SensorReading { source, table }])
        } else {
            let addresses = match &args.ipaddr {
                Some(ip) => vec![ip.clone()],
                None => config.sensor_addresses(),
            };
            Ok(sensors::fetch_all(&client, &addresses).await)
        }
    };
    let remote_task = async {
        match &args.remote {
            Some(location) => remote::load_remote_record(&client, location)
                .await
                .map(|record| {
                    Some(RemoteReading {
                        source: config.remote.source.clone(),
                        record,
                    })
                }),
            None => Ok(None),
        }
    };
    let (sensor_readings, remote_reading) = tokio::join!(sensor_task, remote_task);
    let sensor_readings = sensor_readings?;
    let remote_reading = remote_reading.context("loading remote HVAC record")?;

    if sensor_readings.is_empty() && remote_reading.is_none() {
        bail!("no sensor or remote data could be read");
    }

    let stamp = snapshot::stamp_for(cadence, Local::now().naive_local());
    let assembled = SnapshotAssembler::new(config).assemble(
        cadence,
        stamp,
        &sensor_readings,
        remote_reading.as_ref(),
    );
    if !assembled.missing.is_empty() {
        warn!(
            missing = assembled.missing.len(),
            "snapshot written without some fields"
        );
    }

    if args.dry_run {
        let mut out = io::stdout().lock();
        writeln!(out, "{}", assembled.snapshot.to_json_line()?)?;
        return Ok(());
    }

    let log = SnapshotLog::new(config.log_path(cadence));
    log.append(&assembled.snapshot)?;
    Ok(())
}

fn parse(file: Option<PathBuf>, numeric: bool) -> Result<()> {
    let table = match file {
        Some(path) => {
            debug!(path = %path.display(), "reading CSV data");
            process::parse_sensor_file(&path, numeric)?
        }
        None => {
            debug!("reading CSV data from stdin");
            process::parse_sensor_table(io::stdin().lock(), numeric)
                .context("parsing sensor table from stdin")?
        }
    };
    let mut out = io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, &table)?;
    writeln!(out)?;
    Ok(())
}
