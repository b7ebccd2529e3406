use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "bitaxe-logger",
    version,
    about = "Logs Bitaxe telemetry and probe temperatures to InfluxDB and a CSV file"
)]
pub struct Cli {
    /// TOML file overriding the built-in settings.
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Connection configuration document (JSON).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// CSV log file the samples are appended to.
    #[arg(long)]
    pub log: Option<PathBuf>,

    /// JSON file standing in for the device's non-volatile storage.
    #[arg(long, default_value = "bitaxe-logger-store.json")]
    pub store: PathBuf,

    /// 1-Wire device ids of the Q1, Q2 and L probes, in that order.
    #[arg(long, value_delimiter = ',', num_args = 1..=3)]
    pub probes: Vec<String>,

    /// Report fixed probe temperatures instead of reading 1-Wire.
    #[arg(long, default_value_t = false)]
    pub simulate: bool,

    /// Poll interval in seconds.
    #[arg(long)]
    pub interval: Option<u64>,

    /// Stop after this many ticks instead of running forever.
    #[arg(long)]
    pub ticks: Option<u64>,
}
