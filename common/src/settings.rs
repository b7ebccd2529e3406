use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// How the scheduler spaces ticks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cadence {
    /// Sleep the full interval after every tick. Ticks drift by the time
    /// spent inside them.
    #[default]
    FixedDelay,
    /// Sleep only what is left of the interval so ticks start on a fixed
    /// period.
    FixedRate,
}

/// Firmware behaviour knobs.
///
/// The defaults are the values the device ships with; the desktop runner can
/// override them from a TOML file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub config_path: PathBuf,
    pub log_path: PathBuf,

    pub poll_interval_secs: u64,
    pub cadence: Cadence,

    pub reconnect_max_attempts: u32,
    pub reconnect_spacing_ms: u32,
    pub refresh_reconnect_budget_each_tick: bool,
    /// `None` keeps trying forever.
    pub startup_connect_max_attempts: Option<u32>,

    pub fetch_timeout_secs: u64,
    pub write_timeout_secs: u64,

    pub utc_offset_secs: i32,

    pub measurement: String,
    pub device_tag: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("/sdcard/config.json"),
            log_path: PathBuf::from("/sdcard/log.csv"),
            poll_interval_secs: 30,
            cadence: Cadence::FixedDelay,
            reconnect_max_attempts: 5,
            reconnect_spacing_ms: 1000,
            refresh_reconnect_budget_each_tick: true,
            startup_connect_max_attempts: None,
            fetch_timeout_secs: 10,
            write_timeout_secs: 5,
            utc_offset_secs: 9 * 3600,
            measurement: "BitaxeLogging".into(),
            device_tag: "bitaxe401Supra001".into(),
        }
    }
}

impl Settings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}
