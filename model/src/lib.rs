//! Data model shared by the logger core, the desktop runner and the firmware.

use serde::{Deserialize, Serialize};

/// Maximum byte lengths of the connection settings. They mirror the fixed
/// buffers the device has always stored them in (capacity minus terminator).
pub mod bounds {
    pub const WIFI_SSID: usize = 49;
    pub const WIFI_PASSWORD: usize = 99;
    pub const NTP_URL: usize = 99;
    pub const REMOTE_DEVICE_URL: usize = 99;
    pub const TIMESERIES_URL: usize = 99;
    pub const TIMESERIES_ORG: usize = 49;
    pub const TIMESERIES_BUCKET: usize = 49;
    pub const TIMESERIES_TOKEN: usize = 99;
}

/// A connection setting that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidField {
    #[error("required field `{0}` is empty")]
    Empty(&'static str),
    #[error("field `{field}` is longer than {max} bytes")]
    TooLong { field: &'static str, max: usize },
}

/// Everything the device needs to reach the network, the miner and the
/// time-series database.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub wifi_ssid: String,
    pub wifi_password: String,
    pub ntp_url: String,
    pub remote_device_url: String,
    pub timeseries_url: String,
    pub timeseries_org: String,
    pub timeseries_bucket: String,
    pub timeseries_token: String,
}

impl ConnectionConfig {
    /// Field names, values and length bounds in a fixed order.
    pub fn fields(&self) -> [(&'static str, &str, usize); 8] {
        [
            ("wifi_ssid", &self.wifi_ssid, bounds::WIFI_SSID),
            ("wifi_password", &self.wifi_password, bounds::WIFI_PASSWORD),
            ("ntp_url", &self.ntp_url, bounds::NTP_URL),
            ("remote_device_url", &self.remote_device_url, bounds::REMOTE_DEVICE_URL),
            ("timeseries_url", &self.timeseries_url, bounds::TIMESERIES_URL),
            ("timeseries_org", &self.timeseries_org, bounds::TIMESERIES_ORG),
            ("timeseries_bucket", &self.timeseries_bucket, bounds::TIMESERIES_BUCKET),
            ("timeseries_token", &self.timeseries_token, bounds::TIMESERIES_TOKEN),
        ]
    }

    /// Checks that every field is non-empty and within its bound.
    ///
    /// Reports the first offending field.
    pub fn validate(&self) -> Result<(), InvalidField> {
        for (field, value, max) in self.fields() {
            if value.is_empty() {
                return Err(InvalidField::Empty(field));
            }
            if value.len() > max {
                return Err(InvalidField::TooLong { field, max });
            }
        }
        Ok(())
    }
}

impl core::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("wifi_ssid", &self.wifi_ssid)
            .field("wifi_password", &"<redacted>")
            .field("ntp_url", &self.ntp_url)
            .field("remote_device_url", &self.remote_device_url)
            .field("timeseries_url", &self.timeseries_url)
            .field("timeseries_org", &self.timeseries_org)
            .field("timeseries_bucket", &self.timeseries_bucket)
            .field("timeseries_token", &"<redacted>")
            .finish()
    }
}

/// The three physical temperature probes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProbeId {
    Q1,
    Q2,
    L,
}

impl ProbeId {
    pub const ALL: [ProbeId; 3] = [ProbeId::Q1, ProbeId::Q2, ProbeId::L];

    pub fn name(self) -> &'static str {
        match self {
            ProbeId::Q1 => "Q1",
            ProbeId::Q2 => "Q2",
            ProbeId::L => "L",
        }
    }
}

impl core::fmt::Display for ProbeId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// One reading per probe in degrees Celsius. A disconnected probe reads NaN.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TempReading {
    pub q1: f32,
    pub q2: f32,
    pub l: f32,
}

impl TempReading {
    pub fn get(&self, probe: ProbeId) -> f32 {
        match probe {
            ProbeId::Q1 => self.q1,
            ProbeId::Q2 => self.q2,
            ProbeId::L => self.l,
        }
    }

    pub fn set(&mut self, probe: ProbeId, value: f32) {
        match probe {
            ProbeId::Q1 => self.q1 = value,
            ProbeId::Q2 => self.q2 = value,
            ProbeId::L => self.l = value,
        }
    }
}

/// Telemetry reported by the miner.
///
/// When `valid` is false the numeric fields are NaN and must not be stored.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemoteTelemetry {
    pub power: f32,
    pub voltage: f32,
    pub current: f32,
    pub temperature: f32,
    pub hash_rate: f32,
    pub valid: bool,
}

impl RemoteTelemetry {
    /// Telemetry from a failed fetch.
    pub const fn invalid() -> Self {
        Self {
            power: f32::NAN,
            voltage: f32::NAN,
            current: f32::NAN,
            temperature: f32::NAN,
            hash_rate: f32::NAN,
            valid: false,
        }
    }
}

impl Default for RemoteTelemetry {
    fn default() -> Self {
        Self::invalid()
    }
}

/// Local temperatures and miner telemetry of one tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: String,
    pub temp: TempReading,
    pub telemetry: RemoteTelemetry,
}

/// Link status as tracked by the connectivity supervisor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityState {
    pub connected: bool,
    pub reconnect_attempts: u32,
    pub reconnect_enabled: bool,
}

impl Default for ConnectivityState {
    fn default() -> Self {
        Self {
            connected: false,
            reconnect_attempts: 0,
            reconnect_enabled: true,
        }
    }
}
