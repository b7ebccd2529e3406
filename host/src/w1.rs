//! DS18B20 probes through the Linux `w1_therm` driver.

use std::fs;
use std::path::PathBuf;

use bitaxe_logger_common::sensor::{TemperatureProbe, DEVICE_DISCONNECTED_C};
use log::warn;

const W1_DEVICES: &str = "/sys/bus/w1/devices";

/// One probe, read from `<device>/w1_slave`.
#[derive(Debug, Clone)]
pub struct W1Probe {
    path: PathBuf,
}

impl W1Probe {
    pub fn new(device_id: &str) -> Self {
        Self::at(PathBuf::from(W1_DEVICES).join(device_id).join("w1_slave"))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TemperatureProbe for W1Probe {
    fn read_celsius(&mut self) -> f32 {
        match fs::read_to_string(&self.path) {
            Ok(raw) => parse_w1_slave(&raw).unwrap_or(DEVICE_DISCONNECTED_C),
            Err(e) => {
                warn!("{}: {e}", self.path.display());
                DEVICE_DISCONNECTED_C
            }
        }
    }
}

/// Parses the two-line `w1_slave` format. `None` when the CRC check failed
/// or no temperature is present.
///
/// ```text
/// 72 01 4b 46 7f ff 0e 10 57 : crc=57 YES
/// 72 01 4b 46 7f ff 0e 10 57 t=23125
/// ```
pub fn parse_w1_slave(raw: &str) -> Option<f32> {
    let mut lines = raw.lines();
    if !lines.next()?.trim_end().ends_with("YES") {
        return None;
    }
    let (_, milli) = lines.next()?.rsplit_once("t=")?;
    let milli: i32 = milli.trim().parse().ok()?;
    Some(milli as f32 / 1000.0)
}
