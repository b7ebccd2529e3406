//! The desktop stand-in for the logger board.

use std::path::PathBuf;
use std::time::Duration;

use bitaxe_logger_common::boot::{Platform, StatusDisplay};
use bitaxe_logger_common::clock::{TimeSync, WallClock};
use bitaxe_logger_common::config::FsConfigFile;
use bitaxe_logger_common::connectivity::NetworkLink;
use bitaxe_logger_common::error::{LinkError, PlatformError, TimeSyncError};
use bitaxe_logger_common::model::ProbeId;
use bitaxe_logger_common::sensor::{TemperatureProbe, DEVICE_DISCONNECTED_C};
use chrono::{DateTime, Utc};
use embedded_hal::delay::DelayNs;
use log::info;

use crate::store::JsonFileStore;
use crate::transport::ReqwestTransport;
use crate::w1::W1Probe;

pub enum HostProbe {
    W1(W1Probe),
    Simulated(f32),
    Missing,
}

impl TemperatureProbe for HostProbe {
    fn read_celsius(&mut self) -> f32 {
        match self {
            HostProbe::W1(probe) => probe.read_celsius(),
            HostProbe::Simulated(celsius) => *celsius,
            HostProbe::Missing => DEVICE_DISCONNECTED_C,
        }
    }
}

/// The host's network is managed by the OS; the link is always up.
pub struct HostLink;

impl NetworkLink for HostLink {
    fn begin(&mut self, ssid: &str, _password: &str) -> Result<(), LinkError> {
        info!("Host network in use, ignoring SSID {ssid}");
        Ok(())
    }

    fn is_connected(&mut self) -> bool {
        true
    }

    fn reconnect(&mut self) -> Result<(), LinkError> {
        Ok(())
    }
}

/// The OS keeps the clock in sync.
pub struct SystemTimeSync;

impl TimeSync for SystemTimeSync {
    fn sync(&mut self, server: &str) -> Result<(), TimeSyncError> {
        info!("Using the system clock instead of {server}");
        Ok(())
    }
}

pub struct SystemClock;

impl WallClock for SystemClock {
    fn now(&self) -> Option<DateTime<Utc>> {
        Some(Utc::now())
    }
}

pub struct StdDelay;

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(Duration::from_nanos(u64::from(ns)));
    }

    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}

/// Status lines go to the log.
pub struct LogDisplay;

impl StatusDisplay for LogDisplay {
    fn display_line(&mut self, line: &str) {
        info!("[display] {line}");
    }
}

pub struct HostPlatform {
    pub config_path: PathBuf,
    pub store_path: PathBuf,
    /// 1-Wire ids in Q1, Q2, L order; a missing id leaves that probe disconnected.
    pub probe_ids: Vec<String>,
    pub simulate: bool,
    display: LogDisplay,
}

impl HostPlatform {
    /// Temperatures reported by `--simulate`, in Q1, Q2, L order.
    const SIMULATED: [f32; 3] = [25.0, 25.5, 40.0];

    pub fn new(config_path: PathBuf, store_path: PathBuf, probe_ids: Vec<String>, simulate: bool) -> Self {
        Self {
            config_path,
            store_path,
            probe_ids,
            simulate,
            display: LogDisplay,
        }
    }
}

impl Platform for HostPlatform {
    type ConfigFile = FsConfigFile;
    type Store = JsonFileStore;
    type Link = HostLink;
    type Http = ReqwestTransport;
    type TimeSync = SystemTimeSync;
    type Probe = HostProbe;
    type Clock = SystemClock;
    type Delay = StdDelay;
    type Display = LogDisplay;

    fn display(&mut self) -> &mut LogDisplay {
        &mut self.display
    }

    fn config_sources(&mut self) -> Result<(FsConfigFile, JsonFileStore), PlatformError> {
        let store = JsonFileStore::open(&self.store_path).map_err(PlatformError::new)?;
        Ok((FsConfigFile::new(&self.config_path), store))
    }

    fn probes(&mut self) -> Result<[HostProbe; 3], PlatformError> {
        Ok(std::array::from_fn(|index| {
            let id = ProbeId::ALL[index];
            if self.simulate {
                return HostProbe::Simulated(Self::SIMULATED[index]);
            }
            match self.probe_ids.get(index) {
                Some(device) => {
                    info!("{id} probe on 1-Wire device {device}");
                    HostProbe::W1(W1Probe::new(device))
                }
                None => {
                    info!("{id} probe not configured");
                    HostProbe::Missing
                }
            }
        }))
    }

    fn network(&mut self) -> Result<(HostLink, ReqwestTransport, SystemTimeSync), PlatformError> {
        let http = ReqwestTransport::new().map_err(PlatformError::new)?;
        Ok((HostLink, http, SystemTimeSync))
    }

    fn clock(&mut self) -> SystemClock {
        SystemClock
    }

    fn delay(&mut self) -> StdDelay {
        StdDelay
    }
}
