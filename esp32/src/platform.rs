use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use bitaxe_logger_common::boot::Platform;
use bitaxe_logger_common::clock::WallClock;
use bitaxe_logger_common::config::FsConfigFile;
use bitaxe_logger_common::error::PlatformError;
use bitaxe_logger_common::model::ProbeId;
use bitaxe_logger_common::onewire::{self, Ds18b20Probe};
use chrono::{DateTime, Datelike, Utc};
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::delay::FreeRtos;
use esp_idf_svc::hal::modem::Modem;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{BlockingWifi, EspWifi};
use log::{info, warn};

use crate::display::ConsoleDisplay;
use crate::http::EspTransport;
use crate::nvs_store::NvsStore;
use crate::onewire_gpio::GpioOneWire;
use crate::sntp::EspTimeSync;
use crate::wifi::EspWifiLink;

/// GPIO of the 1-Wire bus the three DS18B20 probes share.
const ONE_WIRE_PIN: i32 = 26;

/// The RTC starts in 1970; anything before this was never synchronised.
const EARLIEST_VALID_YEAR: i32 = 2016;

pub type Probe = Ds18b20Probe<GpioOneWire, FreeRtos>;

pub struct EspClock;

impl WallClock for EspClock {
    fn now(&self) -> Option<DateTime<Utc>> {
        let now = Utc::now();
        (now.year() >= EARLIEST_VALID_YEAR).then_some(now)
    }
}

pub struct EspPlatform {
    modem: Option<Modem>,
    sys_loop: EspSystemEventLoop,
    nvs: EspDefaultNvsPartition,
    config_path: PathBuf,
    display: ConsoleDisplay,
}

impl EspPlatform {
    pub fn new(
        modem: Modem,
        sys_loop: EspSystemEventLoop,
        nvs: EspDefaultNvsPartition,
        config_path: PathBuf,
    ) -> Self {
        Self {
            modem: Some(modem),
            sys_loop,
            nvs,
            config_path,
            display: ConsoleDisplay,
        }
    }
}

fn platform_error(e: impl std::error::Error + Send + Sync + 'static) -> PlatformError {
    PlatformError::new(e)
}

impl Platform for EspPlatform {
    type ConfigFile = FsConfigFile;
    type Store = NvsStore;
    type Link = EspWifiLink;
    type Http = EspTransport;
    type TimeSync = EspTimeSync;
    type Probe = Probe;
    type Clock = EspClock;
    type Delay = FreeRtos;
    type Display = ConsoleDisplay;

    fn display(&mut self) -> &mut ConsoleDisplay {
        &mut self.display
    }

    fn config_sources(&mut self) -> Result<(FsConfigFile, NvsStore), PlatformError> {
        let store = NvsStore::open(self.nvs.clone()).map_err(platform_error)?;
        Ok((FsConfigFile::new(&self.config_path), store))
    }

    fn probes(&mut self) -> Result<[Probe; 3], PlatformError> {
        let bus = Rc::new(RefCell::new(GpioOneWire::new(ONE_WIRE_PIN)));
        let roms = onewire::find_ds18b20(&mut *bus.borrow_mut());
        info!("Found {} DS18B20 sensors.", roms.len());
        if roms.len() < 3 {
            warn!("Expected 3 probes, the missing ones read as disconnected");
        }

        let probes: [Probe; 3] = std::array::from_fn(|index| {
            Ds18b20Probe::new(bus.clone(), roms.get(index).copied(), FreeRtos)
        });
        for (id, probe) in ProbeId::ALL.iter().zip(&probes) {
            match probe.rom() {
                Some(rom) => info!("{id}: address {rom}"),
                None => warn!("{id}: no device"),
            }
        }
        Ok(probes)
    }

    fn network(&mut self) -> Result<(EspWifiLink, EspTransport, EspTimeSync), PlatformError> {
        let modem = self
            .modem
            .take()
            .ok_or_else(|| PlatformError::new("modem already in use"))?;
        let esp_wifi =
            EspWifi::new(modem, self.sys_loop.clone(), Some(self.nvs.clone())).map_err(platform_error)?;
        let wifi = BlockingWifi::wrap(esp_wifi, self.sys_loop.clone()).map_err(platform_error)?;

        Ok((EspWifiLink::new(wifi), EspTransport, EspTimeSync::default()))
    }

    fn clock(&mut self) -> EspClock {
        EspClock
    }

    fn delay(&mut self) -> FreeRtos {
        FreeRtos
    }
}
