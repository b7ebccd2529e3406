mod display;
mod http;
mod nvs_store;
mod onewire_gpio;
mod platform;
mod sdcard;
mod sntp;
mod wifi;

use bitaxe_logger_common::{boot, halt, Settings};
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::prelude::Peripherals;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use log::warn;

use crate::platform::EspPlatform;

fn main() -> anyhow::Result<()> {
    // It is necessary to call this function once. Otherwise some patches to the runtime
    // implemented by esp-idf-sys might not link properly. See https://github.com/esp-rs/esp-idf-template/issues/71
    esp_idf_svc::sys::link_patches();

    // Bind the log crate to the ESP Logging facilities
    esp_idf_svc::log::EspLogger::initialize_default();

    let settings = Settings::default();

    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    // Keep the card mounted for the whole run. Without it the configuration
    // comes from NVS and the CSV writes fail each tick.
    let _sdcard = sdcard::mount(
        peripherals.spi3,
        peripherals.pins.gpio18,
        peripherals.pins.gpio23,
        peripherals.pins.gpio19,
        peripherals.pins.gpio4,
    )
    .inspect_err(|e| warn!("Card Mount Failed: {e:#}"))
    .ok();

    let mut platform = EspPlatform::new(peripherals.modem, sys_loop, nvs, settings.config_path.clone());

    match boot(&mut platform, &settings) {
        Ok(mut scheduler) => scheduler.run(),
        Err(e) => halt(&mut platform, &e),
    }
}
