use esp_idf_svc::fs::fatfs::Fatfs;
use esp_idf_svc::hal::gpio::{AnyIOPin, Gpio18, Gpio19, Gpio23, Gpio4};
use esp_idf_svc::hal::sd::{spi::SdSpiHostDriver, SdCardConfiguration, SdCardDriver};
use esp_idf_svc::hal::spi::{config::DriverConfig, Dma, SPI3};
use esp_idf_svc::hal::spi::SpiDriver;
use esp_idf_svc::io::vfs::MountedFatfs;
use log::info;

pub const MOUNT_POINT: &str = "/sdcard";

/// Mounts the card on the VSPI pins with chip select on GPIO 4. The card
/// stays mounted for as long as the returned handle lives.
pub fn mount(
    spi: SPI3,
    sclk: Gpio18,
    mosi: Gpio23,
    miso: Gpio19,
    cs: Gpio4,
) -> anyhow::Result<impl Sized> {
    let spi_driver = SpiDriver::new(
        spi,
        sclk,
        mosi,
        Some(miso),
        &DriverConfig::default().dma(Dma::Auto(4096)),
    )?;

    let sd_card_driver = SdCardDriver::new_spi(
        SdSpiHostDriver::new(
            spi_driver,
            Some(cs),
            AnyIOPin::none(),
            AnyIOPin::none(),
            AnyIOPin::none(),
            None,
        )?,
        &SdCardConfiguration::new(),
    )?;

    let mounted = MountedFatfs::mount(Fatfs::new_sdcard(0, sd_card_driver)?, MOUNT_POINT, 4)?;
    info!("SD card mounted at {MOUNT_POINT}");
    Ok(mounted)
}
