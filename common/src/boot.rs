//! Startup sequence: configuration, sensors, network, time, then the loop.

use embedded_hal::delay::DelayNs;
use log::{error, info, warn};

use crate::clock::{TimeSync, Timestamper, WallClock};
use crate::config::{ConfigFile, ConfigStore};
use crate::connectivity::{ConnectivitySupervisor, NetworkLink, ReconnectPolicy};
use crate::error::{BootError, PlatformError};
use crate::fetch::RemoteTelemetryFetcher;
use crate::http::HttpTransport;
use crate::persist::{DualSinkPersister, LocalLogSink, TimeseriesSink};
use crate::scheduler::{PollScheduler, SchedulePolicy};
use crate::sensor::{SensorAggregator, TemperatureProbe};
use crate::settings::Settings;
use crate::store::KeyValueStore;

/// One-line status output (the LCD on the board).
pub trait StatusDisplay {
    fn display_line(&mut self, line: &str);
}

impl<D: StatusDisplay + ?Sized> StatusDisplay for &mut D {
    fn display_line(&mut self, line: &str) {
        (**self).display_line(line)
    }
}

/// Hardware bring-up for one target.
///
/// [`boot`] calls `config_sources` first and stops there when no
/// configuration resolves; `probes` and `network` are never reached then.
pub trait Platform {
    type ConfigFile: ConfigFile;
    type Store: KeyValueStore;
    type Link: NetworkLink;
    type Http: HttpTransport;
    type TimeSync: TimeSync;
    type Probe: TemperatureProbe;
    type Clock: WallClock;
    type Delay: DelayNs;
    type Display: StatusDisplay;

    fn display(&mut self) -> &mut Self::Display;

    fn config_sources(&mut self) -> Result<(Self::ConfigFile, Self::Store), PlatformError>;

    /// Probes in Q1, Q2, L order.
    fn probes(&mut self) -> Result<[Self::Probe; 3], PlatformError>;

    fn network(&mut self) -> Result<(Self::Link, Self::Http, Self::TimeSync), PlatformError>;

    fn clock(&mut self) -> Self::Clock;

    fn delay(&mut self) -> Self::Delay;
}

/// The scheduler a platform boots into.
pub type Scheduler<P> = PollScheduler<
    <P as Platform>::Link,
    <P as Platform>::Http,
    <P as Platform>::Probe,
    <P as Platform>::Clock,
    <P as Platform>::Delay,
>;

pub fn boot<P: Platform>(platform: &mut P, settings: &Settings) -> Result<Scheduler<P>, BootError> {
    platform.display().display_line("LCD: OK");

    let (file, store) = platform.config_sources()?;
    let config = ConfigStore::new(file, store).resolve()?;
    info!("Configuration resolved: {config:?}");

    let sensors = SensorAggregator::new(platform.probes()?);

    let (link, http, mut time_sync) = platform.network()?;
    let mut delay = platform.delay();
    let mut supervisor = ConnectivitySupervisor::new(link, ReconnectPolicy::from(settings));
    supervisor.connect_at_startup(&config.wifi_ssid, &config.wifi_password, &mut delay)?;
    platform.display().display_line("WiFi: OK");

    match time_sync.sync(&config.ntp_url) {
        Ok(()) => {
            info!("Time synchronised with {}", config.ntp_url);
            platform.display().display_line("NTP: OK");
        }
        Err(e) => warn!("{e}, timestamps will be placeholders until the clock is set"),
    }

    let fetcher = RemoteTelemetryFetcher::new(&config.remote_device_url, settings.fetch_timeout());
    let persister = DualSinkPersister::new(
        TimeseriesSink::new(
            &config,
            &settings.measurement,
            &settings.device_tag,
            settings.write_timeout(),
        ),
        LocalLogSink::new(&settings.log_path),
    );
    let policy = SchedulePolicy {
        interval: settings.poll_interval(),
        cadence: settings.cadence,
        refresh_budget_each_tick: settings.refresh_reconnect_budget_each_tick,
    };

    Ok(PollScheduler::new(
        supervisor,
        http,
        sensors,
        fetcher,
        persister,
        platform.clock(),
        Timestamper::new(settings.utc_offset_secs),
        delay,
        policy,
    ))
}

/// Shows the boot failure and parks forever.
pub fn halt<P: Platform>(platform: &mut P, error: &BootError) -> ! {
    error!("Startup failed: {error}");
    let line = match error {
        BootError::Config(_) => "Config: NG",
        BootError::Connectivity(_) => "WiFi: NG",
        BootError::Platform(_) => "HW: NG",
    };
    platform.display().display_line(line);

    let mut delay = platform.delay();
    loop {
        delay.delay_ms(1000);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, ConnectivityError};
    use crate::testing::{config_json, FakeHttp, FakeLink, FakePlatform, StaticConfigFile};

    #[test]
    fn status_lines_follow_boot_order() {
        let mut platform = FakePlatform::new(StaticConfigFile::present(config_json()), FakeHttp::new());
        boot(&mut platform, &Settings::default()).unwrap();
        assert_eq!(platform.display.lines, ["LCD: OK", "WiFi: OK", "NTP: OK"]);
    }

    #[test]
    fn ntp_failure_is_not_fatal() {
        let mut platform = FakePlatform::new(StaticConfigFile::present(config_json()), FakeHttp::new());
        if let Some(sync) = platform.time_sync.as_mut() {
            sync.fail = true;
        }

        assert!(boot(&mut platform, &Settings::default()).is_ok());
        assert_eq!(platform.display.lines, ["LCD: OK", "WiFi: OK"]);
    }

    #[test]
    fn config_failure_stops_before_hardware() {
        let mut platform = FakePlatform::new(StaticConfigFile::present("not json"), FakeHttp::new());
        let err = boot(&mut platform, &Settings::default()).err();

        assert!(matches!(err, Some(BootError::Config(ConfigError::Malformed(_)))));
        assert!(!platform.probes_initialized);
        assert!(!platform.network_initialized);
    }

    #[test]
    fn bounded_startup_connect_surfaces_as_boot_error() {
        let mut platform = FakePlatform::new(StaticConfigFile::present(config_json()), FakeHttp::new());
        platform.link = Some(FakeLink::down());
        let settings = Settings {
            startup_connect_max_attempts: Some(3),
            ..Settings::default()
        };

        let err = boot(&mut platform, &settings).err();
        assert!(matches!(
            err,
            Some(BootError::Connectivity(ConnectivityError::StartupExhausted { attempts: 3 }))
        ));
        assert_eq!(platform.display.lines, ["LCD: OK"]);
    }
}
