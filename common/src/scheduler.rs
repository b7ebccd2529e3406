//! The fixed-interval acquire-and-persist loop.

use std::time::{Duration, Instant};

use bitaxe_logger_model::{RemoteTelemetry, Sample, TempReading};
use embedded_hal::delay::DelayNs;
use log::{info, warn};

use crate::clock::{Timestamper, WallClock};
use crate::connectivity::{ConnectivitySupervisor, NetworkLink};
use crate::error::ConnectivityError;
use crate::fetch::RemoteTelemetryFetcher;
use crate::http::HttpTransport;
use crate::persist::{DualSinkPersister, PersistResult};
use crate::sensor::{SensorAggregator, TemperatureProbe};
use crate::settings::Cadence;

/// What happened during one tick.
#[derive(Debug)]
pub struct TickReport {
    pub connectivity: Result<(), ConnectivityError>,
    pub telemetry: RemoteTelemetry,
    pub temp: TempReading,
    /// `None` when persistence was skipped because the telemetry was invalid.
    pub persisted: Option<PersistResult>,
}

#[derive(Clone, Copy, Debug)]
pub struct SchedulePolicy {
    pub interval: Duration,
    pub cadence: Cadence,
    pub refresh_budget_each_tick: bool,
}

pub struct PollScheduler<L, H, P, C, D> {
    supervisor: ConnectivitySupervisor<L>,
    http: H,
    sensors: SensorAggregator<P>,
    fetcher: RemoteTelemetryFetcher,
    persister: DualSinkPersister,
    clock: C,
    timestamper: Timestamper,
    delay: D,
    policy: SchedulePolicy,
    ticks: u64,
}

impl<L, H, P, C, D> PollScheduler<L, H, P, C, D>
where
    L: NetworkLink,
    H: HttpTransport,
    P: TemperatureProbe,
    C: WallClock,
    D: DelayNs,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        supervisor: ConnectivitySupervisor<L>,
        http: H,
        sensors: SensorAggregator<P>,
        fetcher: RemoteTelemetryFetcher,
        persister: DualSinkPersister,
        clock: C,
        timestamper: Timestamper,
        delay: D,
        policy: SchedulePolicy,
    ) -> Self {
        Self {
            supervisor,
            http,
            sensors,
            fetcher,
            persister,
            clock,
            timestamper,
            delay,
            policy,
            ticks: 0,
        }
    }

    pub fn supervisor(&self) -> &ConnectivitySupervisor<L> {
        &self.supervisor
    }

    pub fn supervisor_mut(&mut self) -> &mut ConnectivitySupervisor<L> {
        &mut self.supervisor
    }

    pub fn http_mut(&mut self) -> &mut H {
        &mut self.http
    }

    pub fn delay_mut(&mut self) -> &mut D {
        &mut self.delay
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// One acquire-and-persist cycle, without the trailing sleep.
    pub fn tick(&mut self) -> TickReport {
        self.ticks += 1;

        if self.policy.refresh_budget_each_tick {
            self.supervisor.refresh_budget();
        }

        let connectivity = self.supervisor.try_ensure_connected(&mut self.delay);
        if let Err(e) = &connectivity {
            warn!("Error: WiFi not connected ({e})");
        }
        let online = connectivity.is_ok();

        let telemetry = self.fetcher.fetch(&mut self.http, online);
        let temp = self.sensors.read();

        let persisted = if telemetry.valid {
            let sample = Sample {
                timestamp: self.timestamper.stamp(&self.clock),
                temp,
                telemetry,
            };
            Some(self.persister.persist(&sample, &mut self.http, online))
        } else {
            warn!("Telemetry invalid, nothing stored this tick");
            None
        };

        TickReport {
            connectivity,
            telemetry,
            temp,
            persisted,
        }
    }

    /// Runs `count` ticks, each followed by the interval sleep.
    pub fn run_ticks(&mut self, count: u64) {
        for _ in 0..count {
            self.tick_and_wait();
        }
    }

    /// Runs forever.
    pub fn run(&mut self) -> ! {
        info!(
            "Polling every {}s ({:?})",
            self.policy.interval.as_secs(),
            self.policy.cadence
        );
        loop {
            self.tick_and_wait();
        }
    }

    fn tick_and_wait(&mut self) {
        let started = Instant::now();
        self.tick();

        let wait = match self.policy.cadence {
            Cadence::FixedDelay => self.policy.interval,
            Cadence::FixedRate => self.policy.interval.saturating_sub(started.elapsed()),
        };
        sleep(&mut self.delay, wait);
    }
}

fn sleep(delay: &mut impl DelayNs, duration: Duration) {
    let mut ms = duration.as_millis();
    while ms > 0 {
        let chunk = ms.min(u32::MAX as u128) as u32;
        delay.delay_ms(chunk);
        ms -= chunk as u128;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PersistError;
    use crate::testing::{scheduler_with, system_info_json, FakeHttp, FakeLink};

    #[test]
    fn invalid_telemetry_skips_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let http = FakeHttp::new().on("/system/info", 500, "");
        let mut scheduler = scheduler_with(FakeLink::up(), http, [25.0, 26.0, 27.0], dir.path());

        let report = scheduler.tick();
        assert!(!report.telemetry.valid);
        assert!(report.persisted.is_none());
        assert_eq!(scheduler.http_mut().requests.len(), 1);
        assert!(!dir.path().join("log.csv").exists());
    }

    #[test]
    fn valid_telemetry_reaches_both_sinks() {
        let dir = tempfile::tempdir().unwrap();
        let http = FakeHttp::new()
            .on("/system/info", 200, system_info_json())
            .on("/write", 204, "");
        let mut scheduler = scheduler_with(FakeLink::up(), http, [25.0, 26.0, 27.0], dir.path());

        let report = scheduler.tick();
        let persisted = report.persisted.expect("persisted");
        assert!(persisted.is_complete());
        assert_eq!(report.temp.l, 27.0);
    }

    #[test]
    fn budget_is_refreshed_every_tick() {
        let dir = tempfile::tempdir().unwrap();
        let mut scheduler =
            scheduler_with(FakeLink::down(), FakeHttp::new(), [25.0, 26.0, 27.0], dir.path());

        let first = scheduler.tick();
        assert_eq!(
            first.connectivity,
            Err(ConnectivityError::ReconnectExhausted { attempts: 5 })
        );
        let second = scheduler.tick();
        assert_eq!(
            second.connectivity,
            Err(ConnectivityError::ReconnectExhausted { attempts: 5 })
        );
        assert_eq!(scheduler.supervisor_mut().link_mut().reconnects, 10);
        assert!(scheduler.http_mut().requests.is_empty());
    }

    #[test]
    fn link_loss_skips_one_tick_and_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let http = FakeHttp::new()
            .on("/system/info", 200, system_info_json())
            .on("/write", 204, "");
        let mut scheduler = scheduler_with(FakeLink::up(), http, [25.0, 26.0, 27.0], dir.path());

        assert!(scheduler.tick().persisted.is_some());

        scheduler.supervisor_mut().link_mut().set_up(false);
        let lost = scheduler.tick();
        assert!(lost.connectivity.is_err());
        assert!(lost.persisted.is_none());
        assert_eq!(scheduler.http_mut().requests.len(), 2);

        scheduler.supervisor_mut().link_mut().set_up(true);
        let back = scheduler.tick();
        assert!(back.connectivity.is_ok());
        assert!(back.persisted.expect("persisted").is_complete());
        assert!(scheduler.supervisor().state().connected);
    }

    #[test]
    fn write_transport_failure_still_logs_locally() {
        let dir = tempfile::tempdir().unwrap();
        let http = FakeHttp::new()
            .on("/system/info", 200, system_info_json())
            .fail_on("/write", "timed out");
        let mut scheduler = scheduler_with(FakeLink::up(), http, [25.0, 26.0, 27.0], dir.path());

        let persisted = scheduler.tick().persisted.expect("persisted");
        assert!(matches!(persisted.remote, Err(PersistError::Transport(_))));
        assert!(persisted.local.is_ok());
        assert_eq!(scheduler.http_mut().requests_to("/write").len(), 1);

        let log = std::fs::read_to_string(dir.path().join("log.csv")).unwrap();
        assert_eq!(log.lines().count(), 1);
    }

    #[test]
    fn fixed_delay_sleeps_full_interval() {
        let dir = tempfile::tempdir().unwrap();
        let http = FakeHttp::new().on("/system/info", 500, "");
        let mut scheduler = scheduler_with(FakeLink::up(), http, [25.0, 26.0, 27.0], dir.path());

        scheduler.run_ticks(3);
        assert_eq!(scheduler.ticks(), 3);
        assert_eq!(scheduler.delay_mut().total_ms(), 90_000);
    }

    #[test]
    fn disconnected_probe_still_persists() {
        let dir = tempfile::tempdir().unwrap();
        let http = FakeHttp::new()
            .on("/system/info", 200, system_info_json())
            .on("/write", 204, "");
        let mut scheduler = scheduler_with(
            FakeLink::up(),
            http,
            [25.0, crate::sensor::DEVICE_DISCONNECTED_C, 27.0],
            dir.path(),
        );

        let report = scheduler.tick();
        assert!(report.temp.q2.is_nan());
        assert!(report.persisted.expect("persisted").is_complete());
    }
}
