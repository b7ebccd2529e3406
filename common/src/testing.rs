//! In-memory stand-ins for the hardware seams, shared by the unit tests and
//! the integration tests (`testing` feature).

use std::cell::RefCell;
use std::io;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use bitaxe_logger_model::{ConnectionConfig, RemoteTelemetry, Sample, TempReading};
use chrono::{DateTime, TimeZone, Utc};
use embedded_hal::delay::DelayNs;

use crate::boot::{Platform, StatusDisplay};
use crate::clock::{TimeSync, Timestamper, WallClock};
use crate::config::ConfigFile;
use crate::connectivity::{ConnectivitySupervisor, NetworkLink, ReconnectPolicy};
use crate::error::{LinkError, PlatformError, StoreError, TimeSyncError, TransportError};
use crate::fetch::RemoteTelemetryFetcher;
use crate::http::{HttpRequest, HttpResponse, HttpTransport, Method};
use crate::persist::{DualSinkPersister, LocalLogSink, TimeseriesSink};
use crate::scheduler::{PollScheduler, SchedulePolicy};
use crate::sensor::{SensorAggregator, TemperatureProbe};
use crate::settings::Settings;
use crate::store::{KeyValueStore, MemoryStore};

/// A configuration document with every field set.
pub fn config_json() -> String {
    r#"{
    "wifi": { "ssid": "miners", "password": "hunter22" },
    "ntp": { "url": "ntp.nict.jp" },
    "bitaxe": { "url": "http://192.168.1.40/api" },
    "influxdb": {
        "url": "http://192.168.1.10:8086/api/v2",
        "org": "home",
        "bucket": "bitaxe",
        "token": "secret-token"
    }
}"#
    .to_owned()
}

/// The configuration [`config_json`] describes.
pub fn connection_config() -> ConnectionConfig {
    ConnectionConfig {
        wifi_ssid: "miners".into(),
        wifi_password: "hunter22".into(),
        ntp_url: "ntp.nict.jp".into(),
        remote_device_url: "http://192.168.1.40/api".into(),
        timeseries_url: "http://192.168.1.10:8086/api/v2".into(),
        timeseries_org: "home".into(),
        timeseries_bucket: "bitaxe".into(),
        timeseries_token: "secret-token".into(),
    }
}

/// A `/system/info` body, trimmed to a handful of the fields a miner sends.
pub fn system_info_json() -> String {
    r#"{
    "power": 14.5,
    "voltage": 5.25,
    "current": 2.75,
    "temp": 56.25,
    "hashRate": 612.5,
    "hostname": "bitaxe",
    "uptimeSeconds": 4242
}"#
    .to_owned()
}

pub fn sample() -> Sample {
    Sample {
        timestamp: "2024-05-01 21:00:00".into(),
        temp: TempReading {
            q1: 25.3,
            q2: 26.1,
            l: 45.0,
        },
        telemetry: RemoteTelemetry {
            power: 14.5,
            voltage: 5.25,
            current: 2.75,
            temperature: 56.25,
            hash_rate: 612.5,
            valid: true,
        },
    }
}

/// Noon UTC, 21:00 at the default offset.
pub fn sample_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
        .single()
        .unwrap_or_default()
}

#[derive(Clone, Debug)]
pub enum StaticConfigFile {
    Present(Vec<u8>),
    Absent,
    Unreadable,
}

impl StaticConfigFile {
    pub fn present(contents: impl Into<Vec<u8>>) -> Self {
        Self::Present(contents.into())
    }

    pub fn absent() -> Self {
        Self::Absent
    }

    pub fn unreadable() -> Self {
        Self::Unreadable
    }
}

impl ConfigFile for StaticConfigFile {
    fn read_config(&mut self) -> io::Result<Option<Vec<u8>>> {
        match self {
            Self::Present(contents) => Ok(Some(contents.clone())),
            Self::Absent => Ok(None),
            Self::Unreadable => Err(io::Error::new(io::ErrorKind::Other, "card not mounted")),
        }
    }
}

/// A [`MemoryStore`] that stays inspectable after being handed out.
#[derive(Clone, Debug, Default)]
pub struct SharedStore(pub Rc<RefCell<MemoryStore>>);

impl SharedStore {
    pub fn value(&self, key: &str) -> Option<String> {
        self.0.borrow_mut().get(key).ok().flatten()
    }
}

impl KeyValueStore for SharedStore {
    fn get(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        self.0.borrow_mut().get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.0.borrow_mut().set(key, value)
    }
}

#[derive(Clone, Copy, Debug)]
enum LinkBehaviour {
    Up,
    Down,
    UpAfterPolls(u32),
    UpAfterReconnects(u32),
}

#[derive(Debug)]
pub struct FakeLink {
    behaviour: LinkBehaviour,
    polls: u32,
    pub began_with: Option<String>,
    pub reconnects: u32,
}

impl FakeLink {
    fn with(behaviour: LinkBehaviour) -> Self {
        Self {
            behaviour,
            polls: 0,
            began_with: None,
            reconnects: 0,
        }
    }

    pub fn up() -> Self {
        Self::with(LinkBehaviour::Up)
    }

    pub fn down() -> Self {
        Self::with(LinkBehaviour::Down)
    }

    /// Reports down for the first `polls` checks.
    pub fn up_after_polls(polls: u32) -> Self {
        Self::with(LinkBehaviour::UpAfterPolls(polls))
    }

    /// Reports down until `reconnects` reconnects were attempted.
    pub fn up_after_reconnects(reconnects: u32) -> Self {
        Self::with(LinkBehaviour::UpAfterReconnects(reconnects))
    }

    pub fn set_up(&mut self, up: bool) {
        self.behaviour = if up {
            LinkBehaviour::Up
        } else {
            LinkBehaviour::Down
        };
    }
}

impl NetworkLink for FakeLink {
    fn begin(&mut self, ssid: &str, _password: &str) -> Result<(), LinkError> {
        self.began_with = Some(ssid.to_owned());
        Ok(())
    }

    fn is_connected(&mut self) -> bool {
        self.polls += 1;
        match self.behaviour {
            LinkBehaviour::Up => true,
            LinkBehaviour::Down => false,
            LinkBehaviour::UpAfterPolls(n) => self.polls > n,
            LinkBehaviour::UpAfterReconnects(n) => self.reconnects >= n,
        }
    }

    fn reconnect(&mut self) -> Result<(), LinkError> {
        self.reconnects += 1;
        Ok(())
    }
}

/// Records requested sleeps instead of sleeping.
#[derive(Debug, Default)]
pub struct RecordingDelay {
    total_ns: u64,
}

impl RecordingDelay {
    pub fn total_ms(&self) -> u64 {
        self.total_ns / 1_000_000
    }
}

impl DelayNs for RecordingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ns += u64::from(ns);
    }
}

#[derive(Clone, Copy, Debug)]
pub struct FixedProbe(pub f32);

impl TemperatureProbe for FixedProbe {
    fn read_celsius(&mut self) -> f32 {
        self.0
    }
}

#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub Option<DateTime<Utc>>);

impl WallClock for FixedClock {
    fn now(&self) -> Option<DateTime<Utc>> {
        self.0
    }
}

#[derive(Debug, Default)]
pub struct FakeTimeSync {
    pub fail: bool,
    pub servers: Vec<String>,
}

impl TimeSync for FakeTimeSync {
    fn sync(&mut self, server: &str) -> Result<(), TimeSyncError> {
        self.servers.push(server.to_owned());
        if self.fail {
            Err(TimeSyncError::new(format!("no answer from {server}")))
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Default)]
pub struct RecordingDisplay {
    pub lines: Vec<String>,
}

impl StatusDisplay for RecordingDisplay {
    fn display_line(&mut self, line: &str) {
        self.lines.push(line.to_owned());
    }
}

/// A request as [`FakeHttp`] saw it.
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub timeout: Option<Duration>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Clone, Debug)]
struct Route {
    /// Substring of the URL; `None` matches everything.
    pattern: Option<String>,
    outcome: Result<(u16, String), String>,
}

/// Canned HTTP responses, routed by URL substring. The first matching
/// route answers; a request nothing matches fails at the transport level.
#[derive(Clone, Debug, Default)]
pub struct FakeHttp {
    routes: Vec<Route>,
    pub requests: Vec<RecordedRequest>,
}

impl FakeHttp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers every request with `status` and `body`.
    pub fn respond(self, status: u16, body: impl Into<String>) -> Self {
        self.route(None, Ok((status, body.into())))
    }

    /// Fails every request at the transport level.
    pub fn fail(self, message: impl Into<String>) -> Self {
        self.route(None, Err(message.into()))
    }

    pub fn on(self, pattern: &str, status: u16, body: impl Into<String>) -> Self {
        self.route(Some(pattern.to_owned()), Ok((status, body.into())))
    }

    pub fn fail_on(self, pattern: &str, message: impl Into<String>) -> Self {
        self.route(Some(pattern.to_owned()), Err(message.into()))
    }

    /// Requests whose URL contains `pattern`.
    pub fn requests_to(&self, pattern: &str) -> Vec<&RecordedRequest> {
        self.requests
            .iter()
            .filter(|r| r.url.contains(pattern))
            .collect()
    }

    fn route(mut self, pattern: Option<String>, outcome: Result<(u16, String), String>) -> Self {
        self.routes.push(Route { pattern, outcome });
        self
    }
}

impl HttpTransport for FakeHttp {
    fn send(&mut self, request: &HttpRequest<'_>) -> Result<HttpResponse, TransportError> {
        self.requests.push(RecordedRequest {
            method: request.method,
            url: request.url.to_owned(),
            headers: request
                .headers
                .iter()
                .map(|(n, v)| ((*n).to_owned(), (*v).to_owned()))
                .collect(),
            body: request.body.map(<[u8]>::to_vec).unwrap_or_default(),
            timeout: request.timeout,
        });

        let route = self.routes.iter().find(|route| match &route.pattern {
            Some(pattern) => request.url.contains(pattern.as_str()),
            None => true,
        });
        match route.map(|r| &r.outcome) {
            Some(Ok((status, body))) => Ok(HttpResponse {
                status: *status,
                body: body.clone().into_bytes(),
            }),
            Some(Err(message)) => Err(TransportError::new(message.clone())),
            None => Err(TransportError::new(format!("no route to {}", request.url))),
        }
    }
}

pub type FakeScheduler = PollScheduler<FakeLink, FakeHttp, FixedProbe, FixedClock, RecordingDelay>;

/// A scheduler over fakes with default settings, logging into `log_dir`.
pub fn scheduler_with(link: FakeLink, http: FakeHttp, temps: [f32; 3], log_dir: &Path) -> FakeScheduler {
    let settings = Settings::default();
    let config = connection_config();
    PollScheduler::new(
        ConnectivitySupervisor::new(link, ReconnectPolicy::from(&settings)),
        http,
        SensorAggregator::new(temps.map(FixedProbe)),
        RemoteTelemetryFetcher::new(&config.remote_device_url, settings.fetch_timeout()),
        DualSinkPersister::new(
            TimeseriesSink::new(
                &config,
                &settings.measurement,
                &settings.device_tag,
                settings.write_timeout(),
            ),
            LocalLogSink::new(log_dir.join("log.csv")),
        ),
        FixedClock(Some(sample_time())),
        Timestamper::new(settings.utc_offset_secs),
        RecordingDelay::default(),
        SchedulePolicy {
            interval: settings.poll_interval(),
            cadence: settings.cadence,
            refresh_budget_each_tick: settings.refresh_reconnect_budget_each_tick,
        },
    )
}

/// A whole board made of fakes. Each part can be handed out once.
#[derive(Debug)]
pub struct FakePlatform {
    pub config_file: Option<StaticConfigFile>,
    pub store: SharedStore,
    pub link: Option<FakeLink>,
    pub http: Option<FakeHttp>,
    pub time_sync: Option<FakeTimeSync>,
    pub temps: [f32; 3],
    pub now: Option<DateTime<Utc>>,
    pub display: RecordingDisplay,
    pub probes_initialized: bool,
    pub network_initialized: bool,
}

impl FakePlatform {
    pub fn new(config_file: StaticConfigFile, http: FakeHttp) -> Self {
        Self {
            config_file: Some(config_file),
            store: SharedStore::default(),
            link: Some(FakeLink::up()),
            http: Some(http),
            time_sync: Some(FakeTimeSync::default()),
            temps: [25.3, 26.1, 45.0],
            now: Some(sample_time()),
            display: RecordingDisplay::default(),
            probes_initialized: false,
            network_initialized: false,
        }
    }
}

fn taken(part: &str) -> PlatformError {
    PlatformError::new(format!("{part} already handed out"))
}

impl Platform for FakePlatform {
    type ConfigFile = StaticConfigFile;
    type Store = SharedStore;
    type Link = FakeLink;
    type Http = FakeHttp;
    type TimeSync = FakeTimeSync;
    type Probe = FixedProbe;
    type Clock = FixedClock;
    type Delay = RecordingDelay;
    type Display = RecordingDisplay;

    fn display(&mut self) -> &mut RecordingDisplay {
        &mut self.display
    }

    fn config_sources(&mut self) -> Result<(StaticConfigFile, SharedStore), PlatformError> {
        let file = self.config_file.take().ok_or_else(|| taken("config file"))?;
        Ok((file, self.store.clone()))
    }

    fn probes(&mut self) -> Result<[FixedProbe; 3], PlatformError> {
        self.probes_initialized = true;
        Ok(self.temps.map(FixedProbe))
    }

    fn network(&mut self) -> Result<(FakeLink, FakeHttp, FakeTimeSync), PlatformError> {
        self.network_initialized = true;
        let link = self.link.take().ok_or_else(|| taken("link"))?;
        let http = self.http.take().ok_or_else(|| taken("http"))?;
        let time_sync = self.time_sync.take().ok_or_else(|| taken("time sync"))?;
        Ok((link, http, time_sync))
    }

    fn clock(&mut self) -> FixedClock {
        FixedClock(self.now)
    }

    fn delay(&mut self) -> RecordingDelay {
        RecordingDelay::default()
    }
}
