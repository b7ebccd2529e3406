//! Dual-sink persistence: the time-series database and the CSV log on the
//! SD card. The sinks are independent; one failing never stops the other.

use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bitaxe_logger_model::{ConnectionConfig, Sample};
use log::{debug, info, warn};

use crate::error::PersistError;
use crate::http::{HttpRequest, HttpTransport};

/// Outcome of both sinks for one sample.
#[derive(Debug)]
pub struct PersistResult {
    pub remote: Result<(), PersistError>,
    pub local: Result<(), PersistError>,
}

impl PersistResult {
    pub fn is_complete(&self) -> bool {
        self.remote.is_ok() && self.local.is_ok()
    }
}

fn push_value(out: &mut String, value: f32) {
    if value.is_finite() {
        let _ = write!(out, "{value:.2}");
    } else {
        out.push_str("nan");
    }
}

/// Line-protocol record for one sample.
///
/// Fields without a finite value are left out; the database refuses
/// non-numeric field values and would drop the whole line.
pub fn line_protocol(measurement: &str, device: &str, sample: &Sample) -> String {
    let t = &sample.telemetry;
    let fields = [
        ("Q1", sample.temp.q1),
        ("Q2", sample.temp.q2),
        ("L", sample.temp.l),
        ("power", t.power),
        ("voltage", t.voltage),
        ("current", t.current),
        ("temp", t.temperature),
        ("hashRate", t.hash_rate),
    ];

    let mut line = format!("{measurement},device={device} ");
    let mut first = true;
    for (name, value) in fields.into_iter().filter(|(_, v)| v.is_finite()) {
        if !first {
            line.push(',');
        }
        first = false;
        line.push_str(name);
        line.push('=');
        push_value(&mut line, value);
    }
    line
}

/// CSV record for one sample, without the trailing newline.
pub fn csv_record(sample: &Sample) -> String {
    let t = &sample.telemetry;
    let mut record = sample.timestamp.clone();
    for value in [
        t.power,
        t.voltage,
        t.current,
        t.temperature,
        t.hash_rate,
        sample.temp.q1,
        sample.temp.q2,
        sample.temp.l,
    ] {
        record.push(',');
        push_value(&mut record, value);
    }
    record
}

/// Writes to the time-series database over HTTP.
pub struct TimeseriesSink {
    url: String,
    authorization: String,
    measurement: String,
    device: String,
    timeout: Duration,
}

impl TimeseriesSink {
    pub fn new(
        config: &ConnectionConfig,
        measurement: &str,
        device: &str,
        timeout: Duration,
    ) -> Self {
        Self {
            url: format!(
                "{}/write?org={}&bucket={}&precision=s",
                config.timeseries_url.trim_end_matches('/'),
                config.timeseries_org,
                config.timeseries_bucket
            ),
            authorization: format!("Token {}", config.timeseries_token),
            measurement: measurement.to_owned(),
            device: device.to_owned(),
            timeout,
        }
    }

    pub fn write(
        &self,
        sample: &Sample,
        http: &mut impl HttpTransport,
        online: bool,
    ) -> Result<(), PersistError> {
        if !online {
            return Err(PersistError::Offline);
        }

        let payload = line_protocol(&self.measurement, &self.device, sample);
        debug!("InfluxDB payload: {payload}");

        let headers = [
            ("Authorization", self.authorization.as_str()),
            ("Content-Type", "text/plain"),
        ];
        let request = HttpRequest::post(&self.url, payload.as_bytes())
            .headers(&headers)
            .timeout(self.timeout);

        let response = http.send(&request)?;
        if !response.is_success() {
            return Err(PersistError::RemoteStatus {
                status: response.status,
                body: response.body_text(),
            });
        }
        info!("InfluxDB write accepted ({})", response.status);
        Ok(())
    }
}

/// Appends to the CSV log. The file is opened and closed on every write.
pub struct LocalLogSink {
    path: PathBuf,
}

impl LocalLogSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, sample: &Sample) -> Result<(), PersistError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", csv_record(sample))?;
        file.flush()?;
        info!("Data written to {}", self.path.display());
        Ok(())
    }
}

pub struct DualSinkPersister {
    remote: TimeseriesSink,
    local: LocalLogSink,
}

impl DualSinkPersister {
    pub fn new(remote: TimeseriesSink, local: LocalLogSink) -> Self {
        Self { remote, local }
    }

    /// Attempts both sinks once each, independently.
    pub fn persist(
        &self,
        sample: &Sample,
        http: &mut impl HttpTransport,
        online: bool,
    ) -> PersistResult {
        let remote = self.remote.write(sample, http, online);
        if let Err(e) = &remote {
            warn!("InfluxDB write failed: {e}");
        }

        let local = self.local.append(sample);
        if let Err(e) = &local {
            warn!("Error writing {}: {e}", self.local.path().display());
        }

        PersistResult { remote, local }
    }
}
