//! Miner telemetry retrieval.

use std::time::Duration;

use bitaxe_logger_model::RemoteTelemetry;
use log::{debug, info, warn};
use serde::Deserialize;

use crate::error::RemoteFetchError;
use crate::http::{HttpRequest, HttpTransport};

/// The part of `/system/info` the logger stores. Every field is required.
#[derive(Deserialize)]
struct SystemInfo {
    power: f32,
    voltage: f32,
    current: f32,
    temp: f32,
    #[serde(rename = "hashRate")]
    hash_rate: f32,
}

impl TryFrom<SystemInfo> for RemoteTelemetry {
    type Error = RemoteFetchError;

    /// Numbers beyond `f32` decode as infinities; those are rejected.
    fn try_from(info: SystemInfo) -> Result<Self, Self::Error> {
        let fields = [
            ("power", info.power),
            ("voltage", info.voltage),
            ("current", info.current),
            ("temp", info.temp),
            ("hashRate", info.hash_rate),
        ];
        if let Some((name, _)) = fields.into_iter().find(|(_, value)| !value.is_finite()) {
            return Err(RemoteFetchError::OutOfRange(name));
        }

        Ok(Self {
            power: info.power,
            voltage: info.voltage,
            current: info.current,
            temperature: info.temp,
            hash_rate: info.hash_rate,
            valid: true,
        })
    }
}

pub struct RemoteTelemetryFetcher {
    url: String,
    timeout: Duration,
}

impl RemoteTelemetryFetcher {
    pub fn new(remote_device_url: &str, timeout: Duration) -> Self {
        Self {
            url: format!("{}/system/info", remote_device_url.trim_end_matches('/')),
            timeout,
        }
    }

    /// Fetches the current telemetry. Never fails: any problem yields
    /// invalid telemetry. No retries.
    pub fn fetch(&self, http: &mut impl HttpTransport, online: bool) -> RemoteTelemetry {
        match self.try_fetch(http, online) {
            Ok(telemetry) => telemetry,
            Err(e) => {
                warn!("Bitaxe telemetry unavailable: {e}");
                RemoteTelemetry::invalid()
            }
        }
    }

    fn try_fetch(
        &self,
        http: &mut impl HttpTransport,
        online: bool,
    ) -> Result<RemoteTelemetry, RemoteFetchError> {
        if !online {
            return Err(RemoteFetchError::Offline);
        }

        let request = HttpRequest::get(&self.url)
            .headers(&[("Accept", "application/json")])
            .timeout(self.timeout);
        let response = http.send(&request)?;
        if !response.is_success() {
            return Err(RemoteFetchError::Status(response.status));
        }
        debug!("Bitaxe API response: {}", response.body_text());

        let info: SystemInfo = serde_json::from_slice(&response.body)?;
        let telemetry = RemoteTelemetry::try_from(info)?;
        info!(
            "Bitaxe: {:.2} W, {:.2} V, {:.2} A, {:.2}°C, {:.2} GH/s",
            telemetry.power,
            telemetry.voltage,
            telemetry.current,
            telemetry.temperature,
            telemetry.hash_rate
        );
        Ok(telemetry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{system_info_json, FakeHttp};

    fn fetcher() -> RemoteTelemetryFetcher {
        RemoteTelemetryFetcher::new("http://192.168.1.40/api/", Duration::from_secs(10))
    }

    #[test]
    fn success_decodes_all_fields() {
        let mut http = FakeHttp::new().respond(200, system_info_json());
        let telemetry = fetcher().fetch(&mut http, true);

        assert!(telemetry.valid);
        assert_eq!(telemetry.power, 14.5);
        assert_eq!(telemetry.voltage, 5.25);
        assert_eq!(telemetry.current, 2.75);
        assert_eq!(telemetry.temperature, 56.25);
        assert_eq!(telemetry.hash_rate, 612.5);

        let sent = &http.requests[0];
        assert_eq!(sent.url, "http://192.168.1.40/api/system/info");
        assert_eq!(sent.timeout, Some(Duration::from_secs(10)));
    }

    #[test]
    fn http_error_status_is_invalid() {
        let mut http = FakeHttp::new().respond(500, "oops");
        assert!(!fetcher().fetch(&mut http, true).valid);
    }

    #[test]
    fn transport_failure_is_invalid() {
        let mut http = FakeHttp::new().fail("connection refused");
        assert!(!fetcher().fetch(&mut http, true).valid);
    }

    #[test]
    fn offline_sends_nothing() {
        let mut http = FakeHttp::new();
        assert!(!fetcher().fetch(&mut http, false).valid);
        assert!(http.requests.is_empty());
    }

    #[test]
    fn missing_field_is_invalid() {
        for field in ["power", "voltage", "current", "temp", "hashRate"] {
            let mut value: serde_json::Value = serde_json::from_str(&system_info_json()).unwrap();
            value.as_object_mut().unwrap().remove(field);
            let mut http = FakeHttp::new().respond(200, value.to_string());
            let telemetry = fetcher().fetch(&mut http, true);
            assert!(!telemetry.valid, "missing {field} accepted");
            assert!(telemetry.power.is_nan());
        }
    }

    #[test]
    fn non_numeric_field_is_invalid() {
        let body = system_info_json().replace("612.5", "\"fast\"");
        let mut http = FakeHttp::new().respond(200, body);
        assert!(!fetcher().fetch(&mut http, true).valid);
    }

    #[test]
    fn out_of_range_number_is_invalid() {
        let body = system_info_json().replace("612.5", "1e300");
        let mut http = FakeHttp::new().respond(200, body);
        let telemetry = fetcher().fetch(&mut http, true);
        assert!(!telemetry.valid);
        assert!(telemetry.hash_rate.is_nan());
    }

    #[test]
    fn garbage_body_is_invalid() {
        let mut http = FakeHttp::new().respond(200, "<html>not json</html>");
        assert!(!fetcher().fetch(&mut http, true).valid);
    }
}
