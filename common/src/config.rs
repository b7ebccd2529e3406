//! Connection configuration resolution.
//!
//! The configuration file on the SD card wins. Whatever it holds is copied
//! into the durable store, so the device keeps working after the card is
//! removed. Without a file, the durable store is the only source.

use std::io;
use std::path::PathBuf;

use bitaxe_logger_model::ConnectionConfig;
use log::{error, info, warn};
use serde::Deserialize;

use crate::error::{ConfigError, StoreError};
use crate::store::KeyValueStore;

/// NVS namespace the configuration is persisted under.
pub const STORE_NAMESPACE: &str = "config";

/// Durable store keys, in [`ConnectionConfig::fields`] order.
pub const STORE_KEYS: [&str; 8] = [
    "ssid",
    "password",
    "NTP_url",
    "Bitaxe_url",
    "InfluxDB_url",
    "InfluxDB_org",
    "InfluxDB_bucket",
    "InfluxDB_token",
];

/// Source of the structured configuration document.
pub trait ConfigFile {
    /// Returns the raw document bytes, or `None` when there is no file.
    fn read_config(&mut self) -> io::Result<Option<Vec<u8>>>;
}

/// Configuration file on a mounted file system.
#[derive(Clone, Debug)]
pub struct FsConfigFile {
    path: PathBuf,
}

impl FsConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigFile for FsConfigFile {
    fn read_config(&mut self) -> io::Result<Option<Vec<u8>>> {
        match std::fs::read(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[derive(Deserialize)]
struct ConfigDocument {
    wifi: WifiSection,
    ntp: UrlSection,
    bitaxe: UrlSection,
    influxdb: InfluxSection,
}

#[derive(Deserialize)]
struct WifiSection {
    ssid: String,
    password: String,
}

#[derive(Deserialize)]
struct UrlSection {
    url: String,
}

#[derive(Deserialize)]
struct InfluxSection {
    url: String,
    org: String,
    bucket: String,
    token: String,
}

impl From<ConfigDocument> for ConnectionConfig {
    fn from(doc: ConfigDocument) -> Self {
        Self {
            wifi_ssid: doc.wifi.ssid,
            wifi_password: doc.wifi.password,
            ntp_url: doc.ntp.url,
            remote_device_url: doc.bitaxe.url,
            timeseries_url: doc.influxdb.url,
            timeseries_org: doc.influxdb.org,
            timeseries_bucket: doc.influxdb.bucket,
            timeseries_token: doc.influxdb.token,
        }
    }
}

/// Parses a configuration document. Invalid UTF-8, or any missing,
/// mistyped, empty or over-long field makes the whole document malformed.
pub fn parse_document(raw: &[u8]) -> Result<ConnectionConfig, ConfigError> {
    let doc: ConfigDocument =
        serde_json::from_slice(raw).map_err(|e| ConfigError::Malformed(e.to_string()))?;
    let config = ConnectionConfig::from(doc);
    config
        .validate()
        .map_err(|e| ConfigError::Malformed(e.to_string()))?;
    Ok(config)
}

pub struct ConfigStore<F, S> {
    file: F,
    store: S,
}

impl<F: ConfigFile, S: KeyValueStore> ConfigStore<F, S> {
    pub fn new(file: F, store: S) -> Self {
        Self { file, store }
    }

    /// Resolves the configuration: file first, then the durable store.
    ///
    /// A file that exists but does not parse is fatal; it never falls
    /// through to the store.
    pub fn resolve(&mut self) -> Result<ConnectionConfig, ConfigError> {
        let raw = match self.file.read_config() {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to open configuration file: {e}");
                None
            }
        };

        if let Some(raw) = raw {
            info!("Configuration file opened");
            let config = parse_document(&raw).inspect_err(|e| error!("{e}"))?;

            match self.persist(&config) {
                Ok(()) => info!("Configuration written to the durable store"),
                Err(e) => warn!("Failed to persist configuration: {e}"),
            }
            return Ok(config);
        }

        info!("No configuration file, loading from the durable store");
        match self.load_persisted() {
            Ok(Some(config)) => Ok(config),
            Ok(None) => {
                error!("Durable store holds no complete configuration");
                Err(ConfigError::Unavailable)
            }
            Err(e) => {
                error!("Failed to read the durable store: {e}");
                Err(ConfigError::Unavailable)
            }
        }
    }

    /// Overwrites every persisted field with `config`.
    pub fn persist(&mut self, config: &ConnectionConfig) -> Result<(), StoreError> {
        for (key, (_, value, _)) in STORE_KEYS.iter().zip(config.fields()) {
            self.store.set(key, value)?;
        }
        Ok(())
    }

    /// Loads the persisted configuration. `None` when a field is missing or
    /// the stored set does not validate.
    pub fn load_persisted(&mut self) -> Result<Option<ConnectionConfig>, StoreError> {
        let mut values = Vec::with_capacity(STORE_KEYS.len());
        for key in STORE_KEYS {
            match self.store.get(key)? {
                Some(value) => values.push(value),
                None => return Ok(None),
            }
        }

        let mut values = values.into_iter();
        let mut next = || values.next().unwrap_or_default();
        let config = ConnectionConfig {
            wifi_ssid: next(),
            wifi_password: next(),
            ntp_url: next(),
            remote_device_url: next(),
            timeseries_url: next(),
            timeseries_org: next(),
            timeseries_bucket: next(),
            timeseries_token: next(),
        };

        match config.validate() {
            Ok(()) => Ok(Some(config)),
            Err(e) => {
                warn!("Persisted configuration rejected: {e}");
                Ok(None)
            }
        }
    }

    pub fn into_parts(self) -> (F, S) {
        (self.file, self.store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::testing::{config_json, StaticConfigFile};

    fn store_with(config: &ConnectionConfig) -> MemoryStore {
        let mut store = ConfigStore::new(StaticConfigFile::absent(), MemoryStore::new());
        store.persist(config).unwrap();
        store.into_parts().1
    }

    fn stored_config() -> ConnectionConfig {
        ConnectionConfig {
            wifi_ssid: "old-ssid".into(),
            wifi_password: "old-pass".into(),
            ntp_url: "old.ntp".into(),
            remote_device_url: "http://old-miner".into(),
            timeseries_url: "http://old-influx".into(),
            timeseries_org: "old-org".into(),
            timeseries_bucket: "old-bucket".into(),
            timeseries_token: "old-token".into(),
        }
    }

    #[test]
    fn file_takes_precedence_and_overwrites_store() {
        let store = store_with(&stored_config());
        let mut config_store = ConfigStore::new(StaticConfigFile::present(config_json()), store);

        let config = config_store.resolve().unwrap();
        assert_eq!(config.wifi_ssid, "miners");
        assert_eq!(config.remote_device_url, "http://192.168.1.40/api");

        let (_, mut store) = config_store.into_parts();
        assert_eq!(store.get("ssid").unwrap().as_deref(), Some("miners"));
        assert_eq!(store.get("InfluxDB_token").unwrap().as_deref(), Some("secret-token"));
        assert_eq!(store.len(), STORE_KEYS.len());
    }

    #[test]
    fn falls_back_to_store_without_file() {
        let store = store_with(&stored_config());
        let mut config_store = ConfigStore::new(StaticConfigFile::absent(), store);
        assert_eq!(config_store.resolve().unwrap(), stored_config());
    }

    #[test]
    fn file_that_cannot_be_opened_counts_as_absent() {
        let store = store_with(&stored_config());
        let mut config_store = ConfigStore::new(StaticConfigFile::unreadable(), store);
        assert_eq!(config_store.resolve().unwrap(), stored_config());
    }

    #[test]
    fn nothing_to_resolve_is_unavailable() {
        let mut config_store = ConfigStore::new(StaticConfigFile::absent(), MemoryStore::new());
        assert_eq!(config_store.resolve(), Err(ConfigError::Unavailable));
    }

    #[test]
    fn incomplete_store_is_unavailable() {
        let mut store = store_with(&stored_config());
        store.set("InfluxDB_bucket", "").unwrap();
        let mut config_store = ConfigStore::new(StaticConfigFile::absent(), store);
        assert_eq!(config_store.resolve(), Err(ConfigError::Unavailable));
    }

    #[test]
    fn malformed_file_is_fatal_even_with_a_store() {
        let store = store_with(&stored_config());
        let mut config_store =
            ConfigStore::new(StaticConfigFile::present("{ \"wifi\": "), store);
        assert!(matches!(
            config_store.resolve(),
            Err(ConfigError::Malformed(_))
        ));

        // The store is left untouched.
        let (_, mut store) = config_store.into_parts();
        assert_eq!(store.get("ssid").unwrap().as_deref(), Some("old-ssid"));
    }

    #[test]
    fn missing_field_is_malformed() {
        let raw = config_json().replace("\"token\": \"secret-token\"", "\"tokn\": \"x\"");
        assert!(matches!(parse_document(raw.as_bytes()), Err(ConfigError::Malformed(_))));
    }

    #[test]
    fn empty_field_is_malformed() {
        let raw = config_json().replace("\"ntp.nict.jp\"", "\"\"");
        let err = parse_document(raw.as_bytes()).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Malformed("required field `ntp_url` is empty".into())
        );
    }

    #[test]
    fn fs_config_file_reports_missing_file_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = FsConfigFile::new(dir.path().join("config.json"));
        assert!(file.read_config().unwrap().is_none());

        std::fs::write(dir.path().join("config.json"), config_json()).unwrap();
        assert!(file.read_config().unwrap().is_some());
    }

    #[test]
    fn non_utf8_file_is_malformed_even_with_a_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, [0x7b, 0xff, 0xfe, 0x7d]).unwrap();

        let store = store_with(&stored_config());
        let mut config_store = ConfigStore::new(FsConfigFile::new(&path), store);
        assert!(matches!(
            config_store.resolve(),
            Err(ConfigError::Malformed(_))
        ));

        let (_, mut store) = config_store.into_parts();
        assert_eq!(store.get("ssid").unwrap().as_deref(), Some("old-ssid"));
    }

    #[test]
    fn invalid_utf8_inside_a_string_is_malformed() {
        let mut raw = config_json().into_bytes();
        let at = raw.windows(6).position(|w| w == b"miners").unwrap();
        raw[at] = 0xff;
        assert!(matches!(parse_document(&raw), Err(ConfigError::Malformed(_))));
    }
}
