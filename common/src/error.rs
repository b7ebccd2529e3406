//! Error taxonomy of the logger core.
//!
//! Only [`ConfigError`] is fatal, and only at startup. Everything else
//! degrades the current tick and the loop carries on.

use bitaxe_logger_model::ProbeId;

/// The connection configuration could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("no configuration file and no usable persisted configuration")]
    Unavailable,
    #[error("configuration file is malformed: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectivityError {
    #[error("gave up reconnecting after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },
    #[error("link is down and reconnecting is disabled")]
    ReconnectDisabled,
    #[error("no link after {attempts} startup attempts")]
    StartupExhausted { attempts: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SensorError {
    #[error("temperature probe {0} is disconnected")]
    ProbeDisconnected(ProbeId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum OneWireError {
    #[error("no presence pulse on the 1-Wire bus")]
    NoPresence,
    #[error("scratchpad CRC mismatch")]
    Crc,
}

/// Reasons a telemetry fetch came back invalid. Never returned to callers of
/// the fetcher; it only ends up in the log.
#[derive(Debug, thiserror::Error)]
pub enum RemoteFetchError {
    #[error("network unavailable")]
    Offline,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("undecodable response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("field `{0}` is out of range")]
    OutOfRange(&'static str),
}

/// Failure of one persistence sink.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("network unavailable")]
    Offline,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("time-series endpoint answered HTTP {status}: {body}")]
    RemoteStatus { status: u16, body: String },
    #[error("local log: {0}")]
    Io(#[from] std::io::Error),
}

/// An HTTP exchange that did not produce a response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("HTTP transport failed: {0}")]
pub struct TransportError(pub String);

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Durable key-value store failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("key-value store: {0}")]
pub struct StoreError(pub String);

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Failure of the network link driver itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("network link: {0}")]
pub struct LinkError(pub String);

impl LinkError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("time synchronisation: {0}")]
pub struct TimeSyncError(pub String);

impl TimeSyncError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Hardware bring-up failure reported by a platform.
#[derive(Debug, thiserror::Error)]
#[error("platform: {0}")]
pub struct PlatformError(#[source] pub Box<dyn std::error::Error + Send + Sync>);

impl PlatformError {
    pub fn new(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self(error.into())
    }
}

/// Why [`crate::boot::boot`] did not produce a running scheduler.
#[derive(Debug, thiserror::Error)]
pub enum BootError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Connectivity(#[from] ConnectivityError),
    #[error(transparent)]
    Platform(#[from] PlatformError),
}
