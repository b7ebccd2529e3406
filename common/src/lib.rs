//! Logger core: everything between the hardware seams and the main loop.
//!
//! Targets implement [`boot::Platform`]; [`boot::boot`] turns one into a
//! running [`scheduler::PollScheduler`].

pub mod boot;
pub mod clock;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod fetch;
pub mod http;
pub mod onewire;
pub mod persist;
pub mod scheduler;
pub mod sensor;
pub mod settings;
pub mod store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use bitaxe_logger_model as model;
pub use boot::{boot, halt, Platform, StatusDisplay};
pub use error::{BootError, ConfigError};
pub use settings::Settings;
