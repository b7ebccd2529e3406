//! Network link supervision.
//!
//! Startup blocks until the link is up (or a configured bound is hit).
//! Mid-run reconnects get a small budget; once it is spent the supervisor
//! stops trying until [`ConnectivitySupervisor::refresh_budget`] is called.

use bitaxe_logger_model::ConnectivityState;
use embedded_hal::delay::DelayNs;
use log::{info, warn};

use crate::error::{ConnectivityError, LinkError};
use crate::settings::Settings;

/// The station interface (WiFi on the device).
pub trait NetworkLink {
    /// Configures credentials and starts connecting.
    fn begin(&mut self, ssid: &str, password: &str) -> Result<(), LinkError>;

    fn is_connected(&mut self) -> bool;

    /// One reconnection attempt with the credentials given to `begin`.
    fn reconnect(&mut self) -> Result<(), LinkError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub spacing_ms: u32,
    /// `None` blocks forever at startup.
    pub startup_max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            spacing_ms: 1000,
            startup_max_attempts: None,
        }
    }
}

impl From<&Settings> for ReconnectPolicy {
    fn from(settings: &Settings) -> Self {
        Self {
            max_attempts: settings.reconnect_max_attempts,
            spacing_ms: settings.reconnect_spacing_ms,
            startup_max_attempts: settings.startup_connect_max_attempts,
        }
    }
}

pub struct ConnectivitySupervisor<L> {
    link: L,
    policy: ReconnectPolicy,
    state: ConnectivityState,
}

impl<L: NetworkLink> ConnectivitySupervisor<L> {
    pub fn new(link: L, policy: ReconnectPolicy) -> Self {
        Self {
            link,
            policy,
            state: ConnectivityState::default(),
        }
    }

    pub fn state(&self) -> ConnectivityState {
        self.state
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Brings the link up for the first time, polling once per spacing
    /// interval.
    pub fn connect_at_startup(
        &mut self,
        ssid: &str,
        password: &str,
        delay: &mut impl DelayNs,
    ) -> Result<(), ConnectivityError> {
        info!("Connecting to WiFi: {ssid}");
        if let Err(e) = self.link.begin(ssid, password) {
            warn!("Failed to start the link: {e}");
        }

        let mut polls = 0u32;
        while !self.link.is_connected() {
            polls += 1;
            if let Some(max) = self.policy.startup_max_attempts {
                if polls >= max {
                    warn!("WiFi still down after {polls} startup attempts");
                    return Err(ConnectivityError::StartupExhausted { attempts: polls });
                }
            }
            delay.delay_ms(self.policy.spacing_ms);

            // A failed begin leaves nothing in progress, so nudge the link.
            if polls % 10 == 0 {
                if let Err(e) = self.link.reconnect() {
                    warn!("Reconnect during startup failed: {e}");
                }
            }
        }

        info!("WiFi connected");
        self.mark_connected();
        Ok(())
    }

    /// Grants a fresh reconnect budget.
    pub fn refresh_budget(&mut self) {
        self.state.reconnect_enabled = true;
        self.state.reconnect_attempts = 0;
    }

    /// Like [`Self::try_ensure_connected`], logging the failure.
    pub fn ensure_connected(&mut self, delay: &mut impl DelayNs) -> bool {
        match self.try_ensure_connected(delay) {
            Ok(()) => true,
            Err(e) => {
                warn!("Error: WiFi not connected ({e})");
                false
            }
        }
    }

    /// Checks the link and spends the reconnect budget if it is down.
    pub fn try_ensure_connected(
        &mut self,
        delay: &mut impl DelayNs,
    ) -> Result<(), ConnectivityError> {
        if self.link.is_connected() {
            self.mark_connected();
            return Ok(());
        }

        if self.state.connected {
            warn!("WiFi link lost");
        }
        self.state.connected = false;

        if !self.state.reconnect_enabled {
            return Err(ConnectivityError::ReconnectDisabled);
        }

        while self.state.reconnect_attempts < self.policy.max_attempts {
            self.state.reconnect_attempts += 1;
            info!(
                "Reconnect attempt {}/{}",
                self.state.reconnect_attempts, self.policy.max_attempts
            );
            if let Err(e) = self.link.reconnect() {
                warn!("Reconnect attempt failed: {e}");
            }
            delay.delay_ms(self.policy.spacing_ms);

            if self.link.is_connected() {
                info!("WiFi reconnected");
                self.mark_connected();
                return Ok(());
            }
        }

        let attempts = self.state.reconnect_attempts;
        self.state.reconnect_enabled = false;
        Err(ConnectivityError::ReconnectExhausted { attempts })
    }

    fn mark_connected(&mut self) {
        self.state.connected = true;
        self.state.reconnect_attempts = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeLink, RecordingDelay};

    fn supervisor(link: FakeLink) -> ConnectivitySupervisor<FakeLink> {
        ConnectivitySupervisor::new(link, ReconnectPolicy::default())
    }

    #[test]
    fn connected_link_needs_no_attempts() {
        let mut delay = RecordingDelay::default();
        let mut sup = supervisor(FakeLink::up());
        assert!(sup.ensure_connected(&mut delay));
        assert_eq!(sup.link_mut().reconnects, 0);
        assert!(sup.state().connected);
    }

    #[test]
    fn reconnect_is_bounded_and_disables_itself() {
        let mut delay = RecordingDelay::default();
        let mut sup = supervisor(FakeLink::down());

        assert_eq!(
            sup.try_ensure_connected(&mut delay),
            Err(ConnectivityError::ReconnectExhausted { attempts: 5 })
        );
        assert_eq!(sup.link_mut().reconnects, 5);
        assert_eq!(delay.total_ms(), 5_000);
        assert!(!sup.state().reconnect_enabled);

        // No further attempts until the budget is refreshed.
        assert_eq!(
            sup.try_ensure_connected(&mut delay),
            Err(ConnectivityError::ReconnectDisabled)
        );
        assert_eq!(sup.link_mut().reconnects, 5);

        sup.refresh_budget();
        assert!(!sup.ensure_connected(&mut delay));
        assert_eq!(sup.link_mut().reconnects, 10);
        assert!(sup.state().reconnect_attempts <= 5);
    }

    #[test]
    fn reconnect_stops_as_soon_as_link_returns() {
        let mut delay = RecordingDelay::default();
        let mut sup = supervisor(FakeLink::up_after_reconnects(2));
        sup.state.connected = true;

        assert!(sup.ensure_connected(&mut delay));
        assert_eq!(sup.link_mut().reconnects, 2);
        assert_eq!(sup.state().reconnect_attempts, 0);
        assert!(sup.state().connected);
    }

    #[test]
    fn startup_waits_for_the_link() {
        let mut delay = RecordingDelay::default();
        let mut sup = supervisor(FakeLink::up_after_polls(3));

        sup.connect_at_startup("miners", "hunter22", &mut delay).unwrap();
        assert_eq!(sup.link_mut().began_with.as_deref(), Some("miners"));
        assert_eq!(delay.total_ms(), 3_000);
        assert!(sup.state().connected);
    }

    #[test]
    fn bounded_startup_gives_up() {
        let mut delay = RecordingDelay::default();
        let policy = ReconnectPolicy {
            startup_max_attempts: Some(4),
            ..ReconnectPolicy::default()
        };
        let mut sup = ConnectivitySupervisor::new(FakeLink::down(), policy);

        assert_eq!(
            sup.connect_at_startup("miners", "hunter22", &mut delay),
            Err(ConnectivityError::StartupExhausted { attempts: 4 })
        );
        assert!(!sup.state().connected);
    }
}
