use bitaxe_logger_common::connectivity::NetworkLink;
use bitaxe_logger_common::error::LinkError;
use embedded_svc::wifi::{AuthMethod, ClientConfiguration, Configuration};
use esp_idf_svc::wifi::{BlockingWifi, EspWifi};
use log::{debug, info, warn};

type Wifi = BlockingWifi<EspWifi<'static>>;

/// WiFi station driven through the blocking ESP-IDF wrapper.
pub struct EspWifiLink {
    wifi: Wifi,
}

impl EspWifiLink {
    pub fn new(wifi: Wifi) -> Self {
        Self { wifi }
    }
}

fn link_error(e: impl core::fmt::Display) -> LinkError {
    LinkError::new(e.to_string())
}

impl NetworkLink for EspWifiLink {
    fn begin(&mut self, ssid: &str, password: &str) -> Result<(), LinkError> {
        let auth_method = if password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        let wifi_configuration = Configuration::Client(ClientConfiguration {
            ssid: ssid
                .try_into()
                .map_err(|_| LinkError::new("wifi ssid too long"))?,
            password: password
                .try_into()
                .map_err(|_| LinkError::new("wifi password too long"))?,
            auth_method,
            ..Default::default()
        });

        self.wifi
            .set_configuration(&wifi_configuration)
            .map_err(link_error)?;

        self.wifi.start().map_err(link_error)?;
        info!("Wifi started");

        // A failed first association is retried by the supervisor.
        if let Err(e) = self.wifi.connect() {
            warn!("Wifi connect failed: {e}");
            return Ok(());
        }
        info!("Wifi connected");

        self.wifi.wait_netif_up().map_err(link_error)?;
        info!("Wifi netif up");
        Ok(())
    }

    fn is_connected(&mut self) -> bool {
        self.wifi.is_up().unwrap_or(false)
    }

    fn reconnect(&mut self) -> Result<(), LinkError> {
        if let Err(e) = self.wifi.disconnect() {
            debug!("Wifi disconnect before reconnect failed: {e}");
        }
        self.wifi.connect().map_err(link_error)?;
        self.wifi.wait_netif_up().map_err(link_error)?;
        if let Ok(ip_info) = self.wifi.wifi().sta_netif().get_ip_info() {
            info!("Wifi DHCP info: {:?}", ip_info);
        }
        Ok(())
    }
}
