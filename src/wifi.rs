//! WiFi module for ESP32-C3 board
//!
//! Joins the configured network with esp-wifi, waits for an embassy-net DHCP
//! lease and reports every step through the status register.

use crate::state_machine::{DevicePhase, StatusRegister};
use crate::{BoardError, config};
use embassy_net::Stack;
use embassy_time::{Duration, Timer, with_timeout};
use esp_wifi::wifi::{AuthMethod, ClientConfiguration, Configuration, WifiController};
use log::{error, info, warn};

/// Link check period once joined
const MONITOR_INTERVAL: Duration = Duration::from_secs(1);

/// WiFi manager keeping the station associated for the device's lifetime
pub struct WiFiManager<'a> {
    controller: WifiController<'a>,
    stack: Stack<'a>,
}

impl<'a> WiFiManager<'a> {
    pub fn new(controller: WifiController<'a>, stack: Stack<'a>) -> Self {
        Self { controller, stack }
    }

    /// Join, hold and rejoin the network forever
    pub async fn run(&mut self, status: &StatusRegister) -> ! {
        if !Self::advance(status, DevicePhase::Joining) {
            Self::halt().await;
        }

        if let Err(e) = self.configure(config::WIFI_SSID, config::WIFI_PASSWORD).await {
            error!("[WIFI] Station setup failed: {:?}", e);
            status.fail();
            Self::halt().await;
        }

        loop {
            match self.join().await {
                Ok(()) => {
                    if !Self::advance(status, DevicePhase::Idle) {
                        Self::halt().await;
                    }
                    self.monitor().await;
                    warn!("[WIFI] WiFi connection lost!");
                }
                Err(e) => warn!("[WIFI] Failed to join {}: {:?}", config::WIFI_SSID, e),
            }

            if !Self::advance(status, DevicePhase::Disconnected) {
                Self::halt().await;
            }
            Timer::after(Duration::from_millis(u64::from(config::WIFI_RECONNECT_INTERVAL_MS))).await;
            if !Self::advance(status, DevicePhase::Joining) {
                Self::halt().await;
            }
        }
    }

    /// Apply the station configuration and start the radio
    async fn configure(&mut self, ssid: &str, password: &str) -> Result<(), BoardError> {
        if ssid.is_empty() {
            return Err(BoardError::WiFiConfig);
        }

        let client_config = ClientConfiguration {
            ssid: ssid.try_into().map_err(|_| BoardError::WiFiConfig)?,
            password: password.try_into().map_err(|_| BoardError::WiFiConfig)?,
            auth_method: if password.is_empty() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            },
            ..Default::default()
        };

        self.controller
            .set_configuration(&Configuration::Client(client_config))
            .map_err(|_| BoardError::WiFiConfig)?;
        self.controller
            .start_async()
            .await
            .map_err(|_| BoardError::WiFiConfig)?;

        info!("[WIFI] Station started");
        Ok(())
    }

    /// Associate and wait for a DHCP lease, both bounded by the connect timeout
    async fn join(&mut self) -> Result<(), BoardError> {
        let timeout = Duration::from_millis(u64::from(config::WIFI_CONNECT_TIMEOUT_MS));

        info!("[WIFI] Connecting to WiFi network: {}", config::WIFI_SSID);
        match with_timeout(timeout, self.controller.connect_async()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("[WIFI] Connect error: {:?}", e);
                return Err(BoardError::WiFiConnect);
            }
            Err(_) => {
                warn!("[WIFI] Connect timed out");
                // Drop the pending attempt before the next one
                let _ = self.controller.disconnect_async().await;
                return Err(BoardError::WiFiConnect);
            }
        }

        if with_timeout(timeout, self.stack.wait_config_up()).await.is_err() {
            let _ = self.controller.disconnect_async().await;
            return Err(BoardError::DhcpTimeout);
        }

        if let Some(ip_config) = self.stack.config_v4() {
            info!("[WIFI] DHCP assigned IP address: {}", ip_config.address.address());
        }
        Ok(())
    }

    /// Return once the association is gone
    async fn monitor(&mut self) {
        loop {
            Timer::after(MONITOR_INTERVAL).await;
            if !self.controller.is_connected().unwrap_or(false) {
                return;
            }
        }
    }

    /// Request a phase change, `false` if the device has failed meanwhile
    fn advance(status: &StatusRegister, to: DevicePhase) -> bool {
        status.transition(to).is_ok() || status.read() != DevicePhase::Error
    }

    async fn halt() -> ! {
        warn!("[WIFI] Device in error state, joiner stopped");
        loop {
            core::future::pending::<()>().await;
        }
    }
}
