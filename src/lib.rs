#![cfg_attr(not(test), no_std)]

//! ESP32-C3 On-Air Indicator Library
//!
//! This library provides the status coordination and rendering core of a
//! network-controlled LED indicator: a shared device phase with a validated
//! transition graph, per-phase strip animations, a fixed-rate render step and
//! a single-client TCP control session. Hardware glue (RMT strip transport,
//! WiFi joiner, TCP listener) is only compiled for the bare-metal target.

pub mod animation;
pub mod color;
pub mod control_server;
pub mod led_control;
pub mod render;
pub mod state_machine;
#[cfg(target_os = "none")]
pub mod wifi;

/// Project version information
pub const VERSION: &str = "0.1.0-dev";

/// Default configuration constants
pub mod config {
    /// Number of addressable LEDs on the strip
    pub const LED_STRIP_LENGTH: usize = 24;

    /// LEDs making up one logical round of the rainbow and chaser patterns
    pub const LEDS_PER_ROUND: usize = 24;

    /// Default LED data GPIO pin
    pub const LED_DATA_PIN: u8 = 4;

    /// TCP port of the control channel
    pub const CONTROL_PORT: u16 = 3333;

    /// Seconds of silence before the first keep-alive probe
    pub const KEEPALIVE_IDLE_SECS: u64 = 5;

    /// Seconds between keep-alive probes
    pub const KEEPALIVE_INTERVAL_SECS: u64 = 5;

    /// Unanswered probes before the peer is considered gone
    pub const KEEPALIVE_COUNT: u64 = 3;

    /// Render loop period in milliseconds (50 fps)
    pub const RENDER_TICK_MS: u32 = 20;

    /// Upper bound for a single strip refresh
    pub const REFRESH_TIMEOUT_MS: u32 = 100;

    /// Half period of the error blink
    pub const BLINK_INTERVAL_MS: u32 = 500;

    /// WiFi configuration
    /// Read from environment variables at compile time
    pub const WIFI_SSID: &str = env!("WIFI_SSID");
    pub const WIFI_PASSWORD: &str = env!("WIFI_PASSWORD");

    /// WiFi connection timeout in milliseconds
    pub const WIFI_CONNECT_TIMEOUT_MS: u32 = 10000;

    /// WiFi reconnection interval in milliseconds
    pub const WIFI_RECONNECT_INTERVAL_MS: u32 = 5000;
}

/// Error types for the indicator board
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardError {
    /// Station credentials rejected or the radio failed to start
    WiFiConfig,
    /// Association failed or timed out
    WiFiConnect,
    /// Associated, but no DHCP lease within the connect timeout
    DhcpTimeout,
}
