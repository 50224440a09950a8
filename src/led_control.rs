//! LED strip driver port
//!
//! The render loop only talks to [`LedDriver`]. The WS2812 transport built on
//! the RMT peripheral lives here too but is only compiled for the board.

use core::fmt;
use log::{error, warn};

/// Failure reported by an LED strip transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverError {
    /// The strip transport never came up
    NotInitialized,
    /// Pixel index beyond the strip length
    IndexOutOfRange { index: usize, len: usize },
    /// The peripheral refused the transmission
    Transmit,
    /// The transmission took longer than allowed
    Timeout,
}

/// Addressable LED strip
///
/// Pixels are staged with [`set_pixel`](LedDriver::set_pixel) and only reach
/// the LEDs on [`refresh`](LedDriver::refresh). The strip keeps no frame of its
/// own between refreshes from the caller's point of view.
pub trait LedDriver {
    /// Stage one pixel, `index` in `[0, strip length)`
    fn set_pixel(&mut self, index: usize, r: u8, g: u8, b: u8) -> Result<(), DriverError>;

    /// Push the staged pixels out to the strip
    fn refresh(&mut self, timeout_ms: u32) -> Result<(), DriverError>;

    /// Turn every LED off
    fn clear(&mut self, timeout_ms: u32) -> Result<(), DriverError>;
}

/// A strip whose initialization may have failed. `None` rejects every call.
impl<D: LedDriver> LedDriver for Option<D> {
    fn set_pixel(&mut self, index: usize, r: u8, g: u8, b: u8) -> Result<(), DriverError> {
        self.as_mut()
            .ok_or(DriverError::NotInitialized)?
            .set_pixel(index, r, g, b)
    }

    fn refresh(&mut self, timeout_ms: u32) -> Result<(), DriverError> {
        self.as_mut()
            .ok_or(DriverError::NotInitialized)?
            .refresh(timeout_ms)
    }

    fn clear(&mut self, timeout_ms: u32) -> Result<(), DriverError> {
        self.as_mut()
            .ok_or(DriverError::NotInitialized)?
            .clear(timeout_ms)
    }
}

/// Put a transmit channel back after one transmission and map the outcome.
///
/// `outcome` is the result of starting the transmission, holding the result
/// of waiting for it. A channel handed back by the wait is always restored,
/// even on failure. A rejected start consumes the channel for good, so every
/// later call reports `NotInitialized`.
#[cfg_attr(not(target_os = "none"), allow(dead_code))]
fn settle_transmission<C, E: fmt::Debug>(
    slot: &mut Option<C>,
    outcome: Result<Result<C, (E, C)>, E>,
) -> Result<(), DriverError> {
    match outcome {
        Ok(Ok(channel)) => {
            *slot = Some(channel);
            Ok(())
        }
        Ok(Err((e, channel))) => {
            *slot = Some(channel);
            warn!("[LED] RMT transmission failed: {:?}", e);
            Err(DriverError::Transmit)
        }
        Err(e) => {
            error!("[LED] RMT transmit rejected, channel lost until restart: {:?}", e);
            Err(DriverError::Transmit)
        }
    }
}

#[cfg(target_os = "none")]
pub use rmt::RmtLedStrip;

#[cfg(target_os = "none")]
mod rmt {
    use super::{DriverError, LedDriver, settle_transmission};
    use crate::config::LED_STRIP_LENGTH;
    use embassy_time::{Duration, Instant};
    use esp_hal::gpio::Level;
    use esp_hal::rmt::{PulseCode, TxChannel};

    /// Bytes per LED, in wire order G, R, B
    const BYTES_PER_LED: usize = 3;

    /// 8 pulses per byte + reset
    const PULSE_COUNT: usize = LED_STRIP_LENGTH * BYTES_PER_LED * 8 + 1;

    /// WS2812 strip driven through an RMT TX channel clocked at 10MHz
    pub struct RmtLedStrip<TX>
    where
        TX: TxChannel,
    {
        channel: Option<TX>,
        pixels: [u8; LED_STRIP_LENGTH * BYTES_PER_LED],
        pulses: [u32; PULSE_COUNT],
    }

    impl<TX> RmtLedStrip<TX>
    where
        TX: TxChannel,
    {
        /// Create a strip on an already configured RMT channel
        pub fn new(channel: TX) -> Self {
            Self {
                channel: Some(channel),
                pixels: [0; LED_STRIP_LENGTH * BYTES_PER_LED],
                pulses: [0; PULSE_COUNT],
            }
        }

        /// Encode the staged pixels and transmit them
        fn transmit(&mut self, timeout_ms: u32) -> Result<(), DriverError> {
            for (i, &byte) in self.pixels.iter().enumerate() {
                self.pulses[i * 8..i * 8 + 8].copy_from_slice(&byte_to_pulses(byte));
            }

            // Add reset pulse
            self.pulses[PULSE_COUNT - 1] = PulseCode::new(Level::Low, 800, Level::Low, 0);

            let started = Instant::now();
            let channel = self.channel.take().ok_or(DriverError::NotInitialized)?;
            let outcome = channel
                .transmit(&self.pulses)
                .map(|transaction| transaction.wait());
            settle_transmission(&mut self.channel, outcome)?;

            if started.elapsed() > Duration::from_millis(u64::from(timeout_ms)) {
                return Err(DriverError::Timeout);
            }

            Ok(())
        }
    }

    impl<TX> LedDriver for RmtLedStrip<TX>
    where
        TX: TxChannel,
    {
        fn set_pixel(&mut self, index: usize, r: u8, g: u8, b: u8) -> Result<(), DriverError> {
            if index >= LED_STRIP_LENGTH {
                return Err(DriverError::IndexOutOfRange {
                    index,
                    len: LED_STRIP_LENGTH,
                });
            }

            let offset = index * BYTES_PER_LED;
            self.pixels[offset] = g;
            self.pixels[offset + 1] = r;
            self.pixels[offset + 2] = b;
            Ok(())
        }

        fn refresh(&mut self, timeout_ms: u32) -> Result<(), DriverError> {
            self.transmit(timeout_ms)
        }

        fn clear(&mut self, timeout_ms: u32) -> Result<(), DriverError> {
            self.pixels.fill(0);
            self.transmit(timeout_ms)
        }
    }

    /// Convert a single byte to RMT pulses, MSB first
    /// WS2812 timing at 10MHz: 1-bit = 8 high + 4 low cycles, 0-bit = 4 high + 8 low cycles
    fn byte_to_pulses(byte: u8) -> [u32; 8] {
        let mut pulses = [0u32; 8];

        for (i, pulse) in pulses.iter_mut().enumerate() {
            let bit = (byte >> (7 - i)) & 1;
            *pulse = if bit == 1 {
                PulseCode::new(Level::High, 8, Level::Low, 4)
            } else {
                PulseCode::new(Level::High, 4, Level::Low, 8)
            };
        }

        pulses
    }
}
