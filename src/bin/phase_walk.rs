//! On-device phase walk
//!
//! Walks the status register through every phase along legal edges, checks
//! that an illegal edge is refused, and shows each phase's animation on the
//! real strip for two seconds.

#![no_std]
#![no_main]

use esp_hal::clock::CpuClock;
use esp_hal::delay::Delay;
use esp_hal::gpio::Level;
use esp_hal::rmt::{Rmt, TxChannelConfig, TxChannelCreator};
use esp_hal::time::Rate;
use log::{error, info};

use on_air_light::config;
use on_air_light::led_control::{LedDriver, RmtLedStrip};
use on_air_light::render::Renderer;
use on_air_light::state_machine::{DevicePhase, InvalidTransition, StatusRegister};

// Add app descriptor for espflash compatibility
esp_bootloader_esp_idf::esp_app_desc!();

const PATH: [DevicePhase; 9] = [
    DevicePhase::Joining,
    DevicePhase::Disconnected,
    DevicePhase::Joining,
    DevicePhase::Idle,
    DevicePhase::OffAir,
    DevicePhase::OnAir,
    DevicePhase::OffAir,
    DevicePhase::Idle,
    DevicePhase::Error,
];

/// How long each phase stays on the strip
const SHOW_MS: u32 = 2000;

static STATUS: StatusRegister = StatusRegister::new();

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    esp_println::println!("[WALK] Failed: {}", info);
    loop {}
}

/// Render the current phase for `SHOW_MS`
fn show<D: LedDriver, const N: usize>(renderer: &mut Renderer<'_, D, N>, delay: &Delay) {
    for _ in 0..SHOW_MS / config::RENDER_TICK_MS {
        renderer.tick();
        delay.delay_millis(config::RENDER_TICK_MS);
    }
}

#[esp_hal::main]
fn main() -> ! {
    let hal_config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(hal_config);
    esp_println::logger::init_logger_from_env();

    info!("=== Phase walk ===");

    let strip = match Rmt::new(peripherals.RMT, Rate::from_mhz(10)) {
        Ok(rmt) => {
            let tx_config = TxChannelConfig::default()
                .with_clk_divider(1)
                .with_idle_output_level(Level::Low)
                .with_idle_output(false)
                .with_carrier_modulation(false);
            rmt.channel0
                .configure(peripherals.GPIO4, tx_config)
                .ok()
                .map(RmtLedStrip::new)
        }
        Err(e) => {
            error!("[WALK] RMT unavailable: {:?}", e);
            None
        }
    };
    assert!(strip.is_some(), "LED strip not initialized");

    let mut renderer: Renderer<'_, _, { config::LED_STRIP_LENGTH }> = Renderer::new(strip, &STATUS);
    let delay = Delay::new();

    assert_eq!(STATUS.read(), DevicePhase::Starting);
    info!("[WALK] {:?}", STATUS.read());
    show(&mut renderer, &delay);

    for (step, &to) in PATH.iter().enumerate() {
        let from = STATUS.read();

        if to == DevicePhase::OnAir {
            // Booting is never re-entered
            assert_eq!(
                STATUS.transition(DevicePhase::Starting),
                Err(InvalidTransition {
                    from,
                    to: DevicePhase::Starting
                })
            );
            info!("[WALK] {:?} -> Starting refused", from);
        }

        assert_eq!(STATUS.transition(to), Ok(from), "step {}", step + 1);
        info!("[WALK] {}. {:?} -> {:?}", step + 1, from, to);
        show(&mut renderer, &delay);
    }

    assert_eq!(STATUS.read(), DevicePhase::Error);
    info!("=== Phase walk passed ===");

    // Leave the error blink running
    loop {
        renderer.tick();
        delay.delay_millis(config::RENDER_TICK_MS);
    }
}
