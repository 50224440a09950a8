#![no_std]
#![no_main]

use embassy_net::{Config, Runner, Stack, StackResources};
use embassy_time::{Duration, Ticker};
use esp_hal::clock::CpuClock;
use esp_hal::gpio::Level;
use esp_hal::rmt::{Rmt, TxChannelConfig, TxChannelCreator};
use esp_hal::rng::Rng;
use esp_hal::time::Rate;
use esp_hal::timer::timg::TimerGroup;
use esp_hal_embassy::Executor;
use esp_wifi::wifi::{self, WifiController, WifiDevice};
use log::{error, info};
use static_cell::StaticCell;

use on_air_light::config;
use on_air_light::control_server::ControlServer;
use on_air_light::led_control::RmtLedStrip;
use on_air_light::render::Renderer;
use on_air_light::state_machine::StatusRegister;
use on_air_light::wifi::WiFiManager;

// Add app descriptor for espflash compatibility
esp_bootloader_esp_idf::esp_app_desc!();

type LedChannel = esp_hal::rmt::Channel<esp_hal::Blocking, 0>;
type LedStrip = Option<RmtLedStrip<LedChannel>>;

/// The one device phase shared by every task
static STATUS: StatusRegister = StatusRegister::new();

static WIFI_INIT_CELL: StaticCell<esp_wifi::EspWifiController<'static>> = StaticCell::new();
static STACK_RESOURCES: StaticCell<StackResources<3>> = StaticCell::new();
static EXECUTOR: StaticCell<Executor> = StaticCell::new();

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    esp_println::println!("[MAIN] Panic: {}", info);
    loop {}
}

// Embassy task to run the network stack
#[embassy_executor::task]
async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) -> ! {
    runner.run().await
}

#[embassy_executor::task]
async fn wifi_task(mut wifi_manager: WiFiManager<'static>) -> ! {
    wifi_manager.run(&STATUS).await
}

/// Fixed-rate render loop, one frame per tick
#[embassy_executor::task]
async fn render_task(strip: LedStrip) -> ! {
    let mut renderer: Renderer<'static, LedStrip, { config::LED_STRIP_LENGTH }> =
        Renderer::new(strip, &STATUS);
    let mut ticker = Ticker::every(Duration::from_millis(u64::from(config::RENDER_TICK_MS)));

    loop {
        renderer.tick();
        ticker.next().await;
    }
}

#[embassy_executor::task]
async fn control_task(stack: Stack<'static>) -> ! {
    ControlServer::new(stack, config::CONTROL_PORT, &STATUS)
        .run()
        .await
}

/// Bring up the radio and the DHCP stack
fn init_network(
    timer: esp_hal::timer::timg::Timer<'static>,
    rng: Rng,
    radio_clk: esp_hal::peripherals::RADIO_CLK<'static>,
    wifi: esp_hal::peripherals::WIFI<'static>,
) -> Option<(
    WifiController<'static>,
    Stack<'static>,
    Runner<'static, WifiDevice<'static>>,
)> {
    let wifi_init = match esp_wifi::init(timer, rng, radio_clk) {
        Ok(wifi_init) => wifi_init,
        Err(e) => {
            error!("[WIFI] Driver initialization failed: {:?}", e);
            return None;
        }
    };
    let wifi_init = WIFI_INIT_CELL.init(wifi_init);

    let (controller, interfaces) = match wifi::new(wifi_init, wifi) {
        Ok(parts) => parts,
        Err(e) => {
            error!("[WIFI] Controller creation failed: {:?}", e);
            return None;
        }
    };

    let mut rng = rng;
    let seed = (u64::from(rng.random()) << 32) | u64::from(rng.random());
    let (stack, runner) = embassy_net::new(
        interfaces.sta,
        Config::dhcpv4(Default::default()),
        STACK_RESOURCES.init(StackResources::new()),
        seed,
    );

    info!("[WIFI] Embassy-net stack created with DHCP configuration");
    Some((controller, stack, runner))
}

/// Set up the RMT channel driving the strip
fn init_strip(
    rmt: esp_hal::peripherals::RMT<'static>,
    pin: esp_hal::peripherals::GPIO4<'static>,
) -> LedStrip {
    info!("[LED] Setting up GPIO pin {} for LED data", config::LED_DATA_PIN);

    let rmt = match Rmt::new(rmt, Rate::from_mhz(10)) {
        Ok(rmt) => rmt,
        Err(e) => {
            error!("[LED] Failed to initialize RMT: {:?}", e);
            return None;
        }
    };

    let tx_config = TxChannelConfig::default()
        .with_clk_divider(1)
        .with_idle_output_level(Level::Low)
        .with_idle_output(false)
        .with_carrier_modulation(false);

    match rmt.channel0.configure(pin, tx_config) {
        Ok(channel) => Some(RmtLedStrip::new(channel)),
        Err(e) => {
            error!("[LED] Failed to configure RMT channel: {:?}", e);
            None
        }
    }
}

#[esp_hal::main]
fn main() -> ! {
    let hal_config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(hal_config);

    esp_println::logger::init_logger_from_env();
    info!("[MAIN] On-air light {}", on_air_light::VERSION);

    // Initialize heap allocator for WiFi (72KB)
    esp_alloc::heap_allocator!(size: 72 * 1024);

    // Initialize embassy time system
    let timer_group0 = TimerGroup::new(peripherals.TIMG0);
    esp_hal_embassy::init(timer_group0.timer0);

    let strip = init_strip(peripherals.RMT, peripherals.GPIO4);
    if strip.is_none() {
        STATUS.fail();
    }

    let timer_group1 = TimerGroup::new(peripherals.TIMG1);
    let network = init_network(
        timer_group1.timer0,
        Rng::new(peripherals.RNG),
        peripherals.RADIO_CLK,
        peripherals.WIFI,
    );
    if network.is_none() {
        STATUS.fail();
    }

    let executor = EXECUTOR.init(Executor::new());
    executor.run(|spawner| {
        info!("[MAIN] Spawning render task...");
        spawner.spawn(render_task(strip)).ok();

        if let Some((controller, stack, runner)) = network {
            info!("[MAIN] Spawning network tasks...");
            spawner.spawn(net_task(runner)).ok();
            spawner
                .spawn(wifi_task(WiFiManager::new(controller, stack)))
                .ok();
            spawner.spawn(control_task(stack)).ok();
        }
    });
}
