// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! swdburner - ESP32-C3 Firmware
//!
//! At boot, stages any file left in the upload area of local storage.
//! Then polls for an attached STM32 every 100ms and, once one has settled,
//! programs the staged image into it.
//!
//! Wiring (ESP32-C3 GPIO):
//! - GPIO0: SWDIO
//! - GPIO1: SWCLK
//! - GPIO2: nRST (optional, used with `"resetMode": "hardware"`)
//! - GPIO8: Status LED, active low.  On while ready, flashing while
//!   burning, off when idle.
//!
//! To change other configuration:
//! - `HEAP_SIZE`: Size of the heap used by the application.  The page
//!   buffer and the configuration JSON are allocated from it.
//! - `TICK`: The burner's polling interval.  The settle times in
//!   `swdburner::burner` are counted in ticks.
//! - `storage::PARTITION_BASE` and `storage::PARTITION_SIZE` locate local
//!   storage in the ESP32-C3's flash.

#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![feature(type_alias_impl_trait)]
#![feature(impl_trait_in_assoc_type)]

extern crate alloc;
use embassy_executor::Spawner;
use embassy_time::{Duration, Instant, Ticker, Timer};
use esp_alloc as _;
use esp_backtrace as _;
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::{clock::CpuClock, timer::timg::TimerGroup};
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use static_cell::make_static;

use swdburner::source::StorageImage;
use swdburner::{
    Burner, BurnerConfig, BurnerState, CONFIG_OFFSET, Clock, IMAGE_OFFSET, IMAGE_REGION_SIZE,
    SwdProgrammer, stage_upload,
};

mod line;
mod storage;

use line::GpioLine;
use storage::Partition;

esp_bootloader_esp_idf::esp_app_desc!();

// Heap size for the application.
pub const HEAP_SIZE: usize = 64 * 1024;

// Burner polling interval.
const TICK: Duration = Duration::from_millis(100);

type LocalBurner = Burner<
    SwdProgrammer<GpioLine<'static>>,
    StorageImage<Partition<esp_storage::FlashStorage>>,
    EmbassyClock,
>;

/// Milliseconds since boot.
pub struct EmbassyClock;

impl Clock for EmbassyClock {
    fn now_ms(&self) -> u64 {
        Instant::now().as_millis()
    }
}

// swdburner firmware's main function.
//
// - Set up the HAL
// - Set up the heap
// - Load the configuration, stage any upload and open the staged image
// - Set up the SWD lines
// - Start the burner task
// - Loop forever to prevent main from exiting.
#[esp_hal_embassy::main]
async fn main(spawner: Spawner) -> ! {
    // Set up the logger
    esp_println::logger::init_logger_from_env();

    info!("*** swdburner ***");

    // Set up the HAL
    let hal_config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(hal_config);

    let clocks = esp_hal::clock::Clocks::get();
    info!(
        "Value: {} running at {}MHz",
        esp_hal::chip!(),
        clocks.cpu_clock.as_mhz()
    );

    // Set up the heap allocator
    esp_alloc::heap_allocator!(size: HEAP_SIZE);

    // Initialize embassy
    let timg1 = TimerGroup::new(peripherals.TIMG1);
    esp_hal_embassy::init(timg1.timer0);

    // Load configuration, then stage any uploaded file
    let mut local = Partition::local();
    let mut config = BurnerConfig::load(&mut local, CONFIG_OFFSET);
    info!("Value: Config {config}");

    let source = match StorageImage::new(Partition::local(), IMAGE_OFFSET, IMAGE_REGION_SIZE) {
        Ok(mut image) => {
            match stage_upload(&mut local, &mut image, &mut config) {
                Ok(Some(_)) => match config.store(&mut local, CONFIG_OFFSET) {
                    Ok(()) => info!("OK:    Config updated for {}", config.file),
                    Err(e) => error!("Error: Failed to save config {e:?}"),
                },
                Ok(None) => (),
                Err(e) => error!("Error: Failed to stage upload {e:?}"),
            }
            if image.is_staged() {
                Some(image)
            } else {
                info!("Info:  No image staged");
                None
            }
        }
        Err(e) => {
            error!("Error: Failed to open image region {e:?}");
            None
        }
    };

    // Set up the SWD lines
    let line = GpioLine::new(peripherals.GPIO0, peripherals.GPIO1, Some(peripherals.GPIO2));
    let programmer = SwdProgrammer::from_line(line);

    let led = Output::new(peripherals.GPIO8, Level::High, OutputConfig::default());

    let burner = make_static!(Burner::new(programmer, source, EmbassyClock, config));
    spawner.must_spawn(burner_task(burner, led));

    loop {
        Timer::after(Duration::from_secs(1)).await;
    }
}

#[embassy_executor::task]
async fn burner_task(burner: &'static mut LocalBurner, mut led: Output<'static>) -> ! {
    let mut ticker = Ticker::every(TICK);
    let mut last = burner.state();
    let mut blink = false;

    loop {
        let state = burner.tick();

        if state != last {
            info!("Value: Burner {last} -> {state}");
            match serde_json::to_string(&burner.status()) {
                Ok(json) => info!("Value: Status {json}"),
                Err(e) => warn!("Error: Failed to serialize status {e:?}"),
            }
            last = state;
        }

        // Active low
        let on = match state {
            BurnerState::Ready => true,
            BurnerState::Start | BurnerState::Running | BurnerState::Locked => {
                blink = !blink;
                blink
            }
            BurnerState::Finish => !burner.session().error.is_error(),
            BurnerState::Idle => false,
        };
        led.set_level(Level::from(!on));

        ticker.next().await;
    }
}
