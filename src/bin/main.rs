//! HX8357 BMP loader
//! ========================================
//! source ~/export-esp.sh
//! cargo run --release --features esp32s3
//! ========================================
//!
//! Brings up the 3.5" HX8357-D shield on the 8-bit parallel bus, logs the
//! controller id and draws `jumpers.bmp` from flash.

//% CHIPS: esp32s3
//% FEATURES: esp-hal/unstable

#![no_std]
#![no_main]

// Define the application description, which is placed in a special section of the binary.
// This is used by the bootloader to verify the application.
// The macro automatically fills in the fields.
esp_bootloader_esp_idf::esp_app_desc!();

use esp_backtrace as _;

// ESP-HAL imports
use esp_hal::{
    delay::Delay,
    main,
    timer::systimer::{SystemTimer, Unit},
    Config,
};

// Embedded HAL trait for delay
use embedded_hal::delay::DelayNs;

// Println macro
use esp_println::println;
use log::{error, info, warn};

// Module imports
use hx8357_bmp::{
    bmp::BlitError,
    hx8357::Hx8357,
    storage::FlashVolume,
    wiring::init_board_pins,
};

// Images served from flash, looked up by name like files on a card
static FILES: [(&str, &[u8]); 1] = [
    ("jumpers.bmp", include_bytes!("../../assets/jumpers.bmp")),
];

fn now_ms() -> u64 {
    let t = SystemTimer::unit_value(Unit::Unit0);
    t.saturating_mul(1000) / SystemTimer::ticks_per_second()
}

#[main]
fn main() -> ! {
    // Initialize peripherals
    let peripherals = esp_hal::init(Config::default());
    esp_println::logger::init_logger(log::LevelFilter::Info);

    let mut delay = Delay::new();

    // Set all control bits to idle state, reset line released
    let mut bus = init_board_pins(peripherals);
    bus.idle_all().unwrap();

    let mut lcd = Hx8357::new(bus, Delay::new());
    lcd.reset().unwrap();
    delay.delay_ms(1000);

    let id = lcd.identify().unwrap();
    println!("ID = {:X}", id.id);
    if !id.is_confirmed() {
        warn!("controller not recognised, id {:#06x} is a guess", id.id);
    }

    lcd.init().unwrap();

    let mut volume = FlashVolume::new(&FILES);
    match lcd.draw_bmp(&mut volume, "jumpers.bmp", 0, 0, &now_ms) {
        Ok(report) => info!(
            "{} px in {} flushes, {} seeks",
            report.pixels, report.flushes, report.seeks
        ),
        // origin off screen, nothing to do
        Err(BlitError::OutOfBounds) => {}
        Err(e) => error!("draw failed: {:?}", e),
    }

    loop {
        core::hint::spin_loop();
    }
}
