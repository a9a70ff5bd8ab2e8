// This module handles board-specific pin mappings for the 8-bit LCD shield.
//! The following wiring is assumed (ESP32-S3 DevKitC-1):
//! - LCD_CS  => GPIO12
//! - LCD_CD  => GPIO13 (RS / D/C)
//! - LCD_WR  => GPIO14
//! - LCD_RD  => GPIO15
//! - LCD_RST => GPIO16
//! - LCD_D0..LCD_D7 => GPIO1, GPIO2, GPIO4, GPIO5, GPIO6, GPIO7, GPIO8, GPIO9
//!   (GPIO3 is a strapping pin, skipped)
//! - GND => GND, 5V => 5V (the shield has its own 3.3V regulator)

use esp_backtrace as _;
use esp_hal::{
    delay::Delay,
    gpio::{Flex, Level, Output, OutputConfig},
    peripherals::Peripherals,
};

use crate::bus::{ControlPins, DataPin, GpioBus};

// Data lines swap between push-pull output and floating input at runtime
impl DataPin for Flex<'_> {
    fn set_output_mode(&mut self) {
        self.set_input_enable(false);
        self.set_output_enable(true);
    }

    fn set_input_mode(&mut self) {
        self.set_output_enable(false);
        self.set_input_enable(true);
    }
}

pub type LcdBus<'a> = GpioBus<Output<'a>, Flex<'a>, Delay>;

// Default profile
pub fn init_board_pins(p: Peripherals) -> LcdBus<'static> {
    // Control lines start idle (high)
    let ctrl = ControlPins {
        cs:  Output::new(p.GPIO12, Level::High, OutputConfig::default()),
        cd:  Output::new(p.GPIO13, Level::High, OutputConfig::default()),
        wr:  Output::new(p.GPIO14, Level::High, OutputConfig::default()),
        rd:  Output::new(p.GPIO15, Level::High, OutputConfig::default()),
        rst: Output::new(p.GPIO16, Level::High, OutputConfig::default()),
    };

    let data = [
        Flex::new(p.GPIO1),
        Flex::new(p.GPIO2),
        Flex::new(p.GPIO4),
        Flex::new(p.GPIO5),
        Flex::new(p.GPIO6),
        Flex::new(p.GPIO7),
        Flex::new(p.GPIO8),
        Flex::new(p.GPIO9),
    ];

    GpioBus::new(ctrl, data, Delay::new())
}
