//! HX8357 / ILI9341 register map (only what this driver touches).
//!
//! The MIPI DCS opcodes (0x00..0x5F) are shared by both families, so one
//! window/stream path serves whichever panel is fitted.

pub const NOP: u8 = 0x00;
pub const SWRESET: u8 = 0x01;
pub const RDDID: u8 = 0x04;
pub const SLPOUT: u8 = 0x11;
pub const DISPON: u8 = 0x29;
pub const CASET: u8 = 0x2A;
pub const PASET: u8 = 0x2B;
pub const RAMWR: u8 = 0x2C;
pub const TEON: u8 = 0x35;
pub const MADCTL: u8 = 0x36;
pub const COLMOD: u8 = 0x3A;
pub const TEARLINE: u8 = 0x44;

// Himax extended command set
pub const SETOSC: u8 = 0xB0;
pub const SETPWR1: u8 = 0xB1;
pub const SETRGB: u8 = 0xB3;
pub const SETCYC: u8 = 0xB4;
pub const SETCOM: u8 = 0xB6;
pub const SETC: u8 = 0xB9;
pub const SETSTBA: u8 = 0xC0;
pub const SETPANEL: u8 = 0xCC;
pub const RDHXID: u8 = 0xD0;

// ILI9341 "Read ID4"
pub const RDID4: u8 = 0xD3;

/// Payload of SETC that unlocks the Himax extended commands.
pub const SETC_UNLOCK: u32 = 0xFF_83_57;
