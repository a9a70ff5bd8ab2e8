//! Controller bring-up tables.
//!
//! A table is a flat list of register writes and settle delays, replayed in
//! order by `Hx8357::run_init_table`. Order and delay placement are part of
//! the table: the panel does not come up if entries are reordered.

use crate::regs::*;

/// One step of an init sequence.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InitEntry {
    /// Write `opcode`, then `payload` verbatim in data mode.
    Command { opcode: u8, payload: &'static [u8] },
    /// Sleep for the given number of milliseconds.
    Delay { ms: u16 },
}

const fn cmd(opcode: u8, payload: &'static [u8]) -> InitEntry {
    InitEntry::Command { opcode, payload }
}

const fn delay(ms: u16) -> InitEntry {
    InitEntry::Delay { ms }
}

/// HX8357-D, 320x480, RGB565.
pub static HX8357D_INIT: &[InitEntry] = &[
    cmd(SWRESET, &[]),
    cmd(SETC, &[0xFF, 0x83, 0x57]),
    delay(250),
    cmd(SETRGB, &[0x00, 0x00, 0x06, 0x06]),
    cmd(SETCOM, &[0x25]),                         // -1.52V
    cmd(SETOSC, &[0x68]),                         // normal 70Hz, idle 55Hz
    cmd(SETPANEL, &[0x05]),                       // BGR, gate direction swapped
    cmd(SETPWR1, &[0x00, 0x15, 0x1C, 0x1C, 0x83, 0xAA]),
    cmd(SETSTBA, &[0x50, 0x50, 0x01, 0x3C, 0x1E, 0x08]),
    cmd(SETCYC, &[0x02, 0x40, 0x00, 0x2A, 0x2A, 0x0D, 0x78]),
    cmd(COLMOD, &[0x55]),                         // 16bpp
    cmd(MADCTL, &[0xC0]),
    cmd(TEON, &[0x00]),
    cmd(TEARLINE, &[0x00, 0x02]),
    cmd(SLPOUT, &[]),
    delay(150),
    cmd(DISPON, &[]),
    delay(50),
];
