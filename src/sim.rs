// Test doubles: a simulated HX8357 bus, a recording delay and a BMP builder.

use core::cell::Cell;
use std::vec::Vec;

use embedded_hal::delay::DelayNs;

use crate::bus::{BusDir, ParallelBus};
use crate::storage::{ImageFile, SliceFile, StorageError, Volume};

/// Pin fault injected by `SimBus::fail_reads_after`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SimError;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Event {
    CsActive,
    CsIdle,
    Command(u8),
    Data(u8),
    // WR pulse without re-driving the data lines
    Strobe,
    Read(u8),
    Dir(BusDir),
    RstActive,
    RstIdle,
}

/// Records every primitive and answers register reads from a canned table.
///
/// A read returns the bytes configured for the last opcode written in
/// command mode, one per `read8`, then zeros. Driving the data lines in the
/// wrong direction panics. With `fail_reads_after(n)` every `read8` after the
/// first `n` returns `SimError`.
pub struct SimBus {
    pub events: Vec<Event>,
    regs: Vec<(u8, Vec<u8>)>,
    dir: BusDir,
    cs: bool,
    command_mode: bool,
    last_opcode: Option<u8>,
    read_cursor: usize,
    reads: usize,
    fail_reads_after: Option<usize>,
}

impl Default for SimBus {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            regs: Vec::new(),
            dir: BusDir::Write,
            cs: false,
            command_mode: false,
            last_opcode: None,
            read_cursor: 0,
            reads: 0,
            fail_reads_after: None,
        }
    }
}

impl SimBus {
    pub fn with_reg(mut self, opcode: u8, bytes: &[u8]) -> Self {
        self.regs.retain(|(op, _)| *op != opcode);
        self.regs.push((opcode, bytes.to_vec()));
        self
    }

    pub fn fail_reads_after(mut self, n: usize) -> Self {
        self.fail_reads_after = Some(n);
        self
    }

    pub fn dir(&self) -> BusDir { self.dir }

    pub fn cs_asserted(&self) -> bool { self.cs }

    /// Opcodes written in command mode, in order.
    pub fn commands(&self) -> Vec<u8> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Command(op) => Some(*op),
                _ => None,
            })
            .collect()
    }

    pub fn count_command(&self, opcode: u8) -> usize {
        self.commands().iter().filter(|&&op| op == opcode).count()
    }

    /// Payload bytes that followed each occurrence of `opcode`.
    pub fn payloads(&self, opcode: u8) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        let mut current: Option<Vec<u8>> = None;
        for e in &self.events {
            match *e {
                Event::Command(op) => {
                    if let Some(p) = current.take() {
                        out.push(p);
                    }
                    if op == opcode {
                        current = Some(Vec::new());
                    }
                }
                Event::Data(b) => {
                    if let Some(p) = current.as_mut() {
                        p.push(b);
                    }
                }
                _ => {}
            }
        }
        if let Some(p) = current {
            out.push(p);
        }
        out
    }

    /// Every byte written in data mode.
    pub fn data_bytes(&self) -> Vec<u8> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Data(b) => Some(*b),
                _ => None,
            })
            .collect()
    }

    /// Command and data bytes written to the controller.
    pub fn device_writes(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, Event::Command(_) | Event::Data(_)))
            .count()
    }
}

impl ParallelBus for SimBus {
    type Error = SimError;

    fn cs_active(&mut self) -> Result<(), Self::Error> {
        self.cs = true;
        self.events.push(Event::CsActive);
        Ok(())
    }

    fn cs_idle(&mut self) -> Result<(), Self::Error> {
        self.cs = false;
        self.events.push(Event::CsIdle);
        Ok(())
    }

    fn wr_active(&mut self) -> Result<(), Self::Error> { Ok(()) }
    fn wr_idle(&mut self) -> Result<(), Self::Error> { Ok(()) }
    fn rd_active(&mut self) -> Result<(), Self::Error> { Ok(()) }
    fn rd_idle(&mut self) -> Result<(), Self::Error> { Ok(()) }

    fn cd_command(&mut self) -> Result<(), Self::Error> {
        self.command_mode = true;
        Ok(())
    }

    fn cd_data(&mut self) -> Result<(), Self::Error> {
        self.command_mode = false;
        Ok(())
    }

    fn rst_active(&mut self) -> Result<(), Self::Error> {
        self.events.push(Event::RstActive);
        Ok(())
    }

    fn rst_idle(&mut self) -> Result<(), Self::Error> {
        self.events.push(Event::RstIdle);
        Ok(())
    }

    fn set_dir(&mut self, dir: BusDir) -> Result<(), Self::Error> {
        self.dir = dir;
        self.events.push(Event::Dir(dir));
        Ok(())
    }

    fn wr_strobe(&mut self) -> Result<(), Self::Error> {
        self.events.push(Event::Strobe);
        Ok(())
    }

    fn write8(&mut self, value: u8) -> Result<(), Self::Error> {
        assert_eq!(self.dir, BusDir::Write, "bus contention: write8 with data lines as inputs");
        if self.command_mode {
            self.last_opcode = Some(value);
            self.read_cursor = 0;
            self.events.push(Event::Command(value));
        } else {
            self.events.push(Event::Data(value));
        }
        Ok(())
    }

    fn read8(&mut self) -> Result<u8, Self::Error> {
        assert_eq!(self.dir, BusDir::Read, "read8 with data lines as outputs");
        if self.fail_reads_after.is_some_and(|n| self.reads >= n) {
            return Err(SimError);
        }
        self.reads += 1;
        let value = self
            .last_opcode
            .and_then(|op| self.regs.iter().find(|(r, _)| *r == op))
            .and_then(|(_, bytes)| bytes.get(self.read_cursor).copied())
            .unwrap_or(0);
        self.read_cursor += 1;
        self.events.push(Event::Read(value));
        Ok(value)
    }
}

/// File fault seen through `TrackedFile`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FileFault {
    Storage(StorageError),
    ReadFailed,
}

/// `SliceFile` that counts closes and can fail reads past an offset.
pub struct TrackedFile<'a> {
    inner: SliceFile<'a>,
    closes: &'a Cell<u32>,
    fail_at: Option<u32>,
}

impl ImageFile for TrackedFile<'_> {
    type Error = FileFault;

    // A read that would reach past `fail_at` fails without consuming anything
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, FileFault> {
        if let Some(at) = self.fail_at {
            if self.inner.position() + buf.len() as u32 > at {
                return Err(FileFault::ReadFailed);
            }
        }
        self.inner.read(buf).map_err(FileFault::Storage)
    }

    fn seek(&mut self, pos: u32) -> Result<(), FileFault> {
        self.inner.seek(pos).map_err(FileFault::Storage)
    }

    fn position(&self) -> u32 { self.inner.position() }

    fn close(self) -> Result<(), FileFault> {
        self.closes.set(self.closes.get() + 1);
        Ok(())
    }
}

/// Serves one image under any name, handing out `TrackedFile`s.
pub struct TrackedVolume<'a> {
    pub data: &'a [u8],
    pub closes: &'a Cell<u32>,
    pub fail_at: Option<u32>,
}

impl<'a> Volume for TrackedVolume<'a> {
    type Error = FileFault;
    type File = TrackedFile<'a>;

    fn open(&mut self, _name: &str) -> Result<TrackedFile<'a>, FileFault> {
        Ok(TrackedFile { inner: SliceFile::new(self.data), closes: self.closes, fail_at: self.fail_at })
    }
}

/// Delay that returns immediately but remembers what was asked for, in ns.
#[derive(Default)]
pub struct NoopDelay {
    pub requested_ns: Vec<u64>,
}

impl NoopDelay {
    pub fn total_ms(&self) -> u64 {
        self.requested_ns.iter().sum::<u64>() / 1_000_000
    }
}

impl DelayNs for NoopDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.requested_ns.push(ns as u64);
    }

    fn delay_us(&mut self, us: u32) {
        self.requested_ns.push(us as u64 * 1_000);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.requested_ns.push(ms as u64 * 1_000_000);
    }
}

/// Build a 24-bit uncompressed BMP. `height < 0` stores rows top-down.
/// `pixel(x, y)` returns (r, g, b) in display coordinates (y = 0 is the top).
pub fn build_bmp(width: i32, height: i32, pixel: impl Fn(u32, u32) -> (u8, u8, u8)) -> Vec<u8> {
    const DATA_OFFSET: u32 = 54;
    let w = width as u32;
    let h = height.unsigned_abs();
    let stride = (w * 3 + 3) & !3;
    let file_size = DATA_OFFSET + stride * h;

    let mut out = Vec::with_capacity(file_size as usize);
    out.extend_from_slice(b"BM");
    out.extend_from_slice(&file_size.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&DATA_OFFSET.to_le_bytes());
    out.extend_from_slice(&40u32.to_le_bytes());
    out.extend_from_slice(&width.to_le_bytes());
    out.extend_from_slice(&height.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&24u16.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&(stride * h).to_le_bytes());
    out.extend_from_slice(&[0u8; 16]);
    assert_eq!(out.len() as u32, DATA_OFFSET);

    for file_row in 0..h {
        let y = if height < 0 { file_row } else { h - 1 - file_row };
        let start = out.len();
        for x in 0..w {
            let (r, g, b) = pixel(x, y);
            out.extend_from_slice(&[b, g, r]);
        }
        while out.len() - start < stride as usize {
            out.push(0xEE);
        }
    }
    out
}

/// Patch a little-endian u16 header field in place.
pub fn patch_u16(bmp: &mut [u8], offset: usize, value: u16) {
    bmp[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

pub fn patch_u32(bmp: &mut [u8], offset: usize, value: u32) {
    bmp[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}
