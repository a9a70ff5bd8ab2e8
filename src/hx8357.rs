// HX8357-D panel driver over an 8-bit 8080-style parallel bus.
// Works in no_std with any `ParallelBus` and embedded-graphics.
//
// Bus framing:
//   CS low, D/C low, opcode byte, D/C high, N data bytes, CS high.
//   Multi-byte register values go out MSB first.
// Geometry: panel is 320 x 480 portrait.
//
// The same pinout also carries ILI9341 shields, so `identify` probes several
// controller families before giving up.

use embedded_graphics::{
    draw_target::DrawTarget,
    pixelcolor::Rgb565,
    prelude::*,
    primitives::Rectangle,
    Pixel,
};
use embedded_hal::delay::DelayNs;
use log::{debug, info};

use crate::bus::{BusDir, ParallelBus};
use crate::init::{InitEntry, HX8357D_INIT};
use crate::regs::*;

// Public constants so callers can size things without a driver instance.
pub const TFT_WIDTH: u16 = 320;
pub const TFT_HEIGHT: u16 = 480;

/// Pixels buffered before each GRAM burst.
pub const LCD_PIXELS: usize = 80;

pub const ILI9341_ID: u16 = 0x9341;
pub const HX8357D_ID: u16 = 0x8357;

const ID_RETRIES: usize = 5;
const RDDID_HIMAX: u32 = 0x8000;
const RDHXID_HX8357D: u32 = 0x99_0000;

// Controller setup time between parameter bytes
const PARAM_DELAY_US: u32 = 10;
// Turnaround before the first read cycle
const READ_TURNAROUND_US: u32 = 50;
const ID_RETRY_DELAY_US: u32 = 50;
const SETC_SETTLE_MS: u32 = 300;

/// Error type that wraps bus errors.
#[derive(Debug)]
pub enum Hx8357Error<BusE> {
    Bus(BusE),
    OutOfBounds,
}

impl<BusE> From<BusE> for Hx8357Error<BusE> {
    fn from(e: BusE) -> Self { Self::Bus(e) }
}

/// Identification strategies, tried in this order by `identify`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Probe {
    /// ILI9341 "Read ID4" signature, retried.
    Ili9341,
    /// Himax RDDID marker, SETC unlock, then RDHXID confirmation.
    Hx8357d,
    /// Bit-banged two byte read after a repeated NOP strobe. Always answers,
    /// never authoritative.
    Legacy,
}

const PROBES: [Probe; 3] = [Probe::Ili9341, Probe::Hx8357d, Probe::Legacy];

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DeviceId {
    pub id: u16,
    pub probe: Probe,
}

impl DeviceId {
    /// False when only the legacy fallback produced the value.
    pub fn is_confirmed(&self) -> bool { self.probe != Probe::Legacy }
}

/// Inclusive rectangle in panel coordinates.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Window {
    pub x1: u16,
    pub y1: u16,
    pub x2: u16,
    pub y2: u16,
}

/// HX8357 panel on a parallel bus. Owns the bus for its whole lifetime.
pub struct Hx8357<BUS, D> {
    bus: BUS,
    delay: D,
    w: u16,
    h: u16,
}

impl<BUS, D> Hx8357<BUS, D>
where
    BUS: ParallelBus,
    D: DelayNs,
{
    /// Wrap a bus. Nothing is sent until `reset`/`init`.
    pub fn new(bus: BUS, delay: D) -> Self {
        Self { bus, delay, w: TFT_WIDTH, h: TFT_HEIGHT }
    }

    // Panel width in pixels.
    #[inline]
    pub fn width(&self) -> u16 { self.w }

    // Panel height in pixels.
    #[inline]
    pub fn height(&self) -> u16 { self.h }

    pub fn bus(&self) -> &BUS { &self.bus }

    pub fn bus_mut(&mut self) -> &mut BUS { &mut self.bus }

    pub fn release(self) -> (BUS, D) { (self.bus, self.delay) }

    // ---- Bring-up ----

    /// Hardware reset pulse followed by a NOP and three extra write strobes
    /// to resynchronise the controller's bus state machine.
    pub fn reset(&mut self) -> Result<(), Hx8357Error<BUS::Error>> {
        self.bus.cs_idle()?;
        self.bus.wr_idle()?;
        self.bus.rd_idle()?;

        self.bus.rst_active()?;
        self.delay.delay_ms(2);
        self.bus.rst_idle()?;

        self.bus.cs_active()?;
        self.bus.cd_command()?;
        self.bus.write8(NOP)?;
        for _ in 0..3 {
            self.bus.wr_strobe()?;
        }
        self.bus.cs_idle()?;
        Ok(())
    }

    /// Reset, settle, then replay the HX8357-D init table.
    pub fn init(&mut self) -> Result<(), Hx8357Error<BUS::Error>> {
        self.reset()?;
        self.delay.delay_ms(200);
        self.run_init_table(HX8357D_INIT)
    }

    /// Replay `table` strictly in order.
    pub fn run_init_table(&mut self, table: &[InitEntry]) -> Result<(), Hx8357Error<BUS::Error>> {
        for entry in table {
            match *entry {
                InitEntry::Delay { ms } => self.delay.delay_ms(ms as u32),
                InitEntry::Command { opcode, payload } => {
                    self.write_command(opcode)?;
                    self.bus.cd_data()?;
                    for &b in payload {
                        self.bus.write8(b)?;
                    }
                    self.bus.cs_idle()?;
                }
            }
        }
        Ok(())
    }

    // ---- Register protocol ----

    /// Select the chip and send `opcode` in command mode. CS stays asserted
    /// for the caller's data phase.
    pub fn write_command(&mut self, opcode: u8) -> Result<(), Hx8357Error<BUS::Error>> {
        self.bus.cs_active()?;
        self.bus.cd_command()?;
        self.bus.write8(opcode)?;
        Ok(())
    }

    // Shared body of the 24/32-bit register writes.
    fn write_register_be(&mut self, opcode: u8, bytes: &[u8]) -> Result<(), Hx8357Error<BUS::Error>> {
        self.write_command(opcode)?;
        self.bus.cd_data()?;
        for &b in bytes {
            self.delay.delay_us(PARAM_DELAY_US);
            self.bus.write8(b)?;
        }
        self.bus.cs_idle()?;
        Ok(())
    }

    /// Write the low 24 bits of `value`, MSB first.
    pub fn write_register24(&mut self, opcode: u8, value: u32) -> Result<(), Hx8357Error<BUS::Error>> {
        let be = value.to_be_bytes();
        self.write_register_be(opcode, &be[1..])
    }

    /// Write all 32 bits of `value`, MSB first.
    pub fn write_register32(&mut self, opcode: u8, value: u32) -> Result<(), Hx8357Error<BUS::Error>> {
        self.write_register_be(opcode, &value.to_be_bytes())
    }

    /// Read four bytes from `opcode`, MSB first.
    ///
    /// The data lines are always handed back in write direction, even if the
    /// read phase fails.
    pub fn read_register(&mut self, opcode: u8) -> Result<u32, Hx8357Error<BUS::Error>> {
        self.write_command(opcode)?;
        self.bus.set_dir(BusDir::Read)?;

        let value = self.read_phase();

        let cs = self.bus.cs_idle();
        let dir = self.bus.set_dir(BusDir::Write);
        let value = value?;
        cs?;
        dir?;
        Ok(value)
    }

    fn read_phase(&mut self) -> Result<u32, BUS::Error> {
        self.bus.cd_data()?;
        self.delay.delay_us(READ_TURNAROUND_US);
        let mut value = 0u32;
        for _ in 0..4 {
            value = (value << 8) | self.bus.read8()? as u32;
        }
        Ok(value)
    }

    // ---- Identification ----

    /// Work out which controller is on the bus.
    ///
    /// Tries each probe in order. The legacy read always answers, but its
    /// answer may be a guess (`DeviceId::is_confirmed` is false).
    pub fn identify(&mut self) -> Result<DeviceId, Hx8357Error<BUS::Error>> {
        let mut found = DeviceId { id: 0, probe: Probe::Legacy };
        for probe in PROBES {
            if let Some(id) = self.run_probe(probe)? {
                debug!("probe {:?} matched id {:#06x}", probe, id);
                found = DeviceId { id, probe };
                break;
            }
            debug!("probe {:?} inconclusive", probe);
        }
        Ok(found)
    }

    fn run_probe(&mut self, probe: Probe) -> Result<Option<u16>, Hx8357Error<BUS::Error>> {
        match probe {
            Probe::Ili9341 => self.probe_ili9341(),
            Probe::Hx8357d => self.probe_hx8357d(),
            Probe::Legacy => self.legacy_id().map(Some),
        }
    }

    fn probe_ili9341(&mut self) -> Result<Option<u16>, Hx8357Error<BUS::Error>> {
        for _ in 0..ID_RETRIES {
            let id = self.read_register(RDID4)? as u16;
            self.delay.delay_us(ID_RETRY_DELAY_US);
            if id == ILI9341_ID {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    fn probe_hx8357d(&mut self) -> Result<Option<u16>, Hx8357Error<BUS::Error>> {
        if self.read_register(RDDID)? != RDDID_HIMAX {
            return Ok(None);
        }
        // Extended commands (and RDHXID) stay locked until SETC
        self.write_register24(SETC, SETC_UNLOCK)?;
        self.delay.delay_ms(SETC_SETTLE_MS);
        if self.read_register(RDHXID)? == RDHXID_HX8357D {
            return Ok(Some(HX8357D_ID));
        }
        Ok(None)
    }

    // Two byte read only, unlike the register probes. Kept as observed on
    // older shields.
    fn legacy_id(&mut self) -> Result<u16, Hx8357Error<BUS::Error>> {
        self.write_command(NOP)?;
        self.bus.wr_strobe()?; // repeat prior byte (0x00)
        self.bus.set_dir(BusDir::Read)?;

        let read = self.legacy_read_phase();

        let dir = self.bus.set_dir(BusDir::Write);
        let cs = self.bus.cs_idle();
        let bytes = read?;
        dir?;
        cs?;
        Ok(u16::from_be_bytes(bytes))
    }

    fn legacy_read_phase(&mut self) -> Result<[u8; 2], BUS::Error> {
        self.bus.cd_data()?;
        let hi = self.bus.read8()?;
        let lo = self.bus.read8()?;
        Ok([hi, lo])
    }

    // ---- Window + pixel stream ----

    /// Program the column/row address registers. Coordinates are not checked.
    pub fn set_address_window(
        &mut self,
        x1: u16, y1: u16,
        x2: u16, y2: u16,
    ) -> Result<(), Hx8357Error<BUS::Error>> {
        self.bus.cs_active()?;
        self.write_register32(CASET, pack_pair(x1, x2))?;
        self.write_register32(PASET, pack_pair(y1, y2))?;
        self.bus.cs_idle()?;
        Ok(())
    }

    /// Stream RGB565 pixels into the current window, high byte first.
    ///
    /// Pass `first = true` only for the first chunk after `set_address_window`:
    /// RAMWR resets the controller's write cursor to the window origin.
    pub fn push_colors(&mut self, pixels: &[u16], first: bool) -> Result<(), Hx8357Error<BUS::Error>> {
        if first {
            self.write_command(RAMWR)?;
        } else {
            self.bus.cs_active()?;
        }
        self.bus.cd_data()?;
        for &px in pixels {
            let [hi, lo] = px.to_be_bytes();
            self.bus.write8(hi)?;
            self.bus.write8(lo)?;
        }
        self.bus.cs_idle()?;
        Ok(())
    }

    // Convenience: fill a rectangle with a solid color.
    pub fn fill_rect_solid(
        &mut self, x: u16, y: u16, w: u16, h: u16, color: Rgb565,
    ) -> Result<(), Hx8357Error<BUS::Error>> {
        if w == 0 || h == 0 { return Ok(()); }

        // overflow-safe bounds
        let (pw, ph) = (self.w as u32, self.h as u32);
        if x as u32 + w as u32 > pw || y as u32 + h as u32 > ph {
            return Err(Hx8357Error::OutOfBounds);
        }

        self.set_address_window(x, y, x + w - 1, y + h - 1)?;

        let mut batch = PixelBatch::new();
        let c = color.into_storage();
        for _ in 0..(w as u32 * h as u32) {
            batch.push(self, c)?;
        }
        batch.finish(self)?;
        Ok(())
    }
}

/// First coordinate in the upper half, second in the lower.
#[inline]
pub fn pack_pair(a: u16, b: u16) -> u32 {
    ((a as u32) << 16) | b as u32
}

/// Truncate 8-bit channels to RGB565.
#[inline]
pub fn color565(r: u8, g: u8, b: u8) -> u16 {
    Rgb565::new(r >> 3, g >> 2, b >> 3).into_storage()
}

/// Accumulates pixels and flushes them to GRAM in `LCD_PIXELS` bursts.
///
/// Only the first burst after a window change carries RAMWR.
pub struct PixelBatch {
    buf: heapless::Vec<u16, LCD_PIXELS>,
    first: bool,
    flushes: u32,
}

impl Default for PixelBatch {
    fn default() -> Self { Self::new() }
}

impl PixelBatch {
    pub fn new() -> Self {
        Self { buf: heapless::Vec::new(), first: true, flushes: 0 }
    }

    pub fn flushes(&self) -> u32 { self.flushes }

    pub fn push<BUS, D>(&mut self, lcd: &mut Hx8357<BUS, D>, px: u16) -> Result<(), Hx8357Error<BUS::Error>>
    where
        BUS: ParallelBus,
        D: DelayNs,
    {
        // never full here, it is drained as soon as it fills
        self.buf.push(px).ok();
        if self.buf.is_full() {
            self.flush(lcd)?;
        }
        Ok(())
    }

    /// Send whatever is left.
    pub fn finish<BUS, D>(&mut self, lcd: &mut Hx8357<BUS, D>) -> Result<(), Hx8357Error<BUS::Error>>
    where
        BUS: ParallelBus,
        D: DelayNs,
    {
        if !self.buf.is_empty() {
            self.flush(lcd)?;
        }
        Ok(())
    }

    fn flush<BUS, D>(&mut self, lcd: &mut Hx8357<BUS, D>) -> Result<(), Hx8357Error<BUS::Error>>
    where
        BUS: ParallelBus,
        D: DelayNs,
    {
        lcd.push_colors(&self.buf, self.first)?;
        self.first = false;
        self.flushes += 1;
        self.buf.clear();
        Ok(())
    }
}

// -------------------- embedded-graphics integration --------------------
impl<BUS, D> OriginDimensions for Hx8357<BUS, D>
where
    BUS: ParallelBus,
    D: DelayNs,
{
    fn size(&self) -> Size {
        Size::new(self.w as u32, self.h as u32)
    }
}

impl<BUS, D> DrawTarget for Hx8357<BUS, D>
where
    BUS: ParallelBus,
    D: DelayNs,
{
    type Color = Rgb565;
    type Error = Hx8357Error<BUS::Error>;

    // Slow path: one 1x1 window per pixel
    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Rgb565>>,
    {
        for Pixel(p, c) in pixels {
            let (Ok(x), Ok(y)) = (u16::try_from(p.x), u16::try_from(p.y)) else { continue };
            if x >= self.w || y >= self.h { continue; }
            self.set_address_window(x, y, x, y)?;
            self.push_colors(&[c.into_storage()], true)?;
        }
        Ok(())
    }

    // Fast path when the area is fully on screen: one window, batched stream
    fn fill_contiguous<I>(&mut self, area: &Rectangle, colors: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Rgb565>,
    {
        let visible = area.intersection(&self.bounding_box());
        if visible != *area {
            return self.draw_iter(
                area.points()
                    .zip(colors)
                    .map(|(p, c)| Pixel(p, c)),
            );
        }
        let Some(bottom_right) = area.bottom_right() else {
            return Ok(());
        };

        self.set_address_window(
            area.top_left.x as u16, area.top_left.y as u16,
            bottom_right.x as u16, bottom_right.y as u16,
        )?;

        let mut batch = PixelBatch::new();
        for c in colors.into_iter().take(area.size.width as usize * area.size.height as usize) {
            batch.push(self, c.into_storage())?;
        }
        batch.finish(self)
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Rgb565) -> Result<(), Self::Error> {
        let visible = area.intersection(&self.bounding_box());
        if visible.size.width == 0 || visible.size.height == 0 {
            return Ok(());
        }
        self.fill_rect_solid(
            visible.top_left.x as u16,
            visible.top_left.y as u16,
            visible.size.width as u16,
            visible.size.height as u16,
            color,
        )
    }

    fn clear(&mut self, color: Rgb565) -> Result<(), Self::Error> {
        info!("clearing {}x{}", self.w, self.h);
        self.fill_rect_solid(0, 0, self.w, self.h, color)
    }
}
