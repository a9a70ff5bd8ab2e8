//! Streaming BMP blitter.
//!
//! Draws 24-bit uncompressed Windows bitmaps straight from a file onto the
//! panel without holding more than one small source buffer and one pixel
//! batch in RAM:
//! - header parsed and validated before anything is drawn
//! - image cropped to the panel, rows read in display order (bottom-up files
//!   are walked backwards), seeking only when the read cursor is elsewhere
//! - source reads (`SD_PIXELS`) and GRAM bursts (`LCD_PIXELS`) sized
//!   independently

use core::fmt;

use embedded_hal::delay::DelayNs;
use log::{info, trace, warn};

use crate::bus::ParallelBus;
use crate::hx8357::{color565, Hx8357, Hx8357Error, PixelBatch, Window};
use crate::storage::{ImageFile, Volume};

/// Pixels fetched from the file per read.
pub const SD_PIXELS: usize = 80;
const SD_BYTES: usize = 3 * SD_PIXELS;

const BMP_SIGNATURE: u16 = 0x4D42; // "BM"

/// Millisecond time source used for load timing.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

impl<F: Fn() -> u64> Clock for F {
    fn now_ms(&self) -> u64 { self() }
}

/// Why a header was rejected.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FormatError {
    BadSignature(u16),
    Planes(u16),
    Depth(u16),
    Compressed(u32),
    /// Zero width/height, or pixel data that cannot be addressed with u32 offsets.
    BadDimensions { width: i32, height: i32 },
    /// File ended inside the header.
    Truncated,
}

#[derive(Debug)]
pub enum BlitError<BusE, FileE> {
    /// Origin outside the panel. Raised before anything is opened: once the
    /// file is open the blit window is already clipped to the panel.
    OutOfBounds,
    NotFound(FileE),
    Format(FormatError),
    File(FileE),
    Bus(BusE),
}

// The blitter only drives the window and stream calls, which never report
// OutOfBounds. Only `fill_rect_solid` does.
impl<BusE, FileE> From<Hx8357Error<BusE>> for BlitError<BusE, FileE> {
    fn from(e: Hx8357Error<BusE>) -> Self {
        match e {
            Hx8357Error::Bus(e) => BlitError::Bus(e),
            Hx8357Error::OutOfBounds => BlitError::OutOfBounds,
        }
    }
}

impl<BusE, FileE> From<FormatError> for BlitError<BusE, FileE> {
    fn from(e: FormatError) -> Self { BlitError::Format(e) }
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatError::BadSignature(sig) => write!(f, "bad signature {:#06x}", sig),
            FormatError::Planes(n) => write!(f, "{} planes, expected 1", n),
            FormatError::Depth(d) => write!(f, "{} bpp, only 24 supported", d),
            FormatError::Compressed(c) => write!(f, "compression {}, only 0 supported", c),
            FormatError::BadDimensions { width, height } => write!(f, "bad size {}x{}", width, height),
            FormatError::Truncated => write!(f, "header truncated"),
        }
    }
}

/// The header fields the loader reads, in file order.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BmpHeader {
    pub file_size: u32,
    pub data_offset: u32,
    pub header_size: u32,
    pub width: i32,
    /// Negative for top-down files.
    pub height: i32,
    pub depth: u16,
}

/// Outcome of a successful `draw_bmp`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BlitReport {
    pub header: BmpHeader,
    pub window: Window,
    pub pixels: u32,
    pub flushes: u32,
    pub seeks: u32,
    pub elapsed_ms: u64,
}

// ---- Header ----

/// Failure while reading the header: the file itself, or its contents.
#[derive(Debug)]
pub enum ReadError<E> {
    File(E),
    Format(FormatError),
}

impl<E> From<FormatError> for ReadError<E> {
    fn from(e: FormatError) -> Self { ReadError::Format(e) }
}

impl<BusE, FileE> From<ReadError<FileE>> for BlitError<BusE, FileE> {
    fn from(e: ReadError<FileE>) -> Self {
        match e {
            ReadError::File(e) => BlitError::File(e),
            ReadError::Format(e) => BlitError::Format(e),
        }
    }
}

fn read_exact<F: ImageFile>(file: &mut F, buf: &mut [u8]) -> Result<(), ReadError<F::Error>> {
    let n = file.read(buf).map_err(ReadError::File)?;
    if n < buf.len() {
        return Err(FormatError::Truncated.into());
    }
    Ok(())
}

// BMP fields are little-endian
fn read16<F: ImageFile>(file: &mut F) -> Result<u16, ReadError<F::Error>> {
    let mut b = [0u8; 2];
    read_exact(file, &mut b)?;
    Ok(u16::from_le_bytes(b))
}

fn read32<F: ImageFile>(file: &mut F) -> Result<u32, ReadError<F::Error>> {
    let mut b = [0u8; 4];
    read_exact(file, &mut b)?;
    Ok(u32::from_le_bytes(b))
}

/// Parse and validate a BMP header from the start of `file`.
///
/// Fields are checked as soon as they are read, so a bad signature stops
/// before anything else is consumed.
pub fn read_header<F: ImageFile>(file: &mut F) -> Result<BmpHeader, ReadError<F::Error>> {
    let sig = read16(file)?;
    if sig != BMP_SIGNATURE {
        return Err(FormatError::BadSignature(sig).into());
    }
    let file_size = read32(file)?;
    info!("File size: {}", file_size);
    let _creator = read32(file)?;
    let data_offset = read32(file)?;
    info!("Image Offset: {}", data_offset);

    // DIB header
    let header_size = read32(file)?;
    info!("Header size: {}", header_size);
    let width = read32(file)? as i32;
    let height = read32(file)? as i32;

    let planes = read16(file)?;
    if planes != 1 {
        return Err(FormatError::Planes(planes).into());
    }
    let depth = read16(file)?;
    info!("Bit Depth: {}", depth);
    if depth != 24 {
        return Err(FormatError::Depth(depth).into());
    }
    let compression = read32(file)?;
    if compression != 0 {
        return Err(FormatError::Compressed(compression).into());
    }

    Ok(BmpHeader { file_size, data_offset, header_size, width, height, depth })
}

// ---- Geometry ----

/// Bytes per stored row: 3 per pixel, padded to a multiple of 4.
#[inline]
pub fn row_stride(width: u32) -> u32 {
    ((width * 3 + 3) / 4) * 4
}

/// Visible extent of an image of `extent` pixels placed at `origin` on an
/// axis `limit` pixels long. Zero when `origin` is off the axis.
#[inline]
pub(crate) fn clip_extent(origin: u16, extent: u32, limit: u16) -> u16 {
    extent.min(limit.saturating_sub(origin) as u32) as u16
}

/// Row layout of the pixel array.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub data_offset: u32,
    /// Stored bottom-to-top (the usual case).
    pub bottom_up: bool,
}

impl Geometry {
    pub fn from_header(h: &BmpHeader) -> Result<Self, FormatError> {
        let bad = FormatError::BadDimensions { width: h.width, height: h.height };
        if h.width <= 0 || h.height == 0 {
            return Err(bad);
        }
        let width = h.width as u32;
        // Negative height: top-down. Not canon, but seen in the wild.
        let height = h.height.unsigned_abs();

        // Every row offset must fit the u32 seek interface
        let stride = width.checked_mul(3).and_then(|b| b.checked_add(3)).ok_or(bad)? / 4 * 4;
        stride
            .checked_mul(height)
            .and_then(|len| len.checked_add(h.data_offset))
            .ok_or(bad)?;

        Ok(Self { width, height, stride, data_offset: h.data_offset, bottom_up: h.height > 0 })
    }

    /// File row holding display row `row`.
    #[inline]
    pub fn file_row(&self, row: u32) -> u32 {
        if self.bottom_up { self.height - 1 - row } else { row }
    }

    /// Absolute file offset of display row `row`.
    #[inline]
    pub fn row_offset(&self, row: u32) -> u32 {
        self.data_offset + self.file_row(row) * self.stride
    }

    /// Window covering the part of the image that lands on a `w` x `h` panel
    /// when drawn at (`x`, `y`). The origin must be on the panel, which
    /// `draw_bmp` checks first.
    pub(crate) fn clip(&self, x: u16, y: u16, w: u16, h: u16) -> Window {
        let cw = clip_extent(x, self.width, w);
        let ch = clip_extent(y, self.height, h);
        Window { x1: x, y1: y, x2: x + cw - 1, y2: y + ch - 1 }
    }
}

// ---- Source buffer ----

// Raw BGR triples read ahead from the file.
struct SourceBuffer {
    buf: [u8; SD_BYTES],
    filled: usize,
    idx: usize,
    seeks: u32,
}

impl SourceBuffer {
    fn new() -> Self {
        Self { buf: [0; SD_BYTES], filled: 0, idx: 0, seeks: 0 }
    }

    // File offset of the next unconsumed byte
    fn cursor<F: ImageFile>(&self, file: &F) -> u32 {
        file.position() - (self.filled - self.idx) as u32
    }

    /// Make the next pixel come from `pos`. Buffered bytes are kept when `pos`
    /// falls inside them; the file is only sought when its position is off.
    fn position_at<F: ImageFile>(&mut self, file: &mut F, pos: u32) -> Result<(), F::Error> {
        let cursor = self.cursor(file);
        if pos >= cursor && pos <= file.position() {
            // Row start is already buffered (or next in line): skip padding
            self.idx += (pos - cursor) as usize;
            return Ok(());
        }
        if file.position() != pos {
            trace!("seek {} -> {}", file.position(), pos);
            file.seek(pos)?;
            self.seeks += 1;
        }
        self.filled = 0;
        self.idx = 0;
        Ok(())
    }

    /// Next (b, g, r) triple. Past end of file the pixel reads as black.
    fn next_bgr<F: ImageFile>(&mut self, file: &mut F) -> Result<[u8; 3], F::Error> {
        if self.idx + 3 > self.filled {
            // A triple split across the refill keeps its head
            let left = self.filled - self.idx;
            self.buf.copy_within(self.idx..self.filled, 0);
            self.filled = left + file.read(&mut self.buf[left..])?;
            self.idx = 0;
            if self.filled < 3 {
                self.filled = 0;
                return Ok([0; 3]);
            }
        }
        let px = [self.buf[self.idx], self.buf[self.idx + 1], self.buf[self.idx + 2]];
        self.idx += 3;
        Ok(px)
    }
}

struct ScanStats {
    window: Window,
    pixels: u32,
    flushes: u32,
    seeks: u32,
}

impl<BUS, D> Hx8357<BUS, D>
where
    BUS: ParallelBus,
    D: DelayNs,
{
    /// Draw the BMP `name` from `volume` with its top-left corner at (`x`, `y`).
    ///
    /// The image is cropped to the panel. Origins off the panel are ignored
    /// without touching storage. The file is closed on every path once opened.
    pub fn draw_bmp<V: Volume>(
        &mut self,
        volume: &mut V,
        name: &str,
        x: u16,
        y: u16,
        clock: &impl Clock,
    ) -> Result<BlitReport, BlitError<BUS::Error, V::Error>> {
        if x >= self.width() || y >= self.height() {
            return Err(BlitError::OutOfBounds);
        }
        let start = clock.now_ms();

        info!("Loading image '{}'", name);
        let mut file = match volume.open(name) {
            Ok(f) => f,
            Err(e) => {
                warn!("File not found");
                return Err(BlitError::NotFound(e));
            }
        };

        let result = self.blit_file(&mut file, x, y);
        let closed = file.close();

        match result {
            Ok((header, stats)) => {
                closed.map_err(BlitError::File)?;
                let elapsed_ms = clock.now_ms().saturating_sub(start);
                info!("Loaded in {} ms", elapsed_ms);
                Ok(BlitReport {
                    header,
                    window: stats.window,
                    pixels: stats.pixels,
                    flushes: stats.flushes,
                    seeks: stats.seeks,
                    elapsed_ms,
                })
            }
            Err(BlitError::Format(e)) => {
                warn!("BMP format not recognized: {}", e);
                Err(BlitError::Format(e))
            }
            Err(e) => Err(e),
        }
    }

    fn blit_file<F: ImageFile>(
        &mut self,
        file: &mut F,
        x: u16,
        y: u16,
    ) -> Result<(BmpHeader, ScanStats), BlitError<BUS::Error, F::Error>> {
        let header = read_header(file)?;
        let geo = Geometry::from_header(&header)?;
        info!("Image size: {}x{}", header.width, header.height);

        let window = geo.clip(x, y, self.width(), self.height());
        self.set_address_window(window.x1, window.y1, window.x2, window.y2)?;

        let cols = (window.x2 - window.x1 + 1) as u32;
        let rows = (window.y2 - window.y1 + 1) as u32;

        let mut src = SourceBuffer::new();
        let mut batch = PixelBatch::new();
        for row in 0..rows {
            src.position_at(file, geo.row_offset(row)).map_err(BlitError::File)?;
            for _ in 0..cols {
                let [b, g, r] = src.next_bgr(file).map_err(BlitError::File)?;
                batch.push(self, color565(r, g, b))?;
            }
        }
        batch.finish(self)?;

        let stats = ScanStats { window, pixels: rows * cols, flushes: batch.flushes(), seeks: src.seeks };
        Ok((header, stats))
    }
}
