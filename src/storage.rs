//! Storage seam for the bitmap loader.
//!
//! The loader only needs block reads, absolute seeks and the current
//! position. `SliceFile` and `FlashVolume` serve images that live in flash
//! (or in test fixtures) through the same interface an SD card driver would.

use core::fmt;

/// A seekable byte stream.
pub trait ImageFile {
    type Error: fmt::Debug;

    /// Read up to `buf.len()` bytes. Fewer are returned only at end of file.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Move the read cursor to absolute offset `pos`.
    fn seek(&mut self, pos: u32) -> Result<(), Self::Error>;

    fn position(&self) -> u32;

    fn close(self) -> Result<(), Self::Error>;
}

/// Something files can be opened from by name.
pub trait Volume {
    type Error: fmt::Debug;
    type File: ImageFile<Error = Self::Error>;

    fn open(&mut self, name: &str) -> Result<Self::File, Self::Error>;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StorageError {
    NotFound,
    SeekPastEnd(u32),
}

/// A byte slice behaving as a read-only file.
pub struct SliceFile<'a> {
    data: &'a [u8],
    pos: u32,
    seeks: u32,
}

impl<'a> SliceFile<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0, seeks: 0 }
    }

    pub fn len(&self) -> u32 { self.data.len() as u32 }

    pub fn is_empty(&self) -> bool { self.data.is_empty() }

    // Number of seeks issued so far
    pub fn seeks(&self) -> u32 { self.seeks }
}

impl ImageFile for SliceFile<'_> {
    type Error = StorageError;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StorageError> {
        let start = (self.pos as usize).min(self.data.len());
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        self.pos += n as u32;
        Ok(n)
    }

    fn seek(&mut self, pos: u32) -> Result<(), StorageError> {
        if pos > self.len() {
            return Err(StorageError::SeekPastEnd(pos));
        }
        self.pos = pos;
        self.seeks += 1;
        Ok(())
    }

    fn position(&self) -> u32 { self.pos }

    fn close(self) -> Result<(), StorageError> { Ok(()) }
}

/// Fixed table of named, flash-resident files.
pub struct FlashVolume<'a> {
    files: &'a [(&'a str, &'a [u8])],
}

impl<'a> FlashVolume<'a> {
    pub const fn new(files: &'a [(&'a str, &'a [u8])]) -> Self {
        Self { files }
    }
}

impl<'a> Volume for FlashVolume<'a> {
    type Error = StorageError;
    type File = SliceFile<'a>;

    // Names compare ASCII case-insensitively, like FAT short names
    fn open(&mut self, name: &str) -> Result<SliceFile<'a>, StorageError> {
        self.files
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, data)| SliceFile::new(data))
            .ok_or(StorageError::NotFound)
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::NotFound => write!(f, "file not found"),
            StorageError::SeekPastEnd(pos) => write!(f, "seek to {} past end of file", pos),
        }
    }
}
