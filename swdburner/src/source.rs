// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! swdburner - Program sources
//!
//! A [`ProgramSource`] supplies the image the burner programs.  The usual
//! source is a [`StorageImage`], an image staged into a fixed region of
//! local storage:
//!
//! ```text
//! region + 0x00   magic "BURN"
//!          0x04   image length
//!          0x08   image CRC32
//!          0x0C   flash address
//!          0x10   image data ...
//! ```
//!
//! The header is written after the data, so a partially staged image is
//! never seen as valid.

use crc::{CRC_32_ISO_HDLC, Crc};
use embedded_storage::{ReadStorage, Storage};
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use serde::Serialize;

use crate::SourceError;
use crate::hex;

/// CRC32 used for images and the stored configuration.  This is the
/// common zlib/Ethernet CRC: reflected, polynomial 0x04C11DB7, initial
/// value and final XOR 0xFFFFFFFF.
pub const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Offset of the image staging region in local storage.
pub const IMAGE_OFFSET: u32 = 0x0010_0000;

/// Size of the image staging region.
pub const IMAGE_REGION_SIZE: u32 = 0x0030_0000;

/// Size of the staging header preceding the image data.
pub const IMAGE_HEADER_SIZE: u32 = 16;

const IMAGE_MAGIC: u32 = 0x4E52_5542;

// Chunk used to fill and read back the region
const STAGING_CHUNK: usize = 256;

/// An image to be programmed.
pub trait ProgramSource {
    /// Image length in bytes.
    fn len(&self) -> u32;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// CRC32 of the whole image, if the source knows it.  When present the
    /// burner checks the image against it before touching the target.
    fn crc32(&self) -> Option<u32>;

    /// Flash address the image is linked for, if the source records one.
    /// Otherwise the configured address is used.
    fn flash_addr(&self) -> Option<u32> {
        None
    }

    /// Fills `buf` from the image, starting `offset` bytes in.
    fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), SourceError>;

    /// Removes the image once it has been programmed.
    fn delete(&mut self) -> Result<(), SourceError>;
}

/// Computes the CRC32 of an entire source, reading it `buf.len()` bytes at
/// a time.
pub fn checksum<S: ProgramSource + ?Sized>(
    source: &mut S,
    buf: &mut [u8],
) -> Result<u32, SourceError> {
    if buf.is_empty() {
        return Err(SourceError::OutOfRange);
    }
    let mut digest = CRC32.digest();
    let len = source.len();
    let mut offset = 0;
    while offset < len {
        let n = (len - offset).min(buf.len() as u32) as usize;
        source.read(offset, &mut buf[..n])?;
        digest.update(&buf[..n]);
        offset += n as u32;
    }
    Ok(digest.finalize())
}

/// An image held in memory.
#[derive(Debug)]
pub struct SliceSource<'a> {
    data: &'a [u8],
    crc: Option<u32>,
    deleted: bool,
}

impl<'a> SliceSource<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            crc: None,
            deleted: false,
        }
    }

    /// Attaches an expected CRC32.
    pub fn with_crc(mut self, crc: u32) -> Self {
        self.crc = Some(crc);
        self
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}

impl ProgramSource for SliceSource<'_> {
    fn len(&self) -> u32 {
        if self.deleted { 0 } else { self.data.len() as u32 }
    }

    fn crc32(&self) -> Option<u32> {
        self.crc
    }

    fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), SourceError> {
        let start = offset as usize;
        let end = start.checked_add(buf.len()).ok_or(SourceError::OutOfRange)?;
        if self.deleted || end > self.data.len() {
            return Err(SourceError::OutOfRange);
        }
        buf.copy_from_slice(&self.data[start..end]);
        Ok(())
    }

    fn delete(&mut self) -> Result<(), SourceError> {
        self.deleted = true;
        Ok(())
    }
}

/// Header of a staged image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageHeader {
    pub len: u32,
    pub crc: u32,
    pub flash_addr: u32,
}

impl ImageHeader {
    fn to_bytes(self) -> [u8; IMAGE_HEADER_SIZE as usize] {
        let mut bytes = [0u8; IMAGE_HEADER_SIZE as usize];
        bytes[0..4].copy_from_slice(&IMAGE_MAGIC.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.len.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.crc.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.flash_addr.to_le_bytes());
        bytes
    }

    fn from_bytes(bytes: &[u8; IMAGE_HEADER_SIZE as usize]) -> Option<Self> {
        let word = |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        if word(0) != IMAGE_MAGIC {
            return None;
        }
        Some(Self {
            len: word(4),
            crc: word(8),
            flash_addr: word(12),
        })
    }
}

/// An image staged into a region of local storage.
///
/// ```rust,ignore
/// let mut image = StorageImage::new(storage, IMAGE_OFFSET, IMAGE_REGION_SIZE)?;
/// let header = image.stage_hex(hex_file)?;
/// config.flash_addr = header.flash_addr;
/// ```
#[derive(Debug)]
pub struct StorageImage<S: Storage> {
    storage: S,
    offset: u32,
    capacity: u32,
    header: Option<ImageHeader>,
}

impl<S: Storage> StorageImage<S> {
    /// Opens the staging region, reading any header already present.
    ///
    /// Arguments:
    /// - `storage`: Local storage.
    /// - `offset`: Start of the region, normally [`IMAGE_OFFSET`].
    /// - `size`: Size of the region, header included.
    ///
    /// Returns:
    /// - `Ok(StorageImage)`: whether or not an image is staged.
    /// - `Err(SourceError)`: if the region doesn't fit the storage, or the
    ///   header can't be read.
    pub fn new(mut storage: S, offset: u32, size: u32) -> Result<Self, SourceError> {
        let end = offset.checked_add(size).ok_or(SourceError::OutOfRange)?;
        if size <= IMAGE_HEADER_SIZE || end as usize > storage.capacity() {
            return Err(SourceError::OutOfRange);
        }

        let mut bytes = [0u8; IMAGE_HEADER_SIZE as usize];
        storage
            .read(offset, &mut bytes)
            .map_err(|_| SourceError::Storage)?;
        let capacity = size - IMAGE_HEADER_SIZE;
        let header = ImageHeader::from_bytes(&bytes).filter(|h| h.len <= capacity);
        match &header {
            Some(h) => debug!("Value: Staged image {} bytes for {:#010X}", h.len, h.flash_addr),
            None => debug!("Info:  No staged image"),
        }

        Ok(Self {
            storage,
            offset,
            capacity,
            header,
        })
    }

    pub fn header(&self) -> Option<&ImageHeader> {
        self.header.as_ref()
    }

    pub fn is_staged(&self) -> bool {
        self.header.is_some()
    }

    /// Most image bytes the region holds.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    fn data_offset(&self) -> u32 {
        self.offset + IMAGE_HEADER_SIZE
    }

    /// Stages a raw binary image.
    ///
    /// Arguments:
    /// - `data`: The image.
    /// - `flash_addr`: Where the image is to be programmed.
    ///
    /// Returns:
    /// - `Ok(ImageHeader)`: the header written.
    /// - `Err(SourceError)`: if the image is too large or storage fails.
    ///   Any previously staged image is gone.
    pub fn stage_bin(&mut self, data: &[u8], flash_addr: u32) -> Result<ImageHeader, SourceError> {
        self.stage_bin_from(data.len() as u32, flash_addr, slice_reader(data))
    }

    /// Stages a raw binary image read in chunks from elsewhere, such as an
    /// upload area.
    ///
    /// Arguments:
    /// - `len`: Image length.
    /// - `flash_addr`: Where the image is to be programmed.
    /// - `read`: Fills a buffer from the image, starting at the given offset.
    pub fn stage_bin_from<R>(
        &mut self,
        len: u32,
        flash_addr: u32,
        mut read: R,
    ) -> Result<ImageHeader, SourceError>
    where
        R: FnMut(u32, &mut [u8]) -> Result<(), SourceError>,
    {
        info!("Exec:  Stage {len} byte image for {flash_addr:#010X}");
        self.delete()?;
        if len > self.capacity {
            return Err(SourceError::TooLarge);
        }

        let data_offset = self.data_offset();
        let mut chunk = [0u8; STAGING_CHUNK];
        let mut digest = CRC32.digest();
        let mut done = 0;
        while done < len {
            let n = (len - done).min(STAGING_CHUNK as u32) as usize;
            read(done, &mut chunk[..n])?;
            self.storage
                .write(data_offset + done, &chunk[..n])
                .map_err(|_| SourceError::Storage)?;
            digest.update(&chunk[..n]);
            done += n as u32;
        }

        self.write_header(ImageHeader {
            len,
            crc: digest.finalize(),
            flash_addr,
        })
    }

    /// Stages an Intel HEX file as a flat image.  Gaps between records are
    /// filled with 0xFF, erased flash.
    ///
    /// Returns:
    /// - `Ok(ImageHeader)`: the header written.  Its `flash_addr` is the
    ///   lowest address in the file.
    /// - `Err(SourceError::Hex)`: if the file is malformed.
    /// - `Err(SourceError)`: if the image is too large or storage fails.
    pub fn stage_hex(&mut self, text: &[u8]) -> Result<ImageHeader, SourceError> {
        self.stage_hex_from(text.len() as u32, slice_reader(text))
    }

    /// Stages an Intel HEX file read in chunks from elsewhere.  The file is
    /// read twice, once to find its extent and once to copy the data.
    ///
    /// Arguments:
    /// - `len`: Length of the HEX file.
    /// - `read`: Fills a buffer from the file, starting at the given offset.
    pub fn stage_hex_from<R>(&mut self, len: u32, mut read: R) -> Result<ImageHeader, SourceError>
    where
        R: FnMut(u32, &mut [u8]) -> Result<(), SourceError>,
    {
        let extent = hex::extent_in::<SourceError, _>(len, &mut read)?;
        let image_len = extent.end - extent.start;
        info!(
            "Exec:  Stage HEX image {image_len} bytes for {:#010X}",
            extent.start
        );
        self.delete()?;
        if image_len > self.capacity {
            return Err(SourceError::TooLarge);
        }

        let data_offset = self.data_offset();
        let mut chunk = [0xFFu8; STAGING_CHUNK];
        let mut filled = 0;
        while filled < image_len {
            let n = (image_len - filled).min(STAGING_CHUNK as u32) as usize;
            self.storage
                .write(data_offset + filled, &chunk[..n])
                .map_err(|_| SourceError::Storage)?;
            filled += n as u32;
        }

        let storage = &mut self.storage;
        hex::for_each_data_in::<SourceError, _, _>(len, &mut read, |addr, data| {
            storage
                .write(data_offset + (addr - extent.start), data)
                .map_err(|_| SourceError::Storage)
        })?;

        // CRC what's actually in storage
        let mut digest = CRC32.digest();
        let mut done = 0;
        while done < image_len {
            let n = (image_len - done).min(STAGING_CHUNK as u32) as usize;
            self.storage
                .read(data_offset + done, &mut chunk[..n])
                .map_err(|_| SourceError::Storage)?;
            digest.update(&chunk[..n]);
            done += n as u32;
        }

        self.write_header(ImageHeader {
            len: image_len,
            crc: digest.finalize(),
            flash_addr: extent.start,
        })
    }

    fn write_header(&mut self, header: ImageHeader) -> Result<ImageHeader, SourceError> {
        self.storage
            .write(self.offset, &header.to_bytes())
            .map_err(|_| SourceError::Storage)?;
        self.header = Some(header);
        debug!("OK:    Image staged, CRC {:#010X}", header.crc);
        Ok(header)
    }
}

fn slice_reader(data: &[u8]) -> impl FnMut(u32, &mut [u8]) -> Result<(), SourceError> + '_ {
    move |offset, buf| {
        let start = offset as usize;
        let bytes = data
            .get(start..start + buf.len())
            .ok_or(SourceError::OutOfRange)?;
        buf.copy_from_slice(bytes);
        Ok(())
    }
}

impl<S: Storage> ProgramSource for StorageImage<S> {
    fn len(&self) -> u32 {
        self.header.map(|h| h.len).unwrap_or(0)
    }

    fn crc32(&self) -> Option<u32> {
        self.header.map(|h| h.crc)
    }

    fn flash_addr(&self) -> Option<u32> {
        self.header.map(|h| h.flash_addr)
    }

    fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), SourceError> {
        let header = self.header.ok_or(SourceError::NoImage)?;
        let end = offset
            .checked_add(buf.len() as u32)
            .ok_or(SourceError::OutOfRange)?;
        if end > header.len {
            return Err(SourceError::OutOfRange);
        }
        self.storage
            .read(self.data_offset() + offset, buf)
            .map_err(|_| SourceError::Storage)
    }

    /// Erases the header.  The data is left in place but is no longer an
    /// image.
    fn delete(&mut self) -> Result<(), SourceError> {
        self.storage
            .write(self.offset, &[0xFF; IMAGE_HEADER_SIZE as usize])
            .map_err(|_| SourceError::Storage)?;
        if self.header.take().is_some() {
            debug!("OK:    Staged image deleted");
        }
        Ok(())
    }
}
