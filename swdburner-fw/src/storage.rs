// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! swdburner-fw - Local storage
//!
//! The burner's local storage is a window onto the ESP32-C3's own flash,
//! clear of the bootloader, partition table and application.  Offsets
//! passed to [`Partition`] are relative to the start of the window.

use embedded_storage::{ReadStorage, Storage};
use esp_storage::{FlashStorage, FlashStorageError};

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

/// Start of the burner's storage in the ESP32-C3's flash.
pub const PARTITION_BASE: u32 = 0x0040_0000;

/// Size of the burner's storage.  Configuration, upload area and image
/// staging region must all fit.
pub const PARTITION_SIZE: u32 = 0x0040_0000;

/// Errors accessing a [`Partition`].
#[derive(Debug)]
pub enum PartitionError {
    /// Access would fall outside the partition.
    OutOfBounds,

    /// The underlying flash failed.
    Flash(FlashStorageError),
}

/// A bounded region of an underlying storage device.
pub struct Partition<S> {
    inner: S,
    base: u32,
    size: u32,
}

impl<S: ReadStorage> Partition<S> {
    /// Creates a partition, clamped to the device's capacity.
    pub fn new(inner: S, base: u32, size: u32) -> Self {
        let capacity = inner.capacity() as u32;
        let size = size.min(capacity.saturating_sub(base));
        if size == 0 {
            warn!("Error: Partition at {base:#010X} is outside {capacity:#X} byte flash");
        }
        Self { inner, base, size }
    }

    fn translate(&self, offset: u32, len: usize) -> Option<u32> {
        let end = offset.checked_add(u32::try_from(len).ok()?)?;
        if end > self.size {
            return None;
        }
        self.base.checked_add(offset)
    }
}

impl Partition<FlashStorage> {
    /// The burner's storage on the ESP32-C3's flash.
    pub fn local() -> Self {
        Self::new(FlashStorage::new(), PARTITION_BASE, PARTITION_SIZE)
    }
}

impl<S> ReadStorage for Partition<S>
where
    S: ReadStorage<Error = FlashStorageError>,
{
    type Error = PartitionError;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let addr = self
            .translate(offset, bytes.len())
            .ok_or(PartitionError::OutOfBounds)?;
        self.inner.read(addr, bytes).map_err(PartitionError::Flash)
    }

    fn capacity(&self) -> usize {
        self.size as usize
    }
}

impl<S> Storage for Partition<S>
where
    S: Storage<Error = FlashStorageError>,
{
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        let addr = self
            .translate(offset, bytes.len())
            .ok_or(PartitionError::OutOfBounds)?;
        self.inner.write(addr, bytes).map_err(PartitionError::Flash)
    }
}
