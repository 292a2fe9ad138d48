// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! swdburner - Uploaded files
//!
//! A file transferred to the burner lands in the upload area of local
//! storage, between the configuration and the image staging region:
//!
//! ```text
//! area + 0x00   magic "UPLD"
//!        0x04   file length
//!        0x08   flash address, for BIN files
//!        0x0C   name length
//!        0x10   name, UTF-8 ...
//!        0x80   file contents ...
//! ```
//!
//! At boot [`stage_upload`] converts any upload into a staged image,
//! records it in the configuration, and deletes the upload.  Files named
//! `*.hex` or `*.ihx` are Intel HEX, anything else is a raw binary.

use embedded_storage::{ReadStorage, Storage};
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::SourceError;
use crate::config::{BurnerConfig, FILE_NAME_MAX};
use crate::source::{ImageHeader, StorageImage};

/// Offset of the upload area in local storage.
pub const UPLOAD_OFFSET: u32 = 0x0000_1000;

/// Size of the upload area, header included.  It ends where the image
/// staging region starts.
pub const UPLOAD_REGION_SIZE: u32 = 0x000F_F000;

/// Size of the upload header.
pub const UPLOAD_HEADER_SIZE: u32 = 128;

/// Longest uploaded file name.
pub const UPLOAD_NAME_MAX: usize = UPLOAD_HEADER_SIZE as usize - 0x10;

const UPLOAD_MAGIC: u32 = 0x444C_5055;

/// How an uploaded file is staged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadFormat {
    Bin,
    Hex,
}

impl UploadFormat {
    /// Chooses the format from a file name's extension.
    pub fn from_name(name: &str) -> Self {
        let ext = name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
        if ext.eq_ignore_ascii_case("hex") || ext.eq_ignore_ascii_case("ihx") {
            UploadFormat::Hex
        } else {
            UploadFormat::Bin
        }
    }
}

/// An uploaded file waiting to be staged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub name: heapless::String<FILE_NAME_MAX>,
    pub len: u32,
    pub flash_addr: u32,
    pub format: UploadFormat,
}

impl Upload {
    /// Reads the upload header at `offset`.
    ///
    /// Returns:
    /// - `Ok(Some(Upload))`: if a valid upload is present.
    /// - `Ok(None)`: if there is no upload, or its header is invalid.
    /// - `Err(SourceError::Storage)`: if the header couldn't be read.
    pub fn find<S: ReadStorage>(storage: &mut S, offset: u32) -> Result<Option<Self>, SourceError> {
        let mut bytes = [0u8; UPLOAD_HEADER_SIZE as usize];
        storage
            .read(offset, &mut bytes)
            .map_err(|_| SourceError::Storage)?;

        let word = |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        if word(0x00) != UPLOAD_MAGIC {
            return Ok(None);
        }

        let len = word(0x04);
        let flash_addr = word(0x08);
        let name_len = word(0x0C) as usize;
        if len == 0 || len > UPLOAD_REGION_SIZE - UPLOAD_HEADER_SIZE || name_len > UPLOAD_NAME_MAX {
            warn!("Error: Invalid upload header, {len} bytes, {name_len} byte name");
            return Ok(None);
        }

        let Some(name) = core::str::from_utf8(&bytes[0x10..0x10 + name_len])
            .ok()
            .and_then(|name| heapless::String::try_from(name).ok())
        else {
            warn!("Error: Upload name is not UTF-8");
            return Ok(None);
        };

        let format = UploadFormat::from_name(&name);
        debug!("Value: Upload {name} {len} bytes {format:?}");
        Ok(Some(Self {
            name,
            len,
            flash_addr,
            format,
        }))
    }
}

/// Erases the upload header.
pub fn delete_upload<S: Storage>(storage: &mut S, offset: u32) -> Result<(), SourceError> {
    storage
        .write(offset, &[0xFF; UPLOAD_HEADER_SIZE as usize])
        .map_err(|_| SourceError::Storage)
}

/// Stages any file in the upload area into `image`, then deletes the
/// upload and records the staged image in `config`.
///
/// Arguments:
/// - `uploads`: Local storage holding the upload area at
///   [`UPLOAD_OFFSET`].
/// - `image`: The image staging region.
/// - `config`: Updated with the file's name, length, CRC and flash address
///   on success.  The caller persists it.
///
/// Returns:
/// - `Ok(Some(ImageHeader))`: if a file was staged.
/// - `Ok(None)`: if there was nothing to stage.
/// - `Err(SourceError)`: if staging failed.  An upload that can never be
///   staged, because it is malformed or too large, is deleted.  One that
///   failed on a storage error is kept for the next boot.
pub fn stage_upload<U, S>(
    uploads: &mut U,
    image: &mut StorageImage<S>,
    config: &mut BurnerConfig,
) -> Result<Option<ImageHeader>, SourceError>
where
    U: Storage,
    S: Storage,
{
    let Some(upload) = Upload::find(uploads, UPLOAD_OFFSET)? else {
        return Ok(None);
    };
    info!("Exec:  Stage upload {}", upload.name);

    let data_offset = UPLOAD_OFFSET + UPLOAD_HEADER_SIZE;
    let read = |offset: u32, buf: &mut [u8]| {
        uploads
            .read(data_offset + offset, buf)
            .map_err(|_| SourceError::Storage)
    };
    let staged = match upload.format {
        UploadFormat::Bin => image.stage_bin_from(upload.len, upload.flash_addr, read),
        UploadFormat::Hex => image.stage_hex_from(upload.len, read),
    };

    let header = match staged {
        Ok(header) => header,
        Err(SourceError::Storage) => {
            warn!("Error: Storage failed staging {}, kept", upload.name);
            return Err(SourceError::Storage);
        }
        Err(e) => {
            warn!("Error: Can't stage {}: {e:?}, deleting", upload.name);
            delete_upload(uploads, UPLOAD_OFFSET)?;
            return Err(e);
        }
    };

    delete_upload(uploads, UPLOAD_OFFSET)?;
    config.file = upload.name;
    config.file_size = header.len;
    config.file_crc = Some(header.crc);
    config.flash_addr = header.flash_addr;
    info!(
        "OK:    Staged {} {} bytes for {:#010X}",
        config.file, header.len, header.flash_addr
    );
    Ok(Some(header))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProgramSource;
    use crate::mock::RamStorage;
    use crate::source::{CRC32, IMAGE_OFFSET, IMAGE_REGION_SIZE};

    const STORAGE_SIZE: usize = 0x0040_0000;

    fn upload(storage: &mut RamStorage, name: &str, flash_addr: u32, data: &[u8]) {
        let mut header = [0u8; UPLOAD_HEADER_SIZE as usize];
        header[0x00..0x04].copy_from_slice(&UPLOAD_MAGIC.to_le_bytes());
        header[0x04..0x08].copy_from_slice(&(data.len() as u32).to_le_bytes());
        header[0x08..0x0C].copy_from_slice(&flash_addr.to_le_bytes());
        header[0x0C..0x10].copy_from_slice(&(name.len() as u32).to_le_bytes());
        header[0x10..0x10 + name.len()].copy_from_slice(name.as_bytes());
        storage.write(UPLOAD_OFFSET, &header).unwrap();
        storage.write(UPLOAD_OFFSET + UPLOAD_HEADER_SIZE, data).unwrap();
    }

    fn image() -> StorageImage<RamStorage> {
        StorageImage::new(RamStorage::new(STORAGE_SIZE), IMAGE_OFFSET, IMAGE_REGION_SIZE).unwrap()
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(UploadFormat::from_name("blinky.hex"), UploadFormat::Hex);
        assert_eq!(UploadFormat::from_name("BLINKY.IHX"), UploadFormat::Hex);
        assert_eq!(UploadFormat::from_name("blinky.bin"), UploadFormat::Bin);
        assert_eq!(UploadFormat::from_name("blinky"), UploadFormat::Bin);
        assert_eq!(UploadFormat::from_name("hex"), UploadFormat::Bin);
    }

    #[test]
    fn nothing_to_stage() {
        let mut local = RamStorage::new(STORAGE_SIZE);
        let mut image = image();
        let mut config = BurnerConfig::default();
        assert_eq!(stage_upload(&mut local, &mut image, &mut config), Ok(None));
        assert_eq!(config, BurnerConfig::default());
        assert!(!image.is_staged());
    }

    #[test]
    fn bin_upload_is_staged_and_deleted() {
        let data: Vec<u8> = (0..1000u32).map(|i| (i * 3) as u8).collect();
        let mut local = RamStorage::new(STORAGE_SIZE);
        upload(&mut local, "app.bin", 0x0800_4000, &data);
        let mut image = image();
        let mut config = BurnerConfig::default();

        let header = stage_upload(&mut local, &mut image, &mut config)
            .unwrap()
            .unwrap();
        assert_eq!(header.len, 1000);
        assert_eq!(header.crc, CRC32.checksum(&data));
        assert_eq!(config.file.as_str(), "app.bin");
        assert_eq!(config.file_size, 1000);
        assert_eq!(config.file_crc, Some(header.crc));
        assert_eq!(config.flash_addr, 0x0800_4000);

        let mut buf = vec![0u8; data.len()];
        image.read(0, &mut buf).unwrap();
        assert_eq!(buf, data);

        // Gone, so the next boot doesn't stage it again
        assert_eq!(Upload::find(&mut local, UPLOAD_OFFSET), Ok(None));
    }

    #[test]
    fn hex_upload_takes_its_address_from_the_file() {
        let text = b":020000040800F2\n:040010001122334442\n:00000001FF\n";
        let mut local = RamStorage::new(STORAGE_SIZE);
        upload(&mut local, "app.hex", 0, text);
        let mut image = image();
        let mut config = BurnerConfig::default();

        let header = stage_upload(&mut local, &mut image, &mut config)
            .unwrap()
            .unwrap();
        assert_eq!(header.flash_addr, 0x0800_0010);
        assert_eq!(header.len, 4);
        assert_eq!(config.flash_addr, 0x0800_0010);
        assert_eq!(config.file_size, 4);
        let mut buf = [0u8; 4];
        image.read(0, &mut buf).unwrap();
        assert_eq!(buf, [0x11, 0x22, 0x33, 0x44]);
    }

    #[test]
    fn malformed_hex_upload_is_deleted() {
        let mut local = RamStorage::new(STORAGE_SIZE);
        upload(&mut local, "bad.hex", 0, b":040010001122334443\n:00000001FF\n");
        let mut image = image();
        let mut config = BurnerConfig::default();

        assert!(matches!(
            stage_upload(&mut local, &mut image, &mut config),
            Err(SourceError::Hex(_))
        ));
        assert_eq!(config, BurnerConfig::default());
        assert!(!image.is_staged());
        assert_eq!(Upload::find(&mut local, UPLOAD_OFFSET), Ok(None));
    }

    #[test]
    fn upload_kept_when_storage_fails() {
        let mut local = RamStorage::new(STORAGE_SIZE);
        upload(&mut local, "app.bin", 0x0800_0000, &[1, 2, 3, 4]);
        let mut region = RamStorage::new(STORAGE_SIZE);
        region.fail_writes = true;
        let mut image = StorageImage::new(region, IMAGE_OFFSET, IMAGE_REGION_SIZE).unwrap();
        let mut config = BurnerConfig::default();

        assert_eq!(
            stage_upload(&mut local, &mut image, &mut config),
            Err(SourceError::Storage)
        );
        assert!(Upload::find(&mut local, UPLOAD_OFFSET).unwrap().is_some());
    }

    #[test]
    fn invalid_headers_are_ignored() {
        let mut local = RamStorage::new(STORAGE_SIZE);
        upload(&mut local, "app.bin", 0, &[]);
        assert_eq!(Upload::find(&mut local, UPLOAD_OFFSET), Ok(None));

        upload(&mut local, "app.bin", 0, &[1]);
        local.data[UPLOAD_OFFSET as usize + 0x10] = 0xFF;
        assert_eq!(Upload::find(&mut local, UPLOAD_OFFSET), Ok(None));
    }
}
