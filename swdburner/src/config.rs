// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! swdburner - Configuration
//!
//! The configuration is a JSON document.  It is persisted in the
//! configuration region of local storage as a little-endian length, the
//! JSON, then the CRC32 of the JSON.  Missing keys take their defaults and
//! unknown keys are ignored, so a corrupt or partial document never stops
//! the burner from starting.

use alloc::format;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;
use embedded_storage::{ReadStorage, Storage};
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use swdburner_core::stm::STM32_FLASH_BASE;
use swdburner_swd::{ResetMode, Speed};

use crate::SourceError;
use crate::source::CRC32;

/// Offset of the configuration in local storage.
pub const CONFIG_OFFSET: u32 = 0x0000_0000;

/// Largest JSON document stored.
pub const CONFIG_MAX_SIZE: usize = 1024;

/// Longest staged file name.
pub const FILE_NAME_MAX: usize = 128;

// Length word, then CRC word
const CONFIG_FRAME_SIZE: usize = 8;

/// Burner configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BurnerConfig {
    /// Start burning as soon as a target settles online.
    pub auto_burn: bool,

    /// Erase the whole chip, rather than each sector before it is
    /// programmed.
    pub chip_erase: bool,

    /// Reset the target into its new firmware afterwards.
    pub auto_run: bool,

    /// Run the algorithm's verify entry point after programming.
    pub verify: bool,

    /// Run the algorithm's set read protection entry point after
    /// programming.
    pub read_protection: bool,

    /// Flash address of the image's first byte.
    #[serde(
        serialize_with = "serialize_address",
        deserialize_with = "deserialize_address"
    )]
    pub flash_addr: u32,

    /// Name of the staged file.
    pub file: heapless::String<FILE_NAME_MAX>,

    /// Size of the staged file, in bytes.
    pub file_size: u32,

    /// CRC32 of the staged file, if known.
    pub file_crc: Option<u32>,

    pub reset_mode: ResetMode,

    pub speed: Speed,
}

impl Default for BurnerConfig {
    fn default() -> Self {
        Self {
            auto_burn: true,
            chip_erase: false,
            auto_run: true,
            verify: false,
            read_protection: false,
            flash_addr: STM32_FLASH_BASE,
            file: heapless::String::new(),
            file_size: 0,
            file_crc: None,
            reset_mode: ResetMode::default(),
            speed: Speed::default(),
        }
    }
}

impl fmt::Display for BurnerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "auto burn: {} chip erase: {} auto run: {} verify: {} read protect: {} address: {:#010X}",
            self.auto_burn,
            self.chip_erase,
            self.auto_run,
            self.verify,
            self.read_protection,
            self.flash_addr
        )
    }
}

impl BurnerConfig {
    /// Parses a JSON configuration document.  An unparsable document gives
    /// the default configuration.
    pub fn from_json(json: &[u8]) -> Self {
        match serde_json::from_slice(json) {
            Ok(config) => config,
            Err(e) => {
                warn!("Error: Invalid config, using defaults: {e}");
                Self::default()
            }
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, SourceError> {
        serde_json::to_vec(self).map_err(|e| {
            warn!("Error: Failed to serialize config: {e}");
            SourceError::Config
        })
    }

    /// Loads the configuration from storage.
    ///
    /// Arguments:
    /// - `storage`: Local storage.
    /// - `offset`: Offset of the configuration region, normally
    ///   [`CONFIG_OFFSET`].
    ///
    /// Returns:
    /// - The stored configuration, or the default if the region is erased,
    ///   corrupt or unreadable.
    pub fn load<S: ReadStorage>(storage: &mut S, offset: u32) -> Self {
        let mut len_bytes = [0u8; 4];
        if storage.read(offset, &mut len_bytes).is_err() {
            warn!("Error: Failed to read config length");
            return Self::default();
        }

        let len = u32::from_le_bytes(len_bytes) as usize;
        if len == 0 || len > CONFIG_MAX_SIZE {
            info!("Info:  No stored config, using defaults");
            return Self::default();
        }

        let mut frame = vec![0u8; len + 4];
        if storage.read(offset + 4, &mut frame).is_err() {
            warn!("Error: Failed to read config");
            return Self::default();
        }

        let (json, crc_bytes) = frame.split_at(len);
        let stored = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        let actual = CRC32.checksum(json);
        if stored != actual {
            warn!("Error: Config CRC {actual:#010X} doesn't match stored {stored:#010X}");
            return Self::default();
        }

        let config = Self::from_json(json);
        debug!("Value: Config {config}");
        config
    }

    /// Stores the configuration.
    pub fn store<S: Storage>(&self, storage: &mut S, offset: u32) -> Result<(), SourceError> {
        let json = self.to_json()?;
        if json.len() > CONFIG_MAX_SIZE {
            return Err(SourceError::TooLarge);
        }

        let mut frame = Vec::with_capacity(json.len() + CONFIG_FRAME_SIZE);
        frame.extend_from_slice(&(json.len() as u32).to_le_bytes());
        frame.extend_from_slice(&json);
        frame.extend_from_slice(&CRC32.checksum(&json).to_le_bytes());

        storage
            .write(offset, &frame)
            .map_err(|_| SourceError::Storage)?;
        debug!("OK:    Config stored");
        Ok(())
    }
}

/// Parses an address, either `0x` prefixed hex or decimal.
pub fn parse_address(s: &str) -> Option<u32> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

fn serialize_address<S: Serializer>(addr: &u32, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("{addr:#010X}"))
}

fn deserialize_address<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    struct AddressVisitor;

    impl Visitor<'_> for AddressVisitor {
        type Value = u32;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "an address as a hex string or an integer")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<u32, E> {
            parse_address(v).ok_or_else(|| E::custom(format!("invalid address: {v}")))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<u32, E> {
            u32::try_from(v).map_err(|_| E::custom("address out of range"))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<u32, E> {
            u32::try_from(v).map_err(|_| E::custom("address out of range"))
        }
    }

    deserializer.deserialize_any(AddressVisitor)
}
