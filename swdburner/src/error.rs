// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! swdburner - Error types

use alloc::format;
use alloc::string::String;
use core::fmt;
use serde::Serialize;

use swdburner_swd::FlashError;

use crate::hex::HexError;

/// Result of a burn, one code per pipeline run.
///
/// The numeric value (`as u8`) is stable, and is what the telemetry and UI
/// layers report.  [`BurnerError::None`] is success.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    strum::IntoStaticStr,
    strum::EnumIter,
)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum BurnerError {
    #[default]
    None = 0,
    BufferUnavailable = 1,
    LinkInit = 2,
    ReadFailed = 3,
    ChipUnknown = 4,
    OptionInit = 5,
    OptionErase = 6,
    FlashSizeUnknown = 7,
    FlashAlgorithmMismatch = 8,
    FlashInit = 9,
    FlashErase = 10,
    FlashProgram = 11,
    FlashVerify = 12,
    Unsupported = 13,
    OptionReadProtect = 14,
    ImageCrc = 15,
}

impl BurnerError {
    pub fn code(&self) -> u8 {
        *self as u8
    }

    pub fn is_error(&self) -> bool {
        *self != BurnerError::None
    }

    /// Maps a flash algorithm failure to `on`, unless the failure was a
    /// missing optional entry point.
    pub fn from_flash(error: &FlashError, on: BurnerError) -> Self {
        match error {
            FlashError::Unsupported => BurnerError::Unsupported,
            _ => on,
        }
    }

    /// Returns a string representation of the error.
    pub fn as_str(&self) -> &'static str {
        match self {
            BurnerError::None => "OK",
            BurnerError::BufferUnavailable => "Buffer unavailable",
            BurnerError::LinkInit => "SWD link init failed",
            BurnerError::ReadFailed => "Read failed",
            BurnerError::ChipUnknown => "Unknown chip",
            BurnerError::OptionInit => "Option byte init failed",
            BurnerError::OptionErase => "Option byte erase failed",
            BurnerError::FlashSizeUnknown => "Flash size unknown",
            BurnerError::FlashAlgorithmMismatch => "Image does not fit flash",
            BurnerError::FlashInit => "Flash init failed",
            BurnerError::FlashErase => "Flash erase failed",
            BurnerError::FlashProgram => "Flash program failed",
            BurnerError::FlashVerify => "Flash verify failed",
            BurnerError::Unsupported => "Unsupported by flash algorithm",
            BurnerError::OptionReadProtect => "Read protection failed",
            BurnerError::ImageCrc => "Image CRC mismatch",
        }
    }

    fn kind(&self) -> &'static str {
        self.into()
    }
}

impl fmt::Display for BurnerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.code())
    }
}

impl Serialize for BurnerError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("BurnerError", 3)?;
        state.serialize_field("kind", self.kind())?;
        state.serialize_field("code", &self.code())?;
        state.serialize_field("detail", self.as_str())?;
        state.end()
    }
}

/// Errors from the local storage that holds the configuration and staged
/// image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The storage driver failed.
    Storage,

    /// A read or write fell outside the region.
    OutOfRange,

    /// The image does not fit the staging region.
    TooLarge,

    /// No image is staged.
    NoImage,

    /// The staged Intel HEX could not be parsed.
    Hex(HexError),

    /// The configuration could not be serialized.
    Config,
}

impl SourceError {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceError::Storage => "Storage error",
            SourceError::OutOfRange => "Out of range",
            SourceError::TooLarge => "Image too large",
            SourceError::NoImage => "No image",
            SourceError::Hex(_) => "Invalid HEX file",
            SourceError::Config => "Config error",
        }
    }
}

impl From<HexError> for SourceError {
    fn from(error: HexError) -> Self {
        SourceError::Hex(error)
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Hex(e) => write!(f, "{}: {e}", self.as_str()),
            _ => write!(f, "{}", self.as_str()),
        }
    }
}

impl Serialize for SourceError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("SourceError", 2)?;
        state.serialize_field("kind", self.as_str())?;
        let detail = match self {
            SourceError::Hex(e) => format!("{e}"),
            _ => String::new(),
        };
        state.serialize_field("detail", &detail)?;
        state.end()
    }
}
