// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! swdburner library
//!
//! A standalone STM32 flash burner.  With a target attached it identifies
//! the part, resets its option bytes, and programs a staged image through
//! a compiled-in flash algorithm, without a host.
//!
//! ```text
//!   Firmware tick (100ms)  ->  Burner  ->  Programmer  ->  swdburner-swd
//!                                |
//!                                +------>  ProgramSource  ->  embedded-storage
//! ```
//!
//! * [`Burner`] is the state machine and programming pipeline.
//! * [`Programmer`] is the target access it drives.  [`SwdProgrammer`]
//!   implements it over a [`swdburner_swd::DebugInterface`].
//! * [`ProgramSource`] supplies the image.  [`StorageImage`] is an image
//!   staged, from a BIN or Intel HEX file, into local storage.
//!   [`stage_upload`] stages a file left in the upload area at boot.
//! * [`BurnerConfig`] is the JSON configuration, also held in local
//!   storage.
//!
//! It is `no_std` and requires an `alloc` implementation.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod burner;
pub mod config;
pub mod error;
pub mod hex;
pub mod programmer;
pub mod source;
pub mod upload;

#[cfg(test)]
pub(crate) mod mock;

#[doc(inline)]
pub use crate::burner::{
    AUTO_END_TICKS, AUTO_START_TICKS, BURNER_RETRY_COUNT, Burner, BurnerSession, BurnerState,
    BurnerStatus, Clock,
};
#[doc(inline)]
pub use crate::config::{BurnerConfig, CONFIG_OFFSET};
#[doc(inline)]
pub use crate::error::{BurnerError, SourceError};
#[doc(inline)]
pub use crate::programmer::{Programmer, SwdProgrammer};
#[doc(inline)]
pub use crate::source::{IMAGE_OFFSET, IMAGE_REGION_SIZE, ProgramSource, SliceSource, StorageImage};
#[doc(inline)]
pub use crate::upload::{UPLOAD_OFFSET, stage_upload};
