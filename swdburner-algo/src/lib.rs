// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! swdburner-algo
//!
//! Compiled-in STM32 flash algorithms and the catalog used to select them
//! from a target's DEV_ID and flash size.
//!
//! Each algorithm is a position dependent Thumb blob, loaded at
//! `0x2000_0000` with its program buffer at `0x2000_0400`.  The blob entry
//! points follow the usual flash algorithm calling convention: arguments
//! in R0-R3, result in R0 (zero on success), return to a `BKPT` at the
//! start of the blob.

#![cfg_attr(not(test), no_std)]

pub mod catalog;
pub mod stm32f0;
pub mod stm32f1;
pub mod stm32f2;
pub mod stm32f3;
pub mod stm32f4;

pub use catalog::{Catalog, DeviceProfile, lookup, refine};
