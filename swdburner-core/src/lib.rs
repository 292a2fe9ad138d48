// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! swdburner-core - ARM debug and STM32 concepts used by swdburner.
//!
//! Designed to be used in conjunction with the `swdburner-swd` library, which
//! drives these registers over Serial Wire Debug, and `swdburner-algo`, which
//! provides the compiled-in [`flash::FlashAlgorithm`] descriptors.
//!
//! This library is `no_std` compatible, and requires an `alloc`
//! implementation.

#![cfg_attr(not(test), no_std)]

pub mod arm;
pub mod flash;
pub mod stm;

extern crate alloc;
use core::fmt;

use crate::arm::Cortex;
use crate::arm::dp::IdCode;
use crate::arm::scs::CpuId;
use crate::stm::{StmDeviceId, StmFlashSize};

/// What is known about the attached target.
///
/// Filled in piecemeal as the burner detects the target: the IDCODE comes
/// from connecting, the CPUID and DBGMCU_IDCODE from the first memory reads,
/// and the flash size from the device's size register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct TargetInfo {
    pub idcode: IdCode,
    pub cpuid: CpuId,
    pub device_id: StmDeviceId,
    pub flash_size: Option<StmFlashSize>,
}

impl TargetInfo {
    pub fn new(idcode: IdCode) -> Self {
        Self {
            idcode,
            ..Default::default()
        }
    }

    pub fn cortex(&self) -> Option<Cortex> {
        Cortex::from_idcode(self.idcode)
    }
}

impl fmt::Display for TargetInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cortex() {
            Some(core) => write!(f, "{core}")?,
            None => write!(f, "Unknown core")?,
        }
        write!(
            f,
            " IDCODE {} {} DEV_ID 0x{:03X} REV_ID 0x{:04X}",
            self.idcode,
            self.device_id.family(),
            self.device_id.device_id(),
            self.device_id.revision()
        )?;
        if let Some(size) = self.flash_size {
            write!(f, " flash {size}")?;
        }
        Ok(())
    }
}
