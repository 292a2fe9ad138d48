// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! STM32 identification registers

use core::fmt;

use crate::arm::register::MemoryMappedRegister;
use crate::register_data;

/// Base of main flash on every STM32F part.
pub const STM32_FLASH_BASE: u32 = 0x0800_0000;

/// Base of SRAM on every STM32F part.  Flash algorithms are loaded here.
pub const STM32_RAM_BASE: u32 = 0x2000_0000;

/// Flash size register on STM32F1 parts.
pub const FLASH_SIZE_ADDR_F1: u32 = 0x1FFF_F7E0;

/// Flash size register on STM32F0 and F3 parts.
pub const FLASH_SIZE_ADDR_F0_F3: u32 = 0x1FFF_F7CC;

/// Flash size register on STM32F2 and F4 parts.
pub const FLASH_SIZE_ADDR_F2_F4: u32 = 0x1FFF_7A22;

/// STM32 family, from the DBGMCU device id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, strum::IntoStaticStr)]
pub enum StmFamily {
    F0,
    F1,
    F2,
    F3,
    F4,
    Unknown,
}

impl StmFamily {
    pub fn from_device_id(device_id: u16) -> Self {
        match device_id {
            0x440 | 0x444 | 0x445 | 0x448 => StmFamily::F0,
            0x410 | 0x412 | 0x414 | 0x418 | 0x420 | 0x428 | 0x430 => StmFamily::F1,
            0x411 => StmFamily::F2,
            0x422 | 0x432 | 0x438 | 0x439 | 0x446 => StmFamily::F3,
            0x413 | 0x419 | 0x421 | 0x423 | 0x431 | 0x433 | 0x434 | 0x441 | 0x458 | 0x463 => {
                StmFamily::F4
            }
            _ => StmFamily::Unknown,
        }
    }
}

impl fmt::Display for StmFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name: &'static str = self.into();
        write!(f, "STM32{name}")
    }
}

/// DBGMCU_IDCODE register (read-only)
pub struct StmDeviceIdRegister;

impl MemoryMappedRegister for StmDeviceIdRegister {
    const ADDRESS: u32 = 0xE004_2000;
    type Value = StmDeviceId;
}

/// DBGMCU_IDCODE data: DEV_ID in bits 11:0, REV_ID in bits 31:16.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct StmDeviceId(u32);

register_data!(r StmDeviceId);

impl StmDeviceId {
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }

    pub fn device_id(&self) -> u16 {
        (self.0 & 0xFFF) as u16
    }

    pub fn revision(&self) -> u16 {
        (self.0 >> 16) as u16
    }

    pub fn family(&self) -> StmFamily {
        StmFamily::from_device_id(self.device_id())
    }
}

/// Flash size, in KB, as read from the factory programmed size register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct StmFlashSize(u16);

impl StmFlashSize {
    /// Value read from an erased or read protected size register.
    pub const SENTINEL: u16 = 0xFFFF;

    pub const fn new(kb: u16) -> Self {
        Self(kb)
    }

    /// Decodes the little-endian half word read from the size register.
    pub fn from_le_bytes(bytes: [u8; 2]) -> Self {
        Self(u16::from_le_bytes(bytes))
    }

    pub fn kb(&self) -> u16 {
        self.0
    }

    pub fn bytes(&self) -> u32 {
        self.0 as u32 * 1024
    }

    /// Zero and all-ones both mean the size could not be read.
    pub fn is_valid(&self) -> bool {
        self.0 != 0 && self.0 != Self::SENTINEL
    }
}

impl fmt::Display for StmFlashSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}KB", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_id_fields() {
        let id = StmDeviceId::new(0x2003_6410);
        assert_eq!(id.device_id(), 0x410);
        assert_eq!(id.revision(), 0x2003);
        assert_eq!(id.family(), StmFamily::F1);
        assert_eq!(StmDeviceId::new(0x1007_6413).family(), StmFamily::F4);
    }

    #[test]
    fn flash_size_decoding() {
        assert_eq!(StmFlashSize::from_le_bytes([0x80, 0x00]).kb(), 128);
        assert_eq!(StmFlashSize::from_le_bytes([0x00, 0x04]).bytes(), 1024 * 1024);
        assert!(!StmFlashSize::from_le_bytes([0xFF, 0xFF]).is_valid());
        assert!(!StmFlashSize::new(0).is_valid());
    }
}
