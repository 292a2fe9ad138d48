// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ARM Memory Access Port Registers

use crate::arm::register::{ApRegister, ReadableRegister, RegisterDescriptor, WritableRegister};
use crate::register_data;

/// Control/Status Word Register descriptor (read-write)
pub struct CswRegister;

impl RegisterDescriptor for CswRegister {
    const ADDRESS: u8 = 0x00;
    type Value = Csw;
}

impl ReadableRegister for CswRegister {}
impl WritableRegister for CswRegister {}
impl ApRegister for CswRegister {}

/// Access size carried in CSW bits 2:0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferSize {
    Byte,
    HalfWord,
    Word,
}

impl TransferSize {
    fn bits(&self) -> u32 {
        match self {
            TransferSize::Byte => 0b000,
            TransferSize::HalfWord => 0b001,
            TransferSize::Word => 0b010,
        }
    }
}

/// Control/Status Word register data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Csw(u32);

register_data!(rw Csw);

impl Csw {
    const SIZE_MASK: u32 = 0b111;

    const ADDRINC_MASK: u32 = 0b11;
    const ADDRINC_SHIFT: u32 = 4;

    const PROT_MASK: u32 = 0b111_1111;
    const PROT_SHIFT: u32 = 24;

    // Bit 24 is reserved but must be written as one on STM32 AHB-APs
    const RESERVED_HIGH: u32 = 1 << 24;

    pub const ADDRINC_OFF: u32 = 0b00;
    pub const ADDRINC_SINGLE: u32 = 0b01;

    pub const PROT_MASTER_DEBUG: u32 = 1 << 5;
    pub const PROT_BIT_1: u32 = 1 << 1;

    /// CSW used for all memory transfers: master type debug, privileged
    /// data access, single auto-increment, with the given access size.
    pub fn for_transfer(size: TransferSize) -> Self {
        let mut csw = Csw(0);
        csw.set_prot(Self::PROT_MASTER_DEBUG | Self::PROT_BIT_1);
        csw.0 |= Self::RESERVED_HIGH;
        csw.set_addrinc(Self::ADDRINC_SINGLE);
        csw.set_size(size);
        csw
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn size_bits(&self) -> u32 {
        self.0 & Self::SIZE_MASK
    }

    pub fn addrinc(&self) -> u32 {
        (self.0 >> Self::ADDRINC_SHIFT) & Self::ADDRINC_MASK
    }

    pub fn set_size(&mut self, size: TransferSize) {
        self.0 = (self.0 & !Self::SIZE_MASK) | size.bits();
    }

    pub fn set_addrinc(&mut self, addrinc: u32) {
        self.0 = (self.0 & !(Self::ADDRINC_MASK << Self::ADDRINC_SHIFT))
            | ((addrinc & Self::ADDRINC_MASK) << Self::ADDRINC_SHIFT);
    }

    // PROT overlaps the reserved high bit, so this is applied before it
    fn set_prot(&mut self, prot: u32) {
        self.0 = (self.0 & !(Self::PROT_MASK << Self::PROT_SHIFT))
            | ((prot & Self::PROT_MASK) << Self::PROT_SHIFT);
    }
}

impl Default for Csw {
    fn default() -> Self {
        Self::for_transfer(TransferSize::Word)
    }
}

/// Transfer Address Register descriptor (read-write)
pub struct TarRegister;

impl RegisterDescriptor for TarRegister {
    const ADDRESS: u8 = 0x04;
    type Value = Tar;
}

impl ReadableRegister for TarRegister {}
impl WritableRegister for TarRegister {}
impl ApRegister for TarRegister {}

/// Transfer Address Register data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tar(u32);

register_data!(rw Tar);

/// Data Read/Write Register descriptor (read-write)
pub struct DrwRegister;

impl RegisterDescriptor for DrwRegister {
    const ADDRESS: u8 = 0x0C;
    type Value = Drw;
}

impl ReadableRegister for DrwRegister {}
impl WritableRegister for DrwRegister {}
impl ApRegister for DrwRegister {}

/// Data Read/Write Register data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Drw(u32);

register_data!(rw Drw);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csw_word_and_byte_transfers() {
        // DbgSwEnable clear, Prot = 0x23 | reserved bit, AddrInc single
        assert_eq!(Csw::for_transfer(TransferSize::Word).value(), 0x2300_0012);
        assert_eq!(Csw::for_transfer(TransferSize::Byte).value(), 0x2300_0010);
        assert_eq!(Csw::default().addrinc(), Csw::ADDRINC_SINGLE);
        assert_eq!(Csw::default().size_bits(), 0b010);
    }
}
