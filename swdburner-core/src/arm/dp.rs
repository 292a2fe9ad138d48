// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ARM Debug Port Registers

use alloc::{format, string::String};
use core::fmt;

use crate::arm::register::{DpRegister, ReadableRegister, RegisterDescriptor, WritableRegister};
use crate::{register_data, register_flag};

/// IDCODE Register descriptor (read-only)
pub struct IdCodeRegister;

impl RegisterDescriptor for IdCodeRegister {
    const ADDRESS: u8 = 0x00;
    type Value = IdCode;
}

impl ReadableRegister for IdCodeRegister {}
impl DpRegister for IdCodeRegister {}

/// ARM Debug Port IDCODE register data
///
/// Read immediately after the connect sequence to confirm the link is up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct IdCode(u32);

impl IdCode {
    const ARM_DESIGNER: u16 = 0x23B;

    pub const fn from_u32(value: u32) -> Self {
        IdCode(value)
    }

    pub fn data(&self) -> u32 {
        self.0
    }

    /// Revision (bits 31:28)
    pub fn revision(&self) -> u8 {
        ((self.0 >> 28) & 0xF) as u8
    }

    /// Part number (bits 27:20)
    pub fn part_number(&self) -> u8 {
        ((self.0 >> 20) & 0xFF) as u8
    }

    /// Version (bits 15:12)
    pub fn version(&self) -> u8 {
        ((self.0 >> 12) & 0xF) as u8
    }

    /// JEDEC designer (bits 11:1)
    pub fn designer_id(&self) -> u16 {
        ((self.0 >> 1) & 0x7FF) as u16
    }

    /// Bit 0 reads as one on every real debug port.  An all-zeros or
    /// all-ones value means nothing answered.
    pub fn is_valid(&self) -> bool {
        (self.0 & 1) == 1 && self.0 != 0xFFFF_FFFF
    }

    pub fn is_arm_debug_port(&self) -> bool {
        self.designer_id() == Self::ARM_DESIGNER && self.part_number() == 0xBA
    }
}

register_data!(r IdCode);

impl fmt::LowerHex for IdCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// ABORT Register descriptor (write-only)
pub struct AbortRegister;

impl RegisterDescriptor for AbortRegister {
    const ADDRESS: u8 = 0x00;
    type Value = Abort;
}

impl WritableRegister for AbortRegister {}
impl DpRegister for AbortRegister {}

/// ARM Debug Port ABORT register data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Abort(u32);

register_data!(w Abort);

impl Abort {
    const STKCMPCLR: u32 = 1 << 1;
    const STKERRCLR: u32 = 1 << 2;
    const WDERRCLR: u32 = 1 << 3;
    const ORUNERRCLR: u32 = 1 << 4;

    /// ABORT value clearing every sticky flag (0x1E).
    pub fn clear_all() -> Self {
        let mut abort = Abort::default();
        abort
            .set_stkcmpclr(true)
            .set_stkerrclr(true)
            .set_wderrclr(true)
            .set_orunerrclr(true);
        abort
    }

    register_flag!(stkcmpclr, set_stkcmpclr, Self::STKCMPCLR);
    register_flag!(stkerrclr, set_stkerrclr, Self::STKERRCLR);
    register_flag!(wderrclr, set_wderrclr, Self::WDERRCLR);
    register_flag!(orunerrclr, set_orunerrclr, Self::ORUNERRCLR);
}

/// CTRL/STAT Register descriptor (read-write)
pub struct CtrlStatRegister;

impl RegisterDescriptor for CtrlStatRegister {
    const ADDRESS: u8 = 0x04;
    type Value = CtrlStat;
}

impl ReadableRegister for CtrlStatRegister {}
impl WritableRegister for CtrlStatRegister {}
impl DpRegister for CtrlStatRegister {}

/// ARM Debug Port CTRL/STAT register data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CtrlStat(u32);

register_data!(rw CtrlStat);

impl CtrlStat {
    const STICKYORUN: u32 = 1 << 1;
    const STICKYCMP: u32 = 1 << 4;
    const STICKYERR: u32 = 1 << 5;
    const READOK: u32 = 1 << 6;
    const WDATAERR: u32 = 1 << 7;

    const MASKLANE_MASK: u32 = 0b1111;
    const MASKLANE_SHIFT: u32 = 8;

    const CDBGPWRUPREQ: u32 = 1 << 28;
    const CDBGPWRUPACK: u32 = 1 << 29;
    const CSYSPWRUPREQ: u32 = 1 << 30;
    const CSYSPWRUPACK: u32 = 1 << 31;

    /// Request both system and debug power.
    pub fn power_up_request() -> Self {
        let mut ctrl_stat = CtrlStat::default();
        ctrl_stat.set_cdbgpwrupreq(true).set_csyspwrupreq(true);
        ctrl_stat
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    register_flag!(stickyorun, set_stickyorun, Self::STICKYORUN);
    register_flag!(stickycmp, set_stickycmp, Self::STICKYCMP);
    register_flag!(stickyerr, set_stickyerr, Self::STICKYERR);
    register_flag!(readok, set_readok, Self::READOK);
    register_flag!(wdataerr, set_wdataerr, Self::WDATAERR);
    register_flag!(cdbgpwrupreq, set_cdbgpwrupreq, Self::CDBGPWRUPREQ);
    register_flag!(cdbgpwrupack, set_cdbgpwrupack, Self::CDBGPWRUPACK);
    register_flag!(csyspwrupreq, set_csyspwrupreq, Self::CSYSPWRUPREQ);
    register_flag!(csyspwrupack, set_csyspwrupack, Self::CSYSPWRUPACK);

    /// Mask lane field (bits 11:8)
    pub fn masklane(&self) -> u32 {
        (self.0 >> Self::MASKLANE_SHIFT) & Self::MASKLANE_MASK
    }

    /// Sets the mask lane field.  Transfer mode is left at normal (0).
    pub fn set_masklane(&mut self, mask: u32) -> &mut Self {
        self.0 = (self.0 & !(Self::MASKLANE_MASK << Self::MASKLANE_SHIFT))
            | ((mask & Self::MASKLANE_MASK) << Self::MASKLANE_SHIFT);
        self
    }

    /// True once both power domains have acknowledged a power-up request.
    pub fn is_powered_up(&self) -> bool {
        self.cdbgpwrupack() && self.csyspwrupack()
    }

    /// A sticky error or a write data error makes any following debug state
    /// untrustworthy.
    pub fn has_transfer_errors(&self) -> bool {
        self.stickyerr() || self.wdataerr()
    }

    pub fn has_errors(&self) -> bool {
        self.stickyorun() || self.stickycmp() || self.has_transfer_errors()
    }

    pub fn error_states(&self) -> String {
        let flags = [
            (self.stickyorun(), "STICKYORUN"),
            (self.stickycmp(), "STICKYCMP"),
            (self.stickyerr(), "STICKYERR"),
            (self.wdataerr(), "WDATAERR"),
        ];
        let set: alloc::vec::Vec<&str> = flags
            .iter()
            .filter(|(set, _)| *set)
            .map(|(_, name)| *name)
            .collect();
        if set.is_empty() {
            String::from("No errors")
        } else {
            format!("Errors: {}", set.join(", "))
        }
    }

    pub fn power_states(&self) -> String {
        format!(
            "Debug: {}/{}, System: {}/{}",
            if self.cdbgpwrupreq() { "REQ" } else { "off" },
            if self.cdbgpwrupack() { "ACK" } else { "nak" },
            if self.csyspwrupreq() { "REQ" } else { "off" },
            if self.csyspwrupack() { "ACK" } else { "nak" }
        )
    }
}

/// SELECT Register descriptor (write-only on DPv1)
pub struct SelectRegister;

impl RegisterDescriptor for SelectRegister {
    const ADDRESS: u8 = 0x08;
    type Value = Select;
}

impl WritableRegister for SelectRegister {}
impl DpRegister for SelectRegister {}

/// ARM Debug Port SELECT register data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Select(u32);

register_data!(rw Select);

impl Select {
    const APSEL_MASK: u32 = 0xFF;
    const APSEL_SHIFT: u32 = 24;

    const APBANKSEL_MASK: u32 = 0xF;
    const APBANKSEL_SHIFT: u32 = 4;

    /// SELECT value addressing the given AP register, bank taken from bits
    /// 7:4 of the register address.
    pub fn for_ap_register(apsel: u8, addr: u8) -> Self {
        let mut select = Select::default();
        select.set_apsel(apsel as u32);
        select.set_apbanksel(((addr >> 4) & 0xF) as u32);
        select
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn apsel(&self) -> u32 {
        (self.0 >> Self::APSEL_SHIFT) & Self::APSEL_MASK
    }

    pub fn apbanksel(&self) -> u32 {
        (self.0 >> Self::APBANKSEL_SHIFT) & Self::APBANKSEL_MASK
    }

    pub fn set_apsel(&mut self, apsel: u32) {
        self.0 = (self.0 & !(Self::APSEL_MASK << Self::APSEL_SHIFT))
            | ((apsel & Self::APSEL_MASK) << Self::APSEL_SHIFT);
    }

    pub fn set_apbanksel(&mut self, banksel: u32) {
        self.0 = (self.0 & !(Self::APBANKSEL_MASK << Self::APBANKSEL_SHIFT))
            | ((banksel & Self::APBANKSEL_MASK) << Self::APBANKSEL_SHIFT);
    }
}

/// RDBUFF Register descriptor (read-only)
pub struct RdBuffRegister;

impl RegisterDescriptor for RdBuffRegister {
    const ADDRESS: u8 = 0x0C;
    type Value = RdBuff;
}

impl ReadableRegister for RdBuffRegister {}
impl DpRegister for RdBuffRegister {}

/// ARM Debug Port RDBUFF register data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RdBuff(u32);

register_data!(r RdBuff);

impl RdBuff {
    pub fn data(&self) -> u32 {
        self.0
    }
}
