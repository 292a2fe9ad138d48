// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Cortex-M System Control Space debug registers
//!
//! These are memory mapped, so are accessed through the MEM-AP rather than as
//! DP/AP registers.  They are used to halt, reset and resume the core, and to
//! move values in and out of the core's registers while it is halted.

use core::fmt;

use crate::arm::register::MemoryMappedRegister;
use crate::{register_data, register_flag};

/// Debug Halting Control and Status Register
pub struct DhcsrRegister;

impl MemoryMappedRegister for DhcsrRegister {
    const ADDRESS: u32 = 0xE000_EDF0;
    type Value = Dhcsr;
}

/// DHCSR data.  Every write must carry [`Dhcsr::DBGKEY`] in the top half
/// word or the core ignores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Dhcsr(u32);

register_data!(rw Dhcsr);

impl Dhcsr {
    pub const DBGKEY: u32 = 0xA05F_0000;

    const C_DEBUGEN: u32 = 1 << 0;
    const C_HALT: u32 = 1 << 1;
    const S_REGRDY: u32 = 1 << 16;
    const S_HALT: u32 = 1 << 17;
    const S_RESET_ST: u32 = 1 << 25;

    /// Key only.  Clears C_DEBUGEN, letting the core run freely.
    pub fn run() -> Self {
        Dhcsr(Self::DBGKEY)
    }

    /// Key plus C_DEBUGEN.
    pub fn debug_enable() -> Self {
        Dhcsr(Self::DBGKEY | Self::C_DEBUGEN)
    }

    /// Key plus C_DEBUGEN plus C_HALT.
    pub fn halt() -> Self {
        Dhcsr(Self::DBGKEY | Self::C_DEBUGEN | Self::C_HALT)
    }

    register_flag!(c_debugen, set_c_debugen, Self::C_DEBUGEN);
    register_flag!(c_halt, set_c_halt, Self::C_HALT);
    register_flag!(s_regrdy, set_s_regrdy, Self::S_REGRDY);
    register_flag!(s_halt, set_s_halt, Self::S_HALT);
    register_flag!(s_reset_st, set_s_reset_st, Self::S_RESET_ST);
}

/// Debug Core Register Selector Register (write-only)
pub struct DcrsrRegister;

impl MemoryMappedRegister for DcrsrRegister {
    const ADDRESS: u32 = 0xE000_EDF4;
    type Value = Dcrsr;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Dcrsr(u32);

register_data!(rw Dcrsr);

impl Dcrsr {
    const REGWNR: u32 = 1 << 16;

    /// Transfer the core register into DCRDR.
    pub fn read(reg: CoreRegister) -> Self {
        Dcrsr(reg.number())
    }

    /// Transfer DCRDR into the core register.
    pub fn write(reg: CoreRegister) -> Self {
        Dcrsr(reg.number() | Self::REGWNR)
    }

    pub fn is_write(&self) -> bool {
        self.0 & Self::REGWNR != 0
    }

    pub fn register_number(&self) -> u32 {
        self.0 & 0x7F
    }
}

/// Debug Core Register Data Register
pub struct DcrdrRegister;

impl MemoryMappedRegister for DcrdrRegister {
    const ADDRESS: u32 = 0xE000_EDF8;
    type Value = Dcrdr;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Dcrdr(u32);

register_data!(rw Dcrdr);

/// Debug Exception and Monitor Control Register
pub struct DemcrRegister;

impl MemoryMappedRegister for DemcrRegister {
    const ADDRESS: u32 = 0xE000_EDFC;
    type Value = Demcr;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Demcr(u32);

register_data!(rw Demcr);

impl Demcr {
    const VC_CORERESET: u32 = 1 << 0;

    /// Halt on the reset vector.
    pub fn vector_catch_reset() -> Self {
        Demcr(Self::VC_CORERESET)
    }

    register_flag!(vc_corereset, set_vc_corereset, Self::VC_CORERESET);
}

/// Application Interrupt and Reset Control Register
pub struct AircrRegister;

impl MemoryMappedRegister for AircrRegister {
    const ADDRESS: u32 = 0xE000_ED0C;
    type Value = Aircr;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Aircr(u32);

register_data!(rw Aircr);

impl Aircr {
    const VECTKEY: u32 = 0x05FA_0000;
    const PRIGROUP_MASK: u32 = 0x700;
    const SYSRESETREQ: u32 = 1 << 2;

    /// A system reset request which keeps the interrupt priority grouping
    /// from `current`.
    pub fn system_reset(current: Aircr) -> Self {
        Aircr(Self::VECTKEY | (current.0 & Self::PRIGROUP_MASK) | Self::SYSRESETREQ)
    }

    pub fn is_reset_request(&self) -> bool {
        (self.0 & 0xFFFF_0000) == Self::VECTKEY && self.0 & Self::SYSRESETREQ != 0
    }
}

/// CPUID Base Register (read-only)
pub struct CpuIdRegister;

impl MemoryMappedRegister for CpuIdRegister {
    const ADDRESS: u32 = 0xE000_ED00;
    type Value = CpuId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct CpuId(u32);

register_data!(r CpuId);

impl CpuId {
    pub fn data(&self) -> u32 {
        self.0
    }

    /// Part number (bits 15:4), e.g. 0xC23 for Cortex-M3.
    pub fn part_number(&self) -> u16 {
        ((self.0 >> 4) & 0xFFF) as u16
    }
}

/// Core registers reachable through DCRSR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreRegister {
    R(u8),
    Sp,
    Lr,
    Pc,
    Xpsr,
}

impl CoreRegister {
    pub const R0: CoreRegister = CoreRegister::R(0);
    pub const R1: CoreRegister = CoreRegister::R(1);
    pub const R2: CoreRegister = CoreRegister::R(2);
    pub const R3: CoreRegister = CoreRegister::R(3);
    pub const R9: CoreRegister = CoreRegister::R(9);

    /// xPSR with only the Thumb bit set.
    pub const XPSR_THUMB: u32 = 0x0100_0000;

    /// DCRSR REGSEL value
    pub fn number(&self) -> u32 {
        match self {
            CoreRegister::R(n) => (*n & 0xF) as u32,
            CoreRegister::Sp => 13,
            CoreRegister::Lr => 14,
            CoreRegister::Pc => 15,
            CoreRegister::Xpsr => 16,
        }
    }
}

impl fmt::Display for CoreRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreRegister::R(n) => write!(f, "R{n}"),
            CoreRegister::Sp => write!(f, "SP"),
            CoreRegister::Lr => write!(f, "LR"),
            CoreRegister::Pc => write!(f, "PC"),
            CoreRegister::Xpsr => write!(f, "xPSR"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dhcsr_commands_carry_key() {
        assert_eq!(u32::from(Dhcsr::run()), 0xA05F_0000);
        assert_eq!(u32::from(Dhcsr::debug_enable()), 0xA05F_0001);
        assert_eq!(u32::from(Dhcsr::halt()), 0xA05F_0003);
        assert!(Dhcsr::from(1 << 17).s_halt());
        assert!(Dhcsr::from(1 << 16).s_regrdy());
    }

    #[test]
    fn dcrsr_selects_register() {
        assert_eq!(u32::from(Dcrsr::read(CoreRegister::Pc)), 15);
        assert_eq!(u32::from(Dcrsr::write(CoreRegister::Xpsr)), 0x0001_0010);
        assert!(Dcrsr::write(CoreRegister::R9).is_write());
        assert_eq!(Dcrsr::write(CoreRegister::R9).register_number(), 9);
    }

    #[test]
    fn aircr_reset_keeps_priority_grouping() {
        let current = Aircr::from(0xFA05_0300);
        let reset = Aircr::system_reset(current);
        assert_eq!(u32::from(reset), 0x05FA_0304);
        assert!(reset.is_reset_request());
        assert!(!Aircr::from(0x0000_0004).is_reset_request());
    }
}
