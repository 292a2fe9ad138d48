// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Flash algorithm descriptors
//!
//! A flash algorithm is a small piece of position dependent Thumb code that
//! is loaded into target RAM and called, one entry point at a time, to erase
//! and program the target's flash.  [`FlashAlgorithm`] describes where the
//! code lives, where each entry point is, and the register frame each call
//! needs.  Descriptors are compiled in and never mutated.

use core::fmt;
use core::ops::Range;
use strum::IntoEnumIterator;

/// Register values shared by every call into an algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyscallFrame {
    /// Loaded into LR.  Points at a BKPT instruction (with the Thumb bit set)
    /// so the core halts when the entry point returns.
    pub breakpoint: u32,

    /// Loaded into R9.
    pub static_base: u32,

    /// Loaded into SP.
    pub stack_pointer: u32,
}

/// One run of equally sized sectors.  `start` is an offset from the flash
/// base, and the run extends up to the next entry's `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectorInfo {
    pub size: u32,
    pub start: u32,
}

impl SectorInfo {
    pub const fn new(size: u32, start: u32) -> Self {
        Self { size, start }
    }
}

/// Algorithm entry points, used to select and log calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::IntoStaticStr, strum::EnumIter)]
pub enum FlashEntry {
    Init,
    UnInit,
    EraseChip,
    EraseSector,
    ProgramPage,
    Verify,
    SetReadProtect,
}

impl fmt::Display for FlashEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name: &'static str = self.into();
        write!(f, "{name}")
    }
}

/// An algorithm blob and its calling convention.
///
/// `uninit`, `verify` and `set_read_protect` are optional.  The others are
/// present on every algorithm.
#[derive(Debug, PartialEq, Eq)]
pub struct FlashAlgorithm {
    pub name: &'static str,
    pub init: u32,
    pub uninit: Option<u32>,
    pub erase_chip: u32,
    pub erase_sector: u32,
    pub program_page: u32,
    pub verify: Option<u32>,
    pub set_read_protect: Option<u32>,
    pub frame: SyscallFrame,
    pub program_buffer: u32,
    pub program_buffer_size: u32,
    pub algo_start: u32,
    pub algo_blob: &'static [u32],
    pub sectors: &'static [SectorInfo],
}

// Flash addresses are aliased into the low 128MB before sector lookup, so
// both 0x0800_0000 and 0x0000_0000 based addresses work.
const FLASH_OFFSET_MASK: u32 = 0x07FF_FFFF;

// Region flash algorithms are loaded into
const RAM_START: u32 = 0x2000_0000;
const RAM_END: u32 = 0x2001_0000;

impl FlashAlgorithm {
    /// Returns the entry point address, if the algorithm has one.
    pub fn entry(&self, entry: FlashEntry) -> Option<u32> {
        match entry {
            FlashEntry::Init => Some(self.init),
            FlashEntry::UnInit => self.uninit,
            FlashEntry::EraseChip => Some(self.erase_chip),
            FlashEntry::EraseSector => Some(self.erase_sector),
            FlashEntry::ProgramPage => Some(self.program_page),
            FlashEntry::Verify => self.verify,
            FlashEntry::SetReadProtect => self.set_read_protect,
        }
    }

    /// Size of the algorithm code in bytes.
    pub fn algo_size(&self) -> u32 {
        (self.algo_blob.len() * 4) as u32
    }

    /// Checks the descriptor's invariants: every address it uses is in
    /// target RAM, the code does not overlap the program buffer, and the
    /// sector table is non-empty and ascending.
    pub fn is_consistent(&self) -> bool {
        let in_ram = |addr: u32| (RAM_START..RAM_END).contains(&addr);

        let entries_ok = FlashEntry::iter()
            .filter_map(|e| self.entry(e))
            .all(|addr| in_ram(addr) && addr < self.algo_start + self.algo_size());

        let frame_ok = in_ram(self.frame.breakpoint)
            && in_ram(self.frame.static_base)
            && in_ram(self.frame.stack_pointer);

        let code_end = self.algo_start + self.algo_size();
        let layout_ok = in_ram(self.algo_start)
            && in_ram(self.program_buffer)
            && self.program_buffer_size > 0
            && (code_end <= self.program_buffer
                || self.algo_start >= self.program_buffer + self.program_buffer_size);

        let sectors_ok = !self.sectors.is_empty()
            && self.sectors.iter().all(|s| s.size > 0)
            && self.sectors.windows(2).all(|w| w[0].start < w[1].start);

        entries_ok && frame_ok && layout_ok && sectors_ok
    }

    /// Returns the sector run containing `addr`.  The last run is open
    /// ended, so every address maps to a run as long as the table is not
    /// empty.
    pub fn sector_for(&self, addr: u32) -> Option<&SectorInfo> {
        let offset = addr & FLASH_OFFSET_MASK;
        let index = self
            .sectors
            .iter()
            .position(|s| s.start > offset)
            .unwrap_or(self.sectors.len());
        self.sectors.get(index.checked_sub(1)?)
    }

    /// The absolute address range of the sector containing `addr`.  The
    /// flash base bits of `addr` are kept.
    pub fn sector_range(&self, addr: u32) -> Option<Range<u32>> {
        let offset = addr & FLASH_OFFSET_MASK;
        let base = addr & !FLASH_OFFSET_MASK;
        let sector = self.sector_for(addr)?;
        let start = offset - (offset - sector.start).checked_rem(sector.size)?;
        let start = base + start;
        Some(start..start.saturating_add(sector.size))
    }

    /// Whether `addr` is the first byte of a sector, and therefore needs
    /// erasing before its page is programmed.  Pure computation.
    ///
    /// Arguments:
    /// - `addr`: flash address, absolute or relative to the flash base.
    ///
    /// Returns:
    /// - `true` if `(addr - sector.start) % sector.size == 0` for the sector
    ///   containing `addr`, `false` otherwise, if the table is empty, or if
    ///   the sector has no size.
    pub fn sector_is_boundary(&self, addr: u32) -> bool {
        let offset = addr & FLASH_OFFSET_MASK;
        self.sector_for(addr)
            .and_then(|sector| (offset - sector.start).checked_rem(sector.size))
            == Some(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CODE: [u32; 4] = [0xE00ABE00, 0x47702000, 0x47702000, 0x47702000];

    fn algo(sectors: &'static [SectorInfo]) -> FlashAlgorithm {
        FlashAlgorithm {
            name: "test",
            init: 0x2000_0005,
            uninit: None,
            erase_chip: 0x2000_0005,
            erase_sector: 0x2000_0005,
            program_page: 0x2000_0005,
            verify: None,
            set_read_protect: None,
            frame: SyscallFrame {
                breakpoint: 0x2000_0001,
                static_base: 0x2000_0800,
                stack_pointer: 0x2000_0C00,
            },
            program_buffer: 0x2000_0400,
            program_buffer_size: 0x400,
            algo_start: 0x2000_0000,
            algo_blob: &CODE,
            sectors,
        }
    }

    static UNIFORM_2K: [SectorInfo; 1] = [SectorInfo::new(0x800, 0)];
    static F4_LIKE: [SectorInfo; 3] = [
        SectorInfo::new(0x4000, 0),
        SectorInfo::new(0x10000, 0x10000),
        SectorInfo::new(0x20000, 0x20000),
    ];

    #[test]
    fn uniform_sector_boundaries() {
        let algo = algo(&UNIFORM_2K);
        assert!(algo.sector_is_boundary(0));
        assert!(algo.sector_is_boundary(0x800));
        assert!(!algo.sector_is_boundary(0x400));
    }

    #[test]
    fn boundaries_at_flash_base() {
        let algo = algo(&UNIFORM_2K);
        assert!(algo.sector_is_boundary(0x0800_0000));
        assert!(algo.sector_is_boundary(0x0800_1000));
        assert!(!algo.sector_is_boundary(0x0800_0100));
    }

    #[test]
    fn variable_sector_runs() {
        let algo = algo(&F4_LIKE);
        assert!(algo.sector_is_boundary(0x0800_C000));
        assert!(!algo.sector_is_boundary(0x0800_E000));
        assert!(algo.sector_is_boundary(0x0801_0000));
        assert!(!algo.sector_is_boundary(0x0801_4000));
        // Open ended final run
        assert!(algo.sector_is_boundary(0x0804_0000));
        assert!(algo.sector_is_boundary(0x080E_0000));
        assert!(!algo.sector_is_boundary(0x0803_0000));
        assert_eq!(algo.sector_for(0x0806_0000), Some(&F4_LIKE[2]));
    }

    #[test]
    fn sector_ranges() {
        let algo = algo(&F4_LIKE);
        assert_eq!(algo.sector_range(0x0800_5000), Some(0x0800_4000..0x0800_8000));
        assert_eq!(algo.sector_range(0x0801_0000), Some(0x0801_0000..0x0802_0000));
        assert_eq!(algo.sector_range(0x0806_1234), Some(0x0806_0000..0x0808_0000));
        assert_eq!(algo.sector_range(0x5000), Some(0x4000..0x8000));
        assert_eq!(self::algo(&[]).sector_range(0x0800_0000), None);
    }

    #[test]
    fn empty_sector_table_is_never_a_boundary() {
        let algo = algo(&[]);
        assert!(!algo.sector_is_boundary(0));
        assert!(!algo.is_consistent());
    }

    #[test]
    fn zero_sized_sector_has_no_range() {
        static BROKEN: [SectorInfo; 2] = [SectorInfo::new(0x400, 0), SectorInfo::new(0, 0x1000)];
        let algo = algo(&BROKEN);
        assert!(!algo.is_consistent());
        assert_eq!(algo.sector_range(0x0800_0400), Some(0x0800_0400..0x0800_0800));
        assert_eq!(algo.sector_range(0x0800_1000), None);
        assert!(!algo.sector_is_boundary(0x0800_1000));
        assert!(!algo.sector_is_boundary(0x0800_2000));
    }

    #[test]
    fn optional_entries() {
        let algo = algo(&UNIFORM_2K);
        assert!(algo.is_consistent());
        assert_eq!(algo.entry(FlashEntry::Verify), None);
        assert_eq!(algo.entry(FlashEntry::UnInit), None);
        assert_eq!(algo.entry(FlashEntry::Init), Some(0x2000_0005));
        assert_eq!(algo.algo_size(), 16);
    }
}
