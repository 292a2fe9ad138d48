// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Flash algorithm runtime
//!
//! [`FlashLoader`] downloads a [`FlashAlgorithm`] into target RAM and calls
//! its entry points, one syscall per operation.  Every entry point except
//! verify reports success with R0 == 0.

use alloc::format;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use swdburner_core::flash::{FlashAlgorithm, FlashEntry};

use crate::debug::DebugInterface;
use crate::line::SwdLine;
use crate::{FlashError, SwdError};

/// Runs one flash algorithm on the target.
///
/// ```rust,ignore
/// let mut loader = FlashLoader::new(&mut debug, &STM32F10X_128_1K);
/// loader.init(0x0800_0000)?;
/// loader.erase_sector(0x0800_0000)?;
/// loader.program_page(0x0800_0000, &page)?;
/// loader.uninit()?;
/// ```
#[derive(Debug)]
pub struct FlashLoader<'a, L: SwdLine> {
    debug: &'a mut DebugInterface<L>,
    algo: &'a FlashAlgorithm,
    initialized: bool,
}

impl<'a, L: SwdLine> FlashLoader<'a, L> {
    pub fn new(debug: &'a mut DebugInterface<L>, algo: &'a FlashAlgorithm) -> Self {
        Self {
            debug,
            algo,
            initialized: false,
        }
    }

    /// Wraps an algorithm that an earlier `FlashLoader` loaded and
    /// initialized, and which is still resident on the halted target.
    pub fn loaded(debug: &'a mut DebugInterface<L>, algo: &'a FlashAlgorithm) -> Self {
        Self {
            debug,
            algo,
            initialized: true,
        }
    }

    pub fn algorithm(&self) -> &FlashAlgorithm {
        self.algo
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn debug(&mut self) -> &mut DebugInterface<L> {
        self.debug
    }

    /// Resets the target into a halted state, loads the algorithm and calls
    /// its `init` entry point.
    ///
    /// Arguments:
    /// - `base_address`: Passed to `init` in R0, normally the flash base.
    ///
    /// Returns:
    /// - `Ok(())`: if the algorithm is loaded and initialized.
    /// - `Err(FlashError::InitFailed)`: if any step fails.
    pub fn init(&mut self, base_address: u32) -> Result<(), FlashError> {
        info!("Exec:  {} init {base_address:#010X}", self.algo.name);
        self.initialized = false;

        self.debug.reset_program().map_err(FlashError::InitFailed)?;
        self.debug
            .swd_if()
            .write_block(self.algo.algo_start, self.algo.algo_blob)
            .map_err(FlashError::InitFailed)?;
        self.syscall(FlashEntry::Init, self.algo.init, [base_address, 0, 0, 0])
            .map_err(FlashError::InitFailed)?;

        self.initialized = true;
        debug!("OK:    {} initialized", self.algo.name);
        Ok(())
    }

    /// Calls `uninit`, if the algorithm has one.  Without one this does
    /// nothing.
    pub fn uninit(&mut self) -> Result<(), FlashError> {
        self.check_initialized()?;
        self.initialized = false;
        let Some(entry) = self.algo.uninit else {
            debug!("Info:  {} has no uninit", self.algo.name);
            return Ok(());
        };
        self.syscall(FlashEntry::UnInit, entry, [0; 4])
            .map_err(FlashError::UninitFailed)
    }

    pub fn erase_chip(&mut self) -> Result<(), FlashError> {
        self.check_initialized()?;
        info!("Exec:  {} erase chip", self.algo.name);
        self.syscall(FlashEntry::EraseChip, self.algo.erase_chip, [0; 4])
            .map_err(FlashError::EraseFailed)
    }

    pub fn erase_sector(&mut self, addr: u32) -> Result<(), FlashError> {
        self.check_initialized()?;
        debug!("Exec:  Erase sector {addr:#010X}");
        self.syscall(FlashEntry::EraseSector, self.algo.erase_sector, [addr, 0, 0, 0])
            .map_err(FlashError::EraseFailed)
    }

    /// Programs `buf` at `addr`, in chunks no larger than the algorithm's
    /// program buffer.
    ///
    /// Arguments:
    /// - `addr`: Flash address of the first byte.
    /// - `buf`: The data.
    ///
    /// Returns:
    /// - `Ok(())`: if every chunk was programmed.
    /// - `Err(FlashError::WriteFailed)`: on the first chunk to fail.  Chunks
    ///   before it remain programmed.
    pub fn program_page(&mut self, addr: u32, buf: &[u8]) -> Result<(), FlashError> {
        self.check_initialized()?;
        let buffer = self.algo.program_buffer;
        let mut chunk_addr = addr;

        for chunk in buf.chunks(self.algo.program_buffer_size as usize) {
            trace!("Exec:  Program {chunk_addr:#010X} {} bytes", chunk.len());
            let len = chunk.len() as u32;
            self.debug
                .swd_if()
                .write_memory(buffer, chunk)
                .map_err(FlashError::WriteFailed)?;
            self.syscall(
                FlashEntry::ProgramPage,
                self.algo.program_page,
                [chunk_addr, len, buffer, 0],
            )
            .map_err(FlashError::WriteFailed)?;
            chunk_addr += len;
        }

        Ok(())
    }

    /// Has the algorithm check `size` bytes at `addr` against `crc`.
    ///
    /// The algorithm signals success by returning the address just past the
    /// checked range.
    pub fn verify(&mut self, addr: u32, size: u32, crc: u32) -> Result<(), FlashError> {
        let entry = self.algo.verify.ok_or(FlashError::Unsupported)?;
        self.check_initialized()?;
        info!("Exec:  Verify {addr:#010X} {size} bytes CRC {crc:#010X}");

        let buffer = self.algo.program_buffer;
        self.debug
            .swd_if()
            .write_word(buffer, crc)
            .map_err(FlashError::VerifyFailed)?;
        let result = self
            .debug
            .call(&self.algo.frame, entry, [addr, size, buffer, 0])
            .map_err(FlashError::VerifyFailed)?;

        let expected = addr.wrapping_add(size);
        if result != expected {
            warn!("Error: Verify stopped at {result:#010X}, expected {expected:#010X}");
            return Err(FlashError::VerifyFailed(SwdError::OperationFailed(format!(
                "verify mismatch at {result:#010X}"
            ))));
        }
        debug!("OK:    Verified");
        Ok(())
    }

    pub fn set_read_protect(&mut self) -> Result<(), FlashError> {
        let entry = self.algo.set_read_protect.ok_or(FlashError::Unsupported)?;
        self.check_initialized()?;
        info!("Exec:  Set read protection");
        self.syscall(FlashEntry::SetReadProtect, entry, [0; 4])
            .map_err(FlashError::ReadProtectFailed)
    }

    /// Whether `addr` starts a sector.  No target access.
    pub fn sector_is_boundary(&self, addr: u32) -> bool {
        self.algo.sector_is_boundary(addr)
    }

    fn check_initialized(&self) -> Result<(), FlashError> {
        if self.initialized {
            Ok(())
        } else {
            Err(FlashError::NotInitialized)
        }
    }

    // Calls an entry point which returns 0 on success
    fn syscall(&mut self, name: FlashEntry, entry: u32, args: [u32; 4]) -> Result<(), SwdError> {
        let result = self.debug.call(&self.algo.frame, entry, args)?;
        if result != 0 {
            warn!("Error: {name} returned {result:#X}");
            return Err(SwdError::OperationFailed(format!("{name} returned {result:#X}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ResetMode;
    use crate::mock::MockTarget;
    use swdburner_core::flash::{SectorInfo, SyscallFrame};

    const CODE: [u32; 6] = [
        0xE00A_BE00, 0x4770_2000, 0x4770_2000, 0x4770_2000, 0x4770_2000, 0x4770_2000,
    ];
    const INIT: u32 = 0x2000_0005;
    const UNINIT: u32 = 0x2000_0009;
    const ERASE_CHIP: u32 = 0x2000_000D;
    const ERASE_SECTOR: u32 = 0x2000_0011;
    const PROGRAM_PAGE: u32 = 0x2000_0015;
    const VERIFY: u32 = 0x2000_0019;

    const SECTORS: [SectorInfo; 1] = [SectorInfo::new(0x400, 0)];

    const ALGO: FlashAlgorithm = FlashAlgorithm {
        name: "test",
        init: INIT,
        uninit: Some(UNINIT),
        erase_chip: ERASE_CHIP,
        erase_sector: ERASE_SECTOR,
        program_page: PROGRAM_PAGE,
        verify: Some(VERIFY),
        set_read_protect: None,
        frame: SyscallFrame {
            breakpoint: 0x2000_0001,
            static_base: 0x2000_0800,
            stack_pointer: 0x2000_1000,
        },
        program_buffer: 0x2000_0400,
        program_buffer_size: 0x100,
        algo_start: 0x2000_0000,
        algo_blob: &CODE,
        sectors: &SECTORS,
    };

    const MINIMAL: FlashAlgorithm = FlashAlgorithm {
        uninit: None,
        verify: None,
        ..ALGO
    };

    fn debug(target: &mut MockTarget) -> DebugInterface<&mut MockTarget> {
        let mut debug = DebugInterface::from_line(target);
        debug.set_reset_mode(ResetMode::Software);
        debug.set_halt_poll_limit(20);
        debug
    }

    #[test]
    fn init_loads_and_calls() {
        let mut target = MockTarget::new();
        let mut debug = debug(&mut target);
        let mut loader = FlashLoader::new(&mut debug, &ALGO);
        loader.init(0x0800_0000).unwrap();
        assert!(loader.is_initialized());
        drop(loader);
        drop(debug);

        assert_eq!(target.peek_word(0x2000_0000), CODE[0]);
        assert_eq!(target.peek_word(0x2000_0014), CODE[5]);
        assert_eq!(target.syscalls.len(), 1);
        assert_eq!(target.syscalls[0].pc, INIT);
        assert_eq!(target.syscalls[0].args[0], 0x0800_0000);
    }

    #[test]
    fn operations_need_init() {
        let mut target = MockTarget::new();
        let mut debug = debug(&mut target);
        let mut loader = FlashLoader::new(&mut debug, &ALGO);
        assert_eq!(loader.erase_chip(), Err(FlashError::NotInitialized));
        assert_eq!(loader.program_page(0x0800_0000, &[0; 4]), Err(FlashError::NotInitialized));
    }

    #[test]
    fn program_page_chunks_to_buffer_size() {
        let mut target = MockTarget::new();
        let mut debug = debug(&mut target);
        let mut loader = FlashLoader::new(&mut debug, &ALGO);
        loader.init(0x0800_0000).unwrap();
        let data: Vec<u8> = (0..0x180u32).map(|i| i as u8).collect();
        loader.program_page(0x0800_0400, &data).unwrap();
        drop(loader);
        drop(debug);

        let programs: Vec<_> = target
            .syscalls
            .iter()
            .filter(|c| c.pc == PROGRAM_PAGE)
            .collect();
        assert_eq!(programs.len(), 2);
        assert_eq!(programs[0].args[..3], [0x0800_0400, 0x100, 0x2000_0400]);
        assert_eq!(programs[1].args[..3], [0x0800_0500, 0x80, 0x2000_0400]);
        // Last chunk left in the buffer
        assert_eq!(target.peek_bytes(0x2000_0400, 0x80), data[0x100..].to_vec());
    }

    #[test]
    fn reattach_to_loaded_algorithm() {
        let mut target = MockTarget::new();
        let mut debug = debug(&mut target);
        FlashLoader::new(&mut debug, &ALGO).init(0x0800_0000).unwrap();
        let mut loader = FlashLoader::loaded(&mut debug, &ALGO);
        assert_eq!(loader.erase_chip(), Ok(()));
        drop(loader);
        drop(debug);
        assert_eq!(target.syscalls.len(), 2);
        assert_eq!(target.syscalls[1].pc, ERASE_CHIP);
    }

    #[test]
    fn nonzero_result_is_failure() {
        let mut target = MockTarget::new();
        target.on_syscall(|call, _| if call.pc == ERASE_SECTOR { 1 } else { 0 });
        let mut debug = debug(&mut target);
        let mut loader = FlashLoader::new(&mut debug, &ALGO);
        loader.init(0x0800_0000).unwrap();
        assert!(matches!(
            loader.erase_sector(0x0800_0000),
            Err(FlashError::EraseFailed(SwdError::OperationFailed(_)))
        ));
        assert_eq!(loader.erase_chip(), Ok(()));
    }

    #[test]
    fn erase_chip_times_out() {
        let mut target = MockTarget::new();
        let mut debug = debug(&mut target);
        let mut loader = FlashLoader::new(&mut debug, &ALGO);
        loader.init(0x0800_0000).unwrap();
        loader.debug().swd_if().protocol().line().never_halt = true;
        assert_eq!(
            loader.erase_chip(),
            Err(FlashError::EraseFailed(SwdError::Timeout))
        );
    }

    #[test]
    fn init_failure() {
        let mut target = MockTarget::new();
        target.on_syscall(|call, _| if call.pc == INIT { 0xFF } else { 0 });
        let mut debug = debug(&mut target);
        let mut loader = FlashLoader::new(&mut debug, &ALGO);
        assert!(matches!(
            loader.init(0x0800_0000),
            Err(FlashError::InitFailed(SwdError::OperationFailed(_)))
        ));
        assert!(!loader.is_initialized());
    }

    #[test]
    fn verify_result_is_end_address() {
        let mut target = MockTarget::new();
        target.on_syscall(|call, memory| {
            if call.pc != VERIFY {
                return 0;
            }
            let crc = (0..4).fold(0u32, |acc, i| {
                acc | (*memory.get(&(call.args[2] + i)).unwrap_or(&0) as u32) << (i * 8)
            });
            if crc == 0xCBF4_3926 {
                call.args[0] + call.args[1]
            } else {
                call.args[0]
            }
        });
        let mut debug = debug(&mut target);
        let mut loader = FlashLoader::new(&mut debug, &ALGO);
        loader.init(0x0800_0000).unwrap();
        assert_eq!(loader.verify(0x0800_0000, 0x300, 0xCBF4_3926), Ok(()));
        assert!(matches!(
            loader.verify(0x0800_0000, 0x300, 0x1234_5678),
            Err(FlashError::VerifyFailed(SwdError::OperationFailed(_)))
        ));
    }

    #[test]
    fn optional_entries() {
        let mut target = MockTarget::new();
        let mut debug = debug(&mut target);
        let mut loader = FlashLoader::new(&mut debug, &MINIMAL);
        assert_eq!(loader.verify(0x0800_0000, 4, 0), Err(FlashError::Unsupported));
        assert_eq!(loader.set_read_protect(), Err(FlashError::Unsupported));
        loader.init(0x0800_0000).unwrap();
        assert_eq!(loader.set_read_protect(), Err(FlashError::Unsupported));
        assert_eq!(loader.uninit(), Ok(()));
        drop(loader);
        drop(debug);
        assert_eq!(target.syscalls.len(), 1);
    }

    #[test]
    fn uninit_calls_entry() {
        let mut target = MockTarget::new();
        let mut debug = debug(&mut target);
        let mut loader = FlashLoader::new(&mut debug, &ALGO);
        loader.init(0x0800_0000).unwrap();
        loader.uninit().unwrap();
        assert!(!loader.is_initialized());
        drop(loader);
        drop(debug);
        assert_eq!(target.syscalls.last().map(|c| c.pc), Some(UNINIT));
    }

    #[test]
    fn sector_boundaries_need_no_target() {
        let mut target = MockTarget::new();
        let mut debug = debug(&mut target);
        let loader = FlashLoader::new(&mut debug, &ALGO);
        assert!(loader.sector_is_boundary(0x0800_0000));
        assert!(loader.sector_is_boundary(0x0800_0400));
        assert!(!loader.sector_is_boundary(0x0800_0200));
        drop(loader);
        drop(debug);
        assert!(target.requests.is_empty());
    }
}
