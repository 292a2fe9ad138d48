// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Test doubles: RAM backed storage, a recording programmer and a clock.

use std::collections::BTreeMap;
use std::vec::Vec;

use embedded_storage::{ReadStorage, Storage};

use swdburner_core::arm::dp::IdCode;
use swdburner_core::arm::scs::CpuId;
use swdburner_core::flash::FlashAlgorithm;
use swdburner_core::stm::{StmDeviceId, StmFlashSize};
use swdburner_swd::{FlashError, SwdError};

use crate::burner::Clock;
use crate::programmer::Programmer;

/// Erased flash, held in RAM.
pub struct RamStorage {
    pub data: Vec<u8>,
    pub fail_writes: bool,
}

impl RamStorage {
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0xFF; size],
            fail_writes: false,
        }
    }
}

impl ReadStorage for RamStorage {
    type Error = ();

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), ()> {
        let start = offset as usize;
        let src = self.data.get(start..start + bytes.len()).ok_or(())?;
        bytes.copy_from_slice(src);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.data.len()
    }
}

impl Storage for RamStorage {
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), ()> {
        if self.fail_writes {
            return Err(());
        }
        let start = offset as usize;
        let dst = self.data.get_mut(start..start + bytes.len()).ok_or(())?;
        dst.copy_from_slice(bytes);
        Ok(())
    }
}

/// A call made on [`MockProgrammer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect,
    Ping,
    ReadCpuId,
    ReadDeviceId,
    ReadFlashSize(u32),
    FlashInit(&'static str, u32),
    FlashUninit,
    EraseChip,
    EraseSector(u32),
    ProgramPage(u32, usize),
    Verify(u32, u32, u32),
    SetReadProtect,
    ResetRun,
    Delay(u32),
}

/// Which call fails, and how many times before it succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Fail {
    Connect,
    ReadCpuId,
    ReadDeviceId,
    FlashInit,
    FlashUninit,
    EraseChip,
    EraseSector,
    ProgramPage,
    Verify,
    SetReadProtect,
    ResetRun,
}

/// A scriptable [`Programmer`] that records every call.
///
/// The target is present while `online` is set.  Flash size reads return
/// `flash_kb`, and programmed bytes are kept in `flash`.
pub struct MockProgrammer {
    pub online: bool,
    pub idcode: u32,
    pub cpuid: u32,
    pub device_id: u32,
    pub flash_kb: u16,
    pub calls: Vec<Call>,
    pub flash: BTreeMap<u32, u8>,
    // Calls to let through, then calls to fail
    failures: BTreeMap<Fail, (u32, u32)>,
    loaded: Option<&'static FlashAlgorithm>,
}

impl Default for MockProgrammer {
    fn default() -> Self {
        Self {
            online: true,
            idcode: 0x1BA0_1477,
            cpuid: 0x411F_C231,
            device_id: 0x1000_6410,
            flash_kb: 64,
            calls: Vec::new(),
            flash: BTreeMap::new(),
            failures: BTreeMap::new(),
            loaded: None,
        }
    }
}

impl MockProgrammer {
    /// Makes the next `count` calls of this kind fail.
    pub fn fail(&mut self, which: Fail, count: u32) {
        self.fail_after(which, 0, count);
    }

    /// Lets `skip` calls of this kind succeed, then fails the next `count`.
    pub fn fail_after(&mut self, which: Fail, skip: u32, count: u32) {
        self.failures.insert(which, (skip, count));
    }

    /// Calls other than presence checks and delays.
    pub fn operations(&self) -> Vec<Call> {
        self.calls
            .iter()
            .filter(|c| !matches!(c, Call::Ping | Call::Delay(_)))
            .cloned()
            .collect()
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    fn failing(&mut self, which: Fail) -> bool {
        match self.failures.get_mut(&which) {
            Some((skip, _)) if *skip > 0 => {
                *skip -= 1;
                false
            }
            Some((_, count)) if *count > 0 => {
                *count -= 1;
                true
            }
            _ => false,
        }
    }

    fn present(&self) -> Result<(), SwdError> {
        if self.online { Ok(()) } else { Err(SwdError::NoAck(7)) }
    }

    fn flash_op(&mut self, which: Fail, error: fn(SwdError) -> FlashError) -> Result<(), FlashError> {
        if self.loaded.is_none() {
            return Err(FlashError::NotInitialized);
        }
        self.present().map_err(error)?;
        if self.failing(which) {
            return Err(error(SwdError::Timeout));
        }
        Ok(())
    }
}

impl Programmer for MockProgrammer {
    fn connect(&mut self) -> Result<IdCode, SwdError> {
        self.calls.push(Call::Connect);
        self.loaded = None;
        self.present()?;
        if self.failing(Fail::Connect) {
            return Err(SwdError::NoAck(7));
        }
        Ok(IdCode::from_u32(self.idcode))
    }

    fn ping(&mut self) -> Result<IdCode, SwdError> {
        self.calls.push(Call::Ping);
        self.present()?;
        Ok(IdCode::from_u32(self.idcode))
    }

    fn read_cpuid(&mut self) -> Result<CpuId, SwdError> {
        self.calls.push(Call::ReadCpuId);
        self.present()?;
        if self.failing(Fail::ReadCpuId) {
            return Err(SwdError::FaultAck);
        }
        Ok(CpuId::from(self.cpuid))
    }

    fn read_device_id(&mut self) -> Result<StmDeviceId, SwdError> {
        self.calls.push(Call::ReadDeviceId);
        self.present()?;
        if self.failing(Fail::ReadDeviceId) {
            return Err(SwdError::FaultAck);
        }
        Ok(StmDeviceId::new(self.device_id))
    }

    fn read_flash_size(&mut self, addr: u32) -> Result<StmFlashSize, SwdError> {
        self.calls.push(Call::ReadFlashSize(addr));
        self.present()?;
        Ok(StmFlashSize::new(self.flash_kb))
    }

    fn flash_init(&mut self, algo: &'static FlashAlgorithm, base: u32) -> Result<(), FlashError> {
        self.calls.push(Call::FlashInit(algo.name, base));
        self.loaded = None;
        self.present().map_err(FlashError::InitFailed)?;
        if self.failing(Fail::FlashInit) {
            return Err(FlashError::InitFailed(SwdError::Timeout));
        }
        self.loaded = Some(algo);
        Ok(())
    }

    fn flash_uninit(&mut self) -> Result<(), FlashError> {
        self.calls.push(Call::FlashUninit);
        let result = self.flash_op(Fail::FlashUninit, FlashError::UninitFailed);
        self.loaded = None;
        result
    }

    fn erase_chip(&mut self) -> Result<(), FlashError> {
        self.calls.push(Call::EraseChip);
        self.flash_op(Fail::EraseChip, FlashError::EraseFailed)
    }

    fn erase_sector(&mut self, addr: u32) -> Result<(), FlashError> {
        self.calls.push(Call::EraseSector(addr));
        self.flash_op(Fail::EraseSector, FlashError::EraseFailed)
    }

    fn program_page(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashError> {
        self.calls.push(Call::ProgramPage(addr, data.len()));
        self.flash_op(Fail::ProgramPage, FlashError::WriteFailed)?;
        for (i, byte) in data.iter().enumerate() {
            self.flash.insert(addr + i as u32, *byte);
        }
        Ok(())
    }

    fn verify(&mut self, addr: u32, size: u32, crc: u32) -> Result<(), FlashError> {
        self.calls.push(Call::Verify(addr, size, crc));
        if self.loaded.is_some_and(|algo| algo.verify.is_none()) {
            return Err(FlashError::Unsupported);
        }
        self.flash_op(Fail::Verify, FlashError::VerifyFailed)
    }

    fn set_read_protect(&mut self) -> Result<(), FlashError> {
        self.calls.push(Call::SetReadProtect);
        if self.loaded.is_some_and(|algo| algo.set_read_protect.is_none()) {
            return Err(FlashError::Unsupported);
        }
        self.flash_op(Fail::SetReadProtect, FlashError::ReadProtectFailed)
    }

    fn reset_run(&mut self) -> Result<(), SwdError> {
        self.calls.push(Call::ResetRun);
        self.loaded = None;
        self.present()?;
        if self.failing(Fail::ResetRun) {
            return Err(SwdError::Timeout);
        }
        Ok(())
    }

    fn delay_ms(&mut self, ms: u32) {
        self.calls.push(Call::Delay(ms));
    }
}

/// A clock that advances by `step` milliseconds each time it is read.
pub struct FakeClock {
    now: core::cell::Cell<u64>,
    step: u64,
}

impl FakeClock {
    pub fn new(step: u64) -> Self {
        Self {
            now: core::cell::Cell::new(0),
            step,
        }
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> u64 {
        let now = self.now.get();
        self.now.set(now + self.step);
        now
    }
}
