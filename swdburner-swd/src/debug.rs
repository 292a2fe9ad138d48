// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! SWD (Wire) Debug Interface
//!
//! This module implements control of a Cortex-M target's core over SWD:
//! bringing up the debug link, halting, resetting and resuming the core, and
//! moving values in and out of its registers.  It is what the flash
//! algorithm runtime uses to call code loaded into target RAM.
//!
//! If this module does not give you the control you need, you can use the
//! [`SwdInterface`] object directly, via [`DebugInterface::swd_if()`].

use core::result::Result;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use serde::{Deserialize, Serialize};

use swdburner_core::arm::dp::{IdCode, Select};
use swdburner_core::arm::scs::{
    Aircr, AircrRegister, CoreRegister, CpuId, CpuIdRegister, DcrdrRegister, Dcrsr,
    DcrsrRegister, Demcr, DemcrRegister, Dhcsr, DhcsrRegister,
};
use swdburner_core::flash::SyscallFrame;
use swdburner_core::stm::{StmDeviceId, StmDeviceIdRegister, StmFlashSize};

use crate::interface::SwdInterface;
use crate::line::SwdLine;
use crate::{SwdError, retry, retry_while};

/// Default number of DHCSR polls waiting for the core to halt.  A full chip
/// erase can take seconds, so this is large.
pub const DEFAULT_HALT_POLL_LIMIT: u32 = 1_000_000;

// Polls of DHCSR.S_REGRDY after a DCRSR write
const REGRDY_POLL_ATTEMPTS: u32 = 100;

// Attempts at enabling debug before giving up, toggling reset in between
const DEBUG_ENABLE_ATTEMPTS: u32 = 2;

// Time reset is held, and time allowed after releasing it
const RESET_DELAY_MS: u32 = 20;

/// How the target's reset is driven.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResetMode {
    /// Pulse the nRST line.  Falls back to [`ResetMode::Software`] if the
    /// line implementation has no reset pin.
    Hardware,

    /// Request a system reset through AIRCR.SYSRESETREQ.
    #[default]
    Software,
}

/// Register values loaded before resuming the core.  xPSR is always set to
/// Thumb state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebugState {
    pub args: [u32; 4],
    pub static_base: u32,
    pub stack_pointer: u32,
    pub return_address: u32,
    pub entry: u32,
}

impl DebugState {
    /// State to call `entry` with `args`, using `frame`'s calling convention.
    pub fn for_call(frame: &SyscallFrame, entry: u32, args: [u32; 4]) -> Self {
        Self {
            args,
            static_base: frame.static_base,
            stack_pointer: frame.stack_pointer,
            return_address: frame.breakpoint,
            entry,
        }
    }
}

/// ARM Debug Interface object
///
/// This is used by applications to control the target's core over SWD.  It
/// provides the target lifecycle (connect, reset into a halted state for
/// programming, reset and run, halt, run) and core register access.
///
/// ```rust,ignore
/// use swdburner_swd::{DebugInterface, ResetMode};
///
/// let mut debug = DebugInterface::from_line(line);
/// debug.set_reset_mode(ResetMode::Hardware);
/// debug.reset_program()?;
/// let pc = debug.read_core_register(CoreRegister::Pc)?;
/// ```
#[derive(Debug)]
pub struct DebugInterface<L: SwdLine> {
    swd: SwdInterface<L>,
    reset_mode: ResetMode,
    halt_poll_limit: u32,
}

impl<L: SwdLine> DebugInterface<L> {
    /// Creates a new `DebugInterface` with the given [`SwdInterface`].
    pub fn new(swd: SwdInterface<L>) -> Self {
        Self {
            swd,
            reset_mode: ResetMode::default(),
            halt_poll_limit: DEFAULT_HALT_POLL_LIMIT,
        }
    }

    /// Creates a new `DebugInterface` directly from a bit transport.
    pub fn from_line(line: L) -> Self {
        Self::new(SwdInterface::from_line(line))
    }

    /// Returns a mutable reference to the underlying [`SwdInterface`].
    ///
    /// This allows you to access lower-level SWD operations directly, if
    /// required.
    pub fn swd_if(&mut self) -> &mut SwdInterface<L> {
        &mut self.swd
    }

    pub fn reset_mode(&self) -> ResetMode {
        self.reset_mode
    }

    pub fn set_reset_mode(&mut self, mode: ResetMode) {
        self.reset_mode = mode;
    }

    pub fn halt_poll_limit(&self) -> u32 {
        self.halt_poll_limit
    }

    /// Sets how many times DHCSR is polled waiting for the core to halt,
    /// before the wait is reported as [`SwdError::Timeout`].
    pub fn set_halt_poll_limit(&mut self, limit: u32) {
        self.halt_poll_limit = limit.max(1);
    }

    /// Returns the IDCODE of the target device, if connected.
    pub fn idcode(&self) -> Option<IdCode> {
        self.swd.idcode()
    }

    /// Blocks for `ms` milliseconds, using the line's delay.
    pub fn delay_ms(&mut self, ms: u32) {
        self.swd.protocol().delay_ms(ms);
    }

    /// Connects to the target and powers up its debug domain, leaving the
    /// core in whatever state it was in.
    ///
    /// Returns:
    /// - `Ok(IdCode)`: the target's IDCODE.
    /// - `Err(SwdError)`: if the target did not respond, or did not power
    ///   up.
    pub fn init_debug(&mut self) -> Result<IdCode, SwdError> {
        let idcode = self.swd.connect()?;
        self.swd.power_up_debug_domain()?;
        debug!("OK:    Debug initialized {idcode}");
        Ok(idcode)
    }

    /// Quick check the target is still attached, by reading IDCODE.
    pub fn ping(&mut self) -> Result<IdCode, SwdError> {
        self.swd.read_idcode()
    }

    /// Reads the core's CPUID register.
    pub fn read_cpuid(&mut self) -> Result<CpuId, SwdError> {
        self.swd.read_register(CpuIdRegister)
    }

    /// Reads the STM32 DBGMCU_IDCODE register.
    pub fn read_device_id(&mut self) -> Result<StmDeviceId, SwdError> {
        self.swd.read_register(StmDeviceIdRegister)
    }

    /// Reads the factory programmed flash size half word at `addr`.  This
    /// isn't word aligned on all parts.
    pub fn read_flash_size(&mut self, addr: u32) -> Result<StmFlashSize, SwdError> {
        let mut bytes = [0u8; 2];
        self.swd.read_memory(addr, &mut bytes)?;
        Ok(StmFlashSize::from_le_bytes(bytes))
    }

    /// Reads a core register while the core is halted.
    ///
    /// Arguments:
    /// - `reg`: The register to read.
    ///
    /// Returns:
    /// - `Ok(u32)`: the register's value.
    /// - `Err(SwdError::Timeout)`: if the transfer never completed.
    /// - `Err(SwdError)`: on any SWD failure.
    pub fn read_core_register(&mut self, reg: CoreRegister) -> Result<u32, SwdError> {
        self.swd.write_register(DcrsrRegister, Dcrsr::read(reg))?;
        self.wait_register_ready()?;
        let value = u32::from(self.swd.read_register(DcrdrRegister)?);
        trace!("Value: {reg} {value:#010X}");
        Ok(value)
    }

    /// Writes a core register while the core is halted.
    pub fn write_core_register(&mut self, reg: CoreRegister, value: u32) -> Result<(), SwdError> {
        trace!("Exec:  Write {reg} {value:#010X}");
        self.swd.write_register(DcrdrRegister, value.into())?;
        self.swd.write_register(DcrsrRegister, Dcrsr::write(reg))?;
        self.wait_register_ready()
    }

    /// Loads the core registers then resumes the core with debug still
    /// enabled, so it halts again at the next breakpoint.
    ///
    /// Returns:
    /// - `Ok(())`: if the core was resumed with no sticky or write data
    ///   errors flagged.
    /// - `Err(SwdError::DpError)`: if CTRL/STAT shows either error.
    pub fn write_debug_state(&mut self, state: &DebugState) -> Result<(), SwdError> {
        self.swd.update_dp_select(Select::default())?;

        let regs = [CoreRegister::R0, CoreRegister::R1, CoreRegister::R2, CoreRegister::R3];
        for (reg, value) in regs.into_iter().zip(state.args) {
            self.write_core_register(reg, value)?;
        }
        self.write_core_register(CoreRegister::R9, state.static_base)?;
        self.write_core_register(CoreRegister::Sp, state.stack_pointer)?;
        self.write_core_register(CoreRegister::Lr, state.return_address)?;
        self.write_core_register(CoreRegister::Pc, state.entry)?;
        self.write_core_register(CoreRegister::Xpsr, CoreRegister::XPSR_THUMB)?;

        self.swd.write_register(DhcsrRegister, Dhcsr::debug_enable())?;

        self.swd.check_transfer_errors()
    }

    /// Calls code in target RAM and returns R0 once it hits the breakpoint
    /// the frame points LR at.
    ///
    /// Arguments:
    /// - `frame`: The calling convention of the loaded code.
    /// - `entry`: Entry point, with the Thumb bit set.
    /// - `args`: Loaded into R0-R3.
    ///
    /// Returns:
    /// - `Ok(u32)`: R0 after the call.
    /// - `Err(SwdError::Timeout)`: if the core did not halt within the halt
    ///   poll limit.
    pub fn call(
        &mut self,
        frame: &SyscallFrame,
        entry: u32,
        args: [u32; 4],
    ) -> Result<u32, SwdError> {
        trace!("Exec:  Call {entry:#010X} {args:08X?}");
        self.write_debug_state(&DebugState::for_call(frame, entry, args))?;
        self.wait_halted()?;
        self.read_core_register(CoreRegister::R0)
    }

    /// Resets the target into a halted state at its reset vector, ready for
    /// code to be loaded and called.
    ///
    /// Connects and powers up first.  If the debug enable write fails the
    /// target may be stuck with its bus locked up, so reset is toggled and
    /// the write retried once.
    pub fn reset_program(&mut self) -> Result<(), SwdError> {
        debug!("Exec:  Reset and halt");
        self.init_debug()?;

        let mut attempt = 0;
        retry(DEBUG_ENABLE_ATTEMPTS, || {
            attempt += 1;
            let result = self.swd.write_register(DhcsrRegister, Dhcsr::debug_enable());
            if let Err(e) = &result {
                warn!("Retry: Debug enable failed: {e}");
                if attempt < DEBUG_ENABLE_ATTEMPTS {
                    self.toggle_reset_line();
                    self.init_debug()?;
                }
            }
            result
        })?;

        self.swd
            .write_register(DemcrRegister, Demcr::vector_catch_reset())?;
        self.reset_target()?;
        self.wait_halted()?;
        self.swd.write_register(DemcrRegister, Demcr::default())?;

        debug!("OK:    Target halted at reset vector");
        Ok(())
    }

    /// Resets the target and leaves it running its own firmware.
    pub fn reset_run(&mut self) -> Result<(), SwdError> {
        debug!("Exec:  Reset and run");
        if self.reset_mode == ResetMode::Hardware && self.toggle_reset_line() {
            self.swd.disconnect();
            return Ok(());
        }

        if !self.swd.is_powered_up() {
            self.init_debug()?;
        }
        self.swd.write_register(DhcsrRegister, Dhcsr::run())?;
        self.software_reset()?;
        self.swd.disconnect();
        Ok(())
    }

    /// Halts the core, and waits for it to report halted.
    pub fn halt(&mut self) -> Result<(), SwdError> {
        debug!("Exec:  Halt");
        self.swd.write_register(DhcsrRegister, Dhcsr::halt())?;
        self.wait_halted()
    }

    /// Disables debug, letting the core run, and powers the debug domain
    /// down.
    pub fn run(&mut self) -> Result<(), SwdError> {
        debug!("Exec:  Run");
        self.swd.write_register(DhcsrRegister, Dhcsr::run())?;
        self.swd.power_down_debug_domain()
    }
}

// Internal functions
impl<L: SwdLine> DebugInterface<L> {
    fn wait_register_ready(&mut self) -> Result<(), SwdError> {
        retry_while(
            REGRDY_POLL_ATTEMPTS,
            |e| *e == SwdError::NotReady,
            || {
                let dhcsr = self.swd.read_register(DhcsrRegister)?;
                if dhcsr.s_regrdy() {
                    Ok(())
                } else {
                    Err(SwdError::NotReady)
                }
            },
        )
        .map_err(|e| match e {
            SwdError::NotReady => {
                debug!("Error: Core register transfer not ready");
                SwdError::Timeout
            }
            e => e,
        })
    }

    fn wait_halted(&mut self) -> Result<(), SwdError> {
        let mut polls = 0u32;
        retry_while(
            self.halt_poll_limit,
            |e| *e == SwdError::NotReady,
            || {
                polls += 1;
                if polls % 1000 == 0 {
                    debug!("... waiting for target to halt, {polls} polls");
                }
                let dhcsr = self.swd.read_register(DhcsrRegister)?;
                if dhcsr.s_halt() {
                    Ok(())
                } else {
                    Err(SwdError::NotReady)
                }
            },
        )
        .map_err(|e| match e {
            SwdError::NotReady => {
                warn!("Error: Target did not halt after {polls} polls");
                SwdError::Timeout
            }
            e => e,
        })
    }

    // Returns false if there is no reset line
    fn toggle_reset_line(&mut self) -> bool {
        let protocol = self.swd.protocol();
        if !protocol.set_reset(true) {
            return false;
        }
        protocol.delay_ms(RESET_DELAY_MS);
        protocol.set_reset(false);
        protocol.delay_ms(RESET_DELAY_MS);
        true
    }

    fn software_reset(&mut self) -> Result<(), SwdError> {
        let current = self.swd.read_register(AircrRegister)?;
        self.swd
            .write_register(AircrRegister, Aircr::system_reset(current))?;
        self.delay_ms(RESET_DELAY_MS);
        Ok(())
    }

    fn reset_target(&mut self) -> Result<(), SwdError> {
        let mode = self.reset_mode;
        match mode {
            ResetMode::Hardware if self.toggle_reset_line() => Ok(()),
            ResetMode::Hardware => {
                debug!("Info:  No reset line, using system reset request");
                self.software_reset()
            }
            ResetMode::Software => self.software_reset(),
        }
    }
}
