// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ARM SWD Interface
//!
//! This module implements the SWD interface for communicating with ARM
//! devices.  It provides [`SwdInterface`] for performing DP, AP and memory
//! operations, and [`SwdOp`] for describing a single SWD transfer.

use alloc::string::ToString;
use alloc::vec;
use core::fmt;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use swdburner_core::arm::dp::{
    Abort, AbortRegister, CtrlStat, CtrlStatRegister, IdCode, IdCodeRegister, RdBuffRegister,
    Select, SelectRegister,
};
use swdburner_core::arm::map::{Csw, CswRegister, DrwRegister, TarRegister, TransferSize};
use swdburner_core::arm::register::{
    ApRegister, DpRegister, MemoryMappedRegister, ReadableRegister, RegisterDescriptor,
    WritableRegister,
};

use crate::line::{Speed, SwdLine};
use crate::protocol::{
    POST_SINGLE_OPERATION_CYCLES, POST_WRITE_CYCLES, SwdProtocol, calculate_parity,
};
use crate::{SwdError, retry_while};

// SWD wraps read/writes using auto-incrementing at a 1K boundary, although
// this is implementation dependent.
const SWD_MEMORY_BOUNDARY: u32 = 0x400;

/// Default total attempts for a transfer the target answers with WAIT.
pub const DEFAULT_WAIT_ATTEMPTS: u32 = 10;

// Polls of CTRL/STAT waiting for the power up acknowledgements
const POWER_UP_ATTEMPTS: u32 = 100;

/// The last values written to DP SELECT and AP CSW, used to skip writes
/// that would not change anything.  Both start as unknown, and return to
/// unknown whenever the link is reconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugPortState {
    select: u32,
    csw: u32,
}

impl DebugPortState {
    /// Not a value either register can usefully hold.
    pub const UNKNOWN: u32 = 0xFFFF_FFFF;

    fn invalidate(&mut self) {
        *self = Self::default();
    }

    pub fn select(&self) -> Option<Select> {
        (self.select != Self::UNKNOWN).then(|| Select::from(self.select))
    }

    pub fn csw(&self) -> Option<Csw> {
        (self.csw != Self::UNKNOWN).then(|| Csw::from(self.csw))
    }
}

impl Default for DebugPortState {
    fn default() -> Self {
        Self {
            select: Self::UNKNOWN,
            csw: Self::UNKNOWN,
        }
    }
}

/// SWD Interface object
///
/// This is used by [`crate::DebugInterface`] to perform individual SWD
/// operations on the target.  Most applications will prefer
/// [`crate::DebugInterface`], which provides a higher-level interface for
/// common groups of SWD operations.
///
/// ```rust,ignore
/// use swdburner_swd::SwdInterface;
///
/// let mut swd_if = SwdInterface::from_line(line);
/// let idcode = swd_if.connect()?;
/// swd_if.power_up_debug_domain()?;
/// let word = swd_if.read_word(0x0800_0000)?;
/// ```
#[derive(Debug)]
pub struct SwdInterface<L: SwdLine> {
    protocol: SwdProtocol<L>,
    state: DebugPortState,
    idcode: Option<IdCode>,
    powered_up: bool,
    wait_attempts: u32,
    apsel: u8,
}

impl<L: SwdLine> SwdInterface<L> {
    // Resets internal state of the SWD interface.
    fn reset_internal_state(&mut self) {
        self.state.invalidate();
        self.idcode = None;
        self.powered_up = false;
    }

    /// Creates a new SWD interface using the given [`SwdProtocol`] instance.
    pub fn new(protocol: SwdProtocol<L>) -> Self {
        Self {
            protocol,
            state: DebugPortState::default(),
            idcode: None,
            powered_up: false,
            wait_attempts: DEFAULT_WAIT_ATTEMPTS,
            apsel: 0,
        }
    }

    /// Creates a new SWD interface directly from a bit transport.
    pub fn from_line(line: L) -> Self {
        Self::new(SwdProtocol::new(line))
    }

    /// Sets the SWD speed for this interface.
    ///
    /// Can be changed at any time.  For example, if [`Self::connect()`]
    /// fails, retry with a slower speed.
    pub fn set_swd_speed(&mut self, speed: Speed) {
        trace!("Exec:  Set {speed:?}");
        self.protocol.set_speed(speed);
    }

    pub fn swd_speed(&self) -> Speed {
        self.protocol.speed()
    }

    /// Sets the total number of attempts made for each transfer while the
    /// target answers WAIT.
    pub fn set_wait_attempts(&mut self, attempts: u32) {
        self.wait_attempts = attempts.max(1);
    }

    pub fn wait_attempts(&self) -> u32 {
        self.wait_attempts
    }

    pub fn protocol(&mut self) -> &mut SwdProtocol<L> {
        &mut self.protocol
    }

    /// Returns whether the interface has connected to a target.
    pub fn is_connected(&self) -> bool {
        self.idcode.is_some()
    }

    /// The IDCODE read when last connected.
    pub fn idcode(&self) -> Option<IdCode> {
        self.idcode
    }

    pub fn is_powered_up(&self) -> bool {
        self.powered_up
    }

    /// The cached SELECT and CSW values.
    pub fn state(&self) -> DebugPortState {
        self.state
    }

    /// Switches the target to SWD and confirms the link by reading IDCODE.
    ///
    /// The switch is a line reset, the JTAG-to-SWD sequence, then another
    /// line reset and some idle cycles.  This does not power up the debug
    /// domain, see [`Self::power_up_debug_domain()`].
    ///
    /// Returns:
    /// - `Ok(IdCode)` if the target responded to the IDCODE read.
    /// - `Err(SwdError)` if it did not.
    pub fn connect(&mut self) -> Result<IdCode, SwdError> {
        trace!("Exec:  Connect");
        self.reset_internal_state();

        self.protocol.connect_sequence();

        let idcode = self.read_idcode()?;
        trace!("Value: IDCODE: {idcode}");
        self.idcode = Some(idcode);
        Ok(idcode)
    }

    /// Drops any knowledge of the target, so the next access must connect
    /// again.
    pub fn disconnect(&mut self) {
        self.reset_internal_state();
    }

    /// Performs a SWD operation to read the IDCODE register.
    pub fn read_idcode(&mut self) -> Result<IdCode, SwdError> {
        let op = SwdOp::DpRead(IdCodeRegister::ADDRESS);
        let idcode = self.do_read_op(op, true)?;

        Ok(idcode.into())
    }

    /// Write a Debug Port register
    ///
    /// Writes to SELECT update the cached SELECT value.
    ///
    /// Arguments:
    /// - `reg`: The register to write, which must implement the `DpRegister`
    ///   trait.
    /// - `value`: The value to write.
    ///
    /// ```rust,ignore
    /// use swdburner_core::arm::dp::{Abort, AbortRegister};
    /// swd_if.write_dp_register(AbortRegister, Abort::clear_all())?;
    /// ```
    pub fn write_dp_register<R>(&mut self, _reg: R, value: R::Value) -> Result<(), SwdError>
    where
        R: WritableRegister + DpRegister,
        u32: From<R::Value>,
    {
        self.write_dp_raw(R::ADDRESS, R::to_raw(value))
    }

    /// Write an Access Port register
    ///
    /// This function automatically handles setting the DP SELECT register if
    /// it is required, and reads RDBUFF afterwards so the write has completed
    /// before returning.
    ///
    /// Arguments:
    /// - `reg`: The register to write, which must implement the `ApRegister`
    ///   trait.
    /// - `value`: The value to write.
    pub fn write_ap_register<R>(&mut self, _reg: R, value: R::Value) -> Result<(), SwdError>
    where
        R: WritableRegister + ApRegister,
        u32: From<R::Value>,
    {
        self.write_ap_raw(R::ADDRESS, R::to_raw(value))
    }

    /// Read a Debug Port register.
    ///
    /// Arguments:
    /// - `reg`: The register to read, which must implement the `DpRegister`
    ///   trait.
    ///
    /// Returns:
    /// - `Ok(value)` if the register was read successfully.
    /// - `Err(SwdError)` if there was an error reading the register.
    ///
    /// ```rust,ignore
    /// use swdburner_core::arm::dp::CtrlStatRegister;
    /// let status = swd_if.read_dp_register(CtrlStatRegister)?;
    /// ```
    pub fn read_dp_register<R>(&mut self, _reg: R) -> Result<R::Value, SwdError>
    where
        R: ReadableRegister + DpRegister,
        R::Value: From<u32>,
    {
        let raw_data = self.read_dp_raw(R::ADDRESS)?;
        Ok(R::from_raw(raw_data))
    }

    /// Read an Access Port register
    ///
    /// This function automatically handles setting the DP SELECT register if
    /// it is required.  It also reads the AP read result from the DP RDBUFF
    /// register automatically.
    ///
    /// Arguments:
    /// - `reg`: The register to read, which must implement the `ApRegister`
    ///   trait.
    ///
    /// Returns:
    /// - `Ok(value)` if the register was read successfully, where `value` is
    ///   the value read from the RDBUFF register.
    /// - `Err(SwdError)` if there was an error reading the register.
    pub fn read_ap_register<R>(&mut self, _reg: R) -> Result<R::Value, SwdError>
    where
        R: ReadableRegister + ApRegister,
        R::Value: From<u32>,
    {
        let raw_data = self.read_ap_raw(R::ADDRESS)?;
        Ok(R::from_raw(raw_data))
    }

    /// Write a Debug Port register by raw address (0x0, 0x4, 0x8, 0xC).
    pub fn write_dp_raw(&mut self, addr: u8, value: u32) -> Result<(), SwdError> {
        self.do_write_op(SwdOp::DpWrite(addr), value, true)?;
        if addr == SelectRegister::ADDRESS {
            self.state.select = value;
        }
        Ok(())
    }

    /// Read a Debug Port register by raw address (0x0, 0x4, 0xC).
    pub fn read_dp_raw(&mut self, addr: u8) -> Result<u32, SwdError> {
        self.do_read_op(SwdOp::DpRead(addr), true)
    }

    /// Write an Access Port register of the current AP by raw address, then
    /// drain the write through RDBUFF.
    pub fn write_ap_raw(&mut self, addr: u8, value: u32) -> Result<(), SwdError> {
        self.check_power()?;
        self.ap_write(addr, value)?;
        self.drain()
    }

    /// Read an Access Port register of the current AP by raw address.
    pub fn read_ap_raw(&mut self, addr: u8) -> Result<u32, SwdError> {
        self.check_power()?;
        self.select_ap_bank(addr)?;

        // AP reads are posted: this returns the previous AP read's result,
        // and the result of this one appears in RDBUFF.
        let _ = self.do_read_op(SwdOp::ApRead(addr), false)?;
        self.do_read_op(SwdOp::DpRead(RdBuffRegister::ADDRESS), true)
    }

    /// Call to update the DP SELECT register, unconditionally.
    ///
    /// It is unnecessary to call this function when accessing AP registers,
    /// as those functions update SELECT themselves when required.
    pub fn update_dp_select(&mut self, select: Select) -> Result<(), SwdError> {
        self.write_dp_register(SelectRegister, select)
    }

    /// Call to read the DP CTRL/STAT register.
    pub fn read_ctrl_stat(&mut self) -> Result<CtrlStat, SwdError> {
        self.read_dp_register(CtrlStatRegister)
    }

    /// Checks CTRL/STAT for a sticky error or a write data error.
    ///
    /// Returns:
    /// - `Ok(())` if neither is set.
    /// - `Err(SwdError::DpError)` if either is set.
    pub fn check_transfer_errors(&mut self) -> Result<(), SwdError> {
        let status = self.read_ctrl_stat()?;
        if status.has_transfer_errors() {
            warn!("DP status errors detected: {}", status.error_states());
            return Err(SwdError::DpError);
        }
        Ok(())
    }

    /// Call to clear any errors on the Debug Port, by writing all of the
    /// clear bits in ABORT.
    pub fn clear_errors(&mut self) -> Result<(), SwdError> {
        trace!("Exec:  Clear errors");
        self.write_dp_register(AbortRegister, Abort::clear_all())?;
        trace!("OK:    Clear errors");
        Ok(())
    }

    /// Powers up the target's debug and system domains.
    ///
    /// Clears ABORT, selects AP 0 bank 0, requests power up and polls until
    /// both domains acknowledge.  Then enables all byte lanes and
    /// selects bank 0 again.
    ///
    /// Returns:
    /// - `Ok(())`: if the debug domain was successfully powered up.
    /// - `Err(SwdError)`: if there was an error powering up, or the target
    ///   never acknowledged the request.
    pub fn power_up_debug_domain(&mut self) -> Result<(), SwdError> {
        self.clear_errors()?;
        self.update_dp_select(Select::default())?;

        let request = CtrlStat::power_up_request();
        self.write_dp_register(CtrlStatRegister, request)?;

        let status = retry_while(
            POWER_UP_ATTEMPTS,
            |e| *e == SwdError::NotReady,
            || {
                let status = self.read_ctrl_stat()?;
                if status.is_powered_up() {
                    Ok(status)
                } else {
                    Err(SwdError::NotReady)
                }
            },
        )
        .map_err(|e| match e {
            SwdError::NotReady => {
                SwdError::OperationFailed("debug domain power up failed".to_string())
            }
            e => e,
        })?;

        let mut lanes = request;
        lanes.set_masklane(0xF);
        self.write_dp_register(CtrlStatRegister, lanes)?;
        self.update_dp_select(Select::default())?;

        debug!("OK:    Debug domain powered up {}", status.power_states());
        self.powered_up = true;

        Ok(())
    }

    /// Withdraws the power up requests, ending the debug session.  AP
    /// accesses fail with [`SwdError::NotReady`] until the next power up.
    pub fn power_down_debug_domain(&mut self) -> Result<(), SwdError> {
        self.write_dp_register(CtrlStatRegister, CtrlStat::default())?;
        self.powered_up = false;
        self.state.csw = DebugPortState::UNKNOWN;
        debug!("OK:    Debug domain powered down");
        Ok(())
    }

    /// Writes CSW, unless it already holds this value.
    pub fn set_csw(&mut self, csw: Csw) -> Result<(), SwdError> {
        let value = u32::from(csw);
        if self.state.csw == value {
            return Ok(());
        }
        self.write_ap_register(CswRegister, csw)?;
        self.state.csw = value;
        Ok(())
    }

    /// Reads a memory mapped register.
    pub fn read_register<R: MemoryMappedRegister>(&mut self, _reg: R) -> Result<R::Value, SwdError> {
        self.read_word(R::ADDRESS).map(R::Value::from)
    }

    /// Writes a memory mapped register.
    pub fn write_register<R: MemoryMappedRegister>(
        &mut self,
        _reg: R,
        value: R::Value,
    ) -> Result<(), SwdError> {
        self.write_word(R::ADDRESS, value.into())
    }

    /// Reads a 32-bit value from the target's memory at the specified address.
    ///
    /// Arguments:
    /// - `addr`: The address in the target's memory to read from.  Must be
    ///   word aligned.
    ///
    /// Returns:
    /// - `Ok(u32)`: the value read.
    /// - `Err(SwdError)`: if there was an error reading from the target.
    pub fn read_word(&mut self, addr: u32) -> Result<u32, SwdError> {
        if addr & 0x3 != 0 {
            info!("Error: Attempt to read word on non-4 byte boundary");
            return Err(SwdError::Api);
        }
        self.set_csw(Csw::for_transfer(TransferSize::Word))?;
        self.read_single(addr)
    }

    /// Writes a 32-bit value to the target's memory at the specified address.
    ///
    /// Arguments:
    /// - `addr`: The address in the target's memory to write to.  Must be
    ///   word aligned.
    /// - `data`: The value to write.
    pub fn write_word(&mut self, addr: u32, data: u32) -> Result<(), SwdError> {
        if addr & 0x3 != 0 {
            info!("Error: Attempt to write word on non-4 byte boundary");
            return Err(SwdError::Api);
        }
        self.set_csw(Csw::for_transfer(TransferSize::Word))?;
        self.write_single(addr, data)
    }

    /// Reads a byte.  The target returns it on the byte lane matching the
    /// address.
    pub fn read_byte(&mut self, addr: u32) -> Result<u8, SwdError> {
        self.set_csw(Csw::for_transfer(TransferSize::Byte))?;
        let data = self.read_single(addr)?;
        Ok((data >> ((addr & 0x3) * 8)) as u8)
    }

    /// Writes a byte, placing it on the byte lane matching the address.
    pub fn write_byte(&mut self, addr: u32, data: u8) -> Result<(), SwdError> {
        self.set_csw(Csw::for_transfer(TransferSize::Byte))?;
        self.write_single(addr, (data as u32) << ((addr & 0x3) * 8))
    }

    /// Reads a block of words from the target device.
    ///
    /// Is aware of SWD memory wrapping and handles it (at the 1KB boundary)
    ///
    /// Arguments:
    /// - `addr`: The starting address, word aligned.
    /// - `buf`: Filled with the words read.  Its length is the number of
    ///   words to read.
    pub fn read_block(&mut self, addr: u32, buf: &mut [u32]) -> Result<(), SwdError> {
        if addr & 0x3 != 0 {
            info!("Error: Attempt to read on non-4 byte boundary");
            return Err(SwdError::Api);
        }
        self.set_csw(Csw::for_transfer(TransferSize::Word))?;

        let mut remaining = buf;
        let mut current_addr = addr;
        while !remaining.is_empty() {
            let chunk_size = remaining.len().min(words_to_boundary(current_addr));
            let (chunk, rest) = remaining.split_at_mut(chunk_size);
            self.read_drw_bulk(current_addr, chunk)?;

            remaining = rest;
            current_addr = current_addr.wrapping_add((chunk_size * 4) as u32);
        }

        Ok(())
    }

    /// Writes a block of words to the target device.
    ///
    /// Is aware of SWD memory wrapping and handles it (at the 1KB boundary)
    ///
    /// Arguments:
    /// - `addr`: The starting address, word aligned.
    /// - `buf`: The words to write.
    pub fn write_block(&mut self, addr: u32, buf: &[u32]) -> Result<(), SwdError> {
        if addr & 0x3 != 0 {
            info!("Error: Attempt to write on non-4 byte boundary");
            return Err(SwdError::Api);
        }
        self.set_csw(Csw::for_transfer(TransferSize::Word))?;

        let mut remaining = buf;
        let mut current_addr = addr;
        while !remaining.is_empty() {
            let chunk_size = remaining.len().min(words_to_boundary(current_addr));
            let (chunk, rest) = remaining.split_at(chunk_size);
            self.write_drw_bulk(current_addr, chunk)?;

            remaining = rest;
            current_addr = current_addr.wrapping_add((chunk_size * 4) as u32);
        }

        Ok(())
    }

    /// Reads any number of bytes from any address.  Leading and trailing
    /// bytes off a word boundary are read singly, the rest as words.
    pub fn read_memory(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), SwdError> {
        let (head, words, tail) = split_unaligned(addr, buf.len());
        let mut current_addr = addr;

        for byte in buf[..head].iter_mut() {
            *byte = self.read_byte(current_addr)?;
            current_addr += 1;
        }

        if words > 0 {
            let mut block = vec![0u32; words];
            self.read_block(current_addr, &mut block)?;
            for (dst, word) in buf[head..head + words * 4].chunks_exact_mut(4).zip(block) {
                dst.copy_from_slice(&word.to_le_bytes());
            }
            current_addr += (words * 4) as u32;
        }

        let tail_start = head + words * 4;
        for byte in buf[tail_start..tail_start + tail].iter_mut() {
            *byte = self.read_byte(current_addr)?;
            current_addr += 1;
        }

        Ok(())
    }

    /// Writes any number of bytes to any address.  Leading and trailing
    /// bytes off a word boundary are written singly, the rest as words.
    pub fn write_memory(&mut self, addr: u32, buf: &[u8]) -> Result<(), SwdError> {
        let (head, words, tail) = split_unaligned(addr, buf.len());
        let mut current_addr = addr;

        for byte in &buf[..head] {
            self.write_byte(current_addr, *byte)?;
            current_addr += 1;
        }

        if words > 0 {
            let block: alloc::vec::Vec<u32> = buf[head..head + words * 4]
                .chunks_exact(4)
                .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
            self.write_block(current_addr, &block)?;
            current_addr += (words * 4) as u32;
        }

        let tail_start = head + words * 4;
        for byte in &buf[tail_start..tail_start + tail] {
            self.write_byte(current_addr, *byte)?;
            current_addr += 1;
        }

        Ok(())
    }
}

// Internal functions
impl<L: SwdLine> SwdInterface<L> {
    fn check_power(&self) -> Result<(), SwdError> {
        if self.powered_up {
            Ok(())
        } else {
            debug!("Error: AP access before debug domain power up");
            Err(SwdError::NotReady)
        }
    }

    fn select_ap_bank(&mut self, addr: u8) -> Result<(), SwdError> {
        let select = Select::for_ap_register(self.apsel, addr);
        if self.state.select != select.value() {
            self.update_dp_select(select)?;
        }
        Ok(())
    }

    // AP write without draining RDBUFF
    fn ap_write(&mut self, addr: u8, value: u32) -> Result<(), SwdError> {
        self.select_ap_bank(addr)?;
        self.do_write_op(SwdOp::ApWrite(addr), value, false)
    }

    // Reads RDBUFF, discarding the value, so a posted AP write completes
    fn drain(&mut self) -> Result<(), SwdError> {
        let _ = self.do_read_op(SwdOp::DpRead(RdBuffRegister::ADDRESS), true)?;
        Ok(())
    }

    // CSW must already be set
    fn read_single(&mut self, addr: u32) -> Result<u32, SwdError> {
        self.check_power()?;
        self.ap_write(TarRegister::ADDRESS, addr)?;
        let _ = self.do_read_op(SwdOp::ApRead(DrwRegister::ADDRESS), false)?;
        self.do_read_op(SwdOp::DpRead(RdBuffRegister::ADDRESS), true)
    }

    // CSW must already be set
    fn write_single(&mut self, addr: u32, data: u32) -> Result<(), SwdError> {
        self.check_power()?;
        self.ap_write(TarRegister::ADDRESS, addr)?;
        self.ap_write(DrwRegister::ADDRESS, data)?;
        self.drain()
    }

    // Reads DRW repeatedly from a TAR which must not cross a 1KB boundary.
    // The first DRW read returns stale data, and the last word comes from
    // RDBUFF.
    fn read_drw_bulk(&mut self, addr: u32, buf: &mut [u32]) -> Result<(), SwdError> {
        let count = buf.len();
        trace!("Exec:  Read DRW Bulk {count} from {addr:#010X}");
        if count == 0 {
            return Ok(());
        }

        self.check_power()?;
        self.ap_write(TarRegister::ADDRESS, addr)?;

        let drw_op = SwdOp::ApRead(DrwRegister::ADDRESS);
        let _ = self.do_read_op(drw_op, false)?;
        for item in buf.iter_mut().take(count - 1) {
            *item = self.do_read_op(drw_op, false)?;
        }
        buf[count - 1] = self.do_read_op(SwdOp::DpRead(RdBuffRegister::ADDRESS), true)?;

        Ok(())
    }

    // Writes DRW repeatedly to a TAR which must not cross a 1KB boundary,
    // then drains.
    fn write_drw_bulk(&mut self, addr: u32, buf: &[u32]) -> Result<(), SwdError> {
        let count = buf.len();
        trace!("Exec:  Write DRW Bulk {count} to {addr:#010X}");
        if count == 0 {
            return Ok(());
        }

        self.check_power()?;
        self.ap_write(TarRegister::ADDRESS, addr)?;

        let drw_op = SwdOp::ApWrite(DrwRegister::ADDRESS);
        for &value in buf {
            self.do_write_op(drw_op, value, false)?;
        }
        self.drain()
    }

    fn do_write_op(&mut self, op: SwdOp, data: u32, single: bool) -> Result<(), SwdError> {
        let cmd = op.to_cmd();
        trace!("Exec:  {op} SWD: {cmd:#04X} {data:#010X}");

        let protocol = &mut self.protocol;
        let mut attempt = 0;
        let result = retry_while(self.wait_attempts, SwdError::requires_retry, || {
            if attempt > 0 {
                trace!("Retry: {op} {attempt}");
            }
            attempt += 1;

            protocol.write_cmd_turnaround(cmd);
            protocol.read_ack()?;
            protocol.turnaround_write_u32_parity(data);

            // STM32 reference manuals say 2 extra SWCLK cycles are required
            // after a write, after the parity bit.  If we won't be sending
            // another operation soon, clock the rest of the post operation
            // cycles too.
            if single {
                protocol.idle(POST_SINGLE_OPERATION_CYCLES);
            } else {
                protocol.idle(POST_WRITE_CYCLES);
            }
            Ok(())
        });

        match &result {
            Ok(()) => trace!("OK:    {op}"),
            Err(e) => debug!("Error: {op} {data:#010X}: {e:?}"),
        }

        result
    }

    // Lowest level read operation which actually drives the SWD protocol.
    fn do_read_op(&mut self, op: SwdOp, single: bool) -> Result<u32, SwdError> {
        let cmd = op.to_cmd();
        trace!("Exec:  {op} SWD: {cmd:#04X}");

        let protocol = &mut self.protocol;
        let mut attempt = 0;
        let result = retry_while(self.wait_attempts, SwdError::requires_retry, || {
            if attempt > 0 {
                trace!("Retry: {op} {attempt}");
            }
            attempt += 1;

            protocol.write_cmd_turnaround(cmd);
            protocol.read_ack()?;
            let data = protocol.read_u32_parity_turnaround()?;

            if single {
                protocol.idle(POST_SINGLE_OPERATION_CYCLES);
            } else {
                protocol.idle(0);
            }
            Ok(data)
        });

        match &result {
            Ok(data) => trace!("OK:    {op}            {data:#010X}"),
            Err(e) => debug!("Error: {op}  {e:?}"),
        }

        result
    }
}

// Words from addr up to the next 1KB auto-increment boundary
fn words_to_boundary(addr: u32) -> usize {
    let boundary_offset = SWD_MEMORY_BOUNDARY - (addr & (SWD_MEMORY_BOUNDARY - 1));
    (boundary_offset / 4) as usize
}

// Splits an access into (leading bytes, whole words, trailing bytes)
fn split_unaligned(addr: u32, len: usize) -> (usize, usize, usize) {
    let head = (((4 - (addr & 0x3)) & 0x3) as usize).min(len);
    let words = (len - head) / 4;
    let tail = len - head - words * 4;
    (head, words, tail)
}

/// SWD Operations
///
/// Each operation contains the register address as a u8 (0x0, 0x4, etc).
///
/// SWD command format
/// Bit 0: Start (1)
/// Bit 1: APnDP (0=DP, 1=AP)
/// Bit 2: RnW (0=write, 1=read)
/// Bit 3: A2 (address bit 2)
/// Bit 4: A3 (address bit 3)
/// Bit 5: Parity
/// Bit 6: Stop (0)
/// Bit 7: Park (1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwdOp {
    DpRead(u8),
    DpWrite(u8),
    ApRead(u8),
    ApWrite(u8),
}

impl SwdOp {
    #[allow(clippy::wrong_self_convention)]
    pub fn to_cmd(&self) -> u8 {
        let (base, addr) = match self {
            // start=1, APnDP=0, RnW=1, park=1
            SwdOp::DpRead(a) => (0x85, a),
            // start=1, APnDP=0, RnW=0, park=1
            SwdOp::DpWrite(a) => (0x81, a),
            // start=1, APnDP=1, RnW=1, park=1
            SwdOp::ApRead(a) => (0x87, a),
            // start=1, APnDP=1, RnW=0, park=1
            SwdOp::ApWrite(a) => (0x83, a),
        };

        let cmd = base | ((addr & 0x0C) << 1); // A[3:2] to bits 4:3
        Self::add_parity(cmd)
    }

    fn add_parity(cmd: u8) -> u8 {
        // Parity is calculated using APnDP, RnW and A[2:3]
        let parity_bits = cmd & 0x1E;
        let parity = calculate_parity(parity_bits) as u8;
        cmd | (parity << 5)
    }
}

impl fmt::Display for SwdOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwdOp::DpRead(a) => write!(f, "DP Read 0x{a:02X}"),
            SwdOp::DpWrite(a) => write!(f, "DP Write 0x{a:02X}"),
            SwdOp::ApRead(a) => write!(f, "AP Read 0x{a:02X}"),
            SwdOp::ApWrite(a) => write!(f, "AP Write 0x{a:02X}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTarget;

    fn powered(target: &mut MockTarget) -> SwdInterface<&mut MockTarget> {
        let mut swd = SwdInterface::from_line(target);
        swd.connect().unwrap();
        swd.power_up_debug_domain().unwrap();
        swd
    }

    #[test]
    fn request_headers() {
        // Well known values
        assert_eq!(SwdOp::DpRead(0x0).to_cmd(), 0xA5);
        assert_eq!(SwdOp::DpWrite(0x4).to_cmd(), 0xA9);
        assert_eq!(SwdOp::DpWrite(0x8).to_cmd(), 0xB1);
        assert_eq!(SwdOp::DpRead(0xC).to_cmd(), 0xBD);
        assert_eq!(SwdOp::ApWrite(0x4).to_cmd(), 0x8B);
        assert_eq!(SwdOp::ApRead(0xC).to_cmd(), 0x9F);
    }

    #[test]
    fn unaligned_split() {
        assert_eq!(split_unaligned(0x2000_0001, 10), (3, 1, 3));
        assert_eq!(split_unaligned(0x2000_0000, 8), (0, 2, 0));
        assert_eq!(split_unaligned(0x2000_0003, 1), (1, 0, 0));
        assert_eq!(split_unaligned(0x2000_0002, 1), (1, 0, 0));
        assert_eq!(words_to_boundary(0x2000_03F8), 2);
        assert_eq!(words_to_boundary(0x2000_0400), 256);
    }

    #[test]
    fn dp_registers_round_trip_both_parities() {
        let mut target = MockTarget::new();
        {
            let mut swd = SwdInterface::from_line(&mut target);
            swd.connect().unwrap();

            // Even then odd data parity
            for value in [0x0000_0F00, 0x0000_0700] {
                swd.write_dp_register(CtrlStatRegister, CtrlStat::from(value))
                    .unwrap();
                let read = swd.read_dp_register(CtrlStatRegister).unwrap();
                assert_eq!(u32::from(read), value);
            }

            for value in [0x0000_00F0, 0x0100_00F0] {
                swd.write_dp_register(SelectRegister, Select::from(value))
                    .unwrap();
                assert_eq!(swd.state().select(), Some(Select::from(value)));
            }
            assert_eq!(swd.read_dp_register(IdCodeRegister).unwrap().data(), MockTarget::IDCODE);
        }
        assert_eq!(target.selected(), 0x0100_00F0);
        assert_eq!(target.select_writes, 2);
        // No write parity error was flagged
        assert_eq!(target.ctrl_stat & (1 << 7), 0);
    }

    #[test]
    fn connect_reads_idcode() {
        let mut target = MockTarget::new();
        let mut swd = SwdInterface::from_line(&mut target);
        let idcode = swd.connect().unwrap();
        assert_eq!(idcode.data(), MockTarget::IDCODE);
        assert!(swd.is_connected());
        assert_eq!(swd.state(), DebugPortState::default());
        assert_eq!(target.line_resets, 2);
    }

    #[test]
    fn ap_access_before_power_up() {
        let mut target = MockTarget::new();
        let mut swd = SwdInterface::from_line(&mut target);
        swd.connect().unwrap();
        assert_eq!(swd.read_word(0x2000_0000), Err(SwdError::NotReady));
    }

    #[test]
    fn power_up_acknowledged() {
        let mut target = MockTarget::new();
        let swd = powered(&mut target);
        assert!(swd.is_powered_up());
        assert_eq!(swd.state().select(), Some(Select::default()));
        assert!(target.ctrl_stat & 0xF00 == 0xF00);
    }

    #[test]
    fn power_up_never_acknowledged() {
        let mut target = MockTarget::new();
        target.power_ack = false;
        let mut swd = SwdInterface::from_line(&mut target);
        swd.connect().unwrap();
        assert!(matches!(
            swd.power_up_debug_domain(),
            Err(SwdError::OperationFailed(_))
        ));
        assert!(!swd.is_powered_up());
    }

    #[test]
    fn dp_write_read_round_trip() {
        let mut target = MockTarget::new();
        let mut swd = powered(&mut target);
        for value in [0u32, 1, 0x8000_0000, 0x5555_AAAA, 0xFFFF_FFFE, 0x1234_5678] {
            swd.write_word(0x2000_0100, value).unwrap();
            assert_eq!(swd.read_word(0x2000_0100).unwrap(), value);
        }
    }

    #[test]
    fn corrupted_read_is_parity_error() {
        let mut target = MockTarget::new();
        let mut swd = powered(&mut target);
        swd.write_word(0x2000_0000, 0xCAFE_F00D).unwrap();
        swd.protocol().line().corrupt_next_read = true;
        assert_eq!(swd.read_dp_raw(0x0), Err(SwdError::ReadParity));
        assert_eq!(swd.read_dp_raw(0x0).unwrap(), MockTarget::IDCODE);
    }

    #[test]
    fn wait_retry_is_bounded() {
        let mut target = MockTarget::new();
        let mut swd = SwdInterface::from_line(&mut target);
        swd.connect().unwrap();
        swd.protocol().line().always_wait = true;
        let before = swd.protocol().line().requests.len();
        assert_eq!(swd.read_idcode(), Err(SwdError::WaitAck));
        let after = swd.protocol().line().requests.len();
        assert_eq!(after - before, DEFAULT_WAIT_ATTEMPTS as usize);
    }

    #[test]
    fn wait_then_ok() {
        let mut target = MockTarget::new();
        let mut swd = SwdInterface::from_line(&mut target);
        swd.connect().unwrap();
        swd.protocol().line().wait_count = 3;
        assert_eq!(swd.read_idcode().unwrap().data(), MockTarget::IDCODE);
    }

    #[test]
    fn fault_is_not_retried() {
        let mut target = MockTarget::new();
        let mut swd = SwdInterface::from_line(&mut target);
        swd.connect().unwrap();
        swd.protocol().line().always_fault = true;
        let before = swd.protocol().line().requests.len();
        assert_eq!(swd.read_idcode(), Err(SwdError::FaultAck));
        assert_eq!(swd.protocol().line().requests.len() - before, 1);
    }

    #[test]
    fn no_target_is_no_ack() {
        let mut target = MockTarget::new();
        target.detached = true;
        let mut swd = SwdInterface::from_line(&mut target);
        assert_eq!(swd.connect(), Err(SwdError::NoAck(7)));
        assert!(!swd.is_connected());
    }

    #[test]
    fn csw_and_select_writes_are_elided() {
        let mut target = MockTarget::new();
        let mut swd = powered(&mut target);
        swd.write_word(0x2000_0000, 1).unwrap();
        let csw_writes = swd.protocol().line().csw_writes;
        let select_writes = swd.protocol().line().select_writes;
        swd.write_word(0x2000_0004, 2).unwrap();
        swd.read_word(0x2000_0004).unwrap();
        assert_eq!(swd.protocol().line().csw_writes, csw_writes);
        assert_eq!(swd.protocol().line().select_writes, select_writes);

        swd.write_byte(0x2000_0009, 0xAB).unwrap();
        assert_eq!(swd.protocol().line().csw_writes, csw_writes + 1);
    }

    #[test]
    fn ap_writes_are_drained() {
        let mut target = MockTarget::new();
        let mut swd = powered(&mut target);
        swd.write_word(0x2000_0000, 0x1111_2222).unwrap();
        let requests = &swd.protocol().line().requests;
        let last = requests.last().copied().unwrap();
        assert_eq!(last, SwdOp::DpRead(RdBuffRegister::ADDRESS).to_cmd());
    }

    #[test]
    fn byte_lanes() {
        let mut target = MockTarget::new();
        let mut swd = powered(&mut target);
        swd.write_word(0x2000_0010, 0x4433_2211).unwrap();
        assert_eq!(swd.read_byte(0x2000_0010).unwrap(), 0x11);
        assert_eq!(swd.read_byte(0x2000_0013).unwrap(), 0x44);
        swd.write_byte(0x2000_0012, 0xEE).unwrap();
        assert_eq!(swd.read_word(0x2000_0010).unwrap(), 0x44EE_2211);
    }

    #[test]
    fn block_across_auto_increment_boundary() {
        let mut target = MockTarget::new();
        let mut swd = powered(&mut target);
        let data: Vec<u32> = (0..300).map(|i| 0xA000_0000 | i).collect();
        swd.write_block(0x2000_03F0, &data).unwrap();

        let mut readback = vec![0u32; 300];
        swd.read_block(0x2000_03F0, &mut readback).unwrap();
        assert_eq!(readback, data);
        assert_eq!(target.peek_word(0x2000_0400), 0xA000_0004);
    }

    #[test]
    fn unaligned_memory() {
        let mut target = MockTarget::new();
        let mut swd = powered(&mut target);
        let data: Vec<u8> = (1..=11).collect();
        swd.write_memory(0x2000_0102, &data).unwrap();

        let mut readback = [0u8; 11];
        swd.read_memory(0x2000_0102, &mut readback).unwrap();
        assert_eq!(&readback[..], &data[..]);
        assert_eq!(target.peek_byte(0x2000_0101), 0);
        assert_eq!(target.peek_word(0x2000_0104), 0x0605_0403);
        assert_eq!(target.peek_byte(0x2000_010C), 11);
        assert_eq!(target.peek_byte(0x2000_010D), 0);
    }

    #[test]
    fn unaligned_word_is_api_error() {
        let mut target = MockTarget::new();
        let mut swd = powered(&mut target);
        assert_eq!(swd.read_word(0x2000_0002), Err(SwdError::Api));
        assert_eq!(swd.write_block(0x2000_0001, &[0]), Err(SwdError::Api));
    }

    #[test]
    fn reconnect_invalidates_cache() {
        let mut target = MockTarget::new();
        let mut swd = powered(&mut target);
        swd.write_word(0x2000_0000, 1).unwrap();
        assert!(swd.state().csw().is_some());
        swd.connect().unwrap();
        assert_eq!(swd.state().csw(), None);
        assert_eq!(swd.state().select(), None);
    }
}
