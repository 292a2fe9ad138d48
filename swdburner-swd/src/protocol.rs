// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ARM SWD Wire Protocol Implementation
//!
//! This module implements the SWD wire protocol on top of an [`SwdLine`].
//! It provides [`SwdProtocol`] for the phases of a single transfer, plus the
//! line reset and JTAG-to-SWD switch sequences.  Transfers are sequenced,
//! and WAITs retried, by [`crate::SwdInterface`].

use core::result::Result;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::SwdError;
use crate::line::{Direction, Speed, SwdLine};

// JTAG-to-SWD sequence as documented: 0111100111100111
const JTAG_TO_SWD_DOCUMENTED: u16 = 0b0111100111100111; // 0x79E7

// Reversed for SWD LSB-first transmission
const JTAG_TO_SWD_SEQUENCE: u16 = JTAG_TO_SWD_DOCUMENTED.reverse_bits(); // 0xE79E

// 50+ clock cycles with SWDIO high
const LINE_RESET_SWDIO_HIGH_CYCLES: usize = 51;

// Idle cycles with SWDIO low after the line reset that follows JTAG-to-SWD
const POST_RESET_IDLE_CYCLES: usize = 8;

// Minimum 8 clocks after a single operation
pub(crate) const POST_SINGLE_OPERATION_CYCLES: usize = 8;

// Extra clocks STM32 parts need after a write's parity bit
pub(crate) const POST_WRITE_CYCLES: usize = 2;

const DEFAULT_TURNAROUND_CYCLES: u32 = 1;

/// SWD Protocol object
///
/// This is used by [`crate::SwdInterface`] to communicate with the target.
/// It is not expected to be used directly by applications.
///
/// ```rust,ignore
/// use swdburner_swd::{SwdInterface, SwdProtocol};
///
/// let protocol = SwdProtocol::new(line);
/// let mut swd_if = SwdInterface::new(protocol);
/// ```
#[derive(Debug)]
pub struct SwdProtocol<L: SwdLine> {
    line: L,
    speed: Speed,
    turnaround_cycles: u32,
}

impl<L: SwdLine> SwdProtocol<L> {
    /// Create a new SWD protocol instance.
    ///
    /// Arguments:
    /// - `line`: The bit transport to drive.
    ///
    /// Returns:
    /// - A new `SwdProtocol` instance, with SWDIO released.
    pub fn new(mut line: L) -> Self {
        // Start SWDIO as input.  The target only drives it after the
        // JTAG-to-SWD sequence.
        line.set_direction(Direction::Input);
        debug!("SWD protocol created, SWDIO input");

        Self {
            line,
            speed: Speed::default(),
            turnaround_cycles: DEFAULT_TURNAROUND_CYCLES,
        }
    }

    pub fn speed(&self) -> Speed {
        self.speed
    }

    pub fn set_speed(&mut self, speed: Speed) {
        self.speed = speed;
        self.line.set_speed(speed);
        debug!("SWD speed set to {speed:?}");
    }

    /// Number of clocks in each turnaround period.  Must match the DP's
    /// DLCR.TURNROUND setting, which resets to 1.
    pub fn set_turnaround_cycles(&mut self, cycles: u32) {
        self.turnaround_cycles = cycles.max(1);
    }

    pub fn turnaround_cycles(&self) -> u32 {
        self.turnaround_cycles
    }

    pub fn line(&mut self) -> &mut L {
        &mut self.line
    }

    pub fn into_line(self) -> L {
        self.line
    }

    #[inline]
    pub(crate) fn set_swdio_output(&mut self) {
        self.line.set_direction(Direction::Output);
    }

    #[inline]
    pub(crate) fn set_swdio_input(&mut self) {
        self.line.set_direction(Direction::Input);
    }

    #[inline]
    pub(crate) fn set_swdio_low(&mut self) {
        self.line.set_data(false);
    }

    #[inline]
    pub(crate) fn set_swdio_high(&mut self) {
        self.line.set_data(true);
    }

    #[inline]
    fn turnaround(&mut self) {
        for _ in 0..self.turnaround_cycles {
            self.line.clock_pulse();
        }
    }

    #[inline]
    fn turnaround_to_output(&mut self) {
        self.turnaround();
        self.set_swdio_low();
        self.set_swdio_output();
    }

    /// Sends the 8 bit request header, then releases SWDIO for the
    /// turnaround ahead of the acknowledge.
    pub(crate) fn write_cmd_turnaround(&mut self, cmd: u8) {
        self.set_swdio_output();
        self.write_bits(8, cmd as u64);

        self.set_swdio_input();
        self.turnaround();
    }

    /// Read the ACK response from the target.  All three bits are always
    /// clocked, whatever their value.  If the ACK is WAIT or FAULT this also
    /// performs the turnaround back to output.
    pub(crate) fn read_ack(&mut self) -> Result<(), SwdError> {
        let mut ack = 0u8;
        for ii in 0..3 {
            if self.line.read_bit() {
                ack |= 1 << ii;
            }
        }
        let result = SwdError::from_ack(ack);

        match &result {
            Ok(_) => (),
            Err(SwdError::WaitAck) | Err(SwdError::FaultAck) => {
                trace!("ACK error - turnaround: {result:?}");
                self.turnaround_to_output();
            }
            Err(e) => {
                // Nothing is driving the line, so the data phase never
                // starts.  Clock out the rest of what would have been the
                // transfer so the target, if any, resynchronises.
                trace!("ACK error - no turnaround: {e:?}");
                self.turnaround_to_output();
            }
        }

        result
    }

    /// Reads 32 data bits and the parity bit, then turns the line around.
    /// The turnaround happens even if parity fails, as the target doesn't
    /// know there's been an error.
    pub(crate) fn read_u32_parity_turnaround(&mut self) -> Result<u32, SwdError> {
        let mut data = 0u32;
        for ii in 0..32 {
            if self.line.read_bit() {
                data |= 1 << ii;
            }
        }

        let parity = self.line.read_bit();
        self.turnaround_to_output();

        if calculate_parity(data) != parity {
            debug!("SWD read parity error: data=0x{data:08X}, parity={parity}");
            return Err(SwdError::ReadParity);
        }

        Ok(data)
    }

    /// Turns the line around after an OK ack, then writes 32 data bits and
    /// the parity bit.
    pub(crate) fn turnaround_write_u32_parity(&mut self, data: u32) {
        self.turnaround_to_output();
        self.write_u32_parity(data);
    }

    #[inline]
    pub(crate) fn write_u32_parity(&mut self, data: u32) {
        let data: u64 = if calculate_parity(data) {
            data as u64 | (1 << 32)
        } else {
            data as u64
        };

        self.write_bits(33, data);
    }

    /// Clocks `cycles` idle cycles with SWDIO low, then leaves SWDIO driven
    /// high.
    pub(crate) fn idle(&mut self, cycles: usize) {
        self.set_swdio_output();
        self.write_bits(cycles, 0);
        self.set_swdio_high();
    }

    #[inline]
    pub(crate) fn write_bits(&mut self, count: usize, data: u64) {
        trace!("Info:  Writing {count} bits: 0x{data:0X}");
        let mut data = data;
        for _ in 0..count {
            self.line.write_bit(data & 1 == 1);
            data >>= 1;
        }
    }

    // 50+ clock cycles with SWDIO high
    pub(crate) fn line_reset(&mut self) {
        self.set_swdio_output();
        for _ in 0..LINE_RESET_SWDIO_HIGH_CYCLES {
            self.line.write_bit(true);
        }
    }

    pub(crate) fn jtag_to_swd_sequence(&mut self) {
        self.set_swdio_output();
        self.write_bits(16, JTAG_TO_SWD_SEQUENCE as u64);
    }

    /// The full switch to SWD: line reset, JTAG-to-SWD, line reset, idle.
    /// Follow with an IDCODE read.
    pub(crate) fn connect_sequence(&mut self) {
        trace!("Exec:  SWD connect sequence");
        self.line_reset();
        self.jtag_to_swd_sequence();
        self.line_reset();
        self.idle(POST_RESET_IDLE_CYCLES);
    }

    pub(crate) fn delay_ms(&mut self, ms: u32) {
        self.line.delay_ms(ms);
    }

    pub(crate) fn set_reset(&mut self, asserted: bool) -> bool {
        self.line.set_reset(asserted)
    }
}

/// Calculate SWD parity - 1 for an odd number of bits set to 1, 0 otherwise.
pub(crate) fn calculate_parity<T>(value: T) -> bool
where
    T: Into<u64>,
{
    (value.into().count_ones() % 2) == 1
}
