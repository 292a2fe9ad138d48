// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Simulated SWD lines for tests.
//!
//! [`RecordingLine`] just records what the protocol layer does to the lines.
//! [`MockTarget`] decodes the host's bits into requests and answers them
//! like a Cortex-M DP with a single MEM-AP, including enough of the System
//! Control Space to halt, reset, and run flash algorithm syscalls.

use std::collections::{BTreeMap, VecDeque};

use crate::line::{Direction, SwdLine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEvent {
    Direction(Direction),
    Data(bool),
    Write(bool),
    Read,
    Pulse,
    Delay(u32),
    Reset(bool),
}

#[derive(Debug, Default)]
pub struct RecordingLine {
    pub events: Vec<LineEvent>,
    reads: VecDeque<bool>,
}

impl RecordingLine {
    pub fn with_reads(reads: &[bool]) -> Self {
        Self {
            events: Vec::new(),
            reads: reads.iter().copied().collect(),
        }
    }

    pub fn written_bits(&self) -> Vec<bool> {
        self.events
            .iter()
            .filter_map(|e| match e {
                LineEvent::Write(bit) => Some(*bit),
                _ => None,
            })
            .collect()
    }
}

impl SwdLine for RecordingLine {
    fn set_direction(&mut self, direction: Direction) {
        self.events.push(LineEvent::Direction(direction));
    }

    fn set_data(&mut self, high: bool) {
        self.events.push(LineEvent::Data(high));
    }

    fn write_bit(&mut self, bit: bool) {
        self.events.push(LineEvent::Write(bit));
    }

    fn read_bit(&mut self) -> bool {
        self.events.push(LineEvent::Read);
        self.reads.pop_front().unwrap_or(false)
    }

    fn clock_pulse(&mut self) {
        self.events.push(LineEvent::Pulse);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.events.push(LineEvent::Delay(ms));
    }

    fn set_reset(&mut self, asserted: bool) -> bool {
        self.events.push(LineEvent::Reset(asserted));
        true
    }
}

/// A call into target code, captured when the core was resumed with a
/// freshly written PC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Syscall {
    pub pc: u32,
    pub args: [u32; 4],
    pub sp: u32,
    pub lr: u32,
    pub r9: u32,
    pub xpsr: u32,
}

type SyscallHandler = Box<dyn FnMut(&Syscall, &BTreeMap<u32, u8>) -> u32>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Request {
    DpRead(u8),
    DpWrite(u8),
    ApRead(u8),
    ApWrite(u8),
}

const DHCSR: u32 = 0xE000_EDF0;
const DCRSR: u32 = 0xE000_EDF4;
const DCRDR: u32 = 0xE000_EDF8;
const DEMCR: u32 = 0xE000_EDFC;
const AIRCR: u32 = 0xE000_ED0C;
const CPUID: u32 = 0xE000_ED00;
const DBGMCU_IDCODE: u32 = 0xE004_2000;

const DBGKEY: u32 = 0xA05F_0000;
const RESET_VECTOR: u32 = 0x0800_0145;

pub struct MockTarget {
    // Knobs
    pub detached: bool,
    pub always_wait: bool,
    pub wait_count: u32,
    pub always_fault: bool,
    pub corrupt_next_read: bool,
    pub power_ack: bool,
    pub has_reset_line: bool,
    pub never_halt: bool,
    pub cpuid: u32,
    pub dbgmcu: u32,
    syscall_handler: Option<SyscallHandler>,

    // Observations
    pub requests: Vec<u8>,
    pub line_resets: u32,
    pub select_writes: u32,
    pub csw_writes: u32,
    pub abort_writes: u32,
    pub syscalls: Vec<Syscall>,
    pub core_resets: u32,
    pub reset_asserts: u32,
    pub elapsed_ms: u64,

    // DP and MEM-AP
    pub ctrl_stat: u32,
    select: u32,
    rdbuff: u32,
    csw: u32,
    tar: u32,

    // Core
    pub regs: [u32; 17],
    pub halted: bool,
    pub debug_enabled: bool,
    pub demcr: u32,
    dcrdr: u32,
    pc_written: bool,
    reset_st: bool,
    in_reset: bool,

    memory: BTreeMap<u32, u8>,

    // Bit level state
    bits_since_header: Vec<bool>,
    ones: u32,
    pending_reads: VecDeque<bool>,
    collecting: Option<(u8, Vec<bool>)>,
}

impl MockTarget {
    pub const IDCODE: u32 = 0x1BA0_1477;

    pub fn new() -> Self {
        Self {
            detached: false,
            always_wait: false,
            wait_count: 0,
            always_fault: false,
            corrupt_next_read: false,
            power_ack: true,
            has_reset_line: true,
            never_halt: false,
            cpuid: 0x411F_C231,
            dbgmcu: 0x2003_6410,
            syscall_handler: None,

            requests: Vec::new(),
            line_resets: 0,
            select_writes: 0,
            csw_writes: 0,
            abort_writes: 0,
            syscalls: Vec::new(),
            core_resets: 0,
            reset_asserts: 0,
            elapsed_ms: 0,

            ctrl_stat: 0,
            select: 0,
            rdbuff: 0,
            csw: 0,
            tar: 0,

            regs: [0; 17],
            halted: false,
            debug_enabled: false,
            demcr: 0,
            dcrdr: 0,
            pc_written: false,
            reset_st: false,
            in_reset: false,

            memory: BTreeMap::new(),

            bits_since_header: Vec::new(),
            ones: 0,
            pending_reads: VecDeque::new(),
            collecting: None,
        }
    }

    /// Computes R0 for each call into target code.  Without a handler every
    /// call returns 0.
    pub fn on_syscall(&mut self, handler: impl FnMut(&Syscall, &BTreeMap<u32, u8>) -> u32 + 'static) {
        self.syscall_handler = Some(Box::new(handler));
    }

    /// Last value written to DP SELECT.
    pub fn selected(&self) -> u32 {
        self.select
    }

    pub fn peek_byte(&self, addr: u32) -> u8 {
        self.memory.get(&addr).copied().unwrap_or(0)
    }

    pub fn peek_word(&self, addr: u32) -> u32 {
        u32::from_le_bytes([
            self.peek_byte(addr),
            self.peek_byte(addr + 1),
            self.peek_byte(addr + 2),
            self.peek_byte(addr + 3),
        ])
    }

    pub fn peek_bytes(&self, addr: u32, len: usize) -> Vec<u8> {
        (0..len as u32).map(|i| self.peek_byte(addr + i)).collect()
    }

    pub fn poke_bytes(&mut self, addr: u32, data: &[u8]) {
        for (i, b) in data.iter().enumerate() {
            self.memory.insert(addr + i as u32, *b);
        }
    }

    pub fn poke_word(&mut self, addr: u32, value: u32) {
        self.poke_bytes(addr, &value.to_le_bytes());
    }

    fn decode_header(bits: &[bool]) -> Option<(u8, Request)> {
        let cmd = bits
            .iter()
            .enumerate()
            .fold(0u8, |acc, (i, b)| acc | ((*b as u8) << i));
        let start = cmd & 0x01 != 0;
        let stop = cmd & 0x40 != 0;
        let park = cmd & 0x80 != 0;
        let parity = (cmd >> 5) & 1;
        if !start || stop || !park || ((cmd & 0x1E).count_ones() as u8 & 1) != parity {
            return None;
        }
        let addr = (cmd >> 1) & 0x0C;
        let request = match (cmd & 0x02 != 0, cmd & 0x04 != 0) {
            (false, true) => Request::DpRead(addr),
            (false, false) => Request::DpWrite(addr),
            (true, true) => Request::ApRead(addr),
            (true, false) => Request::ApWrite(addr),
        };
        Some((cmd, request))
    }

    fn queue_ack(&mut self, ack: u8) {
        for i in 0..3 {
            self.pending_reads.push_back(ack & (1 << i) != 0);
        }
    }

    fn start_request(&mut self) {
        self.pending_reads.clear();
        if self.bits_since_header.len() < 8 {
            self.bits_since_header.clear();
            return;
        }
        let header = self.bits_since_header.split_off(self.bits_since_header.len() - 8);
        self.bits_since_header.clear();

        let Some((cmd, request)) = Self::decode_header(&header) else {
            return;
        };
        self.requests.push(cmd);

        if self.detached {
            return;
        }
        if self.always_fault {
            self.queue_ack(4);
            return;
        }
        if self.always_wait || self.wait_count > 0 {
            self.wait_count = self.wait_count.saturating_sub(1);
            self.queue_ack(2);
            return;
        }

        self.queue_ack(1);
        match request {
            Request::DpRead(addr) => {
                let value = self.dp_read(addr);
                self.queue_data(value);
            }
            Request::ApRead(addr) => {
                let value = self.ap_read(addr);
                self.queue_data(value);
            }
            Request::DpWrite(_) | Request::ApWrite(_) => {
                self.collecting = Some((cmd, Vec::with_capacity(33)));
            }
        }
    }

    fn queue_data(&mut self, value: u32) {
        for i in 0..32 {
            self.pending_reads.push_back(value & (1 << i) != 0);
        }
        let mut parity = value.count_ones() % 2 == 1;
        if self.corrupt_next_read {
            self.corrupt_next_read = false;
            parity = !parity;
        }
        self.pending_reads.push_back(parity);
    }

    fn finish_write(&mut self, cmd: u8, bits: Vec<bool>) {
        let value = bits[..32]
            .iter()
            .enumerate()
            .fold(0u32, |acc, (i, b)| acc | ((*b as u32) << i));
        if (value.count_ones() % 2 == 1) != bits[32] {
            self.ctrl_stat |= 1 << 7;
            return;
        }
        match Self::decode_header(&(0..8).map(|i| cmd & (1 << i) != 0).collect::<Vec<_>>()) {
            Some((_, Request::DpWrite(addr))) => self.dp_write(addr, value),
            Some((_, Request::ApWrite(addr))) => self.ap_write(addr, value),
            _ => (),
        }
    }

    fn dp_read(&mut self, addr: u8) -> u32 {
        match addr {
            0x0 => Self::IDCODE,
            0x4 => {
                let mut value = self.ctrl_stat;
                if self.power_ack {
                    value |= (self.ctrl_stat & (1 << 28)) << 1;
                    value |= (self.ctrl_stat & (1 << 30)) << 1;
                }
                value
            }
            _ => self.rdbuff,
        }
    }

    fn dp_write(&mut self, addr: u8, value: u32) {
        match addr {
            0x0 => {
                self.abort_writes += 1;
                if value & (1 << 2) != 0 {
                    self.ctrl_stat &= !(1 << 5);
                }
                if value & (1 << 3) != 0 {
                    self.ctrl_stat &= !(1 << 7);
                }
            }
            0x4 => self.ctrl_stat = value & !((1 << 29) | (1 << 31)),
            0x8 => {
                self.select_writes += 1;
                self.select = value;
            }
            _ => (),
        }
    }

    fn ap_register(&self, addr: u8) -> u8 {
        (((self.select >> 4) & 0xF) as u8) << 4 | addr
    }

    fn ap_read(&mut self, addr: u8) -> u32 {
        let previous = self.rdbuff;
        self.rdbuff = match self.ap_register(addr) {
            0x00 => self.csw,
            0x04 => self.tar,
            0x0C => {
                let value = self.mem_read(self.tar);
                self.increment_tar();
                value
            }
            0xFC => 0x2477_0011,
            _ => 0,
        };
        previous
    }

    fn ap_write(&mut self, addr: u8, value: u32) {
        match self.ap_register(addr) {
            0x00 => {
                self.csw_writes += 1;
                self.csw = value;
            }
            0x04 => self.tar = value,
            0x0C => {
                self.mem_write(self.tar, value);
                self.increment_tar();
            }
            _ => (),
        }
    }

    fn transfer_bytes(&self) -> u32 {
        match self.csw & 0x7 {
            0 => 1,
            1 => 2,
            _ => 4,
        }
    }

    fn increment_tar(&mut self) {
        if (self.csw >> 4) & 0x3 == 0b01 {
            let next = self.tar.wrapping_add(self.transfer_bytes());
            self.tar = (self.tar & !0x3FF) | (next & 0x3FF);
        }
    }

    fn mem_read(&mut self, addr: u32) -> u32 {
        let size = self.transfer_bytes();
        if size == 1 {
            let lane = (addr & 0x3) * 8;
            return (self.peek_byte(addr) as u32) << lane;
        }
        let addr = addr & !0x3;
        match addr {
            DHCSR => {
                let mut value = 0;
                if self.debug_enabled {
                    value |= 1;
                }
                if self.halted {
                    value |= (1 << 1) | (1 << 17);
                }
                value |= 1 << 16;
                if self.reset_st {
                    value |= 1 << 25;
                    self.reset_st = false;
                }
                value
            }
            DCRDR => self.dcrdr,
            DEMCR => self.demcr,
            AIRCR => 0xFA05_0000,
            CPUID => self.cpuid,
            DBGMCU_IDCODE => self.dbgmcu,
            _ => self.peek_word(addr),
        }
    }

    fn mem_write(&mut self, addr: u32, value: u32) {
        let size = self.transfer_bytes();
        if size == 1 {
            let lane = (addr & 0x3) * 8;
            self.memory.insert(addr, (value >> lane) as u8);
            return;
        }
        let addr = addr & !0x3;
        match addr {
            DHCSR => self.write_dhcsr(value),
            DCRSR => {
                let reg = (value & 0x7F) as usize;
                if reg < self.regs.len() {
                    if value & (1 << 16) != 0 {
                        self.regs[reg] = self.dcrdr;
                        if reg == 15 {
                            self.pc_written = true;
                        }
                    } else {
                        self.dcrdr = self.regs[reg];
                    }
                }
            }
            DCRDR => self.dcrdr = value,
            DEMCR => self.demcr = value,
            AIRCR => {
                if value & 0xFFFF_0000 == 0x05FA_0000 && value & (1 << 2) != 0 {
                    self.core_reset();
                }
            }
            _ => self.poke_word(addr, value),
        }
    }

    fn write_dhcsr(&mut self, value: u32) {
        if value & 0xFFFF_0000 != DBGKEY {
            return;
        }
        self.debug_enabled = value & 1 != 0;
        let halt = value & (1 << 1) != 0;

        if self.debug_enabled && halt {
            if !self.halted {
                self.pc_written = false;
            }
            self.halted = true;
        } else if self.halted {
            if self.debug_enabled && self.pc_written {
                self.run_syscall();
            } else {
                self.halted = false;
            }
        }
    }

    fn run_syscall(&mut self) {
        let call = Syscall {
            pc: self.regs[15],
            args: [self.regs[0], self.regs[1], self.regs[2], self.regs[3]],
            sp: self.regs[13],
            lr: self.regs[14],
            r9: self.regs[9],
            xpsr: self.regs[16],
        };
        let result = match self.syscall_handler.as_mut() {
            Some(handler) => handler(&call, &self.memory),
            None => 0,
        };
        self.syscalls.push(call);
        self.pc_written = false;
        self.regs[0] = result;
        if self.never_halt {
            self.halted = false;
        } else {
            self.regs[15] = self.regs[14] & !1;
            self.halted = true;
        }
    }

    fn core_reset(&mut self) {
        self.core_resets += 1;
        self.reset_st = true;
        self.pc_written = false;
        self.regs = [0; 17];
        self.regs[15] = RESET_VECTOR;
        self.halted = self.debug_enabled && self.demcr & 1 != 0;
    }
}

impl Default for MockTarget {
    fn default() -> Self {
        Self::new()
    }
}

impl SwdLine for MockTarget {
    fn set_direction(&mut self, direction: Direction) {
        if direction == Direction::Input && self.collecting.is_none() {
            self.start_request();
        }
    }

    fn set_data(&mut self, _high: bool) {}

    fn write_bit(&mut self, bit: bool) {
        if let Some((cmd, mut bits)) = self.collecting.take() {
            bits.push(bit);
            if bits.len() == 33 {
                self.finish_write(cmd, bits);
            } else {
                self.collecting = Some((cmd, bits));
            }
            return;
        }

        if bit {
            self.ones += 1;
            if self.ones == 50 {
                self.line_resets += 1;
                self.pending_reads.clear();
            }
        } else {
            self.ones = 0;
        }
        self.bits_since_header.push(bit);
        if self.bits_since_header.len() > 64 {
            self.bits_since_header.drain(..32);
        }
    }

    fn read_bit(&mut self) -> bool {
        // Pulled up when nothing drives it
        self.pending_reads.pop_front().unwrap_or(true)
    }

    fn clock_pulse(&mut self) {}

    fn delay_ms(&mut self, ms: u32) {
        self.elapsed_ms += ms as u64;
    }

    fn set_reset(&mut self, asserted: bool) -> bool {
        if !self.has_reset_line {
            return false;
        }
        if asserted {
            self.reset_asserts += 1;
            self.in_reset = true;
        } else if self.in_reset {
            self.in_reset = false;
            self.core_reset();
        }
        true
    }
}
