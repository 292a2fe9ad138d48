// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! SWD bit transport.
//!
//! [`SwdLine`] is the only hardware dependency of this crate.  Firmware
//! implements it over GPIOs, and tests implement it with a simulated target.

use serde::{Deserialize, Serialize};

/// SWDIO direction, from the host's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Host drives SWDIO
    Output,

    /// Target drives SWDIO
    Input,
}

/// SWD clock speed setting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speed {
    /// Aims to be roughly 500kHz clock
    Slow,

    /// Aims to be roughly 1MHz clock
    #[default]
    Medium,

    /// Aims to be roughly 2MHz clock
    Fast,

    /// As fast as the line implementation can toggle
    Turbo,
}

impl Speed {
    /// Returns the **approximate** speed in kHz for this SWD speed setting.
    pub fn speed_khz(&self) -> u32 {
        match self {
            Speed::Slow => 500,
            Speed::Medium => 1000,
            Speed::Fast => 2000,
            Speed::Turbo => 4000,
        }
    }

    /// CPU cycles to spend in each half of the clock period, for a line
    /// implementation using a busy-wait delay on a 160MHz core.
    pub fn half_period_cycles(&self) -> u32 {
        match self {
            Speed::Slow => 75,
            Speed::Medium => 33,
            Speed::Fast => 10,
            Speed::Turbo => 0,
        }
    }
}

/// Bit level access to the SWD lines.
///
/// Every bit operation completes a full clock period before returning, and
/// leaves SWCLK low.  None of these can fail.
pub trait SwdLine {
    /// Switches SWDIO between host and target driven.  Switching to
    /// [`Direction::Output`] drives the last level set.
    fn set_direction(&mut self, direction: Direction);

    /// Sets the level driven on SWDIO without clocking.
    fn set_data(&mut self, high: bool);

    /// Drives `bit` on SWDIO and clocks it out.  The target samples on the
    /// rising edge.
    fn write_bit(&mut self, bit: bool);

    /// Samples SWDIO, which the target changes on the rising edge, then
    /// clocks.  The sample is taken before the rising edge.
    fn read_bit(&mut self) -> bool;

    /// One clock period without touching SWDIO, used for turnaround.
    fn clock_pulse(&mut self);

    /// Blocks for `ms` milliseconds.
    fn delay_ms(&mut self, ms: u32);

    /// Drives the target's nRST line.  Returns false if there is no reset
    /// line, in which case nothing happens.
    fn set_reset(&mut self, asserted: bool) -> bool {
        let _ = asserted;
        false
    }

    /// Changes the clock speed, if the implementation supports it.
    fn set_speed(&mut self, speed: Speed) {
        let _ = speed;
    }
}

impl<L: SwdLine + ?Sized> SwdLine for &mut L {
    fn set_direction(&mut self, direction: Direction) {
        (**self).set_direction(direction)
    }

    fn set_data(&mut self, high: bool) {
        (**self).set_data(high)
    }

    fn write_bit(&mut self, bit: bool) {
        (**self).write_bit(bit)
    }

    fn read_bit(&mut self) -> bool {
        (**self).read_bit()
    }

    fn clock_pulse(&mut self) {
        (**self).clock_pulse()
    }

    fn delay_ms(&mut self, ms: u32) {
        (**self).delay_ms(ms)
    }

    fn set_reset(&mut self, asserted: bool) -> bool {
        (**self).set_reset(asserted)
    }

    fn set_speed(&mut self, speed: Speed) {
        (**self).set_speed(speed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_from_config_string() {
        let speed: Speed = serde_json::from_str("\"fast\"").unwrap();
        assert_eq!(speed, Speed::Fast);
        assert_eq!(Speed::default().speed_khz(), 1000);
        assert!(Speed::Slow.half_period_cycles() > Speed::Fast.half_period_cycles());
    }
}
