// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! swdburner-fw - GPIO implementation of the SWD lines

use esp_hal::gpio::{
    DriveMode, DriveStrength, Flex, InputConfig, InputPin, Level, Output, OutputConfig, OutputPin,
    Pull,
};

use swdburner_swd::{Direction, Speed, SwdLine};

/// Bit-banged SWD over two GPIOs, with an optional nRST output.
///
/// SWCLK idles low.  Each half period is a busy-wait of
/// [`Speed::half_period_cycles`] CPU cycles.
pub struct GpioLine<'a> {
    swclk: Output<'a>,
    swdio: Flex<'a>,
    nrst: Option<Output<'a>>,
    half_period: u32,
}

impl<'a> GpioLine<'a> {
    /// Creates the line, with SWDIO initially an input.
    ///
    /// Arguments:
    /// - `swdio_pin`: SWDIO pin, which must support both input and output.
    /// - `swclk_pin`: SWCLK pin.
    /// - `nrst_pin`: The target's reset pin, if wired.  It is driven open
    ///   drain, so released is high impedance.
    pub fn new(
        swdio_pin: impl InputPin + OutputPin + 'a,
        swclk_pin: impl OutputPin + 'a,
        nrst_pin: Option<impl OutputPin + 'a>,
    ) -> Self {
        let mut swdio = Flex::new(swdio_pin);
        let input_config = InputConfig::default().with_pull(Pull::None);
        swdio.apply_input_config(&input_config);
        swdio.set_input_enable(true);

        let output_config = OutputConfig::default()
            .with_drive_strength(DriveStrength::_20mA)
            .with_drive_mode(DriveMode::PushPull);
        let swclk = Output::new(swclk_pin, Level::Low, output_config);

        let nrst_config = OutputConfig::default()
            .with_drive_mode(DriveMode::OpenDrain)
            .with_pull(Pull::Up);
        let nrst = nrst_pin.map(|pin| Output::new(pin, Level::High, nrst_config));

        Self {
            swclk,
            swdio,
            nrst,
            half_period: Speed::default().half_period_cycles(),
        }
    }

    #[inline(always)]
    fn delay(&self) {
        riscv::asm::delay(self.half_period);
    }
}

impl SwdLine for GpioLine<'_> {
    fn set_direction(&mut self, direction: Direction) {
        match direction {
            Direction::Output => {
                self.swdio.set_input_enable(false);
                self.swdio.set_output_enable(true);
            }
            Direction::Input => {
                self.swdio.set_output_enable(false);
                self.swdio.set_input_enable(true);
            }
        }
    }

    #[inline(always)]
    fn set_data(&mut self, high: bool) {
        self.swdio.set_level(Level::from(high));
    }

    #[inline(always)]
    fn write_bit(&mut self, bit: bool) {
        self.swdio.set_level(Level::from(bit));
        self.delay();
        self.swclk.set_high();
        self.delay();
        self.swclk.set_low();
    }

    #[inline(always)]
    fn read_bit(&mut self) -> bool {
        self.delay();
        let bit = self.swdio.is_high();
        self.swclk.set_high();
        self.delay();
        self.swclk.set_low();
        bit
    }

    #[inline(always)]
    fn clock_pulse(&mut self) {
        self.delay();
        self.swclk.set_high();
        self.delay();
        self.swclk.set_low();
    }

    fn delay_ms(&mut self, ms: u32) {
        embassy_time::block_for(embassy_time::Duration::from_millis(ms as u64));
    }

    fn set_reset(&mut self, asserted: bool) -> bool {
        match self.nrst.as_mut() {
            Some(nrst) => {
                // Active low
                nrst.set_level(Level::from(!asserted));
                true
            }
            None => false,
        }
    }

    fn set_speed(&mut self, speed: Speed) {
        self.half_period = speed.half_period_cycles();
    }
}
