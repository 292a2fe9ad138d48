// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! swdburner - Target access used by the burner
//!
//! [`Programmer`] is everything the burner needs from the target.
//! [`SwdProgrammer`] implements it with a [`DebugInterface`] and
//! [`FlashLoader`], keeping track of which algorithm is resident between
//! calls.

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use swdburner_core::arm::dp::IdCode;
use swdburner_core::arm::scs::CpuId;
use swdburner_core::flash::FlashAlgorithm;
use swdburner_core::stm::{StmDeviceId, StmFlashSize};
use swdburner_swd::{DebugInterface, FlashError, FlashLoader, SwdError, SwdLine};

use crate::BurnerConfig;

/// Target operations used by [`crate::Burner`].
///
/// The flash operations act on the algorithm loaded by the last successful
/// [`Programmer::flash_init`], and fail with [`FlashError::NotInitialized`]
/// without one.
pub trait Programmer {
    /// Applies the parts of the configuration that affect target access.
    fn configure(&mut self, config: &BurnerConfig) {
        let _ = config;
    }

    /// Connects and powers up the debug domain.
    fn connect(&mut self) -> Result<IdCode, SwdError>;

    /// Cheap presence check on an already connected target.
    fn ping(&mut self) -> Result<IdCode, SwdError>;

    fn read_cpuid(&mut self) -> Result<CpuId, SwdError>;

    fn read_device_id(&mut self) -> Result<StmDeviceId, SwdError>;

    fn read_flash_size(&mut self, addr: u32) -> Result<StmFlashSize, SwdError>;

    /// Loads `algo` and calls its init entry point.
    fn flash_init(&mut self, algo: &'static FlashAlgorithm, base: u32) -> Result<(), FlashError>;

    fn flash_uninit(&mut self) -> Result<(), FlashError>;

    fn erase_chip(&mut self) -> Result<(), FlashError>;

    fn erase_sector(&mut self, addr: u32) -> Result<(), FlashError>;

    fn program_page(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashError>;

    fn verify(&mut self, addr: u32, size: u32, crc: u32) -> Result<(), FlashError>;

    fn set_read_protect(&mut self) -> Result<(), FlashError>;

    /// Resets the target and leaves it running.
    fn reset_run(&mut self) -> Result<(), SwdError>;

    fn delay_ms(&mut self, ms: u32);
}

/// [`Programmer`] over SWD.
#[derive(Debug)]
pub struct SwdProgrammer<L: SwdLine> {
    debug: DebugInterface<L>,
    loaded: Option<&'static FlashAlgorithm>,
}

impl<L: SwdLine> SwdProgrammer<L> {
    pub fn new(debug: DebugInterface<L>) -> Self {
        Self {
            debug,
            loaded: None,
        }
    }

    pub fn from_line(line: L) -> Self {
        Self::new(DebugInterface::from_line(line))
    }

    pub fn debug(&mut self) -> &mut DebugInterface<L> {
        &mut self.debug
    }

    /// The algorithm currently resident on the target, if any.
    pub fn loaded(&self) -> Option<&'static FlashAlgorithm> {
        self.loaded
    }

    fn loader(&mut self) -> Result<FlashLoader<'_, L>, FlashError> {
        let algo = self.loaded.ok_or(FlashError::NotInitialized)?;
        Ok(FlashLoader::loaded(&mut self.debug, algo))
    }
}

impl<L: SwdLine> Programmer for SwdProgrammer<L> {
    fn configure(&mut self, config: &BurnerConfig) {
        self.debug.set_reset_mode(config.reset_mode);
        self.debug.swd_if().set_swd_speed(config.speed);
    }

    fn connect(&mut self) -> Result<IdCode, SwdError> {
        // Reconnecting resets the core, so nothing stays resident
        self.loaded = None;
        self.debug.init_debug()
    }

    fn ping(&mut self) -> Result<IdCode, SwdError> {
        self.debug.ping()
    }

    fn read_cpuid(&mut self) -> Result<CpuId, SwdError> {
        self.debug.read_cpuid()
    }

    fn read_device_id(&mut self) -> Result<StmDeviceId, SwdError> {
        self.debug.read_device_id()
    }

    fn read_flash_size(&mut self, addr: u32) -> Result<StmFlashSize, SwdError> {
        self.debug.read_flash_size(addr)
    }

    fn flash_init(&mut self, algo: &'static FlashAlgorithm, base: u32) -> Result<(), FlashError> {
        self.loaded = None;
        FlashLoader::new(&mut self.debug, algo).init(base)?;
        self.loaded = Some(algo);
        Ok(())
    }

    fn flash_uninit(&mut self) -> Result<(), FlashError> {
        let result = self.loader()?.uninit();
        self.loaded = None;
        result
    }

    fn erase_chip(&mut self) -> Result<(), FlashError> {
        self.loader()?.erase_chip()
    }

    fn erase_sector(&mut self, addr: u32) -> Result<(), FlashError> {
        self.loader()?.erase_sector(addr)
    }

    fn program_page(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashError> {
        self.loader()?.program_page(addr, data)
    }

    fn verify(&mut self, addr: u32, size: u32, crc: u32) -> Result<(), FlashError> {
        if self.loaded.is_some_and(|algo| algo.verify.is_none()) {
            return Err(FlashError::Unsupported);
        }
        self.loader()?.verify(addr, size, crc)
    }

    fn set_read_protect(&mut self) -> Result<(), FlashError> {
        if self.loaded.is_some_and(|algo| algo.set_read_protect.is_none()) {
            return Err(FlashError::Unsupported);
        }
        self.loader()?.set_read_protect()
    }

    fn reset_run(&mut self) -> Result<(), SwdError> {
        self.loaded = None;
        self.debug.reset_run()
    }

    fn delay_ms(&mut self, ms: u32) {
        self.debug.delay_ms(ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swdburner_algo::stm32f1::STM32F10X_128_1K;
    use swdburner_swd::{Direction, ResetMode, Speed};

    // Nothing attached: SWDIO floats high
    #[derive(Default)]
    struct Detached {
        delays: u32,
        speed: Option<Speed>,
    }

    impl SwdLine for Detached {
        fn set_direction(&mut self, _: Direction) {}
        fn set_data(&mut self, _: bool) {}
        fn write_bit(&mut self, _: bool) {}
        fn read_bit(&mut self) -> bool {
            true
        }
        fn clock_pulse(&mut self) {}
        fn delay_ms(&mut self, ms: u32) {
            self.delays += ms;
        }
        fn set_speed(&mut self, speed: Speed) {
            self.speed = Some(speed);
        }
    }

    #[test]
    fn detached_target_has_no_ack() {
        let mut programmer = SwdProgrammer::from_line(Detached::default());
        assert_eq!(programmer.connect(), Err(SwdError::NoAck(7)));
        assert!(matches!(
            programmer.flash_init(&STM32F10X_128_1K, 0x0800_0000),
            Err(FlashError::InitFailed(SwdError::NoAck(7)))
        ));
        assert!(programmer.loaded().is_none());
    }

    #[test]
    fn flash_operations_need_an_algorithm() {
        let mut programmer = SwdProgrammer::from_line(Detached::default());
        assert_eq!(programmer.erase_chip(), Err(FlashError::NotInitialized));
        assert_eq!(programmer.erase_sector(0x0800_0000), Err(FlashError::NotInitialized));
        assert_eq!(
            programmer.program_page(0x0800_0000, &[0; 16]),
            Err(FlashError::NotInitialized)
        );
        assert_eq!(programmer.flash_uninit(), Err(FlashError::NotInitialized));
    }

    #[test]
    fn configure_applies_link_settings() {
        let mut programmer = SwdProgrammer::from_line(Detached::default());
        let config = BurnerConfig {
            reset_mode: ResetMode::Hardware,
            speed: Speed::Slow,
            ..Default::default()
        };
        programmer.configure(&config);
        assert_eq!(programmer.debug().reset_mode(), ResetMode::Hardware);
        assert_eq!(programmer.debug().swd_if().swd_speed(), Speed::Slow);
        programmer.delay_ms(5);
        assert_eq!(programmer.debug().swd_if().protocol().line().delays, 5);
        assert_eq!(programmer.debug().swd_if().protocol().line().speed, Some(Speed::Slow));
    }
}
