// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! swdburner - Burner state machine and programming pipeline
//!
//! [`Burner::tick()`] is called on a fixed period, normally every 100ms.
//! Each call senses whether a target is attached, advances the state
//! machine and, on entering [`BurnerState::Start`], runs the whole
//! programming pipeline before returning.
//!
//! ```text
//!          online for AUTO_START_TICKS          auto burn, or trigger()
//!   Idle ----------------------------> Ready -------------------------> Start
//!    ^                                                                    |
//!    |  offline for AUTO_END_TICKS                                        |
//!    +---------------------------- Finish <------- Running <--------------+
//!    |                               |
//!    +------------ Locked <----------+  BURNER_RETRY_COUNT failed runs
//! ```
//!
//! Idle, Ready and Start drop straight back to Idle when the target goes
//! away.  A running pipeline is never interrupted by detection.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use serde::Serialize;

use swdburner_algo::{Catalog, DeviceProfile};
use swdburner_core::arm::dp::IdCode;
use swdburner_core::TargetInfo;
use swdburner_core::arm::scs::CpuId;
use swdburner_core::flash::FlashAlgorithm;
use swdburner_core::stm::{STM32_FLASH_BASE, StmDeviceId, StmFlashSize};
use swdburner_swd::{SwdError, retry};

use crate::source::{CRC32, ProgramSource, checksum};
use crate::{BurnerConfig, BurnerError, Programmer};

/// Consecutive online ticks before a target is considered attached.
pub const AUTO_START_TICKS: u32 = 10;

/// Consecutive offline ticks before a finished target is considered
/// removed.
pub const AUTO_END_TICKS: u32 = 5;

/// Failed runs on one attached target before the burner locks.
pub const BURNER_RETRY_COUNT: u32 = 2;

/// Default working buffer, and so program page, size.
pub const DEFAULT_PAGE_SIZE: usize = 1024;

/// Attempts made to read a valid flash size after the option byte reset.
pub const FLASH_SIZE_READ_ATTEMPTS: u32 = 5;

const FLASH_SIZE_READ_DELAY_MS: u32 = 10;

// Base passed to the option byte algorithm's init
const OPTION_INIT_BASE: u32 = 0;

/// Millisecond time source.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, strum::IntoStaticStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BurnerState {
    /// Waiting for a target to settle online
    #[default]
    Idle,

    /// Target attached, waiting for an image or trigger
    Ready,

    /// About to run the pipeline
    Start,

    /// Pipeline in progress
    Running,

    /// Pipeline complete, waiting for the target to be removed
    Finish,

    /// Too many failures on this target, waiting for it to be removed
    Locked,
}

impl fmt::Display for BurnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name: &'static str = self.into();
        write!(f, "{name}")
    }
}

/// Everything the burner knows about the current target and run.
#[derive(Debug, Clone, Default)]
pub struct BurnerSession {
    pub state: BurnerState,
    pub error: BurnerError,
    pub online: bool,
    pub idcode: Option<IdCode>,
    pub cpuid: Option<CpuId>,
    pub device_id: Option<StmDeviceId>,
    pub flash_size: Option<StmFlashSize>,
    pub profile: Option<&'static DeviceProfile>,
    pub program_size: u32,
    pub finish_size: u32,
    pub finish_time_ms: u64,
    pub failures: u32,
    ticks_online: u32,
    ticks_offline: u32,
}

impl BurnerSession {
    /// Progress through the current image, in permille.
    pub fn finish_rate(&self) -> u16 {
        if self.program_size == 0 {
            return 0;
        }
        (self.finish_size as u64 * 1000 / self.program_size as u64).min(1000) as u16
    }

    /// The target identified so far, once it has answered a connect.
    pub fn target(&self) -> Option<TargetInfo> {
        self.idcode.map(|idcode| TargetInfo {
            idcode,
            cpuid: self.cpuid.unwrap_or_default(),
            device_id: self.device_id.unwrap_or_default(),
            flash_size: self.flash_size,
        })
    }

    fn forget_target(&mut self) {
        self.idcode = None;
        self.cpuid = None;
        self.device_id = None;
        self.flash_size = None;
        self.profile = None;
    }
}

/// Telemetry snapshot, for the UI and any status API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BurnerStatus {
    pub state: BurnerState,
    pub error: BurnerError,
    pub online: bool,
    pub idcode: Option<String>,
    pub cpuid: Option<String>,
    pub dev_id: Option<u16>,
    pub rev_id: Option<u16>,
    pub device: Option<&'static str>,
    pub flash_kb: Option<u16>,
    pub program_size: u32,
    pub finish_size: u32,
    pub finish_rate: u16,
    pub finish_time_ms: u64,
    pub failures: u32,
}

impl From<&BurnerSession> for BurnerStatus {
    fn from(session: &BurnerSession) -> Self {
        Self {
            state: session.state,
            error: session.error,
            online: session.online,
            idcode: session.idcode.map(|id| format!("{id}")),
            cpuid: session.cpuid.map(|id| format!("{id}")),
            dev_id: session.device_id.map(|id| id.device_id()),
            rev_id: session.device_id.map(|id| id.revision()),
            device: session.profile.map(|p| p.name),
            flash_kb: session.flash_size.map(|size| size.kb()),
            program_size: session.program_size,
            finish_size: session.finish_size,
            finish_rate: session.finish_rate(),
            finish_time_ms: session.finish_time_ms,
            failures: session.failures,
        }
    }
}

/// The burner.
///
/// Owns the target access, the image source and the session.  Nothing is
/// shared: all state is reached through this object.
pub struct Burner<P: Programmer, S: ProgramSource, C: Clock> {
    programmer: P,
    source: Option<S>,
    clock: C,
    catalog: Catalog<'static>,
    config: BurnerConfig,
    session: BurnerSession,
    page_size: usize,
}

impl<P: Programmer, S: ProgramSource, C: Clock> Burner<P, S, C> {
    pub fn new(mut programmer: P, source: Option<S>, clock: C, config: BurnerConfig) -> Self {
        programmer.configure(&config);
        info!("Info:  Burner config {config}");
        Self {
            programmer,
            source,
            clock,
            catalog: Catalog::stm32(),
            config,
            session: BurnerSession::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Replaces the built-in STM32 catalog.
    pub fn with_catalog(mut self, catalog: Catalog<'static>) -> Self {
        self.catalog = catalog;
        self
    }

    /// Sets the working buffer size.  Rounded up to a whole number of
    /// words.
    pub fn set_page_size(&mut self, size: usize) {
        self.page_size = size.max(4).next_multiple_of(4);
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Replaces the image source, returning the previous one.
    pub fn set_source(&mut self, source: S) -> Option<S> {
        self.source.replace(source)
    }

    pub fn take_source(&mut self) -> Option<S> {
        self.source.take()
    }

    pub fn source(&self) -> Option<&S> {
        self.source.as_ref()
    }

    pub fn config(&self) -> &BurnerConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: BurnerConfig) {
        self.programmer.configure(&config);
        info!("Info:  Burner config {config}");
        self.config = config;
    }

    pub fn programmer(&mut self) -> &mut P {
        &mut self.programmer
    }

    pub fn session(&self) -> &BurnerSession {
        &self.session
    }

    pub fn state(&self) -> BurnerState {
        self.session.state
    }

    pub fn status(&self) -> BurnerStatus {
        BurnerStatus::from(&self.session)
    }

    /// Starts a run from [`BurnerState::Ready`], for use when auto burn
    /// is off.  The pipeline runs on the next tick.
    ///
    /// Returns:
    /// - `true` if the burner was ready.
    pub fn trigger(&mut self) -> bool {
        if self.session.state != BurnerState::Ready {
            debug!("Info:  Trigger ignored in state {}", self.session.state);
            return false;
        }
        self.enter(BurnerState::Start);
        true
    }

    /// Senses the target and advances the state machine by one period.
    ///
    /// Returns:
    /// - The state after this tick.
    pub fn tick(&mut self) -> BurnerState {
        let online = self.detect();

        match self.session.state {
            BurnerState::Idle => {
                if online {
                    self.session.ticks_online += 1;
                    if self.session.ticks_online >= AUTO_START_TICKS {
                        self.enter(BurnerState::Ready);
                        if !self.config.auto_burn {
                            info!("Info:  Target ready, waiting for trigger");
                        }
                    }
                } else {
                    self.session.ticks_online = 0;
                }
            }
            BurnerState::Ready | BurnerState::Start if !online => {
                self.enter(BurnerState::Idle);
            }
            BurnerState::Ready => {
                if self.config.auto_burn && self.has_image() {
                    self.enter(BurnerState::Start);
                }
            }
            BurnerState::Start | BurnerState::Running => (),
            BurnerState::Finish | BurnerState::Locked => {
                if online {
                    self.session.ticks_offline = 0;
                    if self.session.state == BurnerState::Finish
                        && self.session.error.is_error()
                        && self.config.auto_burn
                        && self.has_image()
                    {
                        info!("Retry: Burning again after {}", self.session.error);
                        self.enter(BurnerState::Start);
                    }
                } else {
                    self.session.ticks_offline += 1;
                    if self.session.ticks_offline >= AUTO_END_TICKS {
                        self.session.failures = 0;
                        self.enter(BurnerState::Idle);
                    }
                }
            }
        }

        if self.session.state == BurnerState::Start {
            self.burn();
        }
        self.session.state
    }

    /// Runs the programming pipeline now, whatever the current state, and
    /// records the result.
    ///
    /// Returns:
    /// - [`BurnerError::None`] on success, otherwise the first failure.
    pub fn burn(&mut self) -> BurnerError {
        self.enter(BurnerState::Running);
        info!("Exec:  Burn");
        let start = self.clock.now_ms();
        self.session.error = BurnerError::None;
        self.session.program_size = 0;
        self.session.finish_size = 0;

        let error = match self.source.take() {
            Some(mut source) => {
                let result = self.pipeline(&mut source);
                if result.is_ok() {
                    if let Err(e) = source.delete() {
                        warn!("Error: Failed to delete programmed image: {e}");
                    }
                }
                self.source = Some(source);
                result.err().unwrap_or_default()
            }
            None => {
                warn!("Error: No image to burn");
                BurnerError::ReadFailed
            }
        };

        self.session.finish_time_ms = self.clock.now_ms().saturating_sub(start);
        self.session.error = error;
        if error.is_error() {
            self.session.failures += 1;
            warn!(
                "Error: Burn failed: {error}, failure {} of {BURNER_RETRY_COUNT}",
                self.session.failures
            );
            if self.session.failures >= BURNER_RETRY_COUNT {
                self.enter(BurnerState::Locked);
            } else {
                self.enter(BurnerState::Finish);
            }
        } else {
            self.session.failures = 0;
            info!(
                "OK:    Burned {} bytes in {}ms",
                self.session.finish_size, self.session.finish_time_ms
            );
            self.enter(BurnerState::Finish);
        }
        error
    }

    fn has_image(&self) -> bool {
        self.source.as_ref().is_some_and(|s| !s.is_empty())
    }

    fn enter(&mut self, state: BurnerState) {
        if self.session.state != state {
            debug!("Info:  Burner {} -> {state}", self.session.state);
        }
        self.session.state = state;
        self.session.ticks_online = 0;
        self.session.ticks_offline = 0;
    }

    // A full connect while offline, an IDCODE read while online
    fn detect(&mut self) -> bool {
        let online = if self.session.online {
            match self.programmer.ping() {
                Ok(_) => true,
                Err(e) => {
                    info!("Info:  Target detached: {e}");
                    self.session.forget_target();
                    false
                }
            }
        } else {
            match self.programmer.connect() {
                Ok(idcode) => {
                    info!("Info:  Target attached, IDCODE {idcode}");
                    self.session.idcode = Some(idcode);
                    self.identify();
                    true
                }
                Err(e) => {
                    trace!("Value: No target: {e}");
                    false
                }
            }
        };
        self.session.online = online;
        online
    }

    // Best effort, the pipeline reads everything again
    fn identify(&mut self) {
        self.session.cpuid = self
            .programmer
            .read_cpuid()
            .inspect_err(|e| debug!("Error: CPUID read failed: {e}"))
            .ok();
        self.session.device_id = self
            .programmer
            .read_device_id()
            .inspect_err(|e| debug!("Error: DBGMCU_IDCODE read failed: {e}"))
            .ok();

        let Some(device_id) = self.session.device_id else {
            return;
        };
        let dev_id = device_id.device_id();
        let Some(profile) = self.catalog.lookup(dev_id) else {
            info!("Info:  Unknown device 0x{dev_id:03X}");
            return;
        };

        self.session.flash_size = self
            .programmer
            .read_flash_size(profile.flash_size_addr)
            .ok()
            .filter(|size| size.is_valid());
        let profile = match self.session.flash_size {
            Some(size) => self.catalog.refine(dev_id, size.kb()).unwrap_or(profile),
            None => profile,
        };
        self.session.profile = Some(profile);
        if let Some(target) = self.session.target() {
            info!("Value: {} {target}", profile.name);
        }
    }

    fn pipeline(&mut self, source: &mut S) -> Result<(), BurnerError> {
        // Working buffer
        let mut buf = Vec::new();
        buf.try_reserve_exact(self.page_size).map_err(|_| {
            warn!("Error: Failed to allocate {} byte buffer", self.page_size);
            BurnerError::BufferUnavailable
        })?;
        buf.resize(self.page_size, 0xFF);

        let len = source.len();
        if len == 0 {
            warn!("Error: Image is empty");
            return Err(BurnerError::ReadFailed);
        }
        self.session.program_size = len;
        if self.config.file_size != 0 && self.config.file_size != len {
            warn!(
                "Error: Image is {len} bytes, config expects {}",
                self.config.file_size
            );
            return Err(BurnerError::ImageCrc);
        }
        let expected = match (source.crc32(), self.config.file_crc) {
            (Some(image), Some(config)) if image != config => {
                warn!("Error: Image CRC {image:#010X}, config expects {config:#010X}");
                return Err(BurnerError::ImageCrc);
            }
            (image, config) => image.or(config),
        };
        if let Some(expected) = expected {
            let actual = checksum(source, &mut buf).map_err(|e| {
                warn!("Error: Failed to read image: {e}");
                BurnerError::ReadFailed
            })?;
            if actual != expected {
                warn!("Error: Image CRC {actual:#010X}, expected {expected:#010X}");
                return Err(BurnerError::ImageCrc);
            }
            debug!("OK:    Image CRC {actual:#010X}");
        }
        let flash_addr = source.flash_addr().unwrap_or(self.config.flash_addr);

        // Identify
        let idcode = self.programmer.connect().map_err(|e| {
            warn!("Error: Failed to connect: {e}");
            BurnerError::LinkInit
        })?;
        self.session.idcode = Some(idcode);
        self.session.online = true;
        let cpuid = self.programmer.read_cpuid().map_err(|e| {
            warn!("Error: Failed to read CPUID: {e}");
            BurnerError::ReadFailed
        })?;
        self.session.cpuid = Some(cpuid);
        let device_id = self.programmer.read_device_id().map_err(|e| {
            warn!("Error: Failed to read DBGMCU_IDCODE: {e}");
            BurnerError::ReadFailed
        })?;
        self.session.device_id = Some(device_id);

        let dev_id = device_id.device_id();
        let profile = self.catalog.lookup(dev_id).ok_or_else(|| {
            warn!("Error: Unknown device 0x{dev_id:03X}");
            BurnerError::ChipUnknown
        })?;
        self.session.profile = Some(profile);
        info!("Value: Target {profile}");

        self.reset_option_bytes(profile.option)?;

        let size = self.fetch_flash_size(profile.flash_size_addr)?;
        self.session.flash_size = Some(size);
        let profile = self.catalog.refine(dev_id, size.kb()).unwrap_or(profile);
        self.session.profile = Some(profile);

        let flash = profile.flash;
        let flash_end = STM32_FLASH_BASE + size.bytes();
        let fits = flash_addr >= STM32_FLASH_BASE
            && flash_addr.checked_add(len).is_some_and(|end| end <= flash_end)
            && flash.sector_for(flash_addr).is_some();
        if !fits {
            warn!(
                "Error: {len} bytes at {flash_addr:#010X} don't fit {size} flash using {}",
                flash.name
            );
            return Err(BurnerError::FlashAlgorithmMismatch);
        }

        self.programmer
            .flash_init(flash, STM32_FLASH_BASE)
            .map_err(|e| {
                warn!("Error: {e}");
                BurnerError::FlashInit
            })?;

        let result = self.program(flash, source, flash_addr, &mut buf);

        if let Err(e) = self.programmer.flash_uninit() {
            warn!("Error: {e}");
        }
        result?;

        if self.config.auto_run {
            info!("Exec:  Reset and run target");
            if let Err(e) = self.programmer.reset_run() {
                warn!("Error: Failed to reset target: {e}");
            }
        }
        Ok(())
    }

    // Resets protection and lock state to the factory defaults
    fn reset_option_bytes(&mut self, option: &'static FlashAlgorithm) -> Result<(), BurnerError> {
        self.programmer
            .flash_init(option, OPTION_INIT_BASE)
            .map_err(|e| {
                warn!("Error: {e}");
                BurnerError::OptionInit
            })?;
        let erased = self.programmer.erase_chip().map_err(|e| {
            warn!("Error: Option bytes: {e}");
            BurnerError::OptionErase
        });
        let uninit = self.programmer.flash_uninit().map_err(|e| {
            warn!("Error: Option bytes: {e}");
            BurnerError::OptionErase
        });
        erased.and(uninit)?;
        debug!("OK:    Option bytes reset");
        Ok(())
    }

    // The option byte reset may leave the target briefly unresponsive
    fn fetch_flash_size(&mut self, addr: u32) -> Result<StmFlashSize, BurnerError> {
        let programmer = &mut self.programmer;
        let mut attempt = 0;
        retry(FLASH_SIZE_READ_ATTEMPTS, || {
            attempt += 1;
            if attempt > 1 {
                debug!("Retry: Flash size, attempt {attempt}");
                programmer.delay_ms(FLASH_SIZE_READ_DELAY_MS);
            }
            programmer.connect()?;
            let size = programmer.read_flash_size(addr)?;
            if size.is_valid() {
                Ok(size)
            } else {
                Err(SwdError::OperationFailed(format!("invalid flash size {size}")))
            }
        })
        .inspect(|size| debug!("Value: Flash size {size}"))
        .map_err(|e| {
            warn!("Error: Flash size unknown: {e}");
            BurnerError::FlashSizeUnknown
        })
    }

    fn program(
        &mut self,
        flash: &'static FlashAlgorithm,
        source: &mut S,
        flash_addr: u32,
        buf: &mut [u8],
    ) -> Result<(), BurnerError> {
        if self.config.chip_erase {
            self.programmer.erase_chip().map_err(|e| {
                warn!("Error: {e}");
                BurnerError::FlashErase
            })?;
        }

        let len = source.len();
        let mut digest = CRC32.digest();
        let mut erased_to = flash_addr;
        let mut offset = 0;
        while offset < len {
            let n = (len - offset).min(buf.len() as u32) as usize;
            buf.fill(0xFF);
            source.read(offset, &mut buf[..n]).map_err(|e| {
                warn!("Error: Failed to read image at {offset:#X}: {e}");
                BurnerError::ReadFailed
            })?;
            digest.update(&buf[..n]);

            // Algorithms program whole words
            let page = &buf[..n.next_multiple_of(4).min(buf.len())];
            let addr = flash_addr + offset;
            let end = addr + page.len() as u32;

            if !self.config.chip_erase {
                while erased_to < end {
                    let sector = flash
                        .sector_range(erased_to.max(addr))
                        .ok_or(BurnerError::FlashAlgorithmMismatch)?;
                    debug_assert!(flash.sector_is_boundary(sector.start));
                    self.programmer.erase_sector(sector.start).map_err(|e| {
                        warn!("Error: {e}");
                        BurnerError::FlashErase
                    })?;
                    erased_to = sector.end;
                }
            }

            self.programmer.program_page(addr, page).map_err(|e| {
                warn!("Error: {e}");
                BurnerError::FlashProgram
            })?;

            offset += n as u32;
            self.session.finish_size = offset;
            trace!("Value: Progress {}", self.session.finish_rate());
        }
        let crc = digest.finalize();

        if self.config.verify {
            info!("Exec:  Verify {len} bytes at {flash_addr:#010X}");
            self.programmer.verify(flash_addr, len, crc).map_err(|e| {
                warn!("Error: {e}");
                BurnerError::from_flash(&e, BurnerError::FlashVerify)
            })?;
        }
        if self.config.read_protection {
            info!("Exec:  Set read protection");
            self.programmer.set_read_protect().map_err(|e| {
                warn!("Error: {e}");
                BurnerError::from_flash(&e, BurnerError::OptionReadProtect)
            })?;
        }
        Ok(())
    }
}
