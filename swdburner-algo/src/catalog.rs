// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Device catalog.
//!
//! Maps an STM32 DEV_ID (from DBGMCU_IDCODE) and, once known, the flash
//! size to the pair of algorithms used to program the part.

use core::fmt;
use core::ops::RangeInclusive;
use serde::Serialize;

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use swdburner_core::flash::FlashAlgorithm;
use swdburner_core::stm::{
    FLASH_SIZE_ADDR_F0_F3, FLASH_SIZE_ADDR_F1, FLASH_SIZE_ADDR_F2_F4,
};

use crate::stm32f0::{STM32F0XX_256_2K, STM32F0XX_64_1K, STM32F0XX_OPT};
use crate::stm32f1::{STM32F10X_1024, STM32F10X_128_1K, STM32F10X_512, STM32F10X_OPT};
use crate::stm32f2::STM32F2XX_OPT;
use crate::stm32f3::STM32F3XX_512;
use crate::stm32f4::{
    STM32F40XXX_41XXX_OPT, STM32F42XXX_43XXX_OPT, STM32F4XX_1024, STM32F4XX_2048,
    STM32F4XX_512,
};

/// A catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceProfile {
    /// 12-bit DEV_ID
    pub device_id: u16,

    /// Human readable name
    pub name: &'static str,

    /// Address of the 16-bit flash size register, in KB
    pub flash_size_addr: u32,

    /// Flash sizes (KB, inclusive) this entry is bound to.  `None` matches
    /// on device ID alone.
    #[serde(skip)]
    pub flash_kb: Option<RangeInclusive<u16>>,

    /// Main flash algorithm
    #[serde(serialize_with = "serialize_algo")]
    pub flash: &'static FlashAlgorithm,

    /// Option byte algorithm
    #[serde(serialize_with = "serialize_algo")]
    pub option: &'static FlashAlgorithm,
}

fn serialize_algo<S: serde::Serializer>(
    algo: &&'static FlashAlgorithm,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(algo.name)
}

impl DeviceProfile {
    const fn new(
        device_id: u16,
        name: &'static str,
        flash_size_addr: u32,
        flash: &'static FlashAlgorithm,
        option: &'static FlashAlgorithm,
    ) -> Self {
        Self {
            device_id,
            name,
            flash_size_addr,
            flash_kb: None,
            flash,
            option,
        }
    }

    const fn sized(
        device_id: u16,
        name: &'static str,
        flash_size_addr: u32,
        flash_kb: RangeInclusive<u16>,
        flash: &'static FlashAlgorithm,
        option: &'static FlashAlgorithm,
    ) -> Self {
        Self {
            device_id,
            name,
            flash_size_addr,
            flash_kb: Some(flash_kb),
            flash,
            option,
        }
    }

    /// Whether both algorithms are laid out in RAM correctly and have a
    /// usable sector table.
    pub fn is_usable(&self) -> bool {
        self.flash.is_consistent() && self.option.is_consistent()
    }

    /// Returns whether this entry is bound to the given flash size.  Unbound
    /// entries never match here.
    pub fn matches_size(&self, kb: u16) -> bool {
        self.flash_kb
            .as_ref()
            .is_some_and(|range| range.contains(&kb))
    }
}

impl fmt::Display for DeviceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (0x{:03X}) flash: {} option: {}",
            self.name, self.device_id, self.flash.name, self.option.name
        )
    }
}

/// An ordered, first-match-wins list of [`DeviceProfile`]s.
#[derive(Debug, Clone, Copy)]
pub struct Catalog<'a> {
    profiles: &'a [DeviceProfile],
}

impl<'a> Catalog<'a> {
    pub const fn new(profiles: &'a [DeviceProfile]) -> Self {
        Self { profiles }
    }

    pub fn profiles(&self) -> &'a [DeviceProfile] {
        self.profiles
    }

    /// Finds the first profile with this device ID.
    ///
    /// Arguments:
    /// - `device_id` - DEV_ID from DBGMCU_IDCODE, upper bits are ignored
    ///
    /// Returns:
    /// - `Some(&DeviceProfile)` - first matching entry
    /// - `None` - the device is not supported
    ///
    /// Entries whose algorithms are not [`DeviceProfile::is_usable`] are
    /// skipped.
    pub fn lookup(&self, device_id: u16) -> Option<&'a DeviceProfile> {
        let device_id = device_id & 0xFFF;
        self.profiles
            .iter()
            .filter(|p| p.device_id == device_id)
            .find(|p| Self::usable(p))
    }

    /// Picks the size-appropriate profile for a device, once its flash size
    /// is known.  Falls back to [`Catalog::lookup`] if no entry is bound to
    /// this size.
    pub fn refine(&self, device_id: u16, flash_kb: u16) -> Option<&'a DeviceProfile> {
        let device_id = device_id & 0xFFF;
        let refined = self
            .profiles
            .iter()
            .filter(|p| p.device_id == device_id && p.matches_size(flash_kb))
            .find(|p| Self::usable(p));
        match refined {
            Some(profile) => {
                debug!("Value: refined 0x{device_id:03X} {flash_kb}KB to {}", profile.flash.name);
                Some(profile)
            }
            None => self.lookup(device_id),
        }
    }

    fn usable(profile: &DeviceProfile) -> bool {
        let usable = profile.is_usable();
        if !usable {
            warn!("Error: Skipping {profile}, inconsistent algorithm");
        }
        usable
    }
}

impl Default for Catalog<'static> {
    fn default() -> Self {
        Self::stm32()
    }
}

impl Catalog<'static> {
    /// The built-in STM32 catalog.
    pub fn stm32() -> Self {
        Self::new(&STM32_PROFILES)
    }
}

/// Built-in STM32 profiles.  Unbound entries come before size bound ones.
pub static STM32_PROFILES: [DeviceProfile; 21] = [
    // STM32F0
    DeviceProfile::new(0x440, "STM32F05x", FLASH_SIZE_ADDR_F0_F3, &STM32F0XX_64_1K, &STM32F0XX_OPT),
    DeviceProfile::new(0x444, "STM32F03x", FLASH_SIZE_ADDR_F0_F3, &STM32F0XX_64_1K, &STM32F0XX_OPT),
    DeviceProfile::new(0x445, "STM32F04x", FLASH_SIZE_ADDR_F0_F3, &STM32F0XX_64_1K, &STM32F0XX_OPT),
    DeviceProfile::new(0x448, "STM32F07x", FLASH_SIZE_ADDR_F0_F3, &STM32F0XX_256_2K, &STM32F0XX_OPT),
    DeviceProfile::new(0x442, "STM32F09x", FLASH_SIZE_ADDR_F0_F3, &STM32F0XX_256_2K, &STM32F0XX_OPT),
    // STM32F1
    DeviceProfile::new(0x412, "STM32F10x_LD", FLASH_SIZE_ADDR_F1, &STM32F10X_128_1K, &STM32F10X_OPT),
    DeviceProfile::new(0x410, "STM32F10x_MD", FLASH_SIZE_ADDR_F1, &STM32F10X_128_1K, &STM32F10X_OPT),
    DeviceProfile::new(0x414, "STM32F10x_HD", FLASH_SIZE_ADDR_F1, &STM32F10X_512, &STM32F10X_OPT),
    DeviceProfile::new(0x418, "STM32F10x_CL", FLASH_SIZE_ADDR_F1, &STM32F10X_512, &STM32F10X_OPT),
    DeviceProfile::new(0x430, "STM32F10x_XL", FLASH_SIZE_ADDR_F1, &STM32F10X_1024, &STM32F10X_OPT),
    // STM32F2
    DeviceProfile::new(0x411, "STM32F2xx", FLASH_SIZE_ADDR_F2_F4, &STM32F4XX_1024, &STM32F2XX_OPT),
    // STM32F3
    DeviceProfile::new(0x422, "STM32F30x", FLASH_SIZE_ADDR_F0_F3, &STM32F3XX_512, &STM32F0XX_OPT),
    DeviceProfile::new(0x446, "STM32F30xDE", FLASH_SIZE_ADDR_F0_F3, &STM32F3XX_512, &STM32F0XX_OPT),
    // STM32F4
    DeviceProfile::new(0x413, "STM32F405/07/15/17", FLASH_SIZE_ADDR_F2_F4, &STM32F4XX_1024, &STM32F40XXX_41XXX_OPT),
    DeviceProfile::new(0x423, "STM32F401xBC", FLASH_SIZE_ADDR_F2_F4, &STM32F4XX_512, &STM32F40XXX_41XXX_OPT),
    DeviceProfile::new(0x433, "STM32F401xDE", FLASH_SIZE_ADDR_F2_F4, &STM32F4XX_512, &STM32F40XXX_41XXX_OPT),
    DeviceProfile::new(0x431, "STM32F411", FLASH_SIZE_ADDR_F2_F4, &STM32F4XX_512, &STM32F40XXX_41XXX_OPT),
    DeviceProfile::new(0x421, "STM32F446", FLASH_SIZE_ADDR_F2_F4, &STM32F4XX_512, &STM32F40XXX_41XXX_OPT),
    DeviceProfile::new(0x419, "STM32F42x/43x", FLASH_SIZE_ADDR_F2_F4, &STM32F4XX_2048, &STM32F42XXX_43XXX_OPT),
    // Size bound
    DeviceProfile::sized(0x413, "STM32F405/07/15/17", FLASH_SIZE_ADDR_F2_F4, 0..=512, &STM32F4XX_512, &STM32F40XXX_41XXX_OPT),
    DeviceProfile::sized(0x419, "STM32F42x/43x", FLASH_SIZE_ADDR_F2_F4, 0..=1024, &STM32F4XX_1024, &STM32F42XXX_43XXX_OPT),
];

/// Finds a profile in the built-in catalog.
pub fn lookup(device_id: u16) -> Option<&'static DeviceProfile> {
    Catalog::stm32().lookup(device_id)
}

/// Refines a profile in the built-in catalog by flash size.
pub fn refine(device_id: u16, flash_kb: u16) -> Option<&'static DeviceProfile> {
    Catalog::stm32().refine(device_id, flash_kb)
}
