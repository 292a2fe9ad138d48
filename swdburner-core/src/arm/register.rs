// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ARM Debug Register Access Traits
//!
//! These give strongly typed access to the registers used while burning a
//! target:
//!
//! * DP and AP registers, addressed by their 8-bit register offset, and
//!   accessed via `swdburner_swd::SwdInterface::read_dp_register()` and
//!   friends.
//! * Memory mapped registers (the Cortex-M System Control Space and the STM32
//!   DBGMCU block), addressed by their full 32-bit address, and accessed via
//!   `swdburner_swd::SwdInterface::read_register()` and
//!   `swdburner_swd::SwdInterface::write_register()`.

/// Base trait for all DP/AP register descriptors
pub trait RegisterDescriptor {
    const ADDRESS: u8;
    type Value;
}

/// Registers that can be read
pub trait ReadableRegister: RegisterDescriptor {
    /// Convert raw 32-bit data to register value
    fn from_raw(data: u32) -> Self::Value
    where
        Self::Value: From<u32>,
    {
        Self::Value::from(data)
    }
}

/// Registers that can be written
pub trait WritableRegister: RegisterDescriptor {
    /// Convert register value to raw 32-bit data
    fn to_raw(value: Self::Value) -> u32
    where
        Self::Value: Into<u32>,
    {
        value.into()
    }
}

/// Debug Port registers (accessed via DP operations)
pub trait DpRegister: RegisterDescriptor {}

/// Access Port registers (accessed via AP operations)
pub trait ApRegister: RegisterDescriptor {}

/// Registers which live in the target's address space, rather than in the
/// DP/AP register space.  These are read and written through the MEM-AP.
pub trait MemoryMappedRegister {
    const ADDRESS: u32;
    type Value: From<u32> + Into<u32>;
}

/// Generate the conversion and display impls for a register data type.
///
/// `r` types can be built from a raw value, `w` types can be turned into one,
/// and `rw` types support both directions.
#[macro_export]
macro_rules! register_data {
    (@into $name:ident) => {
        impl From<$name> for u32 {
            fn from(value: $name) -> u32 {
                value.0
            }
        }
    };
    (@from $name:ident) => {
        impl From<u32> for $name {
            fn from(value: u32) -> Self {
                $name(value)
            }
        }
    };
    (@display $name:ident) => {
        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "0x{:08X}", self.0)
            }
        }
    };
    (r $name:ident) => {
        $crate::register_data!(@into $name);
        $crate::register_data!(@from $name);
        $crate::register_data!(@display $name);
    };
    (rw $name:ident) => {
        $crate::register_data!(@into $name);
        $crate::register_data!(@from $name);
        $crate::register_data!(@display $name);
    };
    (w $name:ident) => {
        $crate::register_data!(@into $name);
        $crate::register_data!(@display $name);
    };
}

/// Generate a bit flag getter and setter pair on a register data type.
#[macro_export]
macro_rules! register_flag {
    ($get:ident, $set:ident, $bit:expr) => {
        pub fn $get(&self) -> bool {
            self.0 & $bit != 0
        }

        pub fn $set(&mut self, enable: bool) -> &mut Self {
            if enable {
                self.0 |= $bit;
            } else {
                self.0 &= !$bit;
            }
            self
        }
    };
}
