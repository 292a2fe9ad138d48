// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! swdburner-swd library
//!
//! ARM Serial Wire Debug (SWD) host, and a flash algorithm runtime built on
//! top of it, used to program STM32 targets.
//!
//! It is `no_std`, requires an `alloc` implementation, and is independent of
//! the hardware used to drive the SWD lines: the caller supplies an
//! implementation of [`SwdLine`].
//!
//! ```text
//!   swdburner             |  FlashLoader   -- runs flash algorithm blobs
//! ----------------------  |
//!     DebugInterface      \   core registers, halt/run/reset
//! ----------------------   \
//!      SwdInterface         |--  SwdError / FlashError
//! ----------------------   /
//!      SwdProtocol        /      request/ack/data framing
//! ----------------------
//!       SwdLine          >======================<       SWD Target
//!                          SWDIO/SWCLK/nRST/GND
//! ```
//!
//! * [`FlashLoader`] downloads a [`swdburner_core::flash::FlashAlgorithm`]
//!   into target RAM and calls its entry points.
//! * [`DebugInterface`] connects to the target and controls the core.
//! * [`SwdInterface`] performs individual DP/AP and memory operations.
//! * [`SwdProtocol`] implements the SWD wire protocol through bit-banging
//!   an [`SwdLine`].
//!
//! Every poll and retry loop in this crate is bounded.  Most are built on
//! [`retry()`] and [`retry_while()`].

#![cfg_attr(not(test), no_std)]

pub mod debug;
pub mod flash;
pub mod interface;
pub mod line;
pub mod protocol;

#[cfg(test)]
pub(crate) mod mock;

#[doc(inline)]
pub use crate::debug::{DebugInterface, ResetMode};
#[doc(inline)]
pub use crate::flash::FlashLoader;
#[doc(inline)]
pub use crate::interface::SwdInterface;
#[doc(inline)]
pub use crate::line::{Direction, Speed, SwdLine};
#[doc(inline)]
pub use crate::protocol::SwdProtocol;

extern crate alloc;
use alloc::format;
use alloc::string::String;
use core::fmt;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use serde::Serialize;

/// Core error type used by all swdburner-swd objects
///
/// Methods are provided to make it easier to handle errors, by checking if
/// either a retry or reset is required:
///
/// - [`SwdError::requires_retry()`]
/// - [`SwdError::requires_reset()`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwdError {
    /// The target answered WAIT on every attempt.  [`SwdInterface`] retries
    /// WAITs internally, so this means the retry budget was exhausted.
    WaitAck,

    /// The target answered FAULT.  The DP's sticky error flags need clearing
    /// via [`SwdInterface::clear_errors()`], or the target reconnecting.
    FaultAck,

    /// No valid acknowledgement.  The value received is included.  7 means
    /// SWDIO was high for the entire acknowledge phase, which usually means
    /// nothing is attached.
    NoAck(u8),

    /// A parity error was detected while reading from the target, so the
    /// data cannot be trusted.  Frequent parity errors suggest noise on the
    /// lines, or too high a clock speed.
    ReadParity,

    /// A Debug Port error was signalled via the DP CTRL/STAT register.
    DpError,

    /// There was no SWD protocol error, but the operation did not succeed.
    OperationFailed(String),

    /// The target is not ready.  Either the debug domain is not powered, or
    /// a polled status bit has not yet been set.
    NotReady,

    /// The API was called incorrectly.
    Api,

    /// A bounded poll expired.
    Timeout,

    /// The requested operation is not supported.
    Unsupported,
}

impl SwdError {
    /// Maps the three acknowledge bits, LSB first, to a result.
    pub fn from_ack(ack: u8) -> Result<(), SwdError> {
        match ack {
            1 => Ok(()),
            2 => Err(SwdError::WaitAck),
            4 => Err(SwdError::FaultAck),
            _ => Err(SwdError::NoAck(ack)),
        }
    }

    /// Returns true if the error requires the target to be reconnected to
    /// recover.
    pub fn requires_reset(&self) -> bool {
        matches!(
            self,
            SwdError::NoAck(_) | SwdError::FaultAck | SwdError::ReadParity | SwdError::DpError
        )
    }

    /// Returns true if the error is a transient error that can be retried.
    /// This is just the `Wait` error from the SWD target.
    pub fn requires_retry(&self) -> bool {
        matches!(self, SwdError::WaitAck)
    }

    /// Returns true if the error requires neither a reset or a retry to
    /// recover.  Usually means the API has been used incorrectly.
    pub fn requires_other(&self) -> bool {
        !self.requires_reset() && !self.requires_retry()
    }

    /// Returns a string representation of the error.
    pub fn as_str(&self) -> &'static str {
        match self {
            SwdError::WaitAck => "Wait ACK",
            SwdError::FaultAck => "Fault ACK",
            SwdError::NoAck(_) => "No ACK",
            SwdError::ReadParity => "Read Parity Error",
            SwdError::DpError => "Debug Port Error",
            SwdError::OperationFailed(_) => "Operation Failed",
            SwdError::NotReady => "Not Ready",
            SwdError::Api => "API Error",
            SwdError::Timeout => "Timeout",
            SwdError::Unsupported => "Unsupported Operation",
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            SwdError::WaitAck => "wait ack",
            SwdError::FaultAck => "fault ack",
            SwdError::NoAck(_) => "no ack",
            SwdError::ReadParity => "read parity",
            SwdError::DpError => "debug port",
            SwdError::OperationFailed(_) => "operation failed",
            SwdError::NotReady => "not ready",
            SwdError::Api => "api error",
            SwdError::Timeout => "timeout",
            SwdError::Unsupported => "unsupported",
        }
    }
}

impl Serialize for SwdError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("SwdError", 2)?;
        state.serialize_field("kind", self.kind())?;

        let detail = match self {
            SwdError::OperationFailed(msg) => msg.clone(),
            SwdError::NoAck(code) => format!("{code}"),
            _ => String::new(),
        };
        state.serialize_field("detail", &detail)?;
        state.end()
    }
}

impl fmt::Display for SwdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwdError::NoAck(ack) => write!(f, "{}: {ack}", self.as_str()),
            SwdError::OperationFailed(str) => write!(f, "{}: {str}", self.as_str()),
            _ => write!(f, "{}", self.as_str()),
        }
    }
}

/// Errors from running a flash algorithm on the target.
///
/// Each runtime failure carries the [`SwdError`] that caused it.  A syscall
/// which runs but returns a non-zero result is reported with
/// [`SwdError::OperationFailed`], and one that never reaches its breakpoint
/// with [`SwdError::Timeout`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlashError {
    InitFailed(SwdError),
    UninitFailed(SwdError),
    EraseFailed(SwdError),
    WriteFailed(SwdError),
    VerifyFailed(SwdError),
    ReadProtectFailed(SwdError),

    /// The algorithm has no such entry point.
    Unsupported,

    /// An operation was attempted before a successful `init`.
    NotInitialized,
}

impl FlashError {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlashError::InitFailed(_) => "Init Failed",
            FlashError::UninitFailed(_) => "UnInit Failed",
            FlashError::EraseFailed(_) => "Erase Failed",
            FlashError::WriteFailed(_) => "Write Failed",
            FlashError::VerifyFailed(_) => "Verify Failed",
            FlashError::ReadProtectFailed(_) => "Read Protect Failed",
            FlashError::Unsupported => "Unsupported",
            FlashError::NotInitialized => "Not Initialized",
        }
    }

    /// The underlying SWD error, if any.
    pub fn swd_error(&self) -> Option<&SwdError> {
        match self {
            FlashError::InitFailed(e)
            | FlashError::UninitFailed(e)
            | FlashError::EraseFailed(e)
            | FlashError::WriteFailed(e)
            | FlashError::VerifyFailed(e)
            | FlashError::ReadProtectFailed(e) => Some(e),
            FlashError::Unsupported | FlashError::NotInitialized => None,
        }
    }
}

impl Serialize for FlashError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("FlashError", 2)?;
        state.serialize_field("kind", self.as_str())?;
        let detail = match self.swd_error() {
            Some(e) => format!("{e}"),
            None => String::new(),
        };
        state.serialize_field("detail", &detail)?;
        state.end()
    }
}

impl fmt::Display for FlashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.swd_error() {
            Some(e) => write!(f, "{}: {e}", self.as_str()),
            None => write!(f, "{}", self.as_str()),
        }
    }
}

/// Runs `op` up to `attempts` times, returning the first success or the
/// last error.
///
/// Arguments:
/// - `attempts`: Total number of attempts, including the first.  Zero is
///   treated as one.
/// - `op`: The operation.
pub fn retry<T, E, F>(attempts: u32, op: F) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
{
    retry_while(attempts, |_| true, op)
}

/// As [`retry()`], but stops early on an error `retriable` rejects.
///
/// Arguments:
/// - `attempts`: Total number of attempts, including the first.  Zero is
///   treated as one.
/// - `retriable`: Called with each error.  Returning `false` returns that
///   error immediately.
/// - `op`: The operation.
///
/// Returns:
/// - `Ok(T)`: from the first successful attempt.
/// - `Err(E)`: the error from the final attempt made.
pub fn retry_while<T, E, P, F>(attempts: u32, mut retriable: P, mut op: F) -> Result<T, E>
where
    P: FnMut(&E) -> bool,
    F: FnMut() -> Result<T, E>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts && retriable(&e) => attempt += 1,
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_mapping() {
        assert_eq!(SwdError::from_ack(1), Ok(()));
        assert_eq!(SwdError::from_ack(2), Err(SwdError::WaitAck));
        assert_eq!(SwdError::from_ack(4), Err(SwdError::FaultAck));
        assert_eq!(SwdError::from_ack(7), Err(SwdError::NoAck(7)));
        assert_eq!(SwdError::from_ack(0), Err(SwdError::NoAck(0)));
    }

    #[test]
    fn retry_stops_at_attempt_count() {
        let mut calls = 0;
        let result: Result<(), u32> = retry(10, || {
            calls += 1;
            Err(calls)
        });
        assert_eq!(result, Err(10));
        assert_eq!(calls, 10);
    }

    #[test]
    fn retry_returns_first_success() {
        let mut calls = 0;
        let result: Result<u32, ()> = retry(5, || {
            calls += 1;
            if calls == 3 { Ok(calls) } else { Err(()) }
        });
        assert_eq!(result, Ok(3));
        assert_eq!(calls, 3);
    }

    #[test]
    fn retry_zero_attempts_runs_once() {
        let mut calls = 0;
        let _: Result<(), ()> = retry(0, || {
            calls += 1;
            Err(())
        });
        assert_eq!(calls, 1);
    }

    #[test]
    fn retry_while_stops_on_fatal() {
        let mut calls = 0;
        let result: Result<(), SwdError> = retry_while(10, SwdError::requires_retry, || {
            calls += 1;
            if calls < 3 {
                Err(SwdError::WaitAck)
            } else {
                Err(SwdError::FaultAck)
            }
        });
        assert_eq!(result, Err(SwdError::FaultAck));
        assert_eq!(calls, 3);
    }

    #[test]
    fn flash_error_carries_cause() {
        let e = FlashError::EraseFailed(SwdError::Timeout);
        assert_eq!(e.swd_error(), Some(&SwdError::Timeout));
        assert_eq!(format!("{e}"), "Erase Failed: Timeout");
        assert_eq!(FlashError::Unsupported.swd_error(), None);
    }
}
