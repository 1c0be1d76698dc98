#![forbid(unsafe_code)]

//! Host-side USB test harness for ASM2464PD firmware under emulation.
//!
//! The harness emulates the host end of the USB link purely through MMIO
//! register and scratch-memory writes against an emulator implementing the
//! [`Emulator`] trait. It never parses or synthesizes USB protocol data:
//! the firmware under test handles all USB semantics, and the harness is a
//! dumb relay that
//! 1. translates a semantic transaction ([`ControlTransfer`] or
//!    [`VendorCmd`]) into the exact register writes the firmware expects,
//! 2. drives emulated execution until the firmware signals completion or a
//!    cycle budget runs out, and
//! 3. copies the firmware's response out of the shared output buffer.
//!
//! Two facades compose these pieces: [`UsbHost`] runs everything inline on
//! the calling thread over an exclusive borrow of the emulator, and
//! [`ThreadedUsbHost`] moves the emulator into a background worker so
//! transactions can be submitted from any thread.
//!
//! If an injected transaction never completes, that indicates a mismatch
//! between the injected state and what the firmware expects (or a genuine
//! firmware defect); the harness reports it as [`HostError::TransferTimeout`]
//! and never retries.

mod bus;
mod host;
mod inject;
mod poll;
mod threaded;
mod transfer;

pub use bus::{Bus, Emulator, LinkState, UsbStatus};
pub use host::{HostConfig, TransferResponse, UsbHost, DEFAULT_CYCLE_BUDGET};
pub use threaded::ThreadedUsbHost;
pub use transfer::{descriptor_type, request, ControlTransfer, VendorCmd};

/// Failure modes of a harness transaction.
///
/// None of these are fatal to the harness itself; every operation returns
/// `Result` and the caller decides whether to retry or fail the test.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    /// The emulator reported it cannot continue executing.
    #[error("execution halted after {cycles} cycles")]
    ExecutionHalted { cycles: u64 },

    /// The inner cycle budget ran out before the firmware cleared the
    /// completion indicators.
    #[error("transfer timeout after {budget} cycles")]
    TransferTimeout { budget: u64 },

    /// Threaded mode only: the worker did not deliver a response within the
    /// outer wall-clock timeout.
    #[error("no response from worker within {timeout:?}")]
    ResponseTimeout { timeout: std::time::Duration },

    /// Threaded mode only: submission after `stop()`, or the worker exited
    /// before replying.
    #[error("command queue is closed")]
    QueueClosed,
}

impl HostError {
    /// Emulated cycles consumed before the failure, where known.
    ///
    /// On [`HostError::TransferTimeout`] this is exactly the configured
    /// budget.
    pub fn cycles_consumed(&self) -> Option<u64> {
        match self {
            HostError::ExecutionHalted { cycles } => Some(*cycles),
            HostError::TransferTimeout { budget } => Some(*budget),
            HostError::ResponseTimeout { .. } | HostError::QueueClosed => None,
        }
    }
}
