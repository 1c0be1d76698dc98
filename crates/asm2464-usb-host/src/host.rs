//! Synchronous host facade: injection + polling + extraction, inline on the
//! calling thread.

use std::time::Duration;

use asm2464_regs as regs;

use crate::bus::Emulator;
use crate::transfer::{request, ControlTransfer, VendorCmd};
use crate::{inject, poll, HostError};

/// Default inner cycle budget for a single transaction.
pub const DEFAULT_CYCLE_BUDGET: u64 = 1_000_000;

/// Host tuning knobs shared by both facades.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Inner per-transaction cycle budget for the completion poller.
    pub cycle_budget: u64,
    /// Threaded mode only: outer wall-clock timeout a caller waits on its
    /// response before giving up on the worker.
    pub response_timeout: Duration,
    /// Threaded mode only: how long `start()` waits for the firmware to
    /// bring the USB link up before reporting failure.
    pub connect_timeout: Duration,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            cycle_budget: DEFAULT_CYCLE_BUDGET,
            response_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Outcome of a completed transaction.
///
/// Success only means the poller observed completion within budget; whether
/// the payload content is semantically correct is the caller's concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferResponse {
    /// Response bytes, empty for outbound transfers and vendor writes.
    pub data: Vec<u8>,
    /// Emulated cycles consumed by the transaction.
    pub cycles: u64,
}

/// Read back the response for a completed control transfer.
pub(crate) fn extract_control_response<E: Emulator>(
    emu: &E,
    xfer: &ControlTransfer,
    cycles: u64,
) -> TransferResponse {
    let data = if xfer.is_device_to_host() {
        let len = (xfer.w_length as usize).min(regs::OUTPUT_BUF_CAP);
        read_output_buf(emu, len)
    } else {
        Vec::new()
    };
    TransferResponse { data, cycles }
}

/// Read back the response for a completed vendor command.
pub(crate) fn extract_vendor_response<E: Emulator>(
    emu: &E,
    cmd: &VendorCmd,
    cycles: u64,
) -> TransferResponse {
    let data = match cmd {
        VendorCmd::Read { size, .. } => read_output_buf(emu, *size as usize),
        VendorCmd::Write { .. } => Vec::new(),
    };
    TransferResponse { data, cycles }
}

fn read_output_buf<E: Emulator>(emu: &E, len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| emu.read_xdata(regs::XDATA_OUTPUT_BUF + i as u32))
        .collect()
}

/// Blocking host facade over an exclusively borrowed emulator.
///
/// The exclusive borrow enforces the single-in-flight invariant: only one
/// facade can drive a given emulator, and it issues every execution unit
/// itself. Injecting a second transaction before the first completes simply
/// overwrites the injected state (last write wins).
pub struct UsbHost<'a, E: Emulator> {
    emu: &'a mut E,
    config: HostConfig,
}

impl<'a, E: Emulator> UsbHost<'a, E> {
    pub fn new(emu: &'a mut E) -> Self {
        Self::with_config(emu, HostConfig::default())
    }

    pub fn with_config(emu: &'a mut E, config: HostConfig) -> Self {
        Self { emu, config }
    }

    /// Inner cycle budget used for every transaction on this facade.
    pub fn cycle_budget(&self) -> u64 {
        self.config.cycle_budget
    }

    /// Perform a complete control transfer: inject, poll, extract.
    pub fn control_transfer(
        &mut self,
        xfer: &ControlTransfer,
    ) -> Result<TransferResponse, HostError> {
        inject::inject_control_transfer(self.emu, xfer);
        let cycles = poll::run_until_complete(self.emu, self.config.cycle_budget)?;
        Ok(extract_control_response(self.emu, xfer, cycles))
    }

    /// Fetch a descriptor via a standard GET_DESCRIPTOR request.
    pub fn get_descriptor(
        &mut self,
        desc_type: u8,
        desc_index: u8,
        length: u16,
    ) -> Result<TransferResponse, HostError> {
        self.control_transfer(&ControlTransfer {
            bm_request_type: 0x80,
            b_request: request::GET_DESCRIPTOR,
            w_value: ((desc_type as u16) << 8) | desc_index as u16,
            w_index: 0,
            w_length: length,
            data: Vec::new(),
        })
    }

    /// Read `size` bytes of firmware XDATA at `addr`.
    pub fn vendor_read(&mut self, addr: u32, size: u8) -> Result<TransferResponse, HostError> {
        self.vendor_cmd(&VendorCmd::Read { addr, size })
    }

    /// Write one byte of firmware XDATA at `addr`.
    pub fn vendor_write(&mut self, addr: u32, value: u8) -> Result<TransferResponse, HostError> {
        self.vendor_cmd(&VendorCmd::Write { addr, value })
    }

    fn vendor_cmd(&mut self, cmd: &VendorCmd) -> Result<TransferResponse, HostError> {
        inject::inject_vendor_cmd(self.emu, cmd);
        let cycles = poll::run_until_complete(self.emu, self.config.cycle_budget)?;
        Ok(extract_vendor_response(self.emu, cmd, cycles))
    }
}
