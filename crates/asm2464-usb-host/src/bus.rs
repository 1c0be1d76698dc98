//! Contract the harness requires from the emulator collaborator.
//!
//! The emulator (8051 core, memory spaces, MMIO decode) lives outside this
//! crate; the harness only needs byte-level access to its register file and
//! memory spaces plus a way to advance execution. Tests implement these
//! traits with a scripted mock.

use bitflags::bitflags;

bitflags! {
    /// Bits of the USB connection/activity status register
    /// ([`asm2464_regs::REG_USB_STATUS`]).
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct UsbStatus: u8 {
        /// A transaction is being presented to the firmware.
        const ACTIVE = 0x01;
        /// The USB link is up.
        const CONNECTED = 0x80;
    }
}

/// Byte-level access to the emulator's register file and memory spaces.
pub trait Bus {
    /// Write one MMIO register.
    fn write_reg(&mut self, addr: u16, value: u8);

    /// Read one MMIO register.
    fn read_reg(&self, addr: u16) -> u8;

    /// Write one byte of external data memory.
    fn write_xdata(&mut self, addr: u32, value: u8);

    /// Read one byte of external data memory.
    fn read_xdata(&self, addr: u32) -> u8;

    /// Write one byte of internal RAM.
    fn write_idata(&mut self, addr: u8, value: u8);
}

/// Execution surface of the emulator.
pub trait Emulator: Bus {
    /// Execute one unit (instruction or bounded cycle batch). Returns
    /// `false` when the emulator cannot continue.
    fn step(&mut self) -> bool;

    /// Monotonic cycle counter.
    fn cycles(&self) -> u64;

    /// Whether the firmware has brought the USB link up.
    fn usb_connected(&self) -> bool;

    /// Transient USB-link side-channel state shared between the harness and
    /// the device model.
    fn link(&mut self) -> &mut LinkState;
}

/// Per-emulator transient state signaling an in-flight transaction.
///
/// The harness sets these on injection; the firmware/device model clears the
/// completion indicators as it processes the request. At most one
/// transaction is in flight per emulator instance, so a fresh injection may
/// freely overwrite all of this (last write wins).
#[derive(Debug, Clone)]
pub struct LinkState {
    /// Completion indicator: a control transfer is being processed.
    pub control_transfer_active: bool,
    /// Completion indicator: a command awaits firmware dispatch. Both this
    /// and `control_transfer_active` must clear before a transaction counts
    /// as finished.
    pub cmd_pending: bool,

    /// A USB interrupt condition is pending toward the CPU model.
    pub irq_pending: bool,
    /// CPU interrupt-latched flag. The firmware's ISR does not execute RETI;
    /// it falls through to the polling main loop, so the harness clears this
    /// explicitly to let a fresh interrupt fire.
    pub in_interrupt: bool,

    /// Opcode of the pending vendor command (0xE4/0xE5), or 0.
    pub cmd_type: u8,
    /// Byte count of a pending vendor read.
    pub cmd_size: u8,
    /// Value of a pending vendor write, held until the device model applies
    /// it.
    pub pending_write_value: u8,
    /// Device-model flag: the vendor write DMA has been applied.
    pub dma_done: bool,

    /// EP0 buffer; firmware reads setup/CDB bytes from here on some paths.
    pub ep0_buf: [u8; 64],
    /// Valid length of `ep0_buf`.
    pub ep0_len: usize,
    /// Secondary endpoint data buffer; another copy of the CDB lives here.
    pub ep_data_buf: [u8; 64],

    /// Device-model read counter for the setup registers, reset per
    /// transaction.
    pub setup_reads: u32,
    /// Device-model read counter for the status registers, reset per
    /// transaction.
    pub status_reads: u32,
}

impl Default for LinkState {
    fn default() -> Self {
        Self {
            control_transfer_active: false,
            cmd_pending: false,
            irq_pending: false,
            in_interrupt: false,
            cmd_type: 0,
            cmd_size: 0,
            pending_write_value: 0,
            dma_done: false,
            ep0_buf: [0; 64],
            ep0_len: 0,
            ep_data_buf: [0; 64],
            setup_reads: 0,
            status_reads: 0,
        }
    }
}

impl LinkState {
    /// Reset the per-transaction counters and flags before a new injection.
    pub fn reset_for_transaction(&mut self) {
        self.setup_reads = 0;
        self.status_reads = 0;
        self.dma_done = false;
    }

    /// True once the firmware has cleared both completion indicators.
    pub fn transaction_complete(&self) -> bool {
        !self.control_transfer_active && !self.cmd_pending
    }
}
