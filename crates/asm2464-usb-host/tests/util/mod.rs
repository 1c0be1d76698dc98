//! Shared mock emulator for harness integration tests.
//!
//! `MockBridge` stands in for the 8051 emulator plus a scripted firmware
//! stub: after a configurable number of steps it services the injected
//! transaction against its own XDATA (vendor reads/writes persist; inbound
//! control transfers return canned descriptor bytes) and clears the
//! completion indicators, the way the real firmware does.

// Not every test binary exercises every knob on the fixture.
#![allow(dead_code)]

use asm2464_usb_host::{Bus, Emulator, LinkState};

const REG_USB_IRQ: u16 = 0xC802;
const REG_CMD_ADDR_HI: u16 = 0xCEB2;
const REG_CMD_ADDR_LO: u16 = 0xCEB3;
const REG_SETUP_BASE: u16 = 0x9E00;
const OUTPUT_BUF: u32 = 0x8000;

/// One firmware dispatch, recorded in processing order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirmwareOp {
    VendorWrite { addr: u32, value: u8 },
    VendorRead { addr: u32, size: u8 },
    Control { bm_request_type: u8, b_request: u8, w_value: u16, w_length: u16 },
}

pub struct MockBridge {
    pub regs: Vec<u8>,
    pub xdata: Vec<u8>,
    pub idata: [u8; 256],
    pub link: LinkState,
    pub cycles: u64,

    /// Whether the firmware reports the USB link up; flips to `true` once
    /// `cycles >= connect_after`.
    pub connect_after: u64,
    /// Steps a transaction takes to complete, counted from injection.
    pub completion_delay: u64,
    /// `step()` returns `false` once this many cycles have run.
    pub halt_after: Option<u64>,
    /// Wall-clock sleep per step, for tests that need the worker to be slow
    /// in real time.
    pub step_delay: Option<std::time::Duration>,
    /// Canned response bytes for inbound control transfers; the output
    /// region is filled with an index pattern past the end of this.
    pub descriptor: Vec<u8>,
    /// Every firmware dispatch, in the order it was serviced.
    pub ops: Vec<FirmwareOp>,

    steps_in_flight: u64,
}

impl MockBridge {
    pub fn new() -> Self {
        Self {
            regs: vec![0; 0x1_0000],
            xdata: vec![0; 0x2_0000],
            idata: [0; 256],
            link: LinkState::default(),
            cycles: 0,
            connect_after: 0,
            completion_delay: 1,
            halt_after: None,
            step_delay: None,
            descriptor: Vec::new(),
            ops: Vec::new(),
            steps_in_flight: 0,
        }
    }

    fn service_transaction(&mut self) {
        if self.link.control_transfer_active {
            let bm_request_type = self.regs[REG_SETUP_BASE as usize];
            let b_request = self.regs[REG_SETUP_BASE as usize + 1];
            let w_value = u16::from_le_bytes([
                self.regs[REG_SETUP_BASE as usize + 2],
                self.regs[REG_SETUP_BASE as usize + 3],
            ]);
            let w_length = u16::from_le_bytes([
                self.regs[REG_SETUP_BASE as usize + 6],
                self.regs[REG_SETUP_BASE as usize + 7],
            ]);
            if bm_request_type & 0x80 != 0 {
                let len = (w_length as usize).min(256);
                for i in 0..len {
                    let byte = self
                        .descriptor
                        .get(i)
                        .copied()
                        .unwrap_or(i as u8);
                    self.xdata[OUTPUT_BUF as usize + i] = byte;
                }
            }
            self.ops.push(FirmwareOp::Control {
                bm_request_type,
                b_request,
                w_value,
                w_length,
            });
        } else {
            let addr = u16::from_be_bytes([
                self.regs[REG_CMD_ADDR_HI as usize],
                self.regs[REG_CMD_ADDR_LO as usize],
            ]) as u32;
            match self.link.cmd_type {
                0xE5 => {
                    let value = self.link.pending_write_value;
                    self.xdata[addr as usize] = value;
                    self.link.dma_done = true;
                    self.ops.push(FirmwareOp::VendorWrite { addr, value });
                }
                0xE4 => {
                    let size = self.link.cmd_size;
                    for i in 0..size as usize {
                        self.xdata[OUTPUT_BUF as usize + i] = self.xdata[addr as usize + i];
                    }
                    self.ops.push(FirmwareOp::VendorRead { addr, size });
                }
                _ => {}
            }
        }

        self.link.control_transfer_active = false;
        self.link.cmd_pending = false;
        self.link.irq_pending = false;
        self.link.cmd_type = 0;
    }
}

impl Bus for MockBridge {
    fn write_reg(&mut self, addr: u16, value: u8) {
        // Every injection ends by raising the USB interrupt cause; use that
        // as the start-of-transaction marker so a re-injection over an
        // unfinished transaction restarts the completion countdown.
        if addr == REG_USB_IRQ {
            self.steps_in_flight = 0;
        }
        self.regs[addr as usize] = value;
    }

    fn read_reg(&self, addr: u16) -> u8 {
        self.regs[addr as usize]
    }

    fn write_xdata(&mut self, addr: u32, value: u8) {
        self.xdata[addr as usize] = value;
    }

    fn read_xdata(&self, addr: u32) -> u8 {
        self.xdata[addr as usize]
    }

    fn write_idata(&mut self, addr: u8, value: u8) {
        self.idata[addr as usize] = value;
    }
}

impl Emulator for MockBridge {
    fn step(&mut self) -> bool {
        if let Some(halt_after) = self.halt_after {
            if self.cycles >= halt_after {
                return false;
            }
        }
        if let Some(delay) = self.step_delay {
            std::thread::sleep(delay);
        }
        self.cycles += 1;

        if !self.link.transaction_complete() {
            self.steps_in_flight += 1;
            if self.steps_in_flight >= self.completion_delay {
                self.steps_in_flight = 0;
                self.service_transaction();
            }
        }
        true
    }

    fn cycles(&self) -> u64 {
        self.cycles
    }

    fn usb_connected(&self) -> bool {
        self.cycles >= self.connect_after
    }

    fn link(&mut self) -> &mut LinkState {
        &mut self.link
    }
}
