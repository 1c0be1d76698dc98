//! Transaction descriptors: control transfers and vendor commands.

use asm2464_regs::{tagged_vendor_addr, RequestClass, VENDOR_OP_READ, VENDOR_OP_WRITE};

/// Standard USB request codes used by the convenience operations.
pub mod request {
    pub const GET_STATUS: u8 = 0x00;
    pub const CLEAR_FEATURE: u8 = 0x01;
    pub const SET_FEATURE: u8 = 0x03;
    pub const SET_ADDRESS: u8 = 0x05;
    pub const GET_DESCRIPTOR: u8 = 0x06;
    pub const SET_DESCRIPTOR: u8 = 0x07;
    pub const GET_CONFIGURATION: u8 = 0x08;
    pub const SET_CONFIGURATION: u8 = 0x09;
    pub const GET_INTERFACE: u8 = 0x0A;
    pub const SET_INTERFACE: u8 = 0x0B;
}

/// Standard USB descriptor types.
pub mod descriptor_type {
    pub const DEVICE: u8 = 0x01;
    pub const CONFIGURATION: u8 = 0x02;
    pub const STRING: u8 = 0x03;
    pub const INTERFACE: u8 = 0x04;
    pub const ENDPOINT: u8 = 0x05;
    pub const BOS: u8 = 0x0F;
}

/// A USB control transfer as seen by the host: the 8-byte setup packet plus
/// an optional payload for OUT transfers.
///
/// Built per call and immutable; `w_length` bounds the response size for IN
/// transfers and the payload size for OUT transfers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlTransfer {
    pub bm_request_type: u8,
    pub b_request: u8,
    pub w_value: u16,
    pub w_index: u16,
    pub w_length: u16,
    /// Payload for OUT transfers. Carried for the caller's benefit; the
    /// firmware path exercised by this harness has no OUT data stage.
    pub data: Vec<u8>,
}

impl ControlTransfer {
    /// True for device-to-host (IN) transfers.
    pub fn is_device_to_host(&self) -> bool {
        (self.bm_request_type & 0x80) != 0
    }

    /// Request class decoded from `bm_request_type`.
    pub fn class(&self) -> RequestClass {
        RequestClass::from_request_type(self.bm_request_type)
    }

    /// The wire-format 8-byte setup packet (multi-byte fields
    /// little-endian).
    pub fn setup_bytes(&self) -> [u8; 8] {
        [
            self.bm_request_type,
            self.b_request,
            self.w_value as u8,
            (self.w_value >> 8) as u8,
            self.w_index as u8,
            (self.w_index >> 8) as u8,
            self.w_length as u8,
            (self.w_length >> 8) as u8,
        ]
    }
}

/// A vendor read/write command against firmware XDATA.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VendorCmd {
    /// Read `size` bytes starting at `addr`.
    Read { addr: u32, size: u8 },
    /// Write `value` to `addr`.
    Write { addr: u32, value: u8 },
}

impl VendorCmd {
    /// The ASMedia vendor opcode (0xE4 read / 0xE5 write).
    pub fn opcode(&self) -> u8 {
        match self {
            VendorCmd::Read { .. } => VENDOR_OP_READ,
            VendorCmd::Write { .. } => VENDOR_OP_WRITE,
        }
    }

    /// Target XDATA address.
    pub fn addr(&self) -> u32 {
        match self {
            VendorCmd::Read { addr, .. } | VendorCmd::Write { addr, .. } => *addr,
        }
    }

    /// Byte count for reads, zero for writes.
    pub fn size(&self) -> u8 {
        match self {
            VendorCmd::Read { size, .. } => *size,
            VendorCmd::Write { .. } => 0,
        }
    }

    /// The 6-byte command block: opcode, size-or-value, then the tagged
    /// address big-endian across three bytes, zero-padded.
    pub fn cdb(&self) -> [u8; 6] {
        let tagged = tagged_vendor_addr(self.addr());
        let second = match self {
            VendorCmd::Read { size, .. } => *size,
            VendorCmd::Write { value, .. } => *value,
        };
        [
            self.opcode(),
            second,
            (tagged >> 16) as u8,
            (tagged >> 8) as u8,
            tagged as u8,
            0x00,
        ]
    }
}
