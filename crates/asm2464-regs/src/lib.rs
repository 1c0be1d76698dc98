#![forbid(unsafe_code)]

//! Reverse-engineered MMIO register map and injection tables for the
//! ASM2464PD USB/PCIe bridge firmware.
//!
//! This crate exists so the host-side injection protocol
//! (`asm2464-usb-host`) and anything else poking at emulator state agree on
//! addresses and magic values that must match the firmware exactly. Every
//! value here was recovered by tracing firmware execution; treat the tables
//! as a wire format, not as tunables.

/// Base of the 8-byte setup-packet staging block (`0x9E00..=0x9E07`).
///
/// The firmware's EP0 handler reads the setup packet from here; the harness
/// also mirrors it into the EP0 buffer because different firmware code paths
/// read different copies.
pub const REG_SETUP_BASE: u16 = 0x9E00;

/// USB connection/activity status register.
///
/// Bit 7 = connected, bit 0 = transaction active. Control transfers write
/// `0x81` (connected + active); vendor commands write `0x80` (connected,
/// vendor dispatch path).
pub const REG_USB_STATUS: u16 = 0x9000;

/// USB interrupt cause register. `0x01` for control transfers, `0x05` for
/// vendor commands.
pub const REG_USB_IRQ: u16 = 0xC802;

/// Endpoint configuration register.
///
/// Bit 5 selects the vendor dispatch path. `0x0B` (bits 0,1,3) routes
/// standard/class requests; `0x21` (bits 0,5) routes vendor requests.
pub const REG_EP_CONFIG: u16 = 0x9101;

/// EP0 arming register; `0x40` (bit 6) arms EP0 for a standard/class
/// transfer. Not written on the vendor path.
pub const REG_EP0_ARM: u16 = 0x9301;

/// EP0 "setup received" status. Always `0x08` on injection.
pub const REG_EP0_SETUP: u16 = 0x91D1;

/// Current endpoint index. Always `0x01` on injection.
pub const REG_EP_INDEX: u16 = 0x9118;

/// Endpoint state register; bits 2-3 (`0x0C`) must be set.
pub const REG_EP_STATE: u16 = 0x92F8;

/// USB mode register; cleared to `0x00` so the trigger register check at
/// `REG_USB_TRIGGER` passes.
pub const REG_USB_MODE: u16 = 0x9002;

/// Handler trigger register; `0x02` kicks the EP0 dispatcher.
pub const REG_USB_TRIGGER: u16 = 0x9091;

/// Primary polling-loop exit condition (bit 0).
pub const REG_POLL_EXIT: u16 = 0xE712;

/// Backup polling-loop exit condition (bit 1).
pub const REG_POLL_EXIT_ALT: u16 = 0xCC11;

/// PCIe link state register consulted on the control-transfer path;
/// `0x03` = link active.
pub const REG_PCIE_STATE: u16 = 0xB480;

/// Base of the 6-byte vendor CDB staging block (`0x910D..=0x9112`).
pub const REG_CDB_BASE: u16 = 0x910D;

/// Vendor command target address, high byte.
pub const REG_CMD_ADDR_HI: u16 = 0xCEB2;

/// Vendor command target address, low byte.
pub const REG_CMD_ADDR_LO: u16 = 0xCEB3;

/// Vendor command kind: `0x04` = read, `0x05` = write.
pub const REG_CMD_KIND: u16 = 0xCEB0;

/// PCIe link status checked by the vendor dispatcher; bits 0-2 must all be
/// set (`0x07`) or the command is silently ignored.
pub const REG_PCIE_LINK: u16 = 0xB432;

/// Second link-ready indication; bit 1 (`0x02`) must be set together with
/// [`REG_PCIE_LINK`] before the vendor dispatcher honors a command.
pub const REG_LINK_READY: u16 = 0xE765;

/// XDATA address the firmware DMAs response data to.
pub const XDATA_OUTPUT_BUF: u32 = 0x8000;

/// Capacity of the output region in bytes; inbound control-transfer payloads
/// are clamped to this.
pub const OUTPUT_BUF_CAP: usize = 256;

/// XDATA mirror of the vendor CDB (6 bytes at `0x0002..=0x0007`).
pub const XDATA_CDB_MIRROR: u32 = 0x0002;

/// Vendor-command flag byte; overlaps the CDB mirror by design (the firmware
/// re-reads `0x0003` as a flag after the CDB has been consumed).
pub const XDATA_VENDOR_FLAG: u32 = 0x0003;

/// Vendor dispatch gate; must be zero or the handler exits early.
pub const XDATA_DISPATCH_GATE: u32 = 0x07EC;

/// Command slot count; must be non-zero or the vendor handler returns before
/// dispatch. The firmware also copies this value over
/// [`XDATA_PORT_INDEX`], which is why slot 1 markers matter (see
/// [`XDATA_SLOT_TABLE`]).
pub const XDATA_SLOT_COUNT: u32 = 0x05A5;

/// Port index consulted during slot selection. Overwritten by the firmware
/// with the slot count, so the injected value is only a safe default.
pub const XDATA_PORT_INDEX: u32 = 0x05A3;

/// Base of the command marker table; slot `i` lives at
/// `XDATA_SLOT_TABLE + i * XDATA_SLOT_STRIDE`.
///
/// The firmware XORs the marker with `0x04` (read) or `0x05` (write) to
/// classify the pending command. Because the slot count is copied over the
/// port index, dispatch reads slot 1; the harness populates slots 0 and 1 so
/// either code path sees a marker.
pub const XDATA_SLOT_TABLE: u32 = 0x05B1;

/// Stride between command marker slots.
pub const XDATA_SLOT_STRIDE: u32 = 0x22;

/// PCIe enumeration-complete flag.
pub const XDATA_PCIE_ENUM_DONE: u32 = 0x0AF7;

/// PCIe link state byte.
pub const XDATA_PCIE_LINK_STATE: u32 = 0x053F;

/// Port state byte consulted on the control-transfer path; must not be 4.
/// Shares an address with slot 0 of [`XDATA_SLOT_TABLE`].
pub const XDATA_PORT_STATE: u32 = 0x05B1;

/// Main-loop descriptor-handler state; `0x05` makes the main loop service
/// EP0 work.
pub const XDATA_USB_HANDLER_STATE: u32 = 0x07E1;

/// IRAM byte holding the USB device state; `5` = configured.
pub const IDATA_USB_STATE: u8 = 0x6A;

/// Value written to [`IDATA_USB_STATE`] on injection.
pub const USB_STATE_CONFIGURED: u8 = 5;

/// Vendor read opcode (read XDATA over USB).
pub const VENDOR_OP_READ: u8 = 0xE4;

/// Vendor write opcode (write XDATA over USB).
pub const VENDOR_OP_WRITE: u8 = 0xE5;

/// High-order selector tag folded into vendor command addresses.
///
/// The logical address space is 17 bits; the tag distinguishes these
/// accesses from ordinary bus addressing in the firmware's address decoder.
pub const VENDOR_ADDR_TAG: u32 = 0x50_0000;

/// Mask for the logical portion of a vendor command address.
pub const VENDOR_ADDR_MASK: u32 = 0x1_FFFF;

/// Request class decoded from bits 5-6 of `bmRequestType`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestClass {
    Standard,
    Class,
    Vendor,
}

impl RequestClass {
    /// Classify a `bmRequestType` byte.
    pub const fn from_request_type(bm_request_type: u8) -> Self {
        match bm_request_type & 0x60 {
            0x00 => RequestClass::Standard,
            0x20 => RequestClass::Class,
            _ => RequestClass::Vendor,
        }
    }
}

/// Per-class register writes that route an injected control transfer to the
/// right firmware dispatch path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InjectionProfile {
    /// Value written to [`REG_EP_CONFIG`].
    pub ep_config: u8,
    /// Value written to [`REG_EP0_ARM`], when the class requires arming EP0.
    pub ep0_arm: Option<u8>,
}

/// Fixed class-to-register-value mapping. Deviating from these tuples breaks
/// firmware dispatch.
pub const fn injection_profile(class: RequestClass) -> InjectionProfile {
    match class {
        RequestClass::Standard | RequestClass::Class => InjectionProfile {
            ep_config: 0x0B,
            ep0_arm: Some(0x40),
        },
        RequestClass::Vendor => InjectionProfile {
            ep_config: 0x21,
            ep0_arm: None,
        },
    }
}

/// Fold a logical XDATA address into the tagged vendor address format.
pub const fn tagged_vendor_addr(addr: u32) -> u32 {
    (addr & VENDOR_ADDR_MASK) | VENDOR_ADDR_TAG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_class_decodes_bits_5_and_6() {
        assert_eq!(RequestClass::from_request_type(0x80), RequestClass::Standard);
        assert_eq!(RequestClass::from_request_type(0x00), RequestClass::Standard);
        assert_eq!(RequestClass::from_request_type(0xA1), RequestClass::Class);
        assert_eq!(RequestClass::from_request_type(0x21), RequestClass::Class);
        assert_eq!(RequestClass::from_request_type(0xC0), RequestClass::Vendor);
        assert_eq!(RequestClass::from_request_type(0x40), RequestClass::Vendor);
        assert_eq!(RequestClass::from_request_type(0x60), RequestClass::Vendor);
    }

    #[test]
    fn injection_profiles_match_traced_firmware_values() {
        let std = injection_profile(RequestClass::Standard);
        assert_eq!(std.ep_config, 0x0B);
        assert_eq!(std.ep0_arm, Some(0x40));

        let class = injection_profile(RequestClass::Class);
        assert_eq!(class, std);

        let vendor = injection_profile(RequestClass::Vendor);
        assert_eq!(vendor.ep_config, 0x21);
        assert_eq!(vendor.ep0_arm, None);
    }

    #[test]
    fn vendor_address_tagging() {
        assert_eq!(tagged_vendor_addr(0x0100), 0x50_0100);
        assert_eq!(tagged_vendor_addr(0x1_FFFF), 0x51_FFFF);
        // The tag survives out-of-range logical addresses.
        assert_eq!(tagged_vendor_addr(0xFFFF_FFFF), 0x51_FFFF);
    }

    #[test]
    fn slot_table_layout() {
        // Slot 1 is the slot the firmware actually dispatches from.
        assert_eq!(XDATA_SLOT_TABLE + XDATA_SLOT_STRIDE, 0x05D3);
        assert_eq!(XDATA_SLOT_TABLE + 2 * XDATA_SLOT_STRIDE, 0x05F5);
    }

    #[test]
    fn register_map_pins_traced_addresses() {
        assert_eq!(REG_SETUP_BASE, 0x9E00);
        assert_eq!(REG_USB_STATUS, 0x9000);
        assert_eq!(REG_USB_IRQ, 0xC802);
        assert_eq!(REG_CDB_BASE, 0x910D);
        assert_eq!(REG_CMD_KIND, 0xCEB0);
        assert_eq!((REG_PCIE_LINK, REG_LINK_READY), (0xB432, 0xE765));
        assert_eq!(XDATA_OUTPUT_BUF, 0x8000);
        assert_eq!(OUTPUT_BUF_CAP, 256);
    }
}
