//! Register injection protocol.
//!
//! Translates a transaction descriptor into the fixed set of register and
//! scratch-memory writes that stand in for a genuine USB hardware event.
//! The mapping is reverse-engineered from firmware traces and must be
//! reproduced exactly; a mismatch does not fail here (injection is
//! infallible) but shows up later as a poller timeout.

use asm2464_regs as regs;
use asm2464_regs::injection_profile;

use crate::bus::{Emulator, UsbStatus};
use crate::transfer::{ControlTransfer, VendorCmd};

/// Present a control transfer to the firmware.
pub fn inject_control_transfer<E: Emulator>(emu: &mut E, xfer: &ControlTransfer) {
    // Stale bytes in the output region would read back as a response.
    let clear_len = (xfer.w_length as usize).min(regs::OUTPUT_BUF_CAP);
    for i in 0..clear_len {
        emu.write_xdata(regs::XDATA_OUTPUT_BUF + i as u32, 0x00);
    }

    // Setup packet into the staging registers and the EP0 buffer; firmware
    // reads whichever copy its current code path uses.
    let setup = xfer.setup_bytes();
    for (i, byte) in setup.iter().enumerate() {
        emu.write_reg(regs::REG_SETUP_BASE + i as u16, *byte);
    }
    let link = emu.link();
    link.ep0_buf[..setup.len()].copy_from_slice(&setup);
    link.control_transfer_active = true;
    link.reset_for_transaction();

    emu.write_reg(
        regs::REG_USB_STATUS,
        (UsbStatus::CONNECTED | UsbStatus::ACTIVE).bits(),
    );
    emu.write_reg(regs::REG_USB_IRQ, 0x01);

    // Route to the standard/class or vendor dispatch path.
    let profile = injection_profile(xfer.class());
    emu.write_reg(regs::REG_EP_CONFIG, profile.ep_config);
    if let Some(arm) = profile.ep0_arm {
        emu.write_reg(regs::REG_EP0_ARM, arm);
    }

    // Endpoint status block.
    emu.write_reg(regs::REG_EP0_SETUP, 0x08);
    emu.write_reg(regs::REG_EP_INDEX, 0x01);
    emu.write_reg(regs::REG_EP_STATE, 0x0C);
    emu.write_reg(regs::REG_USB_MODE, 0x00);
    emu.write_reg(regs::REG_USB_TRIGGER, 0x02);

    // Firmware polling-loop exit conditions.
    emu.write_reg(regs::REG_POLL_EXIT, 0x01);
    emu.write_reg(regs::REG_POLL_EXIT_ALT, 0x02);

    emu.write_reg(regs::REG_PCIE_STATE, 0x03);

    // Scratch state the EP0 handler and main loop consult.
    emu.write_idata(regs::IDATA_USB_STATE, regs::USB_STATE_CONFIGURED);
    emu.write_xdata(regs::XDATA_PCIE_ENUM_DONE, 0x01);
    emu.write_xdata(regs::XDATA_PCIE_LINK_STATE, 0x01);
    emu.write_xdata(regs::XDATA_PORT_INDEX, 0x00);
    emu.write_xdata(regs::XDATA_PORT_STATE, 0x03);
    emu.write_xdata(regs::XDATA_USB_HANDLER_STATE, 0x05);

    let link = emu.link();
    link.cmd_pending = true;
    link.irq_pending = true;

    tracing::debug!(
        bm_request_type = format_args!("{:#04x}", xfer.bm_request_type),
        b_request = format_args!("{:#04x}", xfer.b_request),
        w_value = format_args!("{:#06x}", xfer.w_value),
        w_length = xfer.w_length,
        "injected control transfer"
    );
}

/// Present a vendor read/write command to the firmware.
pub fn inject_vendor_cmd<E: Emulator>(emu: &mut E, cmd: &VendorCmd) {
    let cdb = cmd.cdb();
    let addr = cmd.addr();

    // The CDB is replicated into every buffer the firmware is known to read
    // from; which copy is consulted depends on the dispatch path taken.
    for (i, byte) in cdb.iter().enumerate() {
        emu.write_reg(regs::REG_CDB_BASE + i as u16, *byte);
    }
    let link = emu.link();
    link.ep_data_buf[..cdb.len()].copy_from_slice(&cdb);
    link.ep0_buf[..cdb.len()].copy_from_slice(&cdb);
    link.ep0_len = cdb.len();

    // Side channels used by completion detection in the device model.
    link.cmd_type = cmd.opcode();
    link.cmd_size = cmd.size();
    if let VendorCmd::Write { value, .. } = cmd {
        link.pending_write_value = *value;
    }

    // Target address registers.
    emu.write_reg(regs::REG_CMD_ADDR_HI, (addr >> 8) as u8);
    emu.write_reg(regs::REG_CMD_ADDR_LO, addr as u8);
    let kind = match cmd {
        VendorCmd::Read { .. } => 0x04,
        VendorCmd::Write { .. } => 0x05,
    };
    emu.write_reg(regs::REG_CMD_KIND, kind);

    // Setup-packet registers mirroring the command.
    let direction = match cmd {
        VendorCmd::Read { .. } => 0xC0,
        VendorCmd::Write { .. } => 0x40,
    };
    emu.write_reg(regs::REG_SETUP_BASE, direction);
    emu.write_reg(regs::REG_SETUP_BASE + 1, cmd.opcode());
    emu.write_reg(regs::REG_SETUP_BASE + 2, addr as u8);
    emu.write_reg(regs::REG_SETUP_BASE + 3, (addr >> 8) as u8);
    // Writes mirror a single data byte here even though the side-channel
    // size stays 0; the firmware expects exactly this shape.
    let wire_size = match cmd {
        VendorCmd::Read { size, .. } => *size,
        VendorCmd::Write { .. } => 1,
    };
    emu.write_reg(regs::REG_SETUP_BASE + 6, wire_size);

    emu.write_reg(regs::REG_USB_STATUS, UsbStatus::CONNECTED.bits());
    emu.write_reg(regs::REG_EP_CONFIG, 0x21);
    emu.write_reg(regs::REG_USB_IRQ, 0x05);

    // Both link-ready indications must be set or the vendor dispatcher
    // silently ignores the command.
    emu.write_reg(regs::REG_PCIE_LINK, 0x07);
    emu.write_reg(regs::REG_LINK_READY, 0x02);

    let link = emu.link();
    link.cmd_pending = true;
    link.irq_pending = true;
    link.reset_for_transaction();
    // The ISR falls through to the main loop instead of executing RETI, so
    // the interrupt latch must be cleared by hand to re-arm.
    link.in_interrupt = false;

    emu.write_idata(regs::IDATA_USB_STATE, regs::USB_STATE_CONFIGURED);

    // CDB mirror plus the vendor-command flag overlapping it.
    for (i, byte) in cdb.iter().enumerate() {
        emu.write_xdata(regs::XDATA_CDB_MIRROR + i as u32, *byte);
    }
    emu.write_xdata(regs::XDATA_VENDOR_FLAG, 0x08);

    // Dispatch gate must be clear and the slot count non-zero, or the
    // handler exits before reaching the command.
    emu.write_xdata(regs::XDATA_DISPATCH_GATE, 0x00);
    emu.write_xdata(regs::XDATA_SLOT_COUNT, 0x01);
    emu.write_xdata(regs::XDATA_PORT_INDEX, 0x00);

    // Slot markers: the firmware copies the slot count over the port index
    // and dispatches from slot 1, but slot 0 is populated as well so either
    // path classifies the command correctly.
    let marker = match cmd {
        VendorCmd::Read { .. } => 0x04,
        VendorCmd::Write { .. } => 0x05,
    };
    emu.write_xdata(regs::XDATA_SLOT_TABLE, marker);
    emu.write_xdata(regs::XDATA_SLOT_TABLE + regs::XDATA_SLOT_STRIDE, marker);

    emu.write_xdata(regs::XDATA_PCIE_ENUM_DONE, 0x01);
    emu.write_xdata(regs::XDATA_PCIE_LINK_STATE, 0x01);

    tracing::debug!(
        opcode = format_args!("{:#04x}", cmd.opcode()),
        addr = format_args!("{:#06x}", addr),
        "injected vendor command"
    );
}
