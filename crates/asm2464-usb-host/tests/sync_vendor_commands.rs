mod util;

use asm2464_usb_host::{HostConfig, HostError, UsbHost};
use util::{FirmwareOp, MockBridge};

fn config(cycle_budget: u64) -> HostConfig {
    HostConfig {
        cycle_budget,
        ..HostConfig::default()
    }
}

#[test]
fn vendor_write_then_read_round_trips() {
    let mut emu = MockBridge::new();
    let mut host = UsbHost::with_config(&mut emu, config(10));

    let write = host.vendor_write(0x0100, 0x55).expect("vendor write");
    assert!(write.data.is_empty());
    assert_eq!(write.cycles, 1);

    let read = host.vendor_read(0x0100, 1).expect("vendor read");
    assert_eq!(read.data, vec![0x55]);

    assert_eq!(
        emu.ops,
        vec![
            FirmwareOp::VendorWrite { addr: 0x0100, value: 0x55 },
            FirmwareOp::VendorRead { addr: 0x0100, size: 1 },
        ]
    );
}

#[test]
fn multi_byte_vendor_read() {
    let mut emu = MockBridge::new();
    emu.xdata[0x0200..0x0204].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);

    let mut host = UsbHost::new(&mut emu);
    let read = host.vendor_read(0x0200, 4).expect("vendor read");
    assert_eq!(read.data, vec![0xDE, 0xAD, 0xBE, 0xEF]);
}

#[test]
fn budget_exhaustion_reports_transfer_timeout_with_budget_cycles() {
    let mut emu = MockBridge::new();
    emu.completion_delay = 5;

    let mut host = UsbHost::with_config(&mut emu, config(3));
    let err = host.vendor_write(0x0100, 0x01).unwrap_err();
    assert_eq!(err, HostError::TransferTimeout { budget: 3 });
    assert_eq!(err.cycles_consumed(), Some(3));
}

#[test]
fn emulator_halt_reports_cycles_run_so_far() {
    let mut emu = MockBridge::new();
    emu.completion_delay = 100;
    emu.halt_after = Some(4);

    let mut host = UsbHost::with_config(&mut emu, config(1000));
    let err = host.vendor_write(0x0100, 0x01).unwrap_err();
    assert_eq!(err, HostError::ExecutionHalted { cycles: 4 });
}

#[test]
fn reinjection_over_unfinished_transaction_is_last_write_wins() {
    let mut emu = MockBridge::new();
    emu.completion_delay = 20;

    // First write times out while still in flight.
    let mut host = UsbHost::with_config(&mut emu, config(5));
    let err = host.vendor_write(0x0100, 0xAA).unwrap_err();
    assert!(matches!(err, HostError::TransferTimeout { .. }));

    // A fresh injection overwrites the pending one cleanly: the completion
    // countdown restarts, and the firmware services only the second write.
    let mut host = UsbHost::with_config(&mut emu, config(50));
    let resp = host.vendor_write(0x0100, 0xBB).expect("second write");
    assert_eq!(resp.cycles, 20);
    assert_eq!(emu.xdata[0x0100], 0xBB);
    assert_eq!(
        emu.ops,
        vec![FirmwareOp::VendorWrite { addr: 0x0100, value: 0xBB }]
    );
}

#[test]
fn no_completion_in_zero_steps() {
    // Even an instantly-completing firmware needs one execution unit.
    let mut emu = MockBridge::new();
    emu.completion_delay = 1;

    let mut host = UsbHost::new(&mut emu);
    let resp = host.vendor_write(0x0100, 0x01).expect("write");
    assert!(resp.cycles >= 1);
}
