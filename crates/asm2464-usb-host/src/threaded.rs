//! Threaded host facade: a background worker owns the emulator and serves
//! transactions submitted from other threads.
//!
//! Exactly one worker thread ever touches emulator state; callers
//! communicate only through the command channel, so shared emulator memory
//! needs no locking by construction. Commands are processed strictly in
//! submission order. Each command carries its own reply channel, so a
//! response can never be delivered to the wrong caller even when several
//! threads submit concurrently.
//!
//! The worker drives completion itself, one step at a time, instead of
//! delegating to the synchronous poller. That keeps the stop signal
//! observable between steps even while a transaction is in flight, so
//! `stop()` joins promptly no matter what the worker is doing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::bus::Emulator;
use crate::host::{extract_control_response, extract_vendor_response, HostConfig, TransferResponse};
use crate::transfer::{request, ControlTransfer, VendorCmd};
use crate::{inject, HostError};

type Reply = Sender<Result<TransferResponse, HostError>>;

enum Command {
    Control { xfer: ControlTransfer, reply: Reply },
    Vendor { cmd: VendorCmd, reply: Reply },
}

enum Pending {
    Control(ControlTransfer),
    Vendor(VendorCmd),
}

/// A transaction the worker has injected and is stepping to completion.
struct InFlight {
    pending: Pending,
    reply: Reply,
    start_cycles: u64,
}

const CONNECT_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Thread-safe host facade with a `Stopped -> Running -> Stopped` lifecycle.
///
/// While running, the emulator lives inside the worker thread; `stop()`
/// recovers it so the host can be restarted or the emulator inspected.
pub struct ThreadedUsbHost<E: Emulator + Send + 'static> {
    config: HostConfig,
    /// Parked emulator while stopped; `None` while the worker owns it.
    emu: Option<E>,
    worker: Option<JoinHandle<E>>,
    cmd_tx: Option<Sender<Command>>,
    running: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
}

impl<E: Emulator + Send + 'static> ThreadedUsbHost<E> {
    pub fn new(emu: E) -> Self {
        Self::with_config(emu, HostConfig::default())
    }

    pub fn with_config(emu: E, config: HostConfig) -> Self {
        Self {
            config,
            emu: Some(emu),
            worker: None,
            cmd_tx: None,
            running: Arc::new(AtomicBool::new(false)),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawn the worker and block until the firmware reports the USB link
    /// up, the worker stops, or [`HostConfig::connect_timeout`] passes.
    ///
    /// Returns whether the link came up. Idempotent while running.
    pub fn start(&mut self) -> bool {
        if self.worker.is_some() {
            return self.usb_connected();
        }
        let Some(emu) = self.emu.take() else {
            // Emulator was lost to a worker panic; nothing to restart.
            tracing::error!("start() without an emulator to run");
            return false;
        };

        self.running.store(true, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel();
        self.cmd_tx = Some(tx);

        let running = Arc::clone(&self.running);
        let connected = Arc::clone(&self.connected);
        let config = self.config.clone();
        self.worker = Some(std::thread::spawn(move || {
            worker_loop(emu, rx, running, connected, config)
        }));

        let deadline = Instant::now() + self.config.connect_timeout;
        while !self.connected.load(Ordering::SeqCst)
            && self.running.load(Ordering::SeqCst)
            && Instant::now() < deadline
        {
            std::thread::sleep(CONNECT_POLL_INTERVAL);
        }
        let connected = self.connected.load(Ordering::SeqCst);
        tracing::debug!(connected, "threaded host started");
        connected
    }

    /// Signal the worker to exit, join it, and park the emulator.
    /// Idempotent.
    ///
    /// A transaction still in flight is abandoned; its caller receives
    /// [`HostError::QueueClosed`].
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        // Dropping the sender unblocks a worker waiting on nothing and fails
        // any in-flight submissions with QueueClosed.
        self.cmd_tx = None;
        if let Some(handle) = self.worker.take() {
            match handle.join() {
                Ok(emu) => self.emu = Some(emu),
                Err(_) => tracing::error!("worker thread panicked; emulator lost"),
            }
        }
        self.connected.store(false, Ordering::SeqCst);
        tracing::debug!("threaded host stopped");
    }

    /// Whether the worker thread is alive.
    pub fn is_running(&self) -> bool {
        self.worker.is_some() && self.running.load(Ordering::SeqCst)
    }

    /// Last connected-status value published by the worker.
    pub fn usb_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// The parked emulator, available only while stopped.
    pub fn emulator(&self) -> Option<&E> {
        self.emu.as_ref()
    }

    /// Consume the host and return the emulator, if the worker is stopped
    /// and did not panic.
    pub fn into_emulator(mut self) -> Option<E> {
        self.stop();
        self.emu.take()
    }

    /// Perform a control transfer on the worker thread.
    pub fn control_transfer(&self, xfer: ControlTransfer) -> Result<TransferResponse, HostError> {
        self.submit(|reply| Command::Control { xfer, reply })
    }

    /// Fetch a descriptor via a standard GET_DESCRIPTOR request.
    pub fn get_descriptor(
        &self,
        desc_type: u8,
        desc_index: u8,
        length: u16,
    ) -> Result<TransferResponse, HostError> {
        self.control_transfer(ControlTransfer {
            bm_request_type: 0x80,
            b_request: request::GET_DESCRIPTOR,
            w_value: ((desc_type as u16) << 8) | desc_index as u16,
            w_index: 0,
            w_length: length,
            data: Vec::new(),
        })
    }

    /// Read `size` bytes of firmware XDATA at `addr`.
    pub fn vendor_read(&self, addr: u32, size: u8) -> Result<TransferResponse, HostError> {
        self.submit(|reply| Command::Vendor {
            cmd: VendorCmd::Read { addr, size },
            reply,
        })
    }

    /// Write one byte of firmware XDATA at `addr`.
    pub fn vendor_write(&self, addr: u32, value: u8) -> Result<TransferResponse, HostError> {
        self.submit(|reply| Command::Vendor {
            cmd: VendorCmd::Write { addr, value },
            reply,
        })
    }

    fn submit(
        &self,
        build: impl FnOnce(Reply) -> Command,
    ) -> Result<TransferResponse, HostError> {
        let tx = self.cmd_tx.as_ref().ok_or(HostError::QueueClosed)?;
        let (reply_tx, reply_rx) = mpsc::channel();
        tx.send(build(reply_tx)).map_err(|_| HostError::QueueClosed)?;

        match reply_rx.recv_timeout(self.config.response_timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(HostError::ResponseTimeout {
                timeout: self.config.response_timeout,
            }),
            // Worker exited without replying (halt or stop).
            Err(RecvTimeoutError::Disconnected) => Err(HostError::QueueClosed),
        }
    }
}

impl<E: Emulator + Send + 'static> Drop for ThreadedUsbHost<E> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop<E: Emulator>(
    mut emu: E,
    cmd_rx: Receiver<Command>,
    running: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
    config: HostConfig,
) -> E {
    let mut in_flight: Option<InFlight> = None;

    while running.load(Ordering::SeqCst) {
        // Single in-flight transaction per emulator: the next command is
        // dequeued only once the current one has been answered.
        if in_flight.is_none() {
            match cmd_rx.try_recv() {
                Ok(cmd) => in_flight = Some(begin_transaction(&mut emu, cmd)),
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => break,
            }
        }

        if !emu.step() {
            if let Some(txn) = in_flight.take() {
                let cycles = emu.cycles() - txn.start_cycles;
                let _ = txn.reply.send(Err(HostError::ExecutionHalted { cycles }));
            }
            tracing::warn!("emulator halted; worker exiting");
            break;
        }
        connected.store(emu.usb_connected(), Ordering::SeqCst);

        // Completion is checked only after a step, so no transaction can
        // finish in zero execution units.
        if let Some(txn) = in_flight.take() {
            let consumed = emu.cycles() - txn.start_cycles;
            if emu.link().transaction_complete() {
                let response = match &txn.pending {
                    Pending::Control(xfer) => extract_control_response(&emu, xfer, consumed),
                    Pending::Vendor(cmd) => extract_vendor_response(&emu, cmd, consumed),
                };
                // A caller that hit its outer timeout has dropped the
                // receiver.
                let _ = txn.reply.send(Ok(response));
            } else if consumed >= config.cycle_budget {
                let link = emu.link();
                link.control_transfer_active = false;
                link.cmd_pending = false;
                let _ = txn.reply.send(Err(HostError::TransferTimeout {
                    budget: config.cycle_budget,
                }));
            } else {
                in_flight = Some(txn);
            }
        }
    }
    // An abandoned in-flight reply is dropped here; its caller sees the
    // queue as closed.
    running.store(false, Ordering::SeqCst);
    emu
}

fn begin_transaction<E: Emulator>(emu: &mut E, cmd: Command) -> InFlight {
    let start_cycles = emu.cycles();
    match cmd {
        Command::Control { xfer, reply } => {
            inject::inject_control_transfer(emu, &xfer);
            InFlight {
                pending: Pending::Control(xfer),
                reply,
                start_cycles,
            }
        }
        Command::Vendor { cmd, reply } => {
            inject::inject_vendor_cmd(emu, &cmd);
            InFlight {
                pending: Pending::Vendor(cmd),
                reply,
                start_cycles,
            }
        }
    }
}
