//! Completion poller: drives emulated execution until the firmware clears
//! the completion indicators or a cycle budget runs out.

use crate::bus::Emulator;
use crate::HostError;

/// Advance the emulator until the in-flight transaction completes.
///
/// Completion is checked only after each execution unit, never before, so no
/// transaction can complete in zero units. On success, returns the cycles
/// consumed; on timeout, the reported consumption is exactly `budget` even
/// if the final step overshot the boundary.
pub fn run_until_complete<E: Emulator>(emu: &mut E, budget: u64) -> Result<u64, HostError> {
    let start = emu.cycles();

    loop {
        let consumed = emu.cycles() - start;
        if consumed >= budget {
            // Forcibly clear the in-flight flags so the abandoned
            // transaction cannot satisfy a later completion check.
            let link = emu.link();
            link.control_transfer_active = false;
            link.cmd_pending = false;
            tracing::debug!(budget, "transfer timed out");
            return Err(HostError::TransferTimeout { budget });
        }

        if !emu.step() {
            let cycles = emu.cycles() - start;
            tracing::debug!(cycles, "emulator halted mid-transaction");
            return Err(HostError::ExecutionHalted { cycles });
        }

        if emu.link().transaction_complete() {
            let consumed = emu.cycles() - start;
            tracing::trace!(cycles = consumed, "transaction complete");
            return Ok(consumed);
        }
    }
}
