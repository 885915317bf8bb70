//! Driver tunables.
//!
//! Timeouts are in microseconds against [`KernelServices::now_us`]. Hardware
//! facts that change memory layout (PRDT entries per slot, alignments) are
//! constants in [`command`](super::command), not configuration.
//!
//! [`KernelServices::now_us`]: sable_driver_api::KernelServices::now_us

use super::command::PRDT_MAX_ENTRY_BYTES;

/// One millisecond in microseconds.
const MS: u64 = 1_000;
/// One second in microseconds.
const SEC: u64 = 1_000_000;

/// AHCI driver configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AhciConfig {
    /// Bytes per PRDT entry. Clamped to the 4 MiB hardware limit and rounded
    /// down to an even count.
    pub prdt_max_bytes: usize,
    /// Wait for BSY/DRQ to clear during port reset before escalating to
    /// COMRESET.
    pub port_idle_timeout_us: u64,
    /// Wait for BSY/DRQ to clear before issuing a command.
    pub command_ready_timeout_us: u64,
    /// Wait for an issued command's CI bit to clear.
    pub command_timeout_us: u64,
    /// Wait for controller-side state changes (HBA reset, CR/FR).
    pub controller_timeout_us: u64,
    /// Wait for SStatus to report a device after COMRESET.
    pub device_detect_timeout_us: u64,
    /// How long SControl.DET stays at 1 during COMRESET (spec minimum 1 ms).
    pub link_reset_hold_us: u64,
    /// Settle time after requesting spin-up / power-on.
    pub spin_up_settle_us: u64,
    /// Wait for the BIOS to drop BOS after the OS requests ownership.
    pub bios_handoff_timeout_us: u64,
    /// Settle time after BOS clears before checking BIOS Busy.
    pub bios_settle_us: u64,
    /// Extra wait when BIOS Busy is still set after settling.
    pub bios_busy_wait_us: u64,
    /// Treat the HBA as 32-bit only even if it advertises S64A.
    pub force_32bit_dma: bool,
}

impl AhciConfig {
    /// Default configuration.
    pub const DEFAULT: Self = Self {
        prdt_max_bytes: PRDT_MAX_ENTRY_BYTES,
        port_idle_timeout_us: SEC,
        command_ready_timeout_us: 2 * SEC,
        command_timeout_us: 30 * SEC,
        controller_timeout_us: 5 * SEC,
        device_detect_timeout_us: SEC,
        link_reset_hold_us: 2 * MS,
        spin_up_settle_us: 100 * MS,
        bios_handoff_timeout_us: SEC,
        bios_settle_us: 25 * MS,
        bios_busy_wait_us: 2 * SEC,
        force_32bit_dma: false,
    };

    /// Effective bytes per PRDT entry.
    #[must_use]
    pub const fn entry_bytes(&self) -> usize {
        let bytes = if self.prdt_max_bytes > PRDT_MAX_ENTRY_BYTES {
            PRDT_MAX_ENTRY_BYTES
        } else {
            self.prdt_max_bytes
        };
        let even = bytes & !1;
        if even == 0 { 2 } else { even }
    }
}

impl Default for AhciConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
