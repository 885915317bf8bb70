//! AHCI HBA register offsets and bitflags (AHCI 1.3.1).
//!
//! Defines the memory-mapped layout of the generic host control block and the
//! per-port register blocks, plus the ATA/FIS constants the driver issues.

use bitflags::bitflags;
use sable_mmio::register_block;

// ---------------------------------------------------------------------------
// Generic Host Control register block
// ---------------------------------------------------------------------------

register_block! {
    /// AHCI HBA generic host control registers.
    pub HbaRegs {
        /// Host Capabilities.
        [0x00; u32; ro] cap => HbaCap,
        /// Global Host Control.
        [0x04; u32; rw] ghc => HbaGhc,
        /// Interrupt Status.
        [0x08; u32; rw] is,
        /// Ports Implemented.
        [0x0C; u32; ro] pi,
        /// AHCI Version.
        [0x10; u32; ro] vs,
        /// Host Capabilities Extended.
        [0x24; u32; ro] cap2 => HbaCap2,
        /// BIOS/OS Handoff Control and Status.
        [0x28; u32; rw] bohc => HbaBohc,
    }
}

// ---------------------------------------------------------------------------
// Per-port register block (base = 0x100 + port * 0x80)
// ---------------------------------------------------------------------------

/// Port register block size.
pub const PORT_REG_SIZE: u64 = 0x80;
/// Offset of port 0's register block.
pub const PORT_BASE: u64 = 0x100;
/// Maximum number of ports an HBA can implement.
pub const MAX_PORTS: u8 = 32;
/// Bytes of ABAR covering the generic block and all 32 port blocks.
pub const ABAR_SIZE: u64 = PORT_BASE + MAX_PORTS as u64 * PORT_REG_SIZE;

/// Offset of port `port`'s register block within the ABAR.
#[must_use]
pub const fn port_offset(port: u8) -> u64 {
    PORT_BASE + port as u64 * PORT_REG_SIZE
}

register_block! {
    /// AHCI per-port registers.
    pub PortRegs {
        /// Command List Base Address (low 32 bits, 1 KiB aligned).
        [0x00; u32; rw] clb,
        /// Command List Base Address (high 32 bits).
        [0x04; u32; rw] clbu,
        /// FIS Base Address (low 32 bits, 256 B aligned).
        [0x08; u32; rw] fb,
        /// FIS Base Address (high 32 bits).
        [0x0C; u32; rw] fbu,
        /// Interrupt Status (write 1 to clear).
        [0x10; u32; rw] is => PortIs,
        /// Interrupt Enable.
        [0x14; u32; rw] ie => PortIe,
        /// Command and Status.
        [0x18; u32; rw] cmd => PortCmd,
        /// Task File Data.
        [0x20; u32; ro] tfd => PortTfd,
        /// Signature.
        [0x24; u32; ro] sig,
        /// SATA Status (SStatus).
        [0x28; u32; ro] ssts,
        /// SATA Control (SControl).
        [0x2C; u32; rw] sctl,
        /// SATA Error (write 1 to clear).
        [0x30; u32; rw] serr,
        /// SATA Active (NCQ tags outstanding).
        [0x34; u32; rw] sact,
        /// Command Issue.
        [0x38; u32; rw] ci,
    }
}

// ---------------------------------------------------------------------------
// Bitflags
// ---------------------------------------------------------------------------

bitflags! {
    /// HBA Capabilities (CAP).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HbaCap: u32 {
        /// Supports 64-bit addressing (S64A).
        const S64A = 1 << 31;
        /// Supports native command queuing (SNCQ).
        const SNCQ = 1 << 30;
        /// Supports staggered spin-up (SSS).
        const SSS = 1 << 27;
        /// Number of command slots (bits 12:8), read via [`HbaCap::num_cmd_slots`].
        const _ = !0;
    }
}

impl HbaCap {
    /// Returns the number of command slots (1-32). NCS is zero-based.
    #[must_use]
    pub const fn num_cmd_slots(self) -> u8 {
        (((self.bits() >> 8) & 0x1F) + 1) as u8
    }
}

bitflags! {
    /// Global Host Control (GHC).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HbaGhc: u32 {
        /// AHCI Enable (AE).
        const AE = 1 << 31;
        /// Interrupt Enable (IE).
        const IE = 1 << 1;
        /// HBA Reset (HR); self-clears when the reset completes.
        const HR = 1 << 0;
    }
}

bitflags! {
    /// Host Capabilities Extended (CAP2).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HbaCap2: u32 {
        /// BIOS/OS Handoff supported (BOH).
        const BOH = 1 << 0;
        const _ = !0;
    }
}

bitflags! {
    /// BIOS/OS Handoff Control and Status (BOHC).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HbaBohc: u32 {
        /// BIOS Owned Semaphore (BOS).
        const BOS = 1 << 0;
        /// OS Owned Semaphore (OOS).
        const OOS = 1 << 1;
        /// SMI on OS Ownership Change Enable (SOOE).
        const SOOE = 1 << 2;
        /// OS Ownership Change (OOC).
        const OOC = 1 << 3;
        /// BIOS Busy (BB).
        const BB = 1 << 4;
    }
}

bitflags! {
    /// Port Command and Status (PxCMD).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PortCmd: u32 {
        /// Start (ST): process the command list.
        const ST = 1 << 0;
        /// Spin-Up Device (SUD).
        const SUD = 1 << 1;
        /// Power On Device (POD).
        const POD = 1 << 2;
        /// FIS Receive Enable (FRE).
        const FRE = 1 << 4;
        /// FIS Receive Running (FR).
        const FR = 1 << 14;
        /// Command List Running (CR).
        const CR = 1 << 15;
        /// Device is ATAPI (ATAPI).
        const ATAPI = 1 << 24;
        const _ = !0;
    }
}

impl PortCmd {
    /// Bits that must all be clear for the port to count as idle.
    pub const ENGINE: Self = Self::ST.union(Self::CR).union(Self::FR).union(Self::FRE);
}

bitflags! {
    /// Port Interrupt Status (PxIS).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PortIs: u32 {
        /// Device to Host Register FIS Interrupt (DHRS).
        const DHRS = 1 << 0;
        /// PIO Setup FIS Interrupt (PSS).
        const PSS = 1 << 1;
        /// DMA Setup FIS Interrupt (DSS).
        const DSS = 1 << 2;
        /// Set Device Bits Interrupt (SDBS).
        const SDBS = 1 << 3;
        /// Interface Fatal Error Status (IFS).
        const IFS = 1 << 27;
        /// Host Bus Data Error Status (HBDS).
        const HBDS = 1 << 28;
        /// Host Bus Fatal Error Status (HBFS).
        const HBFS = 1 << 29;
        /// Task File Error Status (TFES).
        const TFES = 1 << 30;
        const _ = !0;
    }
}

bitflags! {
    /// Port Interrupt Enable (PxIE).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PortIe: u32 {
        /// Device to Host Register FIS Interrupt Enable.
        const DHRE = 1 << 0;
        /// Task File Error Enable.
        const TFEE = 1 << 30;
    }
}

bitflags! {
    /// Port Task File Data (PxTFD), status byte in bits 7:0.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PortTfd: u32 {
        /// Error (ERR).
        const ERR = 1 << 0;
        /// Data transfer requested (DRQ).
        const DRQ = 1 << 3;
        /// Busy (BSY).
        const BSY = 1 << 7;
        const _ = !0;
    }
}

// ---------------------------------------------------------------------------
// SATA status / control
// ---------------------------------------------------------------------------

/// Extracts DET (device detection) from SStatus, bits 3:0.
#[must_use]
pub const fn ssts_det(ssts: u32) -> u8 {
    (ssts & 0x0F) as u8
}

/// DET: device present and Phy communication established.
pub const SSTS_DET_PRESENT: u8 = 3;

/// SControl DET value requesting interface initialization (COMRESET).
pub const SCTL_DET_INIT: u32 = 1;

// ---------------------------------------------------------------------------
// Device signatures
// ---------------------------------------------------------------------------

/// PxSIG of a SATA ATA drive.
pub const SATA_SIG_ATA: u32 = 0x0000_0101;
/// PxSIG of a SATAPI (packet) drive.
pub const SATA_SIG_ATAPI: u32 = 0xEB14_0101;

// ---------------------------------------------------------------------------
// ATA commands and FIS types
// ---------------------------------------------------------------------------

/// IDENTIFY DEVICE.
pub const ATA_CMD_IDENTIFY: u8 = 0xEC;
/// IDENTIFY PACKET DEVICE.
pub const ATA_CMD_IDENTIFY_PACKET: u8 = 0xA1;
/// READ DMA EXT (48-bit LBA).
pub const ATA_CMD_READ_DMA_EXT: u8 = 0x25;
/// WRITE DMA EXT (48-bit LBA).
pub const ATA_CMD_WRITE_DMA_EXT: u8 = 0x35;

/// FIS type: Register, Host to Device.
pub const FIS_TYPE_REG_H2D: u8 = 0x27;
