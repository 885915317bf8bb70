//! AHCI command structures: FIS, Command Header, Command Table and PRDT.
//!
//! Layouts follow AHCI 1.3.1 sections 4.2.2 and 4.2.3 exactly. Headers, PRDT
//! entries and the FIS are `#[repr(C, packed)]`; the command table is aligned
//! to the 128 bytes the HBA requires.

/// FIS Register - Host to Device (20 bytes).
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FisRegH2d {
    /// FIS type (0x27).
    pub fis_type: u8,
    /// Port multiplier (bits 3:0) and C bit (bit 7: command register update).
    pub pm_and_c: u8,
    /// ATA command register.
    pub command: u8,
    /// Features register (low byte).
    pub features_lo: u8,

    /// LBA bits 7:0.
    pub lba0: u8,
    /// LBA bits 15:8.
    pub lba1: u8,
    /// LBA bits 23:16.
    pub lba2: u8,
    /// Device register.
    pub device: u8,

    /// LBA bits 31:24.
    pub lba3: u8,
    /// LBA bits 39:32.
    pub lba4: u8,
    /// LBA bits 47:40.
    pub lba5: u8,
    /// Features register (high byte).
    pub features_hi: u8,

    /// Sector count (low byte).
    pub count_lo: u8,
    /// Sector count (high byte).
    pub count_hi: u8,
    /// Isochronous command completion.
    pub icc: u8,
    /// Control register.
    pub control: u8,

    /// Reserved.
    pub _reserved: [u8; 4],
}

/// C bit in [`FisRegH2d::pm_and_c`].
pub const FIS_C_BIT: u8 = 1 << 7;
/// LBA mode bit in [`FisRegH2d::device`].
pub const DEVICE_LBA: u8 = 1 << 6;

impl FisRegH2d {
    /// An all-zero FIS.
    pub const ZERO: Self = Self {
        fis_type: 0,
        pm_and_c: 0,
        command: 0,
        features_lo: 0,
        lba0: 0,
        lba1: 0,
        lba2: 0,
        device: 0,
        lba3: 0,
        lba4: 0,
        lba5: 0,
        features_hi: 0,
        count_lo: 0,
        count_hi: 0,
        icc: 0,
        control: 0,
        _reserved: [0; 4],
    };

    /// Builds a command FIS for `command` at `lba` covering `count` sectors.
    ///
    /// `count` is the raw 16-bit sector count field (0 means 65536).
    #[must_use]
    pub const fn command(command: u8, lba: u64, count: u16, device: u8) -> Self {
        Self {
            fis_type: super::regs::FIS_TYPE_REG_H2D,
            pm_and_c: FIS_C_BIT,
            command,
            lba0: lba as u8,
            lba1: (lba >> 8) as u8,
            lba2: (lba >> 16) as u8,
            device,
            lba3: (lba >> 24) as u8,
            lba4: (lba >> 32) as u8,
            lba5: (lba >> 40) as u8,
            count_lo: count as u8,
            count_hi: (count >> 8) as u8,
            ..Self::ZERO
        }
    }

    /// Reassembles the 48-bit LBA.
    #[must_use]
    pub const fn lba(&self) -> u64 {
        (self.lba0 as u64)
            | ((self.lba1 as u64) << 8)
            | ((self.lba2 as u64) << 16)
            | ((self.lba3 as u64) << 24)
            | ((self.lba4 as u64) << 32)
            | ((self.lba5 as u64) << 40)
    }

    /// Reassembles the 16-bit sector count field.
    #[must_use]
    pub const fn count(&self) -> u16 {
        (self.count_lo as u16) | ((self.count_hi as u16) << 8)
    }
}

/// AHCI Command Header (32 bytes), one per command slot.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandHeader {
    /// DW0 low: CFL in bits 4:0, A=5, W=6, P=7, R=8, B=9, C=10, PMP=15:12.
    pub flags: u16,
    /// Physical Region Descriptor Table Length (entries).
    pub prdtl: u16,
    /// Physical Region Descriptor Byte Count (written back by the HBA).
    pub prdbc: u32,
    /// Command Table Base Address (low 32 bits, 128-byte aligned).
    pub ctba: u32,
    /// Command Table Base Address (high 32 bits).
    pub ctbau: u32,
    /// Reserved.
    pub _reserved: [u32; 4],
}

/// CFL mask in [`CommandHeader::flags`].
pub const HEADER_CFL_MASK: u16 = 0x1F;
/// Write direction (host to device) in [`CommandHeader::flags`].
pub const HEADER_WRITE: u16 = 1 << 6;

impl CommandHeader {
    /// Builds a header for a command table at `ctba_phys`.
    #[must_use]
    pub const fn new(ctba_phys: u64, write: bool, prdtl: u16) -> Self {
        let mut flags = CMD_FIS_LEN_DWORDS & HEADER_CFL_MASK;
        if write {
            flags |= HEADER_WRITE;
        }
        Self {
            flags,
            prdtl,
            prdbc: 0,
            ctba: ctba_phys as u32,
            ctbau: (ctba_phys >> 32) as u32,
            _reserved: [0; 4],
        }
    }

    /// Command table physical address.
    #[must_use]
    pub const fn ctba(&self) -> u64 {
        (self.ctba as u64) | ((self.ctbau as u64) << 32)
    }

    /// Returns `true` if the W bit is set.
    #[must_use]
    pub const fn is_write(&self) -> bool {
        self.flags & HEADER_WRITE != 0
    }
}

/// Physical Region Descriptor Table entry (16 bytes).
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrdtEntry {
    /// Data Base Address (low 32 bits, word aligned).
    pub dba: u32,
    /// Data Base Address (high 32 bits).
    pub dbau: u32,
    /// Reserved.
    pub _reserved: u32,
    /// Data Byte Count, zero-based, bits 21:0. Bit 31 is Interrupt on Completion.
    pub dbc: u32,
}

impl PrdtEntry {
    /// Describes `bytes` bytes at `phys`. `bytes` must be non-zero.
    #[must_use]
    pub const fn new(phys: u64, bytes: u32) -> Self {
        Self {
            dba: phys as u32,
            dbau: (phys >> 32) as u32,
            _reserved: 0,
            dbc: (bytes - 1) & PRDT_DBC_MASK,
        }
    }

    /// Data address.
    #[must_use]
    pub const fn address(&self) -> u64 {
        (self.dba as u64) | ((self.dbau as u64) << 32)
    }

    /// Actual byte count (stored value + 1).
    #[must_use]
    pub const fn byte_count(&self) -> u32 {
        (self.dbc & PRDT_DBC_MASK) + 1
    }
}

/// Mask of the DBC field in [`PrdtEntry::dbc`].
pub const PRDT_DBC_MASK: u32 = 0x003F_FFFF;
/// Largest byte count one PRDT entry can describe (4 MiB).
pub const PRDT_MAX_ENTRY_BYTES: usize = PRDT_DBC_MASK as usize + 1;

/// PRDT entries in each slot's command table.
pub const PRDT_ENTRIES_PER_SLOT: usize = 8;

/// Command Table: command FIS, ATAPI command, PRDT.
#[repr(C, align(128))]
#[derive(Debug, Clone, Copy)]
pub struct CommandTable {
    /// Command FIS area (64 bytes, H2D FIS in the first 20).
    pub cfis: FisRegH2d,
    /// Padding up to the ATAPI command area.
    pub _cfis_pad: [u8; 0x40 - 20],
    /// ATAPI command (12 or 16 bytes).
    pub acmd: [u8; 16],
    /// Reserved.
    pub _reserved: [u8; 0x30],
    /// Physical Region Descriptor Table.
    pub prdt: [PrdtEntry; PRDT_ENTRIES_PER_SLOT],
}

impl CommandTable {
    /// An all-zero table.
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            cfis: FisRegH2d::ZERO,
            _cfis_pad: [0; 0x40 - 20],
            acmd: [0; 16],
            _reserved: [0; 0x30],
            prdt: [PrdtEntry {
                dba: 0,
                dbau: 0,
                _reserved: 0,
                dbc: 0,
            }; PRDT_ENTRIES_PER_SLOT],
        }
    }
}

/// Offset of the PRDT within a Command Table.
pub const PRDT_OFFSET: usize = 0x80;
/// Command FIS length in dwords for Register H2D (20 / 4).
pub const CMD_FIS_LEN_DWORDS: u16 = 5;
/// Size of the received-FIS area.
pub const RECEIVED_FIS_SIZE: usize = 256;

/// Alignment of the command list (PxCLB).
pub const CMD_LIST_ALIGN: usize = 1024;
/// Alignment of the received-FIS area (PxFB).
pub const RECEIVED_FIS_ALIGN: usize = 256;
/// Alignment of a command table (CTBA).
pub const CMD_TABLE_ALIGN: usize = 128;
