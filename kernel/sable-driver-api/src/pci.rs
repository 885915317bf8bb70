//! PCI types used to locate a controller and its register BAR.

use core::fmt;

/// PCI bus/device/function address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PciAddress {
    /// Bus number (0-255).
    pub bus: u8,
    /// Device number (0-31).
    pub device: u8,
    /// Function number (0-7).
    pub function: u8,
}

impl fmt::Display for PciAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}:{:02x}.{}", self.bus, self.device, self.function)
    }
}

/// Wildcard vendor/device value.
pub const PCI_ANY_ID: u16 = 0xFFFF;

/// Match criteria for a PCI function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PciDeviceId {
    /// Vendor ID (`PCI_ANY_ID` = wildcard).
    pub vendor: u16,
    /// Device ID (`PCI_ANY_ID` = wildcard).
    pub device: u16,
    /// Class code: `(class << 16) | (subclass << 8) | prog_if`.
    pub class: u32,
    /// Mask applied to both class codes before comparison (0 = ignore).
    pub class_mask: u32,
}

impl PciDeviceId {
    /// Matches a full class/subclass/programming-interface triple.
    #[must_use]
    pub const fn with_class_progif(class: u8, subclass: u8, prog_if: u8) -> Self {
        Self {
            vendor: PCI_ANY_ID,
            device: PCI_ANY_ID,
            class: ((class as u32) << 16) | ((subclass as u32) << 8) | (prog_if as u32),
            class_mask: 0x00FF_FFFF,
        }
    }

    /// Returns `true` if `info` satisfies every non-wildcard criterion.
    #[must_use]
    pub fn matches(&self, info: &PciDeviceInfo) -> bool {
        let vendor_ok = self.vendor == PCI_ANY_ID || self.vendor == info.vendor_id;
        let device_ok = self.device == PCI_ANY_ID || self.device == info.device_id;
        let class_ok = (info.class_code() & self.class_mask) == (self.class & self.class_mask);
        vendor_ok && device_ok && class_ok
    }
}

/// Decoded Base Address Register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PciBar {
    /// Memory-mapped BAR.
    Memory {
        /// Base physical address (flag bits already stripped).
        base: u64,
        /// Size in bytes.
        size: u64,
    },
    /// I/O port BAR.
    Io {
        /// Base I/O port.
        base: u32,
        /// Size in bytes.
        size: u32,
    },
    /// Unused slot.
    Unused,
}

/// A discovered PCI function.
#[derive(Debug, Clone, Copy)]
pub struct PciDeviceInfo {
    /// Bus/device/function address.
    pub address: PciAddress,
    /// Vendor ID.
    pub vendor_id: u16,
    /// Device ID.
    pub device_id: u16,
    /// Class code.
    pub class: u8,
    /// Subclass code.
    pub subclass: u8,
    /// Programming interface.
    pub prog_if: u8,
    /// Base Address Registers.
    pub bars: [PciBar; 6],
}

impl PciDeviceInfo {
    /// Packed `(class << 16) | (subclass << 8) | prog_if`.
    #[must_use]
    pub const fn class_code(&self) -> u32 {
        ((self.class as u32) << 16) | ((self.subclass as u32) << 8) | (self.prog_if as u32)
    }
}
