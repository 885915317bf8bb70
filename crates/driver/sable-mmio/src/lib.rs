//! Typed register block abstractions.
//!
//! [`register_block!`] turns a declarative register map into an accessor
//! struct whose reads and writes go through a [`RegisterBus`]. On hardware the
//! bus is an [`MmioBus`] over a mapped region, and the single `unsafe` point is
//! [`MmioBus::new`]. Host tests plug in a modelled device instead.
//!
//! # Example
//!
//! ```ignore
//! use sable_mmio::register_block;
//!
//! register_block! {
//!     /// AHCI per-port registers.
//!     pub PortRegs {
//!         /// Command and Status.
//!         [0x18; u32; rw] cmd => PortCmd,
//!         /// Command Issue.
//!         [0x38; u32; rw] ci,
//!     }
//! }
//! ```

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

extern crate self as sable_mmio;

use core::ptr;

pub use sable_mmio_macros::register_block;

/// A register address space, addressed by byte offset.
///
/// Only 32-bit access is mandatory; the narrower and wider accessors default
/// to 32-bit operations on the containing dword(s). AHCI never needs them, but
/// the DSL accepts every width.
pub trait RegisterBus: Send + Sync {
    /// Reads the 32-bit register at `offset`.
    fn read_u32(&self, offset: u64) -> u32;

    /// Writes the 32-bit register at `offset`.
    fn write_u32(&self, offset: u64, value: u32);

    /// Reads the 8-bit register at `offset`.
    fn read_u8(&self, offset: u64) -> u8 {
        (self.read_u32(offset & !3) >> ((offset & 3) * 8)) as u8
    }

    /// Writes the 8-bit register at `offset` (read-modify-write of the dword).
    fn write_u8(&self, offset: u64, value: u8) {
        let shift = (offset & 3) * 8;
        let old = self.read_u32(offset & !3) & !(0xFF << shift);
        self.write_u32(offset & !3, old | (u32::from(value) << shift));
    }

    /// Reads the 16-bit register at `offset`.
    fn read_u16(&self, offset: u64) -> u16 {
        (self.read_u32(offset & !3) >> ((offset & 2) * 8)) as u16
    }

    /// Writes the 16-bit register at `offset` (read-modify-write of the dword).
    fn write_u16(&self, offset: u64, value: u16) {
        let shift = (offset & 2) * 8;
        let old = self.read_u32(offset & !3) & !(0xFFFF << shift);
        self.write_u32(offset & !3, old | (u32::from(value) << shift));
    }

    /// Reads the 64-bit register at `offset`, low dword first.
    fn read_u64(&self, offset: u64) -> u64 {
        let lo = self.read_u32(offset);
        let hi = self.read_u32(offset + 4);
        u64::from(lo) | (u64::from(hi) << 32)
    }

    /// Writes the 64-bit register at `offset`, low dword first.
    fn write_u64(&self, offset: u64, value: u64) {
        self.write_u32(offset, value as u32);
        self.write_u32(offset + 4, (value >> 32) as u32);
    }
}

/// Volatile access to a mapped MMIO region.
#[derive(Debug, Clone, Copy)]
pub struct MmioBus {
    base: u64,
}

impl MmioBus {
    /// Wraps a mapped region starting at virtual address `base`.
    ///
    /// # Safety
    ///
    /// `base` must point to a valid, mapped MMIO region covering every offset
    /// later accessed through this bus, and must stay mapped for as long as
    /// the bus is used.
    #[must_use]
    pub const unsafe fn new(base: u64) -> Self {
        Self { base }
    }

    /// Returns the virtual base address.
    #[must_use]
    pub const fn base(&self) -> u64 {
        self.base
    }
}

impl RegisterBus for MmioBus {
    fn read_u32(&self, offset: u64) -> u32 {
        // SAFETY: `new` guarantees the region is mapped.
        unsafe { ptr::read_volatile((self.base + offset) as *const u32) }
    }

    fn write_u32(&self, offset: u64, value: u32) {
        // SAFETY: `new` guarantees the region is mapped.
        unsafe { ptr::write_volatile((self.base + offset) as *mut u32, value) }
    }

    fn read_u8(&self, offset: u64) -> u8 {
        // SAFETY: `new` guarantees the region is mapped.
        unsafe { ptr::read_volatile((self.base + offset) as *const u8) }
    }

    fn write_u8(&self, offset: u64, value: u8) {
        // SAFETY: `new` guarantees the region is mapped.
        unsafe { ptr::write_volatile((self.base + offset) as *mut u8, value) }
    }

    fn read_u16(&self, offset: u64) -> u16 {
        // SAFETY: `new` guarantees the region is mapped.
        unsafe { ptr::read_volatile((self.base + offset) as *const u16) }
    }

    fn write_u16(&self, offset: u64, value: u16) {
        // SAFETY: `new` guarantees the region is mapped.
        unsafe { ptr::write_volatile((self.base + offset) as *mut u16, value) }
    }

    fn read_u64(&self, offset: u64) -> u64 {
        // SAFETY: `new` guarantees the region is mapped.
        unsafe { ptr::read_volatile((self.base + offset) as *const u64) }
    }

    fn write_u64(&self, offset: u64, value: u64) {
        // SAFETY: `new` guarantees the region is mapped.
        unsafe { ptr::write_volatile((self.base + offset) as *mut u64, value) }
    }
}
