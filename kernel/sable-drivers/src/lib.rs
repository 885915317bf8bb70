//! Storage drivers for Sable.
//!
//! Currently a single driver: [`ahci`], a polling AHCI/SATA block driver.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod ahci;
