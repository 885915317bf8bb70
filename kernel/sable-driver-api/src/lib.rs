//! Driver-facing API for Sable storage drivers.
//!
//! - [`services`]: the [`KernelServices`] contract through which a driver
//!   finds PCI devices, maps MMIO, allocates DMA memory and keeps time.
//! - [`dma`]: [`DmaRegion`], an owned DMA allocation released on drop.
//! - [`block`]: the synchronous [`BlockDevice`] interface and [`IoError`].
//! - [`pci`]: PCI addresses, BARs and device-id matching.
//! - [`error`]: [`DriverError`], returned by service calls.

#![cfg_attr(not(test), no_std)]

pub mod block;
pub mod dma;
pub mod error;
pub mod pci;
pub mod services;

pub use block::{BlockDevice, IoError};
pub use dma::{DmaRegion, DmaZone};
pub use error::DriverError;
pub use pci::{PciAddress, PciBar, PciDeviceId, PciDeviceInfo};
pub use services::KernelServices;
