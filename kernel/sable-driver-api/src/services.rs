//! Kernel service contracts for drivers.
//!
//! Drivers use [`KernelServices`] to reach kernel infrastructure (PCI
//! enumeration, MMIO mapping, DMA memory, time) without depending on the
//! kernel crate directly. The kernel hands a `&'static dyn KernelServices` to
//! the driver at bring-up.

use sable_mmio::RegisterBus;

use crate::dma::DmaZone;
use crate::error::DriverError;
use crate::pci::{PciAddress, PciDeviceId, PciDeviceInfo};

/// Trait providing kernel services to drivers.
pub trait KernelServices: Send + Sync {
    /// Returns the first PCI function matching `id`.
    fn find_pci_device(&self, id: &PciDeviceId) -> Option<PciDeviceInfo>;

    /// Sets Memory Space and Bus Master in the function's PCI Command register.
    fn enable_bus_mastering(&self, addr: PciAddress);

    /// Maps a physical MMIO region and returns a bus over it.
    fn map_mmio(&self, phys_base: u64, size: u64) -> Result<&'static dyn RegisterBus, DriverError>;

    /// Allocates `size` zeroed, physically contiguous bytes aligned to `align`
    /// within `zone`. Returns the physical address.
    fn alloc_dma(&self, size: usize, align: usize, zone: DmaZone) -> Result<u64, DriverError>;

    /// Frees memory from [`alloc_dma`](Self::alloc_dma).
    ///
    /// # Safety
    ///
    /// No DMA may still reference the memory, and `phys`, `size` and `align`
    /// must match a previous allocation.
    unsafe fn free_dma(&self, phys: u64, size: usize, align: usize);

    /// Converts a physical address to a kernel virtual address.
    fn phys_to_virt(&self, phys: u64) -> *mut u8;

    /// Converts a kernel virtual address to the physical address the device
    /// must be given.
    ///
    /// Only the byte at `virt` is translated. A virtually contiguous buffer
    /// may cross into a physically unrelated frame at any 4 KiB boundary.
    fn virt_to_phys(&self, virt: *const u8) -> u64;

    /// Returns a monotonic timestamp in microseconds.
    fn now_us(&self) -> u64;

    /// Busy-waits for at least `us` microseconds.
    fn delay_us(&self, us: u64) {
        let start = self.now_us();
        while self.now_us().wrapping_sub(start) < us {
            core::hint::spin_loop();
        }
    }
}
