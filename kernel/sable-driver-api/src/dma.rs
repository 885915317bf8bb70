//! Owned DMA memory.

use core::ptr::NonNull;
use core::slice;

use crate::error::DriverError;
use crate::services::KernelServices;

/// Highest physical address (exclusive) reachable by 32-bit DMA.
pub const DMA32_LIMIT: u64 = 1 << 32;

/// Physical placement constraint for a DMA allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaZone {
    /// Anywhere in physical memory.
    Any,
    /// Entirely below [`DMA32_LIMIT`], for devices limited to 32-bit addresses.
    Below4G,
}

/// A zeroed, physically contiguous DMA allocation, freed on drop.
pub struct DmaRegion {
    phys: u64,
    virt: NonNull<u8>,
    len: usize,
    align: usize,
    services: &'static dyn KernelServices,
}

// SAFETY: DmaRegion exclusively owns its allocation; the raw pointer is only
// dereferenced through &self / &mut self accessors.
unsafe impl Send for DmaRegion {}
unsafe impl Sync for DmaRegion {}

impl DmaRegion {
    /// Allocates `len` zeroed bytes aligned to `align` within `zone`.
    pub fn alloc(
        services: &'static dyn KernelServices,
        len: usize,
        align: usize,
        zone: DmaZone,
    ) -> Result<Self, DriverError> {
        let phys = services.alloc_dma(len, align, zone)?;
        let Some(virt) = NonNull::new(services.phys_to_virt(phys)) else {
            // SAFETY: just allocated, never handed to a device.
            unsafe { services.free_dma(phys, len, align) };
            return Err(DriverError::OutOfMemory);
        };
        // SAFETY: virt maps the `len` bytes we now own.
        unsafe { virt.as_ptr().write_bytes(0, len) };
        Ok(Self {
            phys,
            virt,
            len,
            align,
            services,
        })
    }

    /// Physical address of the first byte.
    #[must_use]
    pub const fn phys(&self) -> u64 {
        self.phys
    }

    /// Length in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` for a zero-length region.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Raw pointer for volatile access to hardware-visible structures.
    #[must_use]
    pub const fn as_ptr(&self) -> *mut u8 {
        self.virt.as_ptr()
    }

    /// Views the region as bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: virt maps `len` bytes owned by self.
        unsafe { slice::from_raw_parts(self.virt.as_ptr(), self.len) }
    }

    /// Views the region as mutable bytes.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: virt maps `len` bytes exclusively owned by self.
        unsafe { slice::from_raw_parts_mut(self.virt.as_ptr(), self.len) }
    }
}

impl Drop for DmaRegion {
    fn drop(&mut self) {
        // SAFETY: the owner of a region only drops it once no command
        // references it; the triple matches the original allocation.
        unsafe { self.services.free_dma(self.phys, self.len, self.align) };
    }
}
