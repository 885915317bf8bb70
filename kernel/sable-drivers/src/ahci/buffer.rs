//! DMA buffer addressing: direct or bounced.
//!
//! A caller's buffer is handed to the HBA as is only when it is one physical
//! range the HBA can reach. An HBA without S64A can only reach the low 4 GiB,
//! and a buffer spanning pages may be scattered in physical memory. Anything
//! else is staged through a bounce buffer allocated below 4 GiB: filled from
//! the caller before a write, copied back to the caller after a read.

use sable_driver_api::dma::DMA32_LIMIT;
use sable_driver_api::{DmaRegion, DmaZone, DriverError, KernelServices};

/// Alignment of bounce buffer allocations.
const BOUNCE_ALIGN: usize = 4096;
/// Granularity of the kernel's virtual-to-physical mapping.
const PAGE_SIZE: usize = 4096;

/// Returns `true` if `len` bytes at `phys` cannot be handed to the HBA as is.
#[must_use]
pub const fn needs_bounce(supports_64bit: bool, phys: u64, len: usize) -> bool {
    !supports_64bit && phys + len as u64 > DMA32_LIMIT
}

/// Returns `true` if `len` bytes at virtual `buf` are the single physical
/// range starting at `phys`.
fn is_physically_contiguous(
    services: &dyn KernelServices,
    buf: *const u8,
    len: usize,
    phys: u64,
) -> bool {
    let next_page = PAGE_SIZE - buf as usize % PAGE_SIZE;
    (next_page..len)
        .step_by(PAGE_SIZE)
        .all(|off| services.virt_to_phys(buf.wrapping_add(off)) == phys + off as u64)
}

/// Where the HBA transfers data for one command.
pub enum Staging<'a> {
    /// The caller's buffer, at this physical address.
    Direct {
        /// Physical address of the caller's buffer.
        phys: u64,
    },
    /// The handle's bounce buffer.
    Bounced(&'a mut DmaRegion),
}

impl Staging<'_> {
    /// Physical address to put in the PRDT.
    #[must_use]
    pub fn phys(&self) -> u64 {
        match self {
            Self::Direct { phys } => *phys,
            Self::Bounced(region) => region.phys(),
        }
    }

    /// Returns `true` for [`Staging::Bounced`].
    #[must_use]
    pub const fn is_bounced(&self) -> bool {
        matches!(self, Self::Bounced(_))
    }

    /// Copies outgoing data into the bounce buffer. No-op when direct.
    pub fn fill_from(&mut self, src: &[u8]) {
        if let Self::Bounced(region) = self {
            region.as_mut_slice()[..src.len()].copy_from_slice(src);
        }
    }

    /// Copies incoming data out of the bounce buffer. No-op when direct.
    pub fn copy_to(&self, dst: &mut [u8]) {
        if let Self::Bounced(region) = self {
            dst.copy_from_slice(&region.as_slice()[..dst.len()]);
        }
    }
}

/// A lazily allocated, reusable below-4 GiB staging area.
#[derive(Default)]
pub struct BounceBuffer {
    region: Option<DmaRegion>,
}

impl BounceBuffer {
    /// Creates an empty bounce buffer; nothing is allocated until needed.
    #[must_use]
    pub const fn new() -> Self {
        Self { region: None }
    }

    /// Bytes currently allocated.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.region.as_ref().map_or(0, DmaRegion::len)
    }

    /// Decides how `len` bytes at virtual address `buf` reach the HBA.
    ///
    /// A too-small previous allocation is freed and replaced.
    pub fn stage(
        &mut self,
        services: &'static dyn KernelServices,
        supports_64bit: bool,
        buf: *const u8,
        len: usize,
    ) -> Result<Staging<'_>, DriverError> {
        let phys = services.virt_to_phys(buf);
        if !needs_bounce(supports_64bit, phys, len)
            && is_physically_contiguous(services, buf, len, phys)
        {
            return Ok(Staging::Direct { phys });
        }

        let region = match self.region.take() {
            Some(region) if region.len() >= len => region,
            stale => {
                drop(stale);
                DmaRegion::alloc(services, len, BOUNCE_ALIGN, DmaZone::Below4G)?
            }
        };
        Ok(Staging::Bounced(self.region.insert(region)))
    }

    /// Abandons the current allocation without freeing it. Used when a
    /// command that targeted it may still be in flight.
    pub fn leak(&mut self) {
        if let Some(region) = self.region.take() {
            core::mem::forget(region);
        }
    }
}
