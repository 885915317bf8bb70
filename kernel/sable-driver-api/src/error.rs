//! Driver error types.

use core::fmt;

/// Errors returned by kernel service calls made on behalf of a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverError {
    /// No memory satisfying the request (size, alignment, zone) is available.
    OutOfMemory,
    /// The MMIO region could not be mapped.
    MapFailed,
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory => f.write_str("out of DMA memory"),
            Self::MapFailed => f.write_str("MMIO mapping failed"),
        }
    }
}
