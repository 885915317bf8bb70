//! Block device interface and error types.
//!
//! Defines the synchronous [`BlockDevice`] trait through which filesystem and
//! image-copy code above the driver reads and writes whole blocks.

use core::fmt;

/// Errors that can occur during block I/O operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoError {
    /// The requested blocks lie beyond the device's capacity.
    OutOfRange,
    /// The device reported a hardware error.
    DeviceError,
    /// The provided buffer is too small for the operation.
    InvalidBuffer,
    /// The operation timed out waiting for the device.
    Timeout,
    /// A DMA buffer allocation or setup error occurred.
    DmaError,
    /// The device is not ready to accept commands.
    NotReady,
    /// The request exceeds the device's per-transfer limit.
    TooLarge,
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfRange => f.write_str("block out of range"),
            Self::DeviceError => f.write_str("device error"),
            Self::InvalidBuffer => f.write_str("invalid buffer size"),
            Self::Timeout => f.write_str("operation timed out"),
            Self::DmaError => f.write_str("DMA error"),
            Self::NotReady => f.write_str("device not ready"),
            Self::TooLarge => f.write_str("transfer too large"),
        }
    }
}

/// Synchronous block device interface.
///
/// Every call blocks until the hardware completes or fails the request.
/// Transfers larger than [`max_blocks_per_transfer`](Self::max_blocks_per_transfer)
/// are rejected rather than split; use [`read_all`](Self::read_all) to chunk.
pub trait BlockDevice {
    /// Reads `count` blocks starting at `start` into `buf`.
    ///
    /// `buf` must hold at least `count * block_size()` bytes.
    fn read_blocks(&mut self, start: u64, count: u64, buf: &mut [u8]) -> Result<(), IoError>;

    /// Writes `count` blocks starting at `start` from `buf`.
    ///
    /// `buf` must hold at least `count * block_size()` bytes.
    fn write_blocks(&mut self, start: u64, count: u64, buf: &[u8]) -> Result<(), IoError>;

    /// Returns the size of one block in bytes (typically 512).
    fn block_size(&self) -> usize;

    /// Returns the number of addressable blocks.
    fn block_count(&self) -> u64;

    /// Returns the largest block count a single transfer may carry.
    fn max_blocks_per_transfer(&self) -> u64;

    /// Reads `count` blocks starting at `start`, split into transfers no
    /// larger than [`max_blocks_per_transfer`](Self::max_blocks_per_transfer).
    fn read_all(&mut self, start: u64, count: u64, buf: &mut [u8]) -> Result<(), IoError> {
        let bs = self.block_size();
        if (buf.len() as u64) < count * bs as u64 {
            return Err(IoError::InvalidBuffer);
        }
        let step = self.max_blocks_per_transfer().max(1);
        let mut done = 0;
        while done < count {
            let n = step.min(count - done);
            let from = (done as usize) * bs;
            let to = from + (n as usize) * bs;
            self.read_blocks(start + done, n, &mut buf[from..to])?;
            done += n;
        }
        Ok(())
    }
}
