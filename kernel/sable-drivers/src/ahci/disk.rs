//! `AhciDisk`: a block device bound to one AHCI port.

use log::{error, info};
use sable_driver_api::{BlockDevice, IoError};

use super::buffer::BounceBuffer;
use super::command::{DEVICE_LBA, PRDT_ENTRIES_PER_SLOT};
use super::error::{AhciError, Operation};
use super::identify::{ATA_SECTOR_SIZE, DeviceIdentity};
use super::port::{AhciPort, Command};
use super::regs::{ATA_CMD_READ_DMA_EXT, ATA_CMD_WRITE_DMA_EXT};

/// Largest sector count a 16-bit FIS count field can carry.
const MAX_FIS_SECTORS: u64 = 65536;

/// A SATA disk behind an AHCI port.
pub struct AhciDisk {
    port: AhciPort,
    identity: Option<DeviceIdentity>,
    bounce: BounceBuffer,
    used_bounce: bool,
}

impl AhciDisk {
    /// Takes ownership of an initialized port and identifies the device.
    pub fn open(port: AhciPort) -> Result<Self, AhciError> {
        let mut disk = Self {
            port,
            identity: None,
            bounce: BounceBuffer::new(),
            used_bounce: false,
        };
        disk.identify()?;
        Ok(disk)
    }

    /// Issues IDENTIFY and refreshes the cached capacity.
    pub fn identify(&mut self) -> Result<DeviceIdentity, AhciError> {
        let id = self.port.identify()?;
        info!(
            "AHCI: port {} -- {:?} \"{}\" {} sectors, {} bytes/sector",
            self.port.port_num(),
            self.port.kind(),
            id.model_str(),
            id.sector_count,
            id.sector_size
        );
        self.identity = Some(id);
        Ok(id)
    }

    /// Last IDENTIFY result.
    #[must_use]
    pub const fn identity(&self) -> Option<&DeviceIdentity> {
        self.identity.as_ref()
    }

    /// Port number (0-31).
    #[must_use]
    pub const fn port_num(&self) -> u8 {
        self.port.port_num()
    }

    /// Addressable blocks: the IDENTIFY sector count, so valid LBAs run from
    /// 0 to `capacity_blocks() - 1` (see [`DeviceIdentity::max_lba`]).
    #[must_use]
    pub fn capacity_blocks(&self) -> u64 {
        self.identity.map_or(0, |id| id.sector_count)
    }

    /// Bytes per block.
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.identity.map_or(ATA_SECTOR_SIZE, |id| id.sector_size)
    }

    /// Largest block count one command can move: the PRDT capacity or the
    /// 16-bit FIS count, whichever is smaller.
    #[must_use]
    pub fn max_blocks_per_transfer(&self) -> u64 {
        let prdt_bytes = (PRDT_ENTRIES_PER_SLOT * self.port.config().entry_bytes()) as u64;
        (prdt_bytes / self.block_size() as u64).min(MAX_FIS_SECTORS)
    }

    /// Whether the most recent transfer went through the bounce buffer.
    #[must_use]
    pub const fn uses_bounce_buffer(&self) -> bool {
        self.used_bounce
    }

    /// Reads `count` blocks starting at `start` into `buf`.
    pub fn read_blocks(&mut self, start: u64, count: u64, buf: &mut [u8]) -> Result<(), AhciError> {
        let op = Operation::Read;
        let bytes = self.validate(op, start, count, buf.len())?;
        if bytes == 0 {
            return Ok(());
        }
        let port = self.port.port_num();
        let staging = self
            .bounce
            .stage(
                self.port.services(),
                self.port.info().supports_64bit,
                buf.as_mut_ptr().cast_const(),
                bytes,
            )
            .map_err(|e| AhciError::dma(op, Some(port), e))?;
        self.used_bounce = staging.is_bounced();

        let issued = self.port.issue(&Command {
            op,
            opcode: ATA_CMD_READ_DMA_EXT,
            lba: start,
            sectors: count as u32,
            device: DEVICE_LBA,
            write: false,
            phys: staging.phys(),
            bytes,
        });
        if let Err(err) = issued {
            self.abandon_in_flight();
            return Err(err);
        }
        staging.copy_to(&mut buf[..bytes]);
        Ok(())
    }

    /// Writes `count` blocks starting at `start` from `buf`.
    pub fn write_blocks(&mut self, start: u64, count: u64, buf: &[u8]) -> Result<(), AhciError> {
        let op = Operation::Write;
        let bytes = self.validate(op, start, count, buf.len())?;
        if bytes == 0 {
            return Ok(());
        }
        let port = self.port.port_num();
        let mut staging = self
            .bounce
            .stage(
                self.port.services(),
                self.port.info().supports_64bit,
                buf.as_ptr(),
                bytes,
            )
            .map_err(|e| AhciError::dma(op, Some(port), e))?;
        self.used_bounce = staging.is_bounced();
        staging.fill_from(&buf[..bytes]);

        let issued = self.port.issue(&Command {
            op,
            opcode: ATA_CMD_WRITE_DMA_EXT,
            lba: start,
            sectors: count as u32,
            device: DEVICE_LBA,
            write: true,
            phys: staging.phys(),
            bytes,
        });
        if let Err(err) = issued {
            self.abandon_in_flight();
            return Err(err);
        }
        Ok(())
    }

    /// After a failed command, gives up the bounce buffer if the port could
    /// not withdraw the command from the HBA.
    fn abandon_in_flight(&mut self) {
        if !self.port.has_outstanding() {
            return;
        }
        if self.used_bounce {
            self.bounce.leak();
        } else {
            error!(
                "AHCI: port {} still owns a caller buffer after a failed command",
                self.port.port_num()
            );
        }
    }

    /// Checks a request against the transfer limit, capacity and buffer
    /// length. Returns the byte count.
    fn validate(&self, op: Operation, start: u64, count: u64, len: usize) -> Result<usize, AhciError> {
        let port = self.port.port_num();
        let max = self.max_blocks_per_transfer();
        if count > max {
            return Err(AhciError::TransferTooLarge {
                op,
                port,
                requested: count,
                max,
            });
        }
        match start.checked_add(count) {
            Some(end) if end <= self.capacity_blocks() => {}
            _ => return Err(AhciError::OutOfRange { op, port }),
        }
        let bytes = count as usize * self.block_size();
        if len < bytes {
            return Err(AhciError::InvalidBuffer { op, port });
        }
        Ok(bytes)
    }
}

impl BlockDevice for AhciDisk {
    fn read_blocks(&mut self, start: u64, count: u64, buf: &mut [u8]) -> Result<(), IoError> {
        Self::read_blocks(self, start, count, buf).map_err(IoError::from)
    }

    fn write_blocks(&mut self, start: u64, count: u64, buf: &[u8]) -> Result<(), IoError> {
        Self::write_blocks(self, start, count, buf).map_err(IoError::from)
    }

    fn block_size(&self) -> usize {
        Self::block_size(self)
    }

    fn block_count(&self) -> u64 {
        self.capacity_blocks()
    }

    fn max_blocks_per_transfer(&self) -> u64 {
        Self::max_blocks_per_transfer(self)
    }
}
