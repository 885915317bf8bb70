//! AHCI error types.

use core::fmt;

use sable_driver_api::{DriverError, IoError};

/// The driver operation an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Controller bring-up (global reset, handoff).
    BringUp,
    /// Port reset.
    Reset,
    /// Starting the port's command engine.
    Start,
    /// Stopping the port's command engine.
    Stop,
    /// Port initialization (memory setup).
    Init,
    /// IDENTIFY (PACKET) DEVICE.
    Identify,
    /// READ DMA EXT.
    Read,
    /// WRITE DMA EXT.
    Write,
}

impl Operation {
    /// Lowercase name used in log and error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::BringUp => "bring-up",
            Self::Reset => "reset",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Init => "init",
            Self::Identify => "identify",
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors raised by the AHCI driver.
///
/// Every variant except [`ControllerNotFound`](Self::ControllerNotFound)
/// aborts the operation it names; nothing is retried inside the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AhciError {
    /// No AHCI controller on the PCI bus. Storage is simply absent.
    ControllerNotFound,
    /// The controller did not complete a state change it owns (HBA reset,
    /// CR/FR settle) in time.
    ControllerUnresponsive {
        /// Operation in progress.
        op: Operation,
        /// Port, if the wait was port-scoped.
        port: Option<u8>,
    },
    /// Every implemented command slot is issued or active.
    NoFreeCommandSlot {
        /// Operation in progress.
        op: Operation,
        /// Port number.
        port: u8,
    },
    /// The device kept BSY/DRQ set, or never completed an issued command.
    PortHungTimeout {
        /// Operation in progress.
        op: Operation,
        /// Port number.
        port: u8,
    },
    /// The device reported a task-file error (PxIS.TFES).
    TaskFileError {
        /// Operation in progress.
        op: Operation,
        /// Port number.
        port: u8,
    },
    /// The request exceeds what one command can describe.
    TransferTooLarge {
        /// Operation in progress.
        op: Operation,
        /// Port number.
        port: u8,
        /// Blocks requested.
        requested: u64,
        /// Blocks allowed per transfer.
        max: u64,
    },
    /// The requested blocks lie beyond the device's capacity.
    OutOfRange {
        /// Operation in progress.
        op: Operation,
        /// Port number.
        port: u8,
    },
    /// The caller's buffer is shorter than the transfer.
    InvalidBuffer {
        /// Operation in progress.
        op: Operation,
        /// Port number.
        port: u8,
    },
    /// DMA memory could not be allocated.
    DmaAllocation {
        /// Operation in progress.
        op: Operation,
        /// Port, if the allocation was port-scoped.
        port: Option<u8>,
    },
}

impl AhciError {
    /// Operation the error belongs to, if any.
    #[must_use]
    pub const fn operation(&self) -> Option<Operation> {
        match *self {
            Self::ControllerNotFound => None,
            Self::ControllerUnresponsive { op, .. }
            | Self::NoFreeCommandSlot { op, .. }
            | Self::PortHungTimeout { op, .. }
            | Self::TaskFileError { op, .. }
            | Self::TransferTooLarge { op, .. }
            | Self::OutOfRange { op, .. }
            | Self::InvalidBuffer { op, .. }
            | Self::DmaAllocation { op, .. } => Some(op),
        }
    }

    /// Port the error belongs to, if any.
    #[must_use]
    pub const fn port(&self) -> Option<u8> {
        match *self {
            Self::ControllerNotFound => None,
            Self::ControllerUnresponsive { port, .. } | Self::DmaAllocation { port, .. } => port,
            Self::NoFreeCommandSlot { port, .. }
            | Self::PortHungTimeout { port, .. }
            | Self::TaskFileError { port, .. }
            | Self::TransferTooLarge { port, .. }
            | Self::OutOfRange { port, .. }
            | Self::InvalidBuffer { port, .. } => Some(port),
        }
    }

    /// Maps a service-level DMA failure into this operation's context.
    #[must_use]
    pub const fn dma(op: Operation, port: Option<u8>, _err: DriverError) -> Self {
        Self::DmaAllocation { op, port }
    }

    fn reason(&self) -> &'static str {
        match self {
            Self::ControllerNotFound => "no AHCI controller found",
            Self::ControllerUnresponsive { .. } => "controller unresponsive",
            Self::NoFreeCommandSlot { .. } => "no free command slot",
            Self::PortHungTimeout { .. } => "port hung",
            Self::TaskFileError { .. } => "task file error",
            Self::TransferTooLarge { .. } => "transfer too large",
            Self::OutOfRange { .. } => "block out of range",
            Self::InvalidBuffer { .. } => "buffer too small",
            Self::DmaAllocation { .. } => "DMA allocation failed",
        }
    }
}

impl fmt::Display for AhciError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.operation(), self.port()) {
            (None, _) => write!(f, "AHCI: {}", self.reason()),
            (Some(op), None) => write!(f, "AHCI: {op} failed: {}", self.reason()),
            (Some(op), Some(port)) => {
                write!(f, "AHCI: {op} failed on port {port}: {}", self.reason())?;
                if let Self::TransferTooLarge { requested, max, .. } = self {
                    write!(f, " ({requested} > {max} blocks)")?;
                }
                Ok(())
            }
        }
    }
}

impl From<AhciError> for IoError {
    fn from(err: AhciError) -> Self {
        match err {
            AhciError::ControllerNotFound | AhciError::NoFreeCommandSlot { .. } => Self::NotReady,
            AhciError::ControllerUnresponsive { .. } | AhciError::PortHungTimeout { .. } => {
                Self::Timeout
            }
            AhciError::TaskFileError { .. } => Self::DeviceError,
            AhciError::TransferTooLarge { .. } => Self::TooLarge,
            AhciError::OutOfRange { .. } => Self::OutOfRange,
            AhciError::InvalidBuffer { .. } => Self::InvalidBuffer,
            AhciError::DmaAllocation { .. } => Self::DmaError,
        }
    }
}
