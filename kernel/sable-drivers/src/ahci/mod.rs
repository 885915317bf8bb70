//! AHCI (Advanced Host Controller Interface) SATA driver.
//!
//! Finds the AHCI controller on the PCI bus (class 0x01, subclass 0x06,
//! prog-if 0x01), brings it up and returns one [`AhciDisk`] per ATA/ATAPI
//! port. All I/O is synchronous and polled; interrupts stay disabled.

use alloc::vec::Vec;

use log::{debug, info, warn};
use sable_driver_api::{KernelServices, PciBar, PciDeviceId, PciDeviceInfo};

pub mod buffer;
pub mod command;
pub mod config;
pub mod disk;
pub mod error;
pub mod hba;
pub mod identify;
pub mod port;
pub mod prdt;
pub mod regs;
pub mod slot;

#[cfg(test)]
pub(crate) mod sim;

pub use config::AhciConfig;
pub use disk::AhciDisk;
pub use error::{AhciError, Operation};
pub use identify::DeviceIdentity;

use hba::AhciHba;
use port::{AhciPort, DeviceKind, PortEngine};

// ---------------------------------------------------------------------------
// PCI IDs
// ---------------------------------------------------------------------------

/// PCI class code for mass storage.
const PCI_CLASS_STORAGE: u8 = 0x01;
/// PCI subclass code for SATA.
const PCI_SUBCLASS_SATA: u8 = 0x06;
/// PCI programming interface for AHCI 1.0.
const PCI_PROGIF_AHCI: u8 = 0x01;

/// Any AHCI-compatible controller.
pub const AHCI_PCI_ID: PciDeviceId =
    PciDeviceId::with_class_progif(PCI_CLASS_STORAGE, PCI_SUBCLASS_SATA, PCI_PROGIF_AHCI);

/// BAR holding the AHCI Base Address (ABAR).
const ABAR_INDEX: usize = 5;

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// Finds the AHCI controller, brings it up and opens every usable port.
///
/// A machine without a controller yields an empty list. Ports that fail to
/// initialize are logged and skipped.
pub fn discover_and_init_all_ports(
    services: &'static dyn KernelServices,
    config: AhciConfig,
) -> Result<Vec<AhciDisk>, AhciError> {
    let Some(pci) = services.find_pci_device(&AHCI_PCI_ID) else {
        info!("AHCI: no controller found");
        return Ok(Vec::new());
    };
    match probe(services, &pci, config) {
        Err(AhciError::ControllerNotFound) => Ok(Vec::new()),
        result => result,
    }
}

/// Brings up the controller described by `pci` and opens its ports.
pub fn probe(
    services: &'static dyn KernelServices,
    pci: &PciDeviceInfo,
    config: AhciConfig,
) -> Result<Vec<AhciDisk>, AhciError> {
    info!(
        "AHCI: controller {:04x}:{:04x} at {}",
        pci.vendor_id, pci.device_id, pci.address
    );

    let PciBar::Memory { base, size } = pci.bars[ABAR_INDEX] else {
        warn!("AHCI: BAR{ABAR_INDEX} is not a memory BAR");
        return Err(AhciError::ControllerNotFound);
    };
    let size = if size == 0 { regs::ABAR_SIZE } else { size };
    let bus = services.map_mmio(base, size).map_err(|err| {
        warn!("AHCI: failed to map ABAR at {base:#x}: {err}");
        AhciError::ControllerNotFound
    })?;
    services.enable_bus_mastering(pci.address);

    let hba = AhciHba::new(bus);
    let info = hba.bring_up(services, &config)?;

    let mut disks = Vec::new();
    for num in hba.implemented_ports() {
        let mut engine = PortEngine::new(hba.port_regs(num), num, services, config);
        let Some(kind) = engine.device_kind() else {
            debug!("AHCI: port {num} has no ATA/ATAPI device");
            continue;
        };
        if kind == DeviceKind::Atapi {
            engine.mark_atapi();
        }
        if !engine.is_idle() {
            if let Err(err) = engine.stop() {
                warn!("AHCI: skipping port {num}: {err}");
                continue;
            }
        }

        match AhciPort::init(engine, kind, info).and_then(AhciDisk::open) {
            Ok(disk) => disks.push(disk),
            Err(err) => warn!("AHCI: skipping port {num}: {err}"),
        }
    }

    info!("AHCI: {} disk(s) ready", disks.len());
    Ok(disks)
}

/// Polls `done` until it returns `true` or `timeout_us` elapses.
///
/// Returns the final value of `done`.
pub(crate) fn wait_until(
    services: &dyn KernelServices,
    timeout_us: u64,
    mut done: impl FnMut() -> bool,
) -> bool {
    let start = services.now_us();
    loop {
        if done() {
            return true;
        }
        if services.now_us().wrapping_sub(start) >= timeout_us {
            return done();
        }
        core::hint::spin_loop();
    }
}
