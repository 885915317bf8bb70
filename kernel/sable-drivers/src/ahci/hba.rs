//! AHCI HBA (Host Bus Adapter) controller.
//!
//! Owns the generic host control block: global reset, AHCI enable, BIOS/OS
//! handoff and the capability facts every port depends on.

use log::{debug, info, warn};
use sable_driver_api::KernelServices;
use sable_mmio::RegisterBus;

use super::config::AhciConfig;
use super::error::{AhciError, Operation};
use super::regs::{self, HbaBohc, HbaCap, HbaCap2, HbaGhc, HbaRegs, PortRegs};
use super::wait_until;

/// Controller-wide facts recorded at bring-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HbaInfo {
    /// Command slots per port (1-32).
    pub num_cmd_slots: u8,
    /// Whether DMA addresses above 4 GiB may be used.
    pub supports_64bit: bool,
}

/// AHCI HBA controller state.
pub struct AhciHba {
    bus: &'static dyn RegisterBus,
    regs: HbaRegs<'static>,
}

impl AhciHba {
    /// Wraps the ABAR register space.
    #[must_use]
    pub fn new(bus: &'static dyn RegisterBus) -> Self {
        Self {
            bus,
            regs: HbaRegs::new(bus, 0),
        }
    }

    /// Resets the controller, enables AHCI mode and takes ownership from the
    /// BIOS.
    pub fn bring_up(
        &self,
        services: &dyn KernelServices,
        config: &AhciConfig,
    ) -> Result<HbaInfo, AhciError> {
        let (major, minor) = self.version();
        info!("AHCI: controller version {major:x}.{minor:x}");

        self.reset(services, config)?;
        self.enable_ahci();
        self.bios_handoff(services, config);

        let cap = self.regs.cap();
        let advertised = cap.contains(HbaCap::S64A);
        let info = HbaInfo {
            num_cmd_slots: cap.num_cmd_slots(),
            supports_64bit: advertised && !config.force_32bit_dma,
        };
        if advertised && !info.supports_64bit {
            info!("AHCI: 64-bit DMA disabled by configuration");
        }
        debug!(
            "AHCI: {} command slots, 64-bit DMA: {}",
            info.num_cmd_slots, info.supports_64bit
        );
        Ok(info)
    }

    /// Performs a global HBA reset and waits for the controller to finish it.
    pub fn reset(
        &self,
        services: &dyn KernelServices,
        config: &AhciConfig,
    ) -> Result<(), AhciError> {
        self.enable_ahci();
        self.regs.set_ghc(self.regs.ghc() | HbaGhc::HR);
        if !wait_until(services, config.controller_timeout_us, || {
            !self.regs.ghc().contains(HbaGhc::HR)
        }) {
            return Err(AhciError::ControllerUnresponsive {
                op: Operation::BringUp,
                port: None,
            });
        }
        debug!("AHCI: HBA reset complete");
        Ok(())
    }

    /// Sets GHC.AE. Interrupts stay disabled; the driver polls.
    pub fn enable_ahci(&self) {
        let ghc = self.regs.ghc().difference(HbaGhc::IE);
        self.regs.set_ghc(ghc | HbaGhc::AE);
    }

    /// Requests OS ownership if the controller supports BIOS/OS handoff.
    ///
    /// A BIOS that never releases ownership is logged, not fatal.
    pub fn bios_handoff(&self, services: &dyn KernelServices, config: &AhciConfig) {
        if !self.regs.cap2().contains(HbaCap2::BOH) {
            return;
        }
        self.regs.set_bohc(self.regs.bohc() | HbaBohc::OOS);
        if !wait_until(services, config.bios_handoff_timeout_us, || {
            !self.regs.bohc().contains(HbaBohc::BOS)
        }) {
            warn!("AHCI: BIOS did not release ownership");
        }
        services.delay_us(config.bios_settle_us);
        if self.regs.bohc().contains(HbaBohc::BB) {
            debug!("AHCI: BIOS busy, waiting");
            services.delay_us(config.bios_busy_wait_us);
        }
        debug!("AHCI: BIOS/OS handoff complete");
    }

    /// Ports Implemented bitmask.
    #[must_use]
    pub fn ports_implemented(&self) -> u32 {
        self.regs.pi()
    }

    /// AHCI version as (major, minor).
    #[must_use]
    pub fn version(&self) -> (u16, u16) {
        let vs = self.regs.vs();
        ((vs >> 16) as u16, vs as u16)
    }

    /// Register block of port `port`.
    #[must_use]
    pub fn port_regs(&self, port: u8) -> PortRegs<'static> {
        debug_assert!(port < regs::MAX_PORTS);
        PortRegs::new(self.bus, regs::port_offset(port))
    }

    /// Implemented port numbers in ascending order.
    pub fn implemented_ports(&self) -> impl Iterator<Item = u8> {
        let pi = self.ports_implemented();
        (0..regs::MAX_PORTS).filter(move |p| pi & (1 << p) != 0)
    }
}
