//! AHCI per-port state and command management.
//!
//! [`PortEngine`] drives the PxCMD engine bits and link reset. [`AhciPort`]
//! adds the DMA structures (command list, received FIS, command tables) and
//! the polled issue/complete protocol.

use alloc::vec::Vec;
use core::ptr;
use core::sync::atomic::{Ordering, fence};

use log::{debug, error, trace, warn};
use sable_driver_api::{DmaRegion, DmaZone, KernelServices};

use super::command::{
    CMD_LIST_ALIGN, CMD_TABLE_ALIGN, CommandHeader, CommandTable, FisRegH2d, RECEIVED_FIS_ALIGN,
    RECEIVED_FIS_SIZE,
};
use super::config::AhciConfig;
use super::error::{AhciError, Operation};
use super::hba::HbaInfo;
use super::identify::{DeviceIdentity, IDENTIFY_LEN};
use super::prdt::{self, PrdtLayout};
use super::regs::{
    ATA_CMD_IDENTIFY, ATA_CMD_IDENTIFY_PACKET, PortCmd, PortIe, PortIs, PortRegs, PortTfd,
    SATA_SIG_ATA, SATA_SIG_ATAPI, SCTL_DET_INIT, SSTS_DET_PRESENT, ssts_det,
};
use super::slot::find_free_slot;
use super::wait_until;

/// Command list size: 32 headers of 32 bytes.
const CMD_LIST_SIZE: usize = 32 * size_of::<CommandHeader>();

/// Kind of device attached to a port, from PxSIG.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// SATA disk.
    Ata,
    /// SATAPI (packet) device.
    Atapi,
}

impl DeviceKind {
    /// Classifies a PxSIG value. Anything else is not driven.
    #[must_use]
    pub const fn from_signature(sig: u32) -> Option<Self> {
        match sig {
            SATA_SIG_ATA => Some(Self::Ata),
            SATA_SIG_ATAPI => Some(Self::Atapi),
            _ => None,
        }
    }

    /// IDENTIFY opcode for this kind of device.
    #[must_use]
    pub const fn identify_command(self) -> u8 {
        match self {
            Self::Ata => ATA_CMD_IDENTIFY,
            Self::Atapi => ATA_CMD_IDENTIFY_PACKET,
        }
    }
}

/// Command engine state as last driven by this driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    /// Not touched yet.
    Unknown,
    /// COMRESET / error acknowledgement in progress.
    Resetting,
    /// ST, CR, FRE and FR all clear.
    Stopped,
    /// FRE and ST set; commands may be issued.
    Running,
    /// A command is outstanding in PxCI.
    CommandIssued,
}

// ---------------------------------------------------------------------------
// Engine control
// ---------------------------------------------------------------------------

/// Control of one port's command engine and link.
pub struct PortEngine {
    regs: PortRegs<'static>,
    num: u8,
    state: PortState,
    services: &'static dyn KernelServices,
    config: AhciConfig,
}

impl PortEngine {
    /// Wraps port `num`'s registers.
    #[must_use]
    pub fn new(
        regs: PortRegs<'static>,
        num: u8,
        services: &'static dyn KernelServices,
        config: AhciConfig,
    ) -> Self {
        Self {
            regs,
            num,
            state: PortState::Unknown,
            services,
            config,
        }
    }

    /// Port number (0-31).
    #[must_use]
    pub const fn num(&self) -> u8 {
        self.num
    }

    /// Current engine state.
    #[must_use]
    pub const fn state(&self) -> PortState {
        self.state
    }

    /// Port registers.
    #[must_use]
    pub const fn regs(&self) -> &PortRegs<'static> {
        &self.regs
    }

    /// Attached device kind, if the signature is one the driver handles.
    #[must_use]
    pub fn device_kind(&self) -> Option<DeviceKind> {
        DeviceKind::from_signature(self.regs.sig())
    }

    /// Returns `true` if none of ST, CR, FR, FRE are set.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        !self.regs.cmd().intersects(PortCmd::ENGINE)
    }

    /// Clears ST and FRE and waits for CR and FR to follow.
    ///
    /// No-op on an idle port.
    pub fn stop(&mut self) -> Result<(), AhciError> {
        if self.is_idle() {
            self.state = PortState::Stopped;
            return Ok(());
        }
        self.regs.set_cmd(self.regs.cmd().difference(PortCmd::ST));
        self.regs.set_cmd(self.regs.cmd().difference(PortCmd::FRE));
        let regs = self.regs;
        if !wait_until(self.services, self.config.port_idle_timeout_us, || {
            !regs.cmd().intersects(PortCmd::CR | PortCmd::FR)
        }) {
            return Err(self.unresponsive(Operation::Stop));
        }
        self.state = PortState::Stopped;
        trace!("AHCI: port {} stopped", self.num);
        Ok(())
    }

    /// Waits for CR to clear, then sets FRE and ST.
    ///
    /// No-op on a running port.
    pub fn start(&mut self) -> Result<(), AhciError> {
        if self.regs.cmd().contains(PortCmd::ST) {
            self.state = PortState::Running;
            return Ok(());
        }
        let regs = self.regs;
        if !wait_until(self.services, self.config.port_idle_timeout_us, || {
            !regs.cmd().contains(PortCmd::CR)
        }) {
            return Err(self.unresponsive(Operation::Start));
        }
        self.regs.set_cmd(self.regs.cmd() | PortCmd::FRE);
        self.regs.set_cmd(self.regs.cmd() | PortCmd::ST);
        self.state = PortState::Running;
        trace!("AHCI: port {} started", self.num);
        Ok(())
    }

    /// Stops the engine, acknowledges errors and, if the device stays busy,
    /// resets the link with a COMRESET.
    ///
    /// A link that never comes back is logged; the port is then unusable but
    /// no error is raised here.
    pub fn reset(&mut self) -> Result<(), AhciError> {
        self.state = PortState::Resetting;
        self.stop()?;
        self.state = PortState::Resetting;
        self.regs.set_is(self.regs.is());

        let regs = self.regs;
        if !wait_until(self.services, self.config.port_idle_timeout_us, || {
            !regs.tfd().intersects(PortTfd::BSY | PortTfd::DRQ)
        }) {
            debug!("AHCI: port {} busy, issuing COMRESET", self.num);
            self.regs.set_sctl(SCTL_DET_INIT);
            self.services.delay_us(self.config.link_reset_hold_us);
            self.regs.set_sctl(0);
        }

        if !wait_until(self.services, self.config.device_detect_timeout_us, || {
            ssts_det(regs.ssts()) == SSTS_DET_PRESENT
        }) {
            warn!("AHCI: port {} no device after reset", self.num);
        }

        self.regs.set_serr(u32::MAX);
        self.state = PortState::Stopped;
        Ok(())
    }

    /// Sets PxCMD.ATAPI.
    pub fn mark_atapi(&self) {
        self.regs.set_cmd(self.regs.cmd() | PortCmd::ATAPI);
    }

    /// Spins up and powers on the device, then lets it settle.
    pub fn spin_up(&self) {
        self.regs.set_cmd(self.regs.cmd() | PortCmd::SUD | PortCmd::POD);
        self.services.delay_us(self.config.spin_up_settle_us);
    }

    /// Points the HBA at a new command list and received-FIS area.
    ///
    /// The engine must be stopped.
    fn relocate(&self, clb: u64, fb: u64) {
        debug_assert!(self.is_idle(), "relocating a running port");
        self.regs.set_clb(clb as u32);
        self.regs.set_clbu((clb >> 32) as u32);
        self.regs.set_fb(fb as u32);
        self.regs.set_fbu((fb >> 32) as u32);
    }

    const fn unresponsive(&self, op: Operation) -> AhciError {
        AhciError::ControllerUnresponsive {
            op,
            port: Some(self.num),
        }
    }
}

// ---------------------------------------------------------------------------
// Initialized port
// ---------------------------------------------------------------------------

/// One ATA command to issue.
#[derive(Debug, Clone, Copy)]
pub struct Command {
    /// Operation, for error context.
    pub op: Operation,
    /// ATA opcode.
    pub opcode: u8,
    /// Starting LBA.
    pub lba: u64,
    /// Sector count (1-65536; 0 for non-data commands).
    pub sectors: u32,
    /// FIS device register.
    pub device: u8,
    /// Host-to-device data direction.
    pub write: bool,
    /// Physical address of the data buffer.
    pub phys: u64,
    /// Bytes to transfer.
    pub bytes: usize,
}

/// An initialized port with its DMA structures.
pub struct AhciPort {
    engine: PortEngine,
    kind: DeviceKind,
    info: HbaInfo,
    cmd_list: DmaRegion,
    _received_fis: DmaRegion,
    cmd_tables: Vec<DmaRegion>,
}

impl AhciPort {
    /// Resets and powers up the port, installs fresh command structures and
    /// restarts the engine.
    pub fn init(mut engine: PortEngine, kind: DeviceKind, info: HbaInfo) -> Result<Self, AhciError> {
        let op = Operation::Init;
        let port = engine.num;

        engine.reset()?;
        engine.start()?;
        engine.spin_up();
        engine.stop()?;

        let services = engine.services;
        let zone = dma_zone(info);
        let alloc = |len, align| {
            DmaRegion::alloc(services, len, align, zone).map_err(|e| AhciError::dma(op, Some(port), e))
        };

        let cmd_list = alloc(CMD_LIST_SIZE, CMD_LIST_ALIGN)?;
        let received_fis = alloc(RECEIVED_FIS_SIZE, RECEIVED_FIS_ALIGN)?;
        let mut cmd_tables = Vec::with_capacity(usize::from(info.num_cmd_slots));
        for _ in 0..info.num_cmd_slots {
            cmd_tables.push(alloc(size_of::<CommandTable>(), CMD_TABLE_ALIGN)?);
        }

        engine.relocate(cmd_list.phys(), received_fis.phys());
        for (slot, table) in cmd_tables.iter().enumerate() {
            let header = cmd_list.as_ptr().cast::<CommandHeader>().wrapping_add(slot);
            // SAFETY: slot < num_cmd_slots <= 32 headers in the command list.
            unsafe { ptr::write_volatile(header, CommandHeader::new(table.phys(), false, 0)) };
        }

        engine.regs.set_serr(u32::MAX);
        engine.regs.set_is(engine.regs.is());
        engine.regs.set_ie(PortIe::empty());
        engine.start()?;

        debug!(
            "AHCI: port {port} initialized ({kind:?}, clb={:#x}, fb={:#x})",
            cmd_list.phys(),
            received_fis.phys()
        );

        Ok(Self {
            engine,
            kind,
            info,
            cmd_list,
            _received_fis: received_fis,
            cmd_tables,
        })
    }

    /// Port number (0-31).
    #[must_use]
    pub const fn port_num(&self) -> u8 {
        self.engine.num
    }

    /// Attached device kind.
    #[must_use]
    pub const fn kind(&self) -> DeviceKind {
        self.kind
    }

    /// Controller facts this port was set up with.
    #[must_use]
    pub const fn info(&self) -> HbaInfo {
        self.info
    }

    /// Engine state.
    #[must_use]
    pub const fn state(&self) -> PortState {
        self.engine.state
    }

    /// Platform services the port allocates from.
    #[must_use]
    pub const fn services(&self) -> &'static dyn KernelServices {
        self.engine.services
    }

    /// Driver configuration.
    #[must_use]
    pub const fn config(&self) -> &AhciConfig {
        &self.engine.config
    }

    /// Zone DMA buffers for this port must come from.
    #[must_use]
    pub const fn dma_zone(&self) -> DmaZone {
        dma_zone(self.info)
    }

    /// Issues IDENTIFY (PACKET) DEVICE into a scratch buffer and parses it.
    pub fn identify(&mut self) -> Result<DeviceIdentity, AhciError> {
        let op = Operation::Identify;
        let port = self.port_num();
        let scratch = DmaRegion::alloc(self.services(), IDENTIFY_LEN, 2, self.dma_zone())
            .map_err(|e| AhciError::dma(op, Some(port), e))?;

        let issued = self.issue(&Command {
            op,
            opcode: self.kind.identify_command(),
            lba: 0,
            sectors: 0,
            device: 0,
            write: false,
            phys: scratch.phys(),
            bytes: IDENTIFY_LEN,
        });
        if let Err(err) = issued {
            if self.has_outstanding() {
                core::mem::forget(scratch);
            }
            return Err(err);
        }

        DeviceIdentity::parse(scratch.as_slice()).ok_or(AhciError::InvalidBuffer { op, port })
    }

    /// Returns `true` while the HBA still holds an issued command, i.e. it
    /// may yet DMA to that command's buffer.
    #[must_use]
    pub fn has_outstanding(&self) -> bool {
        self.engine.regs.ci() != 0
    }

    /// Builds, issues and polls one command to completion.
    ///
    /// Returns the PRDT layout actually used. A command that fails or times
    /// out is withdrawn from the HBA by cycling the engine, so its buffer is
    /// no longer a DMA target once this returns. Should the engine refuse to
    /// stop, [`has_outstanding`](Self::has_outstanding) stays `true`.
    pub fn issue(&mut self, cmd: &Command) -> Result<PrdtLayout, AhciError> {
        let port = self.engine.num;
        let regs = self.engine.regs;
        let services = self.engine.services;
        let config = self.engine.config;

        let slot = find_free_slot(regs.sact(), regs.ci(), self.info.num_cmd_slots)
            .ok_or(AhciError::NoFreeCommandSlot { op: cmd.op, port })?;
        let slot_bit = 1u32 << slot;

        let mut table = CommandTable::zeroed();
        let layout = prdt::build(&mut table.prdt, cmd.phys, cmd.bytes, config.entry_bytes());
        let mut sectors = cmd.sectors;
        if layout.truncated {
            warn!(
                "{}",
                AhciError::TransferTooLarge {
                    op: cmd.op,
                    port,
                    requested: cmd.bytes as u64,
                    max: layout.bytes as u64,
                }
            );
            sectors = (u64::from(sectors) * layout.bytes as u64 / cmd.bytes as u64) as u32;
        }
        // 65536 sectors wrap to 0, which the device reads as 65536.
        table.cfis = FisRegH2d::command(cmd.opcode, cmd.lba, sectors as u16, cmd.device);

        let slot = usize::from(slot);
        let header = CommandHeader::new(self.cmd_tables[slot].phys(), cmd.write, layout.entries as u16);
        // SAFETY: the slot is clear in SACT and CI, so the HBA is not reading
        // its header or table; both pointers are inside regions we own and the
        // table region is CMD_TABLE_ALIGN aligned.
        unsafe {
            ptr::write_volatile(
                self.cmd_list.as_ptr().cast::<CommandHeader>().wrapping_add(slot),
                header,
            );
            ptr::write_volatile(self.cmd_tables[slot].as_ptr().cast::<CommandTable>(), table);
        }

        if !wait_until(services, config.command_ready_timeout_us, || {
            !regs.tfd().intersects(PortTfd::BSY | PortTfd::DRQ)
        }) {
            error!("{}", AhciError::PortHungTimeout { op: cmd.op, port });
            return Err(AhciError::PortHungTimeout { op: cmd.op, port });
        }

        regs.set_is(regs.is());
        fence(Ordering::SeqCst);
        self.engine.state = PortState::CommandIssued;
        trace!(
            "AHCI: port {port} slot {slot} cmd {:#04x} lba {} sectors {} prdt {}",
            cmd.opcode, cmd.lba, sectors, layout.entries
        );
        regs.set_ci(slot_bit);

        let mut task_file_error = false;
        let completed = wait_until(services, config.command_timeout_us, || {
            if regs.is().contains(PortIs::TFES) {
                task_file_error = true;
                return true;
            }
            regs.ci() & slot_bit == 0
        });
        fence(Ordering::SeqCst);
        self.engine.state = PortState::Running;

        let err = if task_file_error || regs.is().contains(PortIs::TFES) {
            let err = AhciError::TaskFileError { op: cmd.op, port };
            error!("{err} (tfd={:#x})", regs.tfd().bits());
            err
        } else if !completed {
            let err = AhciError::PortHungTimeout { op: cmd.op, port };
            error!("{err}");
            err
        } else {
            return Ok(layout);
        };
        self.withdraw_issued(slot);
        Err(err)
    }

    /// Stops and restarts the engine. Clearing PxCMD.ST makes the HBA drop
    /// every slot in PxCI.
    fn withdraw_issued(&mut self, slot: usize) {
        let restarted = self.engine.stop().and_then(|()| {
            self.engine.regs.set_serr(u32::MAX);
            self.engine.regs.set_is(self.engine.regs.is());
            self.engine.start()
        });
        match restarted {
            Ok(()) => debug!("AHCI: port {} slot {slot} withdrawn", self.engine.num),
            Err(err) => error!("{err} while withdrawing slot {slot}, port left wedged"),
        }
    }
}

impl Drop for AhciPort {
    fn drop(&mut self) {
        if let Err(err) = self.engine.stop() {
            warn!("{err} while releasing port");
        }
    }
}

const fn dma_zone(info: HbaInfo) -> DmaZone {
    if info.supports_64bit {
        DmaZone::Any
    } else {
        DmaZone::Below4G
    }
}
