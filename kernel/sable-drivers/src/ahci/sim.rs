//! Simulated AHCI controller and platform for host tests.
//!
//! [`SimMachine`] is both the ABAR register space and the
//! [`KernelServices`] the driver runs on. Commands written to PxCI are
//! executed immediately against an in-memory disk image by walking the real
//! command list, command table and PRDT the driver built.
//!
//! Physical addresses are fake. DMA allocations get low addresses from a bump
//! allocator; any other host memory (caller `Vec`s) is mapped at
//! `virt + HIGH_MAP`, i.e. above 4 GiB, optionally with each pair of 4 KiB
//! pages swapped.

use std::alloc::{Layout, alloc_zeroed, dealloc};
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock};

use sable_driver_api::{
    DmaRegion, DmaZone, DriverError, KernelServices, PciAddress, PciBar, PciDeviceId,
    PciDeviceInfo,
};
use sable_mmio::RegisterBus;

use super::command::{CommandHeader, CommandTable};
use super::identify::tests::identify_image;
use super::regs::{
    ABAR_SIZE, ATA_CMD_IDENTIFY, ATA_CMD_IDENTIFY_PACKET, ATA_CMD_READ_DMA_EXT,
    ATA_CMD_WRITE_DMA_EXT, HbaBohc, HbaCap, HbaCap2, HbaGhc, MAX_PORTS, PORT_BASE, PORT_REG_SIZE,
    PortCmd, PortIs, PortTfd, SATA_SIG_ATA, SATA_SIG_ATAPI,
};

/// Offset added to host virtual addresses outside DMA allocations.
const HIGH_MAP: u64 = 1 << 48;
/// First fake physical address handed out by `alloc_dma`.
const LOW_BASE: u64 = 0x0010_0000;
/// Fake ABAR physical address.
const ABAR_PHYS: u64 = 0xFEBF_0000;
/// Bit that swaps adjacent 4 KiB pages in the high mapping.
const PAGE_SWAP: u64 = 0x1000;
/// Clock advance per `now_us` call.
const TICK_US: u64 = 100;
/// Simulated sector size.
const SECTOR: usize = 512;

/// SStatus of an established Gen1 link with an active device.
const SSTS_LINK_UP: u32 = 0x113;
/// Task file of an idle, ready device (DRDY | DSC).
const TFD_READY: u32 = 0x50;

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct PortSetup {
    present: bool,
    atapi: bool,
    sectors: u64,
    stuck_engine: bool,
    busy_until_comreset: bool,
    running: bool,
    error_after_completion: bool,
}

impl Default for PortSetup {
    fn default() -> Self {
        Self {
            present: true,
            atapi: false,
            sectors: 8192,
            stuck_engine: false,
            busy_until_comreset: false,
            running: false,
            error_after_completion: false,
        }
    }
}

/// Configures a [`SimMachine`].
pub(crate) struct SimBuilder {
    controller: bool,
    ports_implemented: u32,
    slots: u8,
    dma64: bool,
    stuck_hba_reset: bool,
    bios_owned: bool,
    bios_busy: bool,
    swapped_pages: bool,
    ports: Vec<PortSetup>,
}

impl SimBuilder {
    /// Ports Implemented mask.
    pub(crate) fn ports(mut self, mask: u32) -> Self {
        self.ports_implemented = mask;
        self
    }

    /// Command slots per port.
    pub(crate) fn slots(mut self, slots: u8) -> Self {
        self.slots = slots;
        self
    }

    /// Whether CAP.S64A is advertised.
    pub(crate) fn dma64(mut self, dma64: bool) -> Self {
        self.dma64 = dma64;
        self
    }

    /// Disk image size of `port`.
    pub(crate) fn disk_sectors(mut self, port: u8, sectors: u64) -> Self {
        self.ports[usize::from(port)].sectors = sectors;
        self
    }

    /// No device behind `port`.
    pub(crate) fn no_device(mut self, port: u8) -> Self {
        self.ports[usize::from(port)].present = false;
        self
    }

    /// `port` carries a packet device.
    pub(crate) fn atapi(mut self, port: u8) -> Self {
        self.ports[usize::from(port)].atapi = true;
        self
    }

    /// CR/FR on `port` never clear once set.
    pub(crate) fn stuck_engine(mut self, port: u8) -> Self {
        self.ports[usize::from(port)].stuck_engine = true;
        self
    }

    /// `port` reports BSY until it sees a COMRESET.
    pub(crate) fn busy_until_comreset(mut self, port: u8) -> Self {
        self.ports[usize::from(port)].busy_until_comreset = true;
        self
    }

    /// `port`'s engine is already running (left on by firmware).
    pub(crate) fn running(mut self, port: u8) -> Self {
        self.ports[usize::from(port)].running = true;
        self
    }

    /// Every command on `port` clears its CI bit, then raises TFES one PxIS
    /// read later.
    pub(crate) fn error_after_completion(mut self, port: u8) -> Self {
        self.ports[usize::from(port)].error_after_completion = true;
        self
    }

    /// GHC.HR never self-clears.
    pub(crate) fn stuck_hba_reset(mut self) -> Self {
        self.stuck_hba_reset = true;
        self
    }

    /// CAP2.BOH advertised and the BIOS owns the controller.
    pub(crate) fn bios_owned(mut self) -> Self {
        self.bios_owned = true;
        self
    }

    /// BIOS owned, and BIOS Busy stays set after the handoff.
    pub(crate) fn bios_busy(mut self) -> Self {
        self.bios_owned = true;
        self.bios_busy = true;
        self
    }

    /// Host memory is mapped with adjacent 4 KiB pages swapped, so no
    /// multi-page `Vec` is physically contiguous.
    pub(crate) fn swapped_pages(mut self) -> Self {
        self.swapped_pages = true;
        self
    }

    /// No AHCI function on the PCI bus.
    pub(crate) fn no_controller(mut self) -> Self {
        self.controller = false;
        self
    }

    /// Builds a machine that lives for the rest of the test process.
    pub(crate) fn build(self) -> &'static SimMachine {
        let ports = self
            .ports
            .iter()
            .map(|setup| SimPort::new(setup.clone()))
            .collect();

        let mut cap = HbaCap::from_bits_retain(
            (u32::from(self.slots.clamp(1, 32) - 1) << 8)
                | (self.ports_implemented.count_ones().saturating_sub(1) & 0x1F),
        );
        if self.dma64 {
            cap |= HbaCap::S64A;
        }
        let cap2 = if self.bios_owned {
            HbaCap2::BOH
        } else {
            HbaCap2::empty()
        };
        let bohc = match (self.bios_owned, self.bios_busy) {
            (false, _) => HbaBohc::empty(),
            (true, false) => HbaBohc::BOS,
            (true, true) => HbaBohc::BOS | HbaBohc::BB,
        };

        let sim: &'static SimMachine = Box::leak(Box::new(SimMachine {
            this: OnceLock::new(),
            clock: AtomicU64::new(0),
            controller: self.controller,
            state: Mutex::new(SimState {
                cap,
                cap2,
                ghc: HbaGhc::AE,
                bohc,
                pi: self.ports_implemented,
                stuck_hba_reset: self.stuck_hba_reset,
                bios_busy: self.bios_busy,
                hba_resets: 0,
                bus_mastering: false,
                relocations_while_running: 0,
                ports,
                mem: Memory {
                    next_phys: LOW_BASE,
                    allocations: Vec::new(),
                    high_swap: if self.swapped_pages { PAGE_SWAP } else { 0 },
                },
            }),
        }));
        let _ = sim.this.set(sim);
        sim
    }
}

// ---------------------------------------------------------------------------
// Memory map
// ---------------------------------------------------------------------------

struct Allocation {
    phys: u64,
    virt: usize,
    layout: Layout,
}

struct Memory {
    next_phys: u64,
    allocations: Vec<Allocation>,
    high_swap: u64,
}

impl Memory {
    fn alloc(&mut self, size: usize, align: usize) -> Result<u64, DriverError> {
        let layout =
            Layout::from_size_align(size.max(1), align).map_err(|_| DriverError::OutOfMemory)?;
        // SAFETY: layout has a non-zero size.
        let virt = unsafe { alloc_zeroed(layout) };
        if virt.is_null() {
            return Err(DriverError::OutOfMemory);
        }
        let align = align as u64;
        let phys = self.next_phys.div_ceil(align) * align;
        self.next_phys = phys + size as u64;
        assert!(self.next_phys <= 1 << 32, "simulated low memory exhausted");
        self.allocations.push(Allocation {
            phys,
            virt: virt as usize,
            layout,
        });
        Ok(phys)
    }

    fn free(&mut self, phys: u64) {
        let idx = self
            .allocations
            .iter()
            .position(|a| a.phys == phys)
            .expect("free of unknown DMA address");
        let a = self.allocations.swap_remove(idx);
        // SAFETY: allocated in `alloc` with this layout.
        unsafe { dealloc(a.virt as *mut u8, a.layout) };
    }

    fn phys_to_virt(&self, phys: u64) -> *mut u8 {
        for a in &self.allocations {
            if phys >= a.phys && phys < a.phys + a.layout.size() as u64 {
                return (a.virt + (phys - a.phys) as usize) as *mut u8;
            }
        }
        assert!(phys >= HIGH_MAP, "DMA to unmapped address {phys:#x}");
        ((phys - HIGH_MAP) ^ self.high_swap) as *mut u8
    }

    fn virt_to_phys(&self, virt: *const u8) -> u64 {
        let v = virt as usize;
        for a in &self.allocations {
            if v >= a.virt && v < a.virt + a.layout.size() {
                return a.phys + (v - a.virt) as u64;
            }
        }
        (v as u64 ^ self.high_swap) + HIGH_MAP
    }
}

// ---------------------------------------------------------------------------
// Controller model
// ---------------------------------------------------------------------------

struct SimPort {
    setup: PortSetup,
    clb: u32,
    clbu: u32,
    fb: u32,
    fbu: u32,
    is: u32,
    ie: u32,
    cmd: PortCmd,
    tfd: u32,
    sig: u32,
    ssts: u32,
    sctl: u32,
    serr: u32,
    sact: u32,
    ci: u32,
    busy: bool,
    fail_next: bool,
    hang_next: bool,
    late_tfes: Option<u8>,
    comreset_pending: bool,
    disk: Vec<u8>,
    stats: PortStats,
}

#[derive(Default)]
struct PortStats {
    cmd_writes: usize,
    comresets: usize,
    relocations: usize,
    spin_ups: usize,
    ci_writes: usize,
    last_slot: Option<u8>,
    last_command: Option<u8>,
    last_prdt_entries: Option<usize>,
    last_fis_count: Option<u16>,
    max_prdt_end: u64,
}

impl SimPort {
    fn new(setup: PortSetup) -> Self {
        let (sig, ssts, tfd) = match (setup.present, setup.atapi) {
            (false, _) => (u32::MAX, 0, 0x7F),
            (true, false) => (SATA_SIG_ATA, SSTS_LINK_UP, TFD_READY),
            (true, true) => (SATA_SIG_ATAPI, SSTS_LINK_UP, TFD_READY),
        };
        let cmd = if setup.running {
            PortCmd::ENGINE
        } else {
            PortCmd::empty()
        };
        let disk_len = if setup.present && !setup.atapi {
            setup.sectors as usize * SECTOR
        } else {
            0
        };
        Self {
            busy: setup.busy_until_comreset,
            setup,
            clb: 0,
            clbu: 0,
            fb: 0,
            fbu: 0,
            is: 0,
            ie: 0,
            cmd,
            tfd,
            sig,
            ssts,
            sctl: 0,
            serr: 0x0400_0000,
            sact: 0,
            ci: 0,
            fail_next: false,
            hang_next: false,
            late_tfes: None,
            comreset_pending: false,
            disk: vec![0; disk_len],
            stats: PortStats::default(),
        }
    }

    fn tfd(&self) -> u32 {
        if self.busy {
            self.tfd | PortTfd::BSY.bits()
        } else {
            self.tfd
        }
    }

    fn write_cmd(&mut self, value: u32) {
        self.stats.cmd_writes += 1;
        let old = self.cmd;
        let mut new = PortCmd::from_bits_retain(value).difference(PortCmd::CR | PortCmd::FR);
        let stuck = self.setup.stuck_engine;
        if new.contains(PortCmd::ST) || (stuck && old.contains(PortCmd::CR)) {
            new |= PortCmd::CR;
        }
        if new.contains(PortCmd::FRE) || (stuck && old.contains(PortCmd::FR)) {
            new |= PortCmd::FR;
        }
        if new.contains(PortCmd::SUD) && !old.contains(PortCmd::SUD) {
            self.stats.spin_ups += 1;
        }
        if old.contains(PortCmd::ST) && !new.contains(PortCmd::ST) {
            self.ci = 0;
            self.sact = 0;
        }
        self.cmd = new;
    }

    fn write_sctl(&mut self, value: u32) {
        self.sctl = value;
        if value & 0xF == 1 {
            self.stats.comresets += 1;
            self.comreset_pending = true;
            self.ssts = 0;
        } else if value & 0xF == 0 && self.comreset_pending {
            self.comreset_pending = false;
            self.busy = false;
            if self.setup.present {
                self.ssts = SSTS_LINK_UP;
                self.tfd = TFD_READY;
            }
        }
    }

    fn engine_active(&self) -> bool {
        self.cmd.intersects(PortCmd::ENGINE)
    }

    fn read_is(&mut self) -> u32 {
        match self.late_tfes {
            Some(0) => {
                self.late_tfes = None;
                self.is |= PortIs::TFES.bits();
                self.tfd |= PortTfd::ERR.bits();
            }
            Some(n) => self.late_tfes = Some(n - 1),
            None => {}
        }
        self.is
    }
}

struct SimState {
    cap: HbaCap,
    cap2: HbaCap2,
    ghc: HbaGhc,
    bohc: HbaBohc,
    pi: u32,
    stuck_hba_reset: bool,
    bios_busy: bool,
    hba_resets: usize,
    bus_mastering: bool,
    relocations_while_running: usize,
    ports: Vec<SimPort>,
    mem: Memory,
}

impl SimState {
    fn read(&mut self, offset: u64) -> u32 {
        if offset >= PORT_BASE {
            let (port, reg) = split_port_offset(offset);
            let p = &mut self.ports[port];
            return match reg {
                0x00 => p.clb,
                0x04 => p.clbu,
                0x08 => p.fb,
                0x0C => p.fbu,
                0x10 => p.read_is(),
                0x14 => p.ie,
                0x18 => p.cmd.bits(),
                0x20 => p.tfd(),
                0x24 => p.sig,
                0x28 => p.ssts,
                0x2C => p.sctl,
                0x30 => p.serr,
                0x34 => p.sact,
                0x38 => p.ci,
                _ => 0,
            };
        }
        match offset {
            0x00 => self.cap.bits(),
            0x04 => self.ghc.bits(),
            0x0C => self.pi,
            0x10 => 0x0001_0301,
            0x24 => self.cap2.bits(),
            0x28 => self.bohc.bits(),
            _ => 0,
        }
    }

    fn write(&mut self, offset: u64, value: u32) {
        if offset >= PORT_BASE {
            self.write_port(offset, value);
            return;
        }
        match offset {
            0x04 => {
                let ghc = HbaGhc::from_bits_retain(value);
                if ghc.contains(HbaGhc::HR) {
                    self.hba_resets += 1;
                    self.ghc = if self.stuck_hba_reset {
                        HbaGhc::HR
                    } else {
                        HbaGhc::empty()
                    };
                } else {
                    self.ghc = ghc;
                }
            }
            0x28 => {
                let mut bohc = HbaBohc::from_bits_retain(value);
                if bohc.contains(HbaBohc::OOS) {
                    bohc.remove(HbaBohc::BOS);
                    if !self.bios_busy {
                        bohc.remove(HbaBohc::BB);
                    }
                }
                self.bohc = bohc;
            }
            _ => {}
        }
    }

    fn write_port(&mut self, offset: u64, value: u32) {
        let (port, reg) = split_port_offset(offset);
        let p = &mut self.ports[port];
        match reg {
            0x00 | 0x04 | 0x08 | 0x0C => {
                if p.engine_active() {
                    self.relocations_while_running += 1;
                }
                match reg {
                    0x00 => {
                        p.stats.relocations += 1;
                        p.clb = value;
                    }
                    0x04 => p.clbu = value,
                    0x08 => p.fb = value,
                    _ => p.fbu = value,
                }
            }
            0x10 => p.is &= !value,
            0x14 => p.ie = value,
            0x18 => p.write_cmd(value),
            0x2C => p.write_sctl(value),
            0x30 => p.serr &= !value,
            0x34 => p.sact |= value,
            0x38 => {
                p.stats.ci_writes += 1;
                p.ci |= value;
                for slot in 0..32u8 {
                    if value & (1 << slot) != 0 {
                        self.execute(port, slot);
                    }
                }
            }
            _ => {}
        }
    }

    /// Runs the command in `slot` the way the HBA would.
    fn execute(&mut self, port: usize, slot: u8) {
        let mem = &self.mem;
        let p = &mut self.ports[port];
        if !p.cmd.contains(PortCmd::ST) {
            return;
        }
        p.stats.last_slot = Some(slot);
        if p.hang_next {
            p.hang_next = false;
            return;
        }
        if p.fail_next {
            p.fail_next = false;
            p.is |= PortIs::TFES.bits();
            p.tfd |= PortTfd::ERR.bits();
            return;
        }

        let clb = u64::from(p.clb) | (u64::from(p.clbu) << 32);
        let header_ptr = mem.phys_to_virt(clb + u64::from(slot) * 32);
        // SAFETY: the driver owns a live command list at CLB.
        let header = unsafe { ptr::read_unaligned(header_ptr.cast::<CommandHeader>()) };
        // SAFETY: the header points at a live command table.
        let table = unsafe {
            ptr::read_unaligned(mem.phys_to_virt(header.ctba()).cast::<CommandTable>())
        };
        let entries = usize::from(header.prdtl);
        let prdt: Vec<(u64, usize)> = table.prdt[..entries]
            .iter()
            .map(|e| (e.address(), e.byte_count() as usize))
            .collect();
        p.stats.last_prdt_entries = Some(entries);
        p.stats.last_command = Some(table.cfis.command);
        p.stats.last_fis_count = Some(table.cfis.count());
        for &(addr, len) in &prdt {
            p.stats.max_prdt_end = p.stats.max_prdt_end.max(addr + len as u64);
        }

        let lba = table.cfis.lba() as usize;
        let count = match table.cfis.count() {
            0 => 65536,
            n => usize::from(n),
        };
        let ok = match (table.cfis.command, p.setup.atapi) {
            (ATA_CMD_IDENTIFY, false) | (ATA_CMD_IDENTIFY_PACKET, true) => {
                let image = identify_image(
                    (p.disk.len() / SECTOR) as u64,
                    "SABLE SIM DISK",
                    &format!("SIM{port:04}"),
                );
                scatter(mem, &prdt, &image);
                true
            }
            (ATA_CMD_READ_DMA_EXT, false) if (lba + count) * SECTOR <= p.disk.len() => {
                scatter(mem, &prdt, &p.disk[lba * SECTOR..(lba + count) * SECTOR]);
                true
            }
            (ATA_CMD_WRITE_DMA_EXT, false) if (lba + count) * SECTOR <= p.disk.len() => {
                let end = (lba + count) * SECTOR;
                gather(mem, &prdt, &mut p.disk[lba * SECTOR..end]);
                true
            }
            _ => false,
        };

        if ok {
            p.ci &= !(1 << slot);
            p.is |= PortIs::DHRS.bits();
            if p.setup.error_after_completion {
                p.late_tfes = Some(1);
            }
        } else {
            p.is |= PortIs::TFES.bits();
            p.tfd |= PortTfd::ERR.bits();
        }
    }
}

fn split_port_offset(offset: u64) -> (usize, u64) {
    let rel = offset - PORT_BASE;
    let port = rel / PORT_REG_SIZE;
    assert!(port < u64::from(MAX_PORTS), "offset {offset:#x} beyond ABAR");
    (port as usize, rel % PORT_REG_SIZE)
}

/// Copies `data` out through the PRDT.
fn scatter(mem: &Memory, prdt: &[(u64, usize)], mut data: &[u8]) {
    for &(addr, len) in prdt {
        let n = len.min(data.len());
        // SAFETY: PRDT entries describe live buffers owned by the driver or
        // the test.
        unsafe { ptr::copy_nonoverlapping(data.as_ptr(), mem.phys_to_virt(addr), n) };
        data = &data[n..];
    }
}

/// Fills `out` from the PRDT.
fn gather(mem: &Memory, prdt: &[(u64, usize)], out: &mut [u8]) {
    let mut done = 0;
    for &(addr, len) in prdt {
        let n = len.min(out.len() - done);
        // SAFETY: as in `scatter`.
        unsafe { ptr::copy_nonoverlapping(mem.phys_to_virt(addr), out[done..].as_mut_ptr(), n) };
        done += n;
    }
}

// ---------------------------------------------------------------------------
// Machine
// ---------------------------------------------------------------------------

/// A simulated PC with one AHCI controller.
pub(crate) struct SimMachine {
    this: OnceLock<&'static SimMachine>,
    clock: AtomicU64,
    controller: bool,
    state: Mutex<SimState>,
}

impl SimMachine {
    /// Default machine: one ATA port, 32 slots, no 64-bit DMA.
    pub(crate) fn builder() -> SimBuilder {
        SimBuilder {
            controller: true,
            ports_implemented: 0b1,
            slots: 32,
            dma64: false,
            stuck_hba_reset: false,
            bios_owned: false,
            bios_busy: false,
            swapped_pages: false,
            ports: vec![PortSetup::default(); usize::from(MAX_PORTS)],
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap()
    }

    fn port<R>(&self, port: u8, f: impl FnOnce(&mut SimPort) -> R) -> R {
        f(&mut self.lock().ports[usize::from(port)])
    }

    /// The ABAR register space.
    pub(crate) fn bus(&'static self) -> &'static dyn RegisterBus {
        self
    }

    /// The platform services.
    pub(crate) fn services(&'static self) -> &'static dyn KernelServices {
        self
    }

    /// A DMA buffer in low memory, for direct 32-bit transfers.
    pub(crate) fn alloc_low_buffer(&'static self, len: usize) -> DmaRegion {
        DmaRegion::alloc(self, len, 16, DmaZone::Below4G).unwrap()
    }

    /// Current simulated time, without advancing it.
    pub(crate) fn clock_us(&self) -> u64 {
        self.clock.load(Ordering::Relaxed)
    }

    /// Live DMA allocations.
    pub(crate) fn live_dma_allocations(&self) -> usize {
        self.lock().mem.allocations.len()
    }

    /// Times GHC.HR was written.
    pub(crate) fn hba_resets(&self) -> usize {
        self.lock().hba_resets
    }

    /// Whether the driver enabled bus mastering.
    pub(crate) fn bus_mastering_enabled(&self) -> bool {
        self.lock().bus_mastering
    }

    /// CLB/FB writes made while any engine bit was set, on any port.
    pub(crate) fn relocations_while_running(&self) -> usize {
        self.lock().relocations_while_running
    }

    /// Keeps BSY set on `port` until cleared.
    pub(crate) fn set_busy(&self, port: u8, busy: bool) {
        self.port(port, |p| p.busy = busy);
    }

    /// The next command on `port` ends with a task-file error.
    pub(crate) fn fail_next_command(&self, port: u8) {
        self.port(port, |p| p.fail_next = true);
    }

    /// The next command on `port` never completes.
    pub(crate) fn hang_next_command(&self, port: u8) {
        self.port(port, |p| p.hang_next = true);
    }

    /// Marks `slot` on `port` as taken by a queued command (PxSACT).
    pub(crate) fn occupy_slot(&self, port: u8, slot: u8) {
        self.port(port, |p| p.sact |= 1 << slot);
    }

    /// Lets the device finish every slot still set in `port`'s PxCI.
    pub(crate) fn finish_issued(&self, port: u8) {
        let mut state = self.lock();
        let ci = state.ports[usize::from(port)].ci;
        for slot in (0..32u8).filter(|&s| ci & (1 << s) != 0) {
            state.execute(usize::from(port), slot);
        }
    }

    /// Current PxCI of `port`.
    pub(crate) fn port_ci(&self, port: u8) -> u32 {
        self.port(port, |p| p.ci)
    }

    /// Copies `data` into `port`'s disk image at byte `offset`.
    pub(crate) fn fill_disk(&self, port: u8, offset: usize, data: &[u8]) {
        self.port(port, |p| {
            p.disk[offset..offset + data.len()].copy_from_slice(data);
        });
    }

    /// Bytes of `port`'s disk image.
    pub(crate) fn disk_bytes(&self, port: u8, offset: usize, len: usize) -> Vec<u8> {
        self.port(port, |p| p.disk[offset..offset + len].to_vec())
    }

    /// Current PxCMD of `port`.
    pub(crate) fn port_cmd(&self, port: u8) -> PortCmd {
        self.port(port, |p| p.cmd)
    }

    /// PxCMD writes on `port`.
    pub(crate) fn cmd_writes(&self, port: u8) -> usize {
        self.port(port, |p| p.stats.cmd_writes)
    }

    /// COMRESETs sent on `port`.
    pub(crate) fn comresets(&self, port: u8) -> usize {
        self.port(port, |p| p.stats.comresets)
    }

    /// PxCLB writes on `port`.
    pub(crate) fn relocations(&self, port: u8) -> usize {
        self.port(port, |p| p.stats.relocations)
    }

    /// SUD rising edges on `port`.
    pub(crate) fn spin_ups(&self, port: u8) -> usize {
        self.port(port, |p| p.stats.spin_ups)
    }

    /// PxCI writes on `port`.
    pub(crate) fn ci_writes(&self, port: u8) -> usize {
        self.port(port, |p| p.stats.ci_writes)
    }

    /// Slot of the last command executed on `port`.
    pub(crate) fn last_slot(&self, port: u8) -> Option<u8> {
        self.port(port, |p| p.stats.last_slot)
    }

    /// ATA opcode of the last command executed on `port`.
    pub(crate) fn last_command(&self, port: u8) -> Option<u8> {
        self.port(port, |p| p.stats.last_command)
    }

    /// PRDT length of the last command executed on `port`.
    pub(crate) fn last_prdt_entries(&self, port: u8) -> Option<usize> {
        self.port(port, |p| p.stats.last_prdt_entries)
    }

    /// FIS count field of the last command executed on `port`.
    pub(crate) fn last_fis_count(&self, port: u8) -> Option<u16> {
        self.port(port, |p| p.stats.last_fis_count)
    }

    /// Highest end address any PRDT entry on `port` has described.
    pub(crate) fn max_prdt_address(&self, port: u8) -> u64 {
        self.port(port, |p| p.stats.max_prdt_end)
    }
}

impl RegisterBus for SimMachine {
    fn read_u32(&self, offset: u64) -> u32 {
        assert!(offset < ABAR_SIZE, "read beyond ABAR at {offset:#x}");
        self.lock().read(offset)
    }

    fn write_u32(&self, offset: u64, value: u32) {
        assert!(offset < ABAR_SIZE, "write beyond ABAR at {offset:#x}");
        self.lock().write(offset, value);
    }
}

impl KernelServices for SimMachine {
    fn find_pci_device(&self, id: &PciDeviceId) -> Option<PciDeviceInfo> {
        if !self.controller {
            return None;
        }
        let mut bars = [PciBar::Unused; 6];
        bars[5] = PciBar::Memory {
            base: ABAR_PHYS,
            size: 0x2000,
        };
        let info = PciDeviceInfo {
            address: PciAddress {
                bus: 0,
                device: 0x1F,
                function: 2,
            },
            vendor_id: 0x8086,
            device_id: 0x2922,
            class: 0x01,
            subclass: 0x06,
            prog_if: 0x01,
            bars,
        };
        id.matches(&info).then_some(info)
    }

    fn enable_bus_mastering(&self, _addr: PciAddress) {
        self.lock().bus_mastering = true;
    }

    fn map_mmio(&self, phys_base: u64, _size: u64) -> Result<&'static dyn RegisterBus, DriverError> {
        if phys_base != ABAR_PHYS {
            return Err(DriverError::MapFailed);
        }
        let this: &'static SimMachine = self.this.get().ok_or(DriverError::MapFailed)?;
        Ok(this)
    }

    fn alloc_dma(&self, size: usize, align: usize, _zone: DmaZone) -> Result<u64, DriverError> {
        self.lock().mem.alloc(size, align)
    }

    unsafe fn free_dma(&self, phys: u64, _size: usize, _align: usize) {
        self.lock().mem.free(phys);
    }

    fn phys_to_virt(&self, phys: u64) -> *mut u8 {
        self.lock().mem.phys_to_virt(phys)
    }

    fn virt_to_phys(&self, virt: *const u8) -> u64 {
        self.lock().mem.virt_to_phys(virt)
    }

    fn now_us(&self) -> u64 {
        self.clock.fetch_add(TICK_US, Ordering::Relaxed)
    }
}
