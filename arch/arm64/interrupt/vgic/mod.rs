//! VGIC (Virtual GIC) distributor for ARM64 guests
//!
//! Emulates the GICv2 distributor a guest sees through trapped MMIO
//! accesses, and tracks every virtual interrupt from the moment it is
//! raised until the guest acknowledges it.
//! Reference: ARM IHI 0048B (GICv2 architecture specification)
//!
//! ## Layout
//!
//! - [`rank`] - register state in 32-line ranks, one lock per rank
//! - [`pending`] - one persistent descriptor per virtual line
//! - [`vcpu`] - per-VCPU private rank, private descriptors, inflight list
//! - [`mmio`] - trapped register access decode and dispatch
//! - [`inject`] - injection and enable/disable transitions
//! - [`sgi`] - software-generated interrupt dispatch
//! - [`host`] - traits for the physical GIC driver and the scheduler

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

use tock_registers::LocalRegisterCopy;

use crate::config::VgicConfig;

pub mod host;
pub mod inject;
pub mod mmio;
pub mod pending;
pub mod rank;
pub mod regs;
pub mod sgi;
pub mod vcpu;

#[cfg(test)]
pub(crate) mod testing;

pub use host::{GicInterface, VgicHost};
pub use mmio::{MmioAccess, MmioHandler};
pub use pending::{PendingIrq, PendingStatus};
pub use rank::{Rank, RankRegs};
pub use vcpu::{InflightEntry, InflightList, VgicVcpu};

/// Maximum number of VCPUs supported (GICv2 target masks are 8 bits wide)
pub const VGIC_MAX_NCPU: usize = 8;

/// Architectural maximum number of interrupt lines
pub const GIC_MAX_LINES: u32 = 1020;

/// Number of private lines (SGIs + PPIs) per VCPU, also the rank width
pub const NR_PRIVATE_LINES: usize = 32;

/// Number of software-generated interrupts
pub const NR_SGIS: usize = 16;

/// Virtual interrupt line number
pub type IrqLine = u32;

/// VCPU index within a domain
pub type VcpuId = usize;

/// Physical CPU index
pub type PhysCpuId = usize;

/// Physical interrupt backing a virtual line
///
/// The distributor only references the physical descriptor; the physical
/// GIC driver owns it and its lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PhysIrq(pub u32);

/// Width of a trapped guest access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessWidth {
    /// 8-bit access
    Byte,
    /// 16-bit access
    Halfword,
    /// 32-bit access
    Word,
    /// 64-bit access
    Doubleword,
}

impl AccessWidth {
    /// Decode an access size in bytes
    pub fn from_size(size: usize) -> Option<Self> {
        match size {
            1 => Some(Self::Byte),
            2 => Some(Self::Halfword),
            4 => Some(Self::Word),
            8 => Some(Self::Doubleword),
            _ => None,
        }
    }

    /// Access size in bytes
    pub fn size(self) -> usize {
        match self {
            Self::Byte => 1,
            Self::Halfword => 2,
            Self::Word => 4,
            Self::Doubleword => 8,
        }
    }
}

/// VGIC error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VgicError {
    /// A defined register was accessed with a width it does not support.
    /// The domain has been crashed by the time this is returned.
    BadWidth {
        /// Byte offset into the distributor frame
        offset: u32,
        /// Width of the offending access
        width: AccessWidth,
    },
    /// Register access the distributor does not emulate; the trap layer
    /// should reflect a fault into the guest
    Unhandled {
        /// Byte offset into the distributor frame
        offset: u32,
    },
    /// No such VCPU in this domain
    InvalidVcpu(VcpuId),
    /// VCPU state already allocated
    VcpuAlreadyInitialized(VcpuId),
    /// Line number beyond the domain's configured lines
    InvalidLine(IrqLine),
    /// Rejected domain configuration
    InvalidConfig(&'static str),
}

impl fmt::Display for VgicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadWidth { offset, width } => {
                write!(f, "bad {}-byte access at offset {:#05x}", width.size(), offset)
            }
            Self::Unhandled { offset } => write!(f, "unhandled access at offset {:#05x}", offset),
            Self::InvalidVcpu(id) => write!(f, "invalid vcpu {}", id),
            Self::VcpuAlreadyInitialized(id) => write!(f, "vcpu {} already initialized", id),
            Self::InvalidLine(line) => write!(f, "invalid line {}", line),
            Self::InvalidConfig(why) => write!(f, "invalid configuration: {}", why),
        }
    }
}

/// Per-domain virtual distributor
///
/// Owns the shared (SPI) ranks and descriptors for the domain's lifetime
/// and each VCPU's private state between [`Vgic::init_vcpu`] and
/// [`Vgic::free_vcpu`].
pub struct Vgic {
    /// Domain configuration
    config: VgicConfig,
    /// GICD_CTLR image (only the enable bit is kept)
    ctlr: AtomicU32,
    /// Shared ranks, `ceil(nr_spis / 32)` of them
    shared_ranks: Box<[Rank]>,
    /// Shared descriptors, one per configured SPI
    shared_pending: Box<[PendingIrq]>,
    /// Per-VCPU state, `None` until initialized
    vcpus: Vec<Option<VgicVcpu>>,
    /// Physical GIC driver
    gic: Arc<dyn GicInterface>,
    /// Scheduler and domain services
    host: Arc<dyn VgicHost>,
}

impl Vgic {
    /// Create the distributor for a new domain
    ///
    /// Allocates zeroed shared ranks and the SPI descriptor table.
    /// VCPU state is allocated separately by [`Vgic::init_vcpu`].
    pub fn new(
        config: VgicConfig,
        gic: Arc<dyn GicInterface>,
        host: Arc<dyn VgicHost>,
    ) -> Result<Self, VgicError> {
        config.validate()?;

        let shared_ranks = (0..config.nr_shared_ranks()).map(|_| Rank::new()).collect();
        let shared_pending = (0..config.nr_spis)
            .map(|spi| PendingIrq::new(NR_PRIVATE_LINES as IrqLine + spi))
            .collect();
        let vcpus = (0..config.nr_vcpus).map(|_| None).collect();

        log::info!(
            "VGIC initialized: {} VCPUs, {} SPIs, distributor at {:#x}",
            config.nr_vcpus,
            config.nr_spis,
            config.dist_base
        );

        Ok(Self {
            config,
            ctlr: AtomicU32::new(0),
            shared_ranks,
            shared_pending,
            vcpus,
            gic,
            host,
        })
    }

    /// Allocate the private rank and descriptors of VCPU `id`
    ///
    /// Every private line is routed to the new VCPU alone.
    pub fn init_vcpu(&mut self, id: VcpuId) -> Result<(), VgicError> {
        let capacity = self.config.nr_lines() as usize;
        let slot = self.vcpus.get_mut(id).ok_or(VgicError::InvalidVcpu(id))?;
        if slot.is_some() {
            return Err(VgicError::VcpuAlreadyInitialized(id));
        }
        *slot = Some(VgicVcpu::new(id, capacity));
        log::debug!("VGIC: VCPU {} private state allocated", id);
        Ok(())
    }

    /// Release the private state of VCPU `id`
    ///
    /// Shared lines still inflight on it are handed back first so they can
    /// be delivered elsewhere.
    pub fn free_vcpu(&mut self, id: VcpuId) -> Result<(), VgicError> {
        self.clear_pending_irqs(id)?;
        if let Some(slot) = self.vcpus.get_mut(id) {
            slot.take();
        }
        log::debug!("VGIC: VCPU {} private state released", id);
        Ok(())
    }

    /// Domain configuration
    pub fn config(&self) -> &VgicConfig {
        &self.config
    }

    /// Get VCPU state
    pub fn vcpu(&self, id: VcpuId) -> Option<&VgicVcpu> {
        self.vcpus.get(id).and_then(Option::as_ref)
    }

    /// Get VCPU state, or an error for an unknown or uninitialized VCPU
    pub(crate) fn vcpu_or_err(&self, id: VcpuId) -> Result<&VgicVcpu, VgicError> {
        self.vcpu(id).ok_or(VgicError::InvalidVcpu(id))
    }

    /// Iterate over initialized VCPUs
    pub(crate) fn vcpus(&self) -> impl Iterator<Item = &VgicVcpu> {
        self.vcpus.iter().filter_map(Option::as_ref)
    }

    /// Whether the guest has enabled the distributor
    pub fn is_enabled(&self) -> bool {
        LocalRegisterCopy::<u32, regs::GICD_CTLR::Register>::new(self.ctlr.load(Ordering::Acquire))
            .is_set(regs::GICD_CTLR::EnableGrp0)
    }

    /// Number of shared ranks
    pub fn nr_shared_ranks(&self) -> usize {
        self.shared_ranks.len()
    }

    /// Descriptor for `line` as seen from `vcpu`
    ///
    /// Private lines resolve to `vcpu`'s own descriptors; lines inside a
    /// present rank but past the configured SPI count have none.
    pub fn pending_irq<'a>(&'a self, vcpu: &'a VgicVcpu, line: IrqLine) -> Option<&'a PendingIrq> {
        let line = line as usize;
        if line < NR_PRIVATE_LINES {
            vcpu.pending(line)
        } else {
            self.shared_pending.get(line - NR_PRIVATE_LINES)
        }
    }
}

impl fmt::Debug for Vgic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vgic")
            .field("config", &self.config)
            .field("enabled", &self.is_enabled())
            .field("shared_ranks", &self.shared_ranks.len())
            .field("vcpus", &self.vcpus().count())
            .finish()
    }
}

impl Drop for Vgic {
    fn drop(&mut self) {
        log::info!("VGIC: releasing distributor for {} VCPUs", self.config.nr_vcpus);
    }
}
