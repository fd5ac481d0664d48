//! Interrupt handling for ARM64
//!
//! Provides the virtual GIC distributor presented to guests.

/// VGIC (Virtual GIC) distributor emulation
pub mod vgic;

// Re-export commonly used types
pub use vgic::{
    AccessWidth, GicInterface, IrqLine, MmioHandler, PendingIrq, PendingStatus, PhysCpuId,
    PhysIrq, Rank, RankRegs, VcpuId, Vgic, VgicError, VgicHost, VgicVcpu, GIC_MAX_LINES,
    NR_PRIVATE_LINES, NR_SGIS, VGIC_MAX_NCPU,
};
