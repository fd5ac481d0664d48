//! Configuration management
//!
//! Per-domain settings for the virtual distributor, fixed when the
//! domain is created.

use crate::arch::arm64::PAGE_SIZE;
use crate::arch::arm64::interrupt::vgic::{
    IrqLine, VgicError, GIC_MAX_LINES, NR_PRIVATE_LINES, VGIC_MAX_NCPU,
};

/// Default guest-physical base of the distributor frame (QEMU virt layout)
pub const DEFAULT_DIST_BASE: u64 = 0x0800_0000;

/// Default event-channel upcall line (a PPI)
pub const DEFAULT_EVTCHN_IRQ: IrqLine = 31;

/// Virtual distributor configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VgicConfig {
    /// Guest-physical base address of the distributor frame
    pub dist_base: u64,
    /// Number of VCPUs in the domain
    pub nr_vcpus: usize,
    /// Number of shared peripheral lines (SPIs) emulated for the domain
    pub nr_spis: u32,
    /// Line used for event-channel upcalls
    pub evtchn_irq: IrqLine,
}

impl Default for VgicConfig {
    fn default() -> Self {
        Self::for_guest(1)
    }
}

impl VgicConfig {
    /// Configuration for an unprivileged guest: private lines only
    pub fn for_guest(nr_vcpus: usize) -> Self {
        Self {
            dist_base: DEFAULT_DIST_BASE,
            nr_vcpus,
            nr_spis: 0,
            evtchn_irq: DEFAULT_EVTCHN_IRQ,
        }
    }

    /// Configuration for the hardware domain, which sees every physical SPI
    ///
    /// `physical_lines` is the total line count reported by the host GIC.
    pub fn for_hardware_domain(nr_vcpus: usize, physical_lines: u32) -> Self {
        Self {
            nr_spis: physical_lines.saturating_sub(NR_PRIVATE_LINES as u32),
            ..Self::for_guest(nr_vcpus)
        }
    }

    /// Number of shared ranks backing the SPIs
    pub fn nr_shared_ranks(&self) -> usize {
        div_round_up!(self.nr_spis as usize, NR_PRIVATE_LINES)
    }

    /// Total number of emulated lines, private ones included
    pub fn nr_lines(&self) -> u32 {
        NR_PRIVATE_LINES as u32 + self.nr_spis
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), VgicError> {
        if self.nr_vcpus == 0 || self.nr_vcpus > VGIC_MAX_NCPU {
            return Err(VgicError::InvalidConfig("vcpu count out of range"));
        }

        if self.nr_lines() > GIC_MAX_LINES {
            return Err(VgicError::InvalidConfig("too many shared lines"));
        }

        if self.dist_base % PAGE_SIZE as u64 != 0 {
            return Err(VgicError::InvalidConfig("distributor base not page aligned"));
        }

        if self.evtchn_irq >= self.nr_lines() {
            return Err(VgicError::InvalidConfig("event-channel line out of range"));
        }

        Ok(())
    }
}
