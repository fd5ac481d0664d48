//! ARM64 (AArch64) Architecture Support for Ferrovisor
//!
//! This module provides the guest-facing interrupt controller model:
//! - Virtual GICv2 distributor register emulation
//! - Pending-interrupt tracking and injection into virtual CPUs
//!
//! ## References
//! - [ARM Generic Interrupt Controller Architecture Specification](https://developer.arm.com/documentation/ihi0048/latest)

pub mod interrupt;

#[cfg(test)]
mod tests;

// Re-export key types and functions
pub use interrupt::*;

/// Page size (4KB)
pub const PAGE_SIZE: usize = 4096;
