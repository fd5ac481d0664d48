//! Ferrovisor VGIC - virtual GICv2 distributor for guest domains
//!
//! This library emulates the GIC distributor each guest sees through
//! trapped MMIO accesses, and carries virtual interrupts from "raised"
//! to "acknowledged" on the guest's virtual CPUs.
//!
//! The physical GIC driver, the MMIO trap layer and the scheduler are
//! collaborators reached through the traits in
//! [`arch::arm64::interrupt::vgic::host`].

#![cfg_attr(not(test), no_std)]

extern crate alloc;

// Core modules
#[macro_use]
pub mod utils;
pub mod config;
pub mod sync;

// Architecture-specific code
pub mod arch;

// Re-export key types for convenience
pub use arch::arm64::interrupt::vgic::{
    AccessWidth, GicInterface, IrqLine, MmioHandler, PendingStatus, PhysIrq, Vgic, VgicError,
    VgicHost, VcpuId,
};
pub use config::VgicConfig;

/// Ferrovisor VGIC version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common error type for Ferrovisor VGIC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Virtual interrupt controller error
    VgicError(VgicError),
}

impl From<VgicError> for Error {
    fn from(err: VgicError) -> Self {
        Error::VgicError(err)
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::VgicError(err) => write!(f, "vgic: {}", err),
        }
    }
}

/// Result type alias
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_from_vgic_error() {
        let err: Error = VgicError::InvalidVcpu(3).into();
        assert_eq!(err, Error::VgicError(VgicError::InvalidVcpu(3)));
        assert_eq!(format!("{}", err), "vgic: invalid vcpu 3");
    }

    #[test]
    fn test_config_errors_propagate() {
        fn build() -> Result<()> {
            VgicConfig::for_guest(0).validate()?;
            Ok(())
        }
        assert!(matches!(build(), Err(Error::VgicError(VgicError::InvalidConfig(_)))));
    }
}
