//! Architecture support
//!
//! The distributor emulation only decodes guest register images, so it
//! builds on any host; the ARM64 module is not gated on `target_arch`.

pub mod arm64;
