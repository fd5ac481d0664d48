//! Utility functions and data structures
//!
//! This module contains helpers used throughout the virtual distributor.

pub mod bitops;
pub mod log;

// Re-export commonly used utilities
pub use self::bitops::{byte_read, byte_splat, byte_write, SetBits};

/// Round `$value` up to the next multiple of `$align`
#[macro_export]
macro_rules! div_round_up {
    ($value:expr, $align:expr) => {
        (($value + $align - 1) / $align)
    };
}
