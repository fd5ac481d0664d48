//! Synchronization primitives
//!
//! Lock order in the virtual distributor is structural: rank state is
//! only reachable inside `Rank::with`, list state only inside
//! `VgicVcpu::with_list`, and neither closure is handed the other lock.

pub mod spinlock;

// Re-export SpinLock for convenience
pub use spinlock::{SpinLock, SpinLockGuard};
