//! Pending-interrupt registry
//!
//! One descriptor per virtual line, allocated with its owner and never per
//! event. Status bits and the inflight owner only change under the list
//! lock of the VCPU the line is (or becomes) inflight on; the descriptor
//! fields are atomics so readers outside that lock see whole values.

use core::sync::atomic::{AtomicU32, AtomicU8, AtomicUsize, Ordering};

use bitflags::bitflags;

use super::{IrqLine, PhysIrq, VcpuId};

bitflags! {
    /// Delivery status of a virtual line
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PendingStatus: u32 {
        /// The guest has enabled the line in the distributor
        const ENABLED = 1 << 0;
        /// Raised and waiting for delivery (or re-triggered while inflight)
        const QUEUED = 1 << 1;
        /// Present in a list register
        const VISIBLE = 1 << 2;
        /// Acknowledged by the guest, EOI outstanding
        const ACTIVE = 1 << 3;
    }
}

const NO_OWNER: usize = usize::MAX;
const NO_PHYS: u32 = u32::MAX;

/// Persistent descriptor of one virtual line
#[derive(Debug)]
pub struct PendingIrq {
    /// Line id
    line: IrqLine,
    /// [`PendingStatus`] bits
    status: AtomicU32,
    /// Priority snapshotted at injection time
    priority: AtomicU8,
    /// Backing physical interrupt, `NO_PHYS` when purely virtual
    phys: AtomicU32,
    /// VCPU whose inflight list holds the line, `NO_OWNER` when none
    inflight: AtomicUsize,
}

impl PendingIrq {
    /// Create the descriptor of `line`, idle and disabled
    pub const fn new(line: IrqLine) -> Self {
        Self {
            line,
            status: AtomicU32::new(0),
            priority: AtomicU8::new(0),
            phys: AtomicU32::new(NO_PHYS),
            inflight: AtomicUsize::new(NO_OWNER),
        }
    }

    /// Line id
    pub fn line(&self) -> IrqLine {
        self.line
    }

    /// Current status
    pub fn status(&self) -> PendingStatus {
        PendingStatus::from_bits_truncate(self.status.load(Ordering::Acquire))
    }

    /// Whether all of `flags` are set
    pub fn is_set(&self, flags: PendingStatus) -> bool {
        self.status().contains(flags)
    }

    /// Set `flags`
    pub fn set(&self, flags: PendingStatus) {
        self.status.fetch_or(flags.bits(), Ordering::AcqRel);
    }

    /// Clear `flags`
    pub fn clear(&self, flags: PendingStatus) {
        self.status.fetch_and(!flags.bits(), Ordering::AcqRel);
    }

    /// Priority captured by the last injection
    pub fn priority(&self) -> u8 {
        self.priority.load(Ordering::Acquire)
    }

    pub(crate) fn set_priority(&self, priority: u8) {
        self.priority.store(priority, Ordering::Release);
    }

    /// Backing physical interrupt
    pub fn phys(&self) -> Option<PhysIrq> {
        match self.phys.load(Ordering::Acquire) {
            NO_PHYS => None,
            irq => Some(PhysIrq(irq)),
        }
    }

    pub(crate) fn set_phys(&self, irq: Option<PhysIrq>) {
        let raw = irq.map_or(NO_PHYS, |PhysIrq(irq)| irq);
        self.phys.store(raw, Ordering::Release);
    }

    /// VCPU whose inflight list holds the line
    pub fn inflight_on(&self) -> Option<VcpuId> {
        match self.inflight.load(Ordering::Acquire) {
            NO_OWNER => None,
            vcpu => Some(vcpu),
        }
    }

    /// Whether the line sits on any inflight list
    pub fn is_inflight(&self) -> bool {
        self.inflight_on().is_some()
    }

    /// Claim the line for `vcpu`'s inflight list
    ///
    /// Fails with the current owner when the line is already inflight
    /// anywhere. Caller holds `vcpu`'s list lock.
    pub(crate) fn claim(&self, vcpu: VcpuId) -> Result<(), VcpuId> {
        self.inflight
            .compare_exchange(NO_OWNER, vcpu, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
    }

    /// Release the line from `vcpu`'s inflight list
    ///
    /// Caller holds `vcpu`'s list lock; a line owned by another VCPU is
    /// left alone.
    pub(crate) fn release(&self, vcpu: VcpuId) -> bool {
        self.inflight
            .compare_exchange(vcpu, NO_OWNER, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
