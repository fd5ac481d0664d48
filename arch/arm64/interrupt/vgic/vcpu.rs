//! Per-VCPU distributor state
//!
//! Each VCPU owns the rank of its private lines, the descriptors of those
//! lines, and the priority-ordered list of lines inflight on it.

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::sync::SpinLock;
use crate::utils::byte_splat;

use super::{IrqLine, PendingIrq, Rank, VcpuId, NR_PRIVATE_LINES};

/// Entry of an inflight list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InflightEntry {
    /// Line id
    pub line: IrqLine,
    /// Priority snapshotted when the line was injected
    pub priority: u8,
}

/// Lines raised on a VCPU and not yet retired by the guest
///
/// Ordered by ascending priority value; entries of equal priority keep
/// their insertion order.
#[derive(Debug, Default)]
pub struct InflightList {
    entries: Vec<InflightEntry>,
}

impl InflightList {
    /// Create a list that can hold `capacity` lines without reallocating
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Insert `line` before the first entry of strictly greater priority
    pub fn insert(&mut self, line: IrqLine, priority: u8) {
        let pos = self
            .entries
            .iter()
            .position(|entry| entry.priority > priority)
            .unwrap_or(self.entries.len());
        self.entries.insert(pos, InflightEntry { line, priority });
    }

    /// Unlink `line`, returning whether it was present
    pub fn remove(&mut self, line: IrqLine) -> bool {
        match self.entries.iter().position(|entry| entry.line == line) {
            Some(pos) => {
                self.entries.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Whether `line` is on the list
    pub fn contains(&self, line: IrqLine) -> bool {
        self.entries.iter().any(|entry| entry.line == line)
    }

    /// Entries in delivery order
    pub fn iter(&self) -> impl Iterator<Item = &InflightEntry> {
        self.entries.iter()
    }

    /// Line ids in delivery order
    pub fn lines(&self) -> impl Iterator<Item = IrqLine> + '_ {
        self.entries.iter().map(|entry| entry.line)
    }

    /// Number of inflight lines
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is inflight
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Unlink everything, yielding the removed entries
    pub fn drain(&mut self) -> impl Iterator<Item = InflightEntry> + '_ {
        self.entries.drain(..)
    }
}

/// Distributor state private to one VCPU
#[derive(Debug)]
pub struct VgicVcpu {
    /// VCPU index
    id: VcpuId,
    /// Rank of the SGIs and PPIs
    private_rank: Rank,
    /// Descriptors of the private lines
    pending: Box<[PendingIrq]>,
    /// Inflight list, whose lock also guards descriptor status changes
    list: SpinLock<InflightList>,
}

impl VgicVcpu {
    /// Allocate the private state of VCPU `id`
    ///
    /// All private lines target `id` alone. The inflight list reserves
    /// room for `nr_lines` entries up front so that injecting never
    /// allocates.
    pub fn new(id: VcpuId, nr_lines: usize) -> Self {
        let private_rank = Rank::new();
        private_rank.with(|regs| regs.itargets = [byte_splat(1u8 << id); 8]);

        Self {
            id,
            private_rank,
            pending: (0..NR_PRIVATE_LINES as IrqLine).map(PendingIrq::new).collect(),
            list: SpinLock::new(InflightList::with_capacity(nr_lines)),
        }
    }

    /// VCPU index
    pub fn id(&self) -> VcpuId {
        self.id
    }

    /// Rank of the private lines
    pub fn private_rank(&self) -> &Rank {
        &self.private_rank
    }

    /// Descriptor of private line `line`
    pub fn pending(&self, line: usize) -> Option<&PendingIrq> {
        self.pending.get(line)
    }

    /// Run `f` on the inflight list with the list lock held
    pub fn with_list<R>(&self, f: impl FnOnce(&mut InflightList) -> R) -> R {
        let mut list = self.list.lock();
        f(&mut *list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inflight_ordering_is_stable() {
        let mut list = InflightList::default();
        list.insert(40, 0x80);
        list.insert(41, 0x10);
        list.insert(42, 0x80);
        list.insert(43, 0x40);

        let order: Vec<_> = list.iter().map(|e| (e.line, e.priority)).collect();
        assert_eq!(order, vec![(41, 0x10), (43, 0x40), (40, 0x80), (42, 0x80)]);
    }

    #[test]
    fn test_inflight_remove() {
        let mut list = InflightList::with_capacity(4);
        list.insert(1, 0xa0);
        list.insert(2, 0xa0);
        assert!(list.remove(1));
        assert!(!list.remove(1));
        assert!(!list.contains(1));
        assert_eq!(list.lines().collect::<Vec<_>>(), vec![2]);

        assert_eq!(list.drain().count(), 1);
        assert!(list.is_empty());
    }

    #[test]
    fn test_vcpu_private_state() {
        let vcpu = VgicVcpu::new(3, 64);
        assert_eq!(vcpu.id(), 3);
        assert_eq!(vcpu.pending(31).map(PendingIrq::line), Some(31));
        assert!(vcpu.pending(32).is_none());
        assert_eq!(vcpu.private_rank().with(|regs| regs.target(20)), 0x08);
        assert_eq!(vcpu.with_list(|list| list.len()), 0);
    }
}
