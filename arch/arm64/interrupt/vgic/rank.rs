//! Register rank store
//!
//! Distributor register state is kept in ranks of 32 consecutive lines.
//! Rank 0 is private to each VCPU (SGIs and PPIs), the remaining ranks
//! are shared by the domain. Each rank has its own lock, and its registers
//! are only reachable from inside [`Rank::with`].

use crate::sync::SpinLock;
use crate::utils::{byte_read, byte_write};

use super::{Vgic, VgicVcpu, NR_PRIVATE_LINES, NR_SGIS};

/// Register words per rank for a group with one bit per line
pub const ENABLE_BITS: usize = 1;
/// Register words per rank for a group with two bits per line
pub const CONFIG_BITS: usize = 2;
/// Register words per rank for a group with eight bits per line
pub const BYTE_BITS: usize = 8;

/// Register state of one rank
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RankRegs {
    /// Enable bitmap
    pub ienable: u32,
    /// Pending bitmap
    pub ipend: u32,
    /// Active bitmap
    pub iactive: u32,
    /// Priority, one byte per line
    pub ipriority: [u32; BYTE_BITS],
    /// Target VCPU mask, one byte per line
    pub itargets: [u32; BYTE_BITS],
    /// Trigger configuration, two bits per line
    pub icfg: [u32; CONFIG_BITS],
    /// Pending SGI sources, one byte per SGI (private rank only)
    pub pendsgi: [u32; NR_SGIS / 4],
}

impl RankRegs {
    /// Priority byte of line `index` within the rank
    pub fn priority(&self, index: usize) -> u8 {
        byte_read(self.ipriority[index / 4], false, index) as u8
    }

    /// Target mask byte of line `index` within the rank
    pub fn target(&self, index: usize) -> u8 {
        byte_read(self.itargets[index / 4], false, index) as u8
    }

    /// Set the priority byte of line `index` within the rank
    pub fn set_priority(&mut self, index: usize, priority: u8) {
        byte_write(&mut self.ipriority[index / 4], priority as u32, index);
    }
}

/// A lock-protected rank
#[derive(Debug, Default)]
pub struct Rank {
    regs: SpinLock<RankRegs>,
}

impl Rank {
    /// Create a zeroed rank
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` on the rank registers with the rank lock held
    ///
    /// The closure sees nothing but the registers, so no other lock can be
    /// taken while this one is held.
    pub fn with<R>(&self, f: impl FnOnce(&mut RankRegs) -> R) -> R {
        let mut regs = self.regs.lock();
        f(&mut *regs)
    }

    /// Priority of line `index` within the rank
    pub fn priority(&self, index: usize) -> u8 {
        self.with(|regs| regs.priority(index))
    }

    /// Copy of the register state
    pub fn snapshot(&self) -> RankRegs {
        self.with(|regs| regs.clone())
    }
}

/// Rank index addressed by `reg_offset` within a group of
/// `bits_per_line` bits per line
#[inline]
pub fn rank_index(bits_per_line: usize, reg_offset: u32) -> usize {
    (reg_offset as usize >> 2) / bits_per_line
}

/// Word index within the rank addressed by `reg_offset`
#[inline]
pub fn word_index(bits_per_line: usize, reg_offset: u32) -> usize {
    (reg_offset as usize >> 2) % bits_per_line
}

/// Rank index holding `line`
#[inline]
pub fn line_rank(line: u32) -> usize {
    line as usize / NR_PRIVATE_LINES
}

impl Vgic {
    /// Rank addressed by `reg_offset` inside a register group
    ///
    /// `reg_offset` is relative to the start of the group. Index 0 selects
    /// the private rank of `vcpu`; indices past the configured shared
    /// ranks are absent and must read as zero and ignore writes.
    pub fn resolve_rank<'a>(
        &'a self,
        vcpu: &'a VgicVcpu,
        bits_per_line: usize,
        reg_offset: u32,
    ) -> Option<&'a Rank> {
        self.rank(vcpu, rank_index(bits_per_line, reg_offset))
    }

    /// Rank `index` as seen from `vcpu`
    pub(crate) fn rank<'a>(&'a self, vcpu: &'a VgicVcpu, index: usize) -> Option<&'a Rank> {
        match index {
            0 => Some(vcpu.private_rank()),
            n => self.shared_ranks.get(n - 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::test_vgic;
    use super::*;
    use test_case::test_case;

    #[test_case(ENABLE_BITS, 0x00, 0, 0)]
    #[test_case(ENABLE_BITS, 0x04, 1, 0)]
    #[test_case(ENABLE_BITS, 0x7c, 31, 0)]
    #[test_case(CONFIG_BITS, 0x04, 0, 1; "ppi config word")]
    #[test_case(CONFIG_BITS, 0x08, 1, 0)]
    #[test_case(BYTE_BITS, 0x1c, 0, 7; "last private priority word")]
    #[test_case(BYTE_BITS, 0x20, 1, 0)]
    #[test_case(BYTE_BITS, 0x23, 1, 0; "byte offset inside a word")]
    fn test_rank_math(bits: usize, offset: u32, rank: usize, word: usize) {
        assert_eq!(rank_index(bits, offset), rank);
        assert_eq!(word_index(bits, offset), word);
    }

    #[test]
    fn test_rank_byte_fields() {
        let mut regs = RankRegs::default();
        regs.set_priority(5, 0xa0);
        assert_eq!(regs.ipriority[1], 0x0000_a000);
        assert_eq!(regs.priority(5), 0xa0);
        assert_eq!(regs.priority(4), 0);

        regs.itargets[2] = 0x0400_0000;
        assert_eq!(regs.target(11), 0x04);
    }

    #[test]
    fn test_resolve_rank() {
        let (vgic, _, _) = test_vgic(2, 40);
        let vcpu0 = vgic.vcpu(0).unwrap();
        let vcpu1 = vgic.vcpu(1).unwrap();

        let p0 = vgic.resolve_rank(vcpu0, ENABLE_BITS, 0).unwrap();
        let p1 = vgic.resolve_rank(vcpu1, ENABLE_BITS, 0).unwrap();
        assert!(!core::ptr::eq(p0, p1));

        // 40 SPIs need two shared ranks
        let s0 = vgic.resolve_rank(vcpu0, ENABLE_BITS, 0x04).unwrap();
        let s1 = vgic.resolve_rank(vcpu1, ENABLE_BITS, 0x04).unwrap();
        assert!(core::ptr::eq(s0, s1));
        assert!(vgic.resolve_rank(vcpu0, ENABLE_BITS, 0x08).is_some());
        assert!(vgic.resolve_rank(vcpu0, ENABLE_BITS, 0x0c).is_none());
        assert!(vgic.resolve_rank(vcpu0, BYTE_BITS, 0x60).is_none());
    }

    #[test]
    fn test_private_targets_seeded() {
        let (vgic, _, _) = test_vgic(2, 0);
        let rank = vgic.vcpu(1).unwrap().private_rank().snapshot();
        assert!(rank.itargets.iter().all(|&word| word == 0x0202_0202));
    }
}
