//! Trapped distributor register access
//!
//! Every register group of the 4 KiB frame is described once in a static
//! table: its offset range, the access widths it accepts, and the read and
//! write handlers. A width the group does not accept is fatal for the
//! domain; registers that are recognized but not emulated are reported
//! back to the trap layer as unhandled.

use core::sync::atomic::Ordering;

use bitflags::bitflags;
use tock_registers::LocalRegisterCopy;

use super::rank::{rank_index, word_index, BYTE_BITS, CONFIG_BITS, ENABLE_BITS};
use super::regs::{gicd, DIST_FRAME_SIZE, GICD_CTLR, GICD_TYPER, IIDR_VALUE, SGIR_READ_VALUE};
use super::{AccessWidth, RankRegs, VcpuId, Vgic, VgicError, VgicVcpu};
use crate::utils::{byte_read, byte_write};

bitflags! {
    /// Access widths a register group accepts
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Widths: u8 {
        const BYTE = 1 << 0;
        const WORD = 1 << 2;
        const BYTE_OR_WORD = Self::BYTE.bits() | Self::WORD.bits();
    }
}

impl Widths {
    fn allows(self, width: AccessWidth) -> bool {
        match width {
            AccessWidth::Byte => self.contains(Self::BYTE),
            AccessWidth::Word => self.contains(Self::WORD),
            AccessWidth::Halfword | AccessWidth::Doubleword => false,
        }
    }
}

/// A decoded access, as handed to a register group handler
#[derive(Debug, Clone, Copy)]
pub struct MmioAccess {
    /// Byte offset into the distributor frame
    pub offset: u32,
    /// Byte offset from the start of the register group
    pub reg: u32,
    /// Access width
    pub width: AccessWidth,
    /// Sign-extend byte reads
    pub signed: bool,
}

impl MmioAccess {
    /// Value a read of `word` returns for this access
    fn extract(&self, word: u32) -> u32 {
        match self.width {
            AccessWidth::Byte => byte_read(word, self.signed, self.reg as usize),
            _ => word,
        }
    }

    /// Merge `value` into `word` for this access
    fn merge(&self, word: &mut u32, value: u32) {
        match self.width {
            AccessWidth::Byte => byte_write(word, value, self.reg as usize),
            _ => *word = value,
        }
    }
}

type ReadFn = fn(&Vgic, &VgicVcpu, &MmioAccess) -> Result<u32, VgicError>;
type WriteFn = fn(&Vgic, &VgicVcpu, &MmioAccess, u32) -> Result<(), VgicError>;

/// One register group of the frame
struct RegisterGroup {
    name: &'static str,
    /// First byte of the group
    start: u32,
    /// First byte of the last word of the group
    last: u32,
    widths: Widths,
    read: ReadFn,
    write: WriteFn,
}

impl RegisterGroup {
    const fn new(
        name: &'static str,
        start: u32,
        last: u32,
        widths: Widths,
        read: ReadFn,
        write: WriteFn,
    ) -> Self {
        Self { name, start, last, widths, read, write }
    }

    fn contains(&self, offset: u32) -> bool {
        offset >= self.start && offset < self.last + 4
    }
}

const WORD: Widths = Widths::WORD;
const BYTE_OR_WORD: Widths = Widths::BYTE_OR_WORD;

#[rustfmt::skip]
static REGISTER_MAP: [RegisterGroup; 27] = [
    RegisterGroup::new("CTLR", gicd::CTLR, gicd::CTLR, WORD, read_ctlr, write_ctlr),
    RegisterGroup::new("TYPER", gicd::TYPER, gicd::TYPER, WORD, read_typer, write_ignore),
    RegisterGroup::new("IIDR", gicd::IIDR, gicd::IIDR, WORD, read_iidr, write_ignore),
    RegisterGroup::new("reserved", gicd::RESERVED_0, gicd::RESERVED_0_END, WORD, read_zero, write_ignore),
    RegisterGroup::new("impdef", gicd::IMPDEF_0, gicd::IMPDEF_0_END, WORD, read_zero, write_ignore),
    RegisterGroup::new("reserved", gicd::RESERVED_1, gicd::RESERVED_1_END, WORD, read_zero, write_ignore),
    RegisterGroup::new("IGROUPR", gicd::IGROUPR, gicd::IGROUPR_END, WORD, read_zero, write_ignore),
    RegisterGroup::new("ISENABLER", gicd::ISENABLER, gicd::ISENABLER_END, WORD, read_enable, write_set_enable),
    RegisterGroup::new("ICENABLER", gicd::ICENABLER, gicd::ICENABLER_END, WORD, read_enable, write_clear_enable),
    RegisterGroup::new("ISPENDR", gicd::ISPENDR, gicd::ISPENDR_END, BYTE_OR_WORD, read_pending, write_unhandled),
    RegisterGroup::new("ICPENDR", gicd::ICPENDR, gicd::ICPENDR_END, BYTE_OR_WORD, read_pending, write_unhandled),
    RegisterGroup::new("ISACTIVER", gicd::ISACTIVER, gicd::ISACTIVER_END, WORD, read_active, write_ignore),
    RegisterGroup::new("ICACTIVER", gicd::ICACTIVER, gicd::ICACTIVER_END, WORD, read_active, write_clear_active),
    RegisterGroup::new("IPRIORITYR", gicd::IPRIORITYR, gicd::IPRIORITYR_END, BYTE_OR_WORD, read_priority, write_priority),
    RegisterGroup::new("reserved", gicd::RESERVED_2, gicd::RESERVED_2, WORD, read_zero, write_ignore),
    RegisterGroup::new("ITARGETSR", gicd::ITARGETSR, gicd::ITARGETSR_END, BYTE_OR_WORD, read_targets, write_targets),
    RegisterGroup::new("reserved", gicd::RESERVED_3, gicd::RESERVED_3, WORD, read_zero, write_ignore),
    RegisterGroup::new("ICFGR", gicd::ICFGR, gicd::ICFGR_END, WORD, read_config, write_config),
    RegisterGroup::new("NSACR", gicd::NSACR, gicd::NSACR_END, WORD, read_zero, write_ignore),
    RegisterGroup::new("SGIR", gicd::SGIR, gicd::SGIR, WORD, read_sgir, write_sgir),
    RegisterGroup::new("reserved", gicd::RESERVED_4, gicd::RESERVED_4_END, WORD, read_zero, write_ignore),
    RegisterGroup::new("CPENDSGIR", gicd::CPENDSGIR, gicd::CPENDSGIR_END, BYTE_OR_WORD, read_sgi_pending, write_unhandled),
    RegisterGroup::new("SPENDSGIR", gicd::SPENDSGIR, gicd::SPENDSGIR_END, BYTE_OR_WORD, read_sgi_pending, write_unhandled),
    RegisterGroup::new("reserved", gicd::RESERVED_5, gicd::RESERVED_5_END, WORD, read_zero, write_ignore),
    RegisterGroup::new("impdef", gicd::IMPDEF_1, gicd::IMPDEF_1_END, WORD, read_zero, write_ignore),
    RegisterGroup::new("ICPIDR2", gicd::ICPIDR2, gicd::ICPIDR2, WORD, read_unhandled, write_ignore),
    RegisterGroup::new("impdef", gicd::IMPDEF_2, gicd::IMPDEF_2_END, WORD, read_zero, write_ignore),
];

fn lookup(offset: u32) -> Option<&'static RegisterGroup> {
    REGISTER_MAP.iter().find(|group| group.contains(offset))
}

fn read_ctlr(vgic: &Vgic, _: &VgicVcpu, _: &MmioAccess) -> Result<u32, VgicError> {
    Ok(vgic.ctlr.load(Ordering::Acquire))
}

fn write_ctlr(vgic: &Vgic, v: &VgicVcpu, _: &MmioAccess, value: u32) -> Result<(), VgicError> {
    let ctlr = LocalRegisterCopy::<u32, GICD_CTLR::Register>::new(value);
    let enable = GICD_CTLR::EnableGrp0.val(ctlr.read(GICD_CTLR::EnableGrp0)).value;
    let old = vgic.ctlr.swap(enable, Ordering::AcqRel);
    if old != enable {
        log::info!(
            "VGIC: VCPU {} {} the distributor",
            v.id(),
            if enable != 0 { "enabled" } else { "disabled" }
        );
    }
    Ok(())
}

fn read_typer(vgic: &Vgic, _: &VgicVcpu, _: &MmioAccess) -> Result<u32, VgicError> {
    let mut typer = LocalRegisterCopy::<u32, GICD_TYPER::Register>::new(0);
    typer.write(
        GICD_TYPER::CPUNumber.val(vgic.config().nr_vcpus as u32 - 1)
            + GICD_TYPER::ITLinesNumber.val(vgic.nr_shared_ranks() as u32),
    );
    Ok(typer.get())
}

fn read_iidr(_: &Vgic, _: &VgicVcpu, _: &MmioAccess) -> Result<u32, VgicError> {
    Ok(IIDR_VALUE)
}

fn read_zero(_: &Vgic, _: &VgicVcpu, _: &MmioAccess) -> Result<u32, VgicError> {
    Ok(0)
}

fn read_sgir(_: &Vgic, _: &VgicVcpu, _: &MmioAccess) -> Result<u32, VgicError> {
    Ok(SGIR_READ_VALUE)
}

fn read_unhandled(_: &Vgic, v: &VgicVcpu, access: &MmioAccess) -> Result<u32, VgicError> {
    log::warn!("VGIC: VCPU {} unhandled read at offset {:#05x}", v.id(), access.offset);
    Err(VgicError::Unhandled { offset: access.offset })
}

fn write_ignore(_: &Vgic, _: &VgicVcpu, access: &MmioAccess, value: u32) -> Result<(), VgicError> {
    log::trace!("VGIC: ignored write {:#x} at offset {:#05x}", value, access.offset);
    Ok(())
}

fn write_unhandled(_: &Vgic, v: &VgicVcpu, access: &MmioAccess, value: u32) -> Result<(), VgicError> {
    log::warn!(
        "VGIC: VCPU {} unhandled {}-byte write {:#x} at offset {:#05x}",
        v.id(),
        access.width.size(),
        value,
        access.offset
    );
    Err(VgicError::Unhandled { offset: access.offset })
}

/// Read a field of the rank addressed by `access`; absent ranks read as zero
fn read_rank(
    vgic: &Vgic,
    v: &VgicVcpu,
    access: &MmioAccess,
    bits_per_line: usize,
    field: impl FnOnce(&RankRegs, usize) -> u32,
) -> u32 {
    let word = word_index(bits_per_line, access.reg);
    vgic.resolve_rank(v, bits_per_line, access.reg)
        .map_or(0, |rank| rank.with(|regs| access.extract(field(regs, word))))
}

/// Update a field of the rank addressed by `access`; absent ranks ignore writes
fn write_rank<R>(
    vgic: &Vgic,
    v: &VgicVcpu,
    access: &MmioAccess,
    bits_per_line: usize,
    field: impl FnOnce(&mut RankRegs, usize) -> R,
) -> Option<R> {
    let word = word_index(bits_per_line, access.reg);
    let rank = vgic.resolve_rank(v, bits_per_line, access.reg);
    if rank.is_none() {
        log::trace!("VGIC: write to absent rank at offset {:#05x} ignored", access.offset);
    }
    rank.map(|rank| rank.with(|regs| field(regs, word)))
}

fn read_enable(vgic: &Vgic, v: &VgicVcpu, access: &MmioAccess) -> Result<u32, VgicError> {
    Ok(read_rank(vgic, v, access, ENABLE_BITS, |regs, _| regs.ienable))
}

fn write_set_enable(vgic: &Vgic, v: &VgicVcpu, access: &MmioAccess, value: u32) -> Result<(), VgicError> {
    let changed = write_rank(vgic, v, access, ENABLE_BITS, |regs, _| {
        let old = regs.ienable;
        regs.ienable |= value;
        value & !old
    });
    if let Some(changed) = changed.filter(|&mask| mask != 0) {
        vgic.enable_lines_on(v, changed, rank_index(ENABLE_BITS, access.reg));
    }
    Ok(())
}

fn write_clear_enable(vgic: &Vgic, v: &VgicVcpu, access: &MmioAccess, value: u32) -> Result<(), VgicError> {
    let changed = write_rank(vgic, v, access, ENABLE_BITS, |regs, _| {
        let old = regs.ienable;
        regs.ienable &= !value;
        value & old
    });
    if let Some(changed) = changed.filter(|&mask| mask != 0) {
        vgic.disable_lines_on(v, changed, rank_index(ENABLE_BITS, access.reg));
    }
    Ok(())
}

fn read_pending(vgic: &Vgic, v: &VgicVcpu, access: &MmioAccess) -> Result<u32, VgicError> {
    Ok(read_rank(vgic, v, access, ENABLE_BITS, |regs, _| regs.ipend))
}

fn read_active(vgic: &Vgic, v: &VgicVcpu, access: &MmioAccess) -> Result<u32, VgicError> {
    Ok(read_rank(vgic, v, access, ENABLE_BITS, |regs, _| regs.iactive))
}

fn write_clear_active(vgic: &Vgic, v: &VgicVcpu, access: &MmioAccess, value: u32) -> Result<(), VgicError> {
    write_rank(vgic, v, access, ENABLE_BITS, |regs, _| regs.iactive &= !value);
    Ok(())
}

fn read_priority(vgic: &Vgic, v: &VgicVcpu, access: &MmioAccess) -> Result<u32, VgicError> {
    Ok(read_rank(vgic, v, access, BYTE_BITS, |regs, word| regs.ipriority[word]))
}

fn write_priority(vgic: &Vgic, v: &VgicVcpu, access: &MmioAccess, value: u32) -> Result<(), VgicError> {
    write_rank(vgic, v, access, BYTE_BITS, |regs, word| {
        access.merge(&mut regs.ipriority[word], value)
    });
    Ok(())
}

fn read_targets(vgic: &Vgic, v: &VgicVcpu, access: &MmioAccess) -> Result<u32, VgicError> {
    Ok(read_rank(vgic, v, access, BYTE_BITS, |regs, word| regs.itargets[word]))
}

fn write_targets(vgic: &Vgic, v: &VgicVcpu, access: &MmioAccess, value: u32) -> Result<(), VgicError> {
    // Targets of lines 0-7 are fixed to the owning VCPU
    if access.offset < gicd::ITARGETSR_WRITABLE {
        return write_ignore(vgic, v, access, value);
    }
    write_rank(vgic, v, access, BYTE_BITS, |regs, word| {
        access.merge(&mut regs.itargets[word], value)
    });
    Ok(())
}

fn read_config(vgic: &Vgic, v: &VgicVcpu, access: &MmioAccess) -> Result<u32, VgicError> {
    Ok(read_rank(vgic, v, access, CONFIG_BITS, |regs, word| regs.icfg[word]))
}

fn write_config(vgic: &Vgic, v: &VgicVcpu, access: &MmioAccess, value: u32) -> Result<(), VgicError> {
    // SGI and PPI trigger modes are fixed
    if access.offset < gicd::ICFGR_WRITABLE {
        return write_ignore(vgic, v, access, value);
    }
    write_rank(vgic, v, access, CONFIG_BITS, |regs, word| regs.icfg[word] = value);
    Ok(())
}

fn write_sgir(vgic: &Vgic, v: &VgicVcpu, _: &MmioAccess, value: u32) -> Result<(), VgicError> {
    vgic.dispatch_sgi_from(v, value);
    Ok(())
}

fn read_sgi_pending(_: &Vgic, v: &VgicVcpu, access: &MmioAccess) -> Result<u32, VgicError> {
    let word = (access.reg >> 2) as usize;
    Ok(v.private_rank().with(|regs| access.extract(regs.pendsgi[word])))
}

impl Vgic {
    /// Emulate a guest read of the distributor register at `offset`
    ///
    /// `offset` is relative to the distributor base. Reads of registers
    /// that are recognized but not emulated return
    /// [`VgicError::Unhandled`]; a width the register does not accept
    /// crashes the domain and returns [`VgicError::BadWidth`].
    pub fn handle_read(
        &self,
        vcpu: VcpuId,
        offset: u32,
        width: AccessWidth,
        signed: bool,
    ) -> Result<u32, VgicError> {
        let v = self.vcpu_or_err(vcpu)?;
        let (group, access) = self.decode(v, offset, width, signed)?;
        let value = (group.read)(self, v, &access)?;
        log::trace!("VGIC: VCPU {} read {} +{:#x} = {:#x}", vcpu, group.name, access.reg, value);
        Ok(value)
    }

    /// Emulate a guest write of `value` to the distributor register at `offset`
    ///
    /// Same failure policy as [`Vgic::handle_read`]. No register state
    /// changes when the write fails.
    pub fn handle_write(
        &self,
        vcpu: VcpuId,
        offset: u32,
        width: AccessWidth,
        value: u32,
    ) -> Result<(), VgicError> {
        let v = self.vcpu_or_err(vcpu)?;
        let (group, access) = self.decode(v, offset, width, false)?;
        log::trace!("VGIC: VCPU {} write {} +{:#x} = {:#x}", vcpu, group.name, access.reg, value);
        (group.write)(self, v, &access, value)
    }

    fn decode(
        &self,
        v: &VgicVcpu,
        offset: u32,
        width: AccessWidth,
        signed: bool,
    ) -> Result<(&'static RegisterGroup, MmioAccess), VgicError> {
        let Some(group) = lookup(offset) else {
            log::warn!("VGIC: VCPU {} access to unknown offset {:#x}", v.id(), offset);
            return Err(VgicError::Unhandled { offset });
        };

        if !group.widths.allows(width) {
            log::error!(
                "VGIC: VCPU {} bad {}-byte access to {} at offset {:#05x}, crashing domain",
                v.id(),
                width.size(),
                group.name,
                offset
            );
            self.host.crash_domain();
            return Err(VgicError::BadWidth { offset, width });
        }

        let access = MmioAccess {
            offset,
            reg: offset - group.start,
            width,
            signed,
        };
        Ok((group, access))
    }
}

/// A device behind a guest-physical MMIO window
pub trait MmioHandler {
    /// Guest-physical base address of the window
    fn base(&self) -> u64;

    /// Size of the window in bytes
    fn size(&self) -> u64;

    /// Whether `addr` falls inside the window
    fn contains(&self, addr: u64) -> bool {
        addr >= self.base() && addr - self.base() < self.size()
    }

    /// Handle a trapped read at guest-physical `addr`
    fn read(&self, vcpu: VcpuId, addr: u64, width: AccessWidth, signed: bool) -> Result<u32, VgicError>;

    /// Handle a trapped write at guest-physical `addr`
    fn write(&self, vcpu: VcpuId, addr: u64, width: AccessWidth, value: u32) -> Result<(), VgicError>;
}

impl MmioHandler for Vgic {
    fn base(&self) -> u64 {
        self.config().dist_base
    }

    fn size(&self) -> u64 {
        DIST_FRAME_SIZE
    }

    fn read(&self, vcpu: VcpuId, addr: u64, width: AccessWidth, signed: bool) -> Result<u32, VgicError> {
        self.handle_read(vcpu, self.frame_offset(addr)?, width, signed)
    }

    fn write(&self, vcpu: VcpuId, addr: u64, width: AccessWidth, value: u32) -> Result<(), VgicError> {
        self.handle_write(vcpu, self.frame_offset(addr)?, width, value)
    }
}

impl Vgic {
    fn frame_offset(&self, addr: u64) -> Result<u32, VgicError> {
        if !self.contains(addr) {
            let offset = addr.wrapping_sub(self.base()) as u32;
            return Err(VgicError::Unhandled { offset });
        }
        Ok((addr - self.base()) as u32)
    }
}
