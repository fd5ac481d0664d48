//! Injection engine and enable/disable transitions
//!
//! A line's status bits and inflight ownership only change with the list
//! lock of the VCPU that owns (or is claiming) it held. Priorities are read
//! from the rank before that lock is taken, so the two locks never nest.

use alloc::vec::Vec;

use crate::utils::SetBits;

use super::rank::line_rank;
use super::{
    InflightList, IrqLine, PendingIrq, PendingStatus, PhysIrq, VcpuId, Vgic, VgicError, VgicVcpu,
    NR_PRIVATE_LINES,
};

/// What an injection left to do once the list lock is released
enum Delivery {
    /// Nothing, the target is offline
    Dropped,
    /// Kick the VCPU holding the line
    Notify(VcpuId),
}

impl Vgic {
    /// Raise `line` on VCPU `vcpu`
    ///
    /// A line that is already inflight is re-triggered instead of being
    /// queued twice. Injecting on an offline VCPU does nothing.
    pub fn inject(&self, vcpu: VcpuId, line: IrqLine) -> Result<(), VgicError> {
        let v = self.vcpu_or_err(vcpu)?;
        let p = self.pending_irq(v, line).ok_or(VgicError::InvalidLine(line))?;
        self.deliver(v, p);
        Ok(())
    }

    /// Queue `p` on `v`, or re-trigger it on the VCPU already holding it
    pub(crate) fn deliver(&self, v: &VgicVcpu, p: &PendingIrq) {
        let line = p.line();
        let priority = self
            .rank(v, line_rank(line))
            .map_or(0, |rank| rank.priority(line as usize % NR_PRIVATE_LINES));

        let delivery = self.with_holder(v, p, |holder, list| {
            if p.is_inflight() {
                p.set(PendingStatus::QUEUED);
                self.gic.raise_inflight_irq(holder.id(), line);
                return Some(Delivery::Notify(holder.id()));
            }

            if !self.host.is_online(v.id()) {
                return Some(Delivery::Dropped);
            }

            // Lost to a concurrent claim on another VCPU
            p.claim(v.id()).ok()?;

            p.set_priority(priority);
            p.set(PendingStatus::QUEUED);
            if p.is_set(PendingStatus::ENABLED) {
                self.gic.raise_guest_irq(v.id(), line, priority);
            }
            list.insert(line, priority);
            Some(Delivery::Notify(v.id()))
        });

        match delivery {
            Some(Delivery::Dropped) => {
                log::debug!("VGIC: dropped line {} for offline VCPU {}", line, v.id());
            }
            Some(Delivery::Notify(target)) => {
                log::trace!("VGIC: line {} inflight on VCPU {}", line, target);
                self.kick(target);
            }
            None => {}
        }
    }

    /// Run `f` under the list lock of the VCPU holding `p`
    ///
    /// The holder is the VCPU `p` is inflight on, or `fallback` while it is
    /// not inflight anywhere. Ownership is checked again once the lock is
    /// held; `f` is retried until both agree and `f` returns `Some`.
    /// Returns `None` if `p` is claimed by a VCPU that no longer exists.
    fn with_holder<R>(
        &self,
        fallback: &VgicVcpu,
        p: &PendingIrq,
        mut f: impl FnMut(&VgicVcpu, &mut InflightList) -> Option<R>,
    ) -> Option<R> {
        loop {
            let owner = p.inflight_on();
            let holder = match owner {
                Some(id) => match self.vcpu(id) {
                    Some(ov) => ov,
                    None => {
                        log::warn!("VGIC: line {} claimed by missing VCPU {}", p.line(), id);
                        return None;
                    }
                },
                None => fallback,
            };
            let done = holder.with_list(|list| {
                if p.inflight_on() != owner {
                    return None;
                }
                f(holder, list)
            });
            if done.is_some() {
                return done;
            }
            core::hint::spin_loop();
        }
    }

    /// Wake `vcpu` and make it re-evaluate its interrupts if it runs elsewhere
    fn kick(&self, vcpu: VcpuId) {
        let running = self.host.running_on(vcpu);
        self.host.unblock(vcpu);
        if let Some(cpu) = running {
            if cpu != self.host.current_cpu() {
                self.host.send_event_check(cpu);
            }
        }
    }

    /// Deliver shared line `line` to the first online VCPU it targets
    ///
    /// Falls back to VCPU 0 when no targeted VCPU is online.
    pub fn inject_spi(&self, line: IrqLine) -> Result<(), VgicError> {
        if (line as usize) < NR_PRIVATE_LINES {
            return Err(VgicError::InvalidLine(line));
        }
        let v0 = self.vcpu_or_err(0)?;
        let rank = self.rank(v0, line_rank(line)).ok_or(VgicError::InvalidLine(line))?;
        let mask = rank.with(|regs| regs.target(line as usize % NR_PRIVATE_LINES));

        let target = SetBits::new(mask as u32)
            .find(|&id| self.vcpu(id).is_some() && self.host.is_online(id))
            .unwrap_or(0);
        self.inject(target, line)
    }

    /// Guest enabled the lines set in `mask` of rank `rank`
    pub fn enable_lines(&self, vcpu: VcpuId, mask: u32, rank: usize) -> Result<(), VgicError> {
        let v = self.vcpu_or_err(vcpu)?;
        self.enable_lines_on(v, mask, rank);
        Ok(())
    }

    pub(crate) fn enable_lines_on(&self, v: &VgicVcpu, mask: u32, rank: usize) {
        for bit in SetBits::new(mask) {
            let line = (rank * NR_PRIVATE_LINES + bit) as IrqLine;
            let Some(p) = self.pending_irq(v, line) else {
                continue;
            };
            p.set(PendingStatus::ENABLED);

            // The upcall may have latched before the guest enabled the line
            if line == self.config.evtchn_irq
                && self.host.evtchn_upcall_pending(v.id())
                && !p.is_inflight()
            {
                self.deliver(v, p);
            } else if let Some(owner) = p.inflight_on() {
                self.raise_if_hidden(p, owner);
            }

            if let Some(irq) = p.phys() {
                self.gic.enable_physical(irq);
            }
        }
    }

    /// Ask the physical interface to show an inflight line it is not showing yet
    fn raise_if_hidden(&self, p: &PendingIrq, owner: VcpuId) {
        let Some(ov) = self.vcpu(owner) else {
            return;
        };
        ov.with_list(|_| {
            if p.inflight_on() == Some(owner) && !p.is_set(PendingStatus::VISIBLE) {
                self.gic.raise_guest_irq(owner, p.line(), p.priority());
            }
        });
    }

    /// Guest disabled the lines set in `mask` of rank `rank`
    pub fn disable_lines(&self, vcpu: VcpuId, mask: u32, rank: usize) -> Result<(), VgicError> {
        let v = self.vcpu_or_err(vcpu)?;
        self.disable_lines_on(v, mask, rank);
        Ok(())
    }

    pub(crate) fn disable_lines_on(&self, v: &VgicVcpu, mask: u32, rank: usize) {
        for bit in SetBits::new(mask) {
            let line = (rank * NR_PRIVATE_LINES + bit) as IrqLine;
            let Some(p) = self.pending_irq(v, line) else {
                continue;
            };
            p.clear(PendingStatus::ENABLED);

            self.with_holder(v, p, |holder, list| {
                if p.release(holder.id()) {
                    list.remove(line);
                    p.clear(PendingStatus::QUEUED | PendingStatus::VISIBLE | PendingStatus::ACTIVE);
                }
                self.gic.remove_from_queues(holder.id(), line);
                Some(())
            });

            if let Some(irq) = p.phys() {
                self.gic.disable_physical(irq);
            }
        }
    }

    /// Drop every line inflight on `vcpu`, here and at the physical interface
    pub fn clear_pending_irqs(&self, vcpu: VcpuId) -> Result<(), VgicError> {
        let v = self.vcpu_or_err(vcpu)?;
        v.with_list(|list| {
            for entry in list.drain() {
                if let Some(p) = self.pending_irq(v, entry.line) {
                    p.release(vcpu);
                    p.clear(PendingStatus::QUEUED | PendingStatus::VISIBLE | PendingStatus::ACTIVE);
                }
            }
            self.gic.clear_pending_irqs(vcpu);
        });
        log::debug!("VGIC: cleared pending lines of VCPU {}", vcpu);
        Ok(())
    }

    /// Record that `line` entered or left a list register of `vcpu`
    ///
    /// Entering a list register consumes the queued state; a later raise
    /// sets it again.
    pub fn set_visible(&self, vcpu: VcpuId, line: IrqLine, visible: bool) -> Result<(), VgicError> {
        self.update_status(vcpu, line, |p| {
            if visible {
                p.set(PendingStatus::VISIBLE);
                p.clear(PendingStatus::QUEUED);
            } else {
                p.clear(PendingStatus::VISIBLE);
            }
        })
    }

    /// Record that the guest acknowledged (or deactivated) `line`
    pub fn set_active(&self, vcpu: VcpuId, line: IrqLine, active: bool) -> Result<(), VgicError> {
        self.update_status(vcpu, line, |p| {
            if active {
                p.set(PendingStatus::ACTIVE);
            } else {
                p.clear(PendingStatus::ACTIVE);
            }
        })
    }

    /// Guest completed `line` on `vcpu`
    ///
    /// A line re-triggered while it was being serviced stays inflight and
    /// is raised again if enabled. Returns whether it is still inflight.
    pub fn retire(&self, vcpu: VcpuId, line: IrqLine) -> Result<bool, VgicError> {
        let v = self.vcpu_or_err(vcpu)?;
        let p = self.pending_irq(v, line).ok_or(VgicError::InvalidLine(line))?;
        Ok(v.with_list(|list| {
            p.clear(PendingStatus::VISIBLE | PendingStatus::ACTIVE);
            if p.inflight_on() != Some(vcpu) {
                return false;
            }
            if p.is_set(PendingStatus::QUEUED | PendingStatus::ENABLED) {
                self.gic.raise_guest_irq(vcpu, line, p.priority());
                return true;
            }
            p.clear(PendingStatus::QUEUED);
            p.release(vcpu);
            list.remove(line);
            false
        }))
    }

    /// Lines inflight on `vcpu`, in delivery order
    pub fn inflight_lines(&self, vcpu: VcpuId) -> Result<Vec<IrqLine>, VgicError> {
        let v = self.vcpu_or_err(vcpu)?;
        Ok(v.with_list(|list| list.lines().collect()))
    }

    /// Status of `line` as seen from `vcpu`
    pub fn pending_status(&self, vcpu: VcpuId, line: IrqLine) -> Result<PendingStatus, VgicError> {
        let v = self.vcpu_or_err(vcpu)?;
        let p = self.pending_irq(v, line).ok_or(VgicError::InvalidLine(line))?;
        Ok(p.status())
    }

    /// Back `line` with physical interrupt `irq`
    pub fn route_physical(&self, vcpu: VcpuId, line: IrqLine, irq: PhysIrq) -> Result<(), VgicError> {
        let v = self.vcpu_or_err(vcpu)?;
        let p = self.pending_irq(v, line).ok_or(VgicError::InvalidLine(line))?;
        p.set_phys(Some(irq));
        log::info!("VGIC: line {} routed to physical IRQ {}", line, irq.0);
        Ok(())
    }

    /// Detach the physical interrupt backing `line`
    pub fn unroute_physical(&self, vcpu: VcpuId, line: IrqLine) -> Result<Option<PhysIrq>, VgicError> {
        let v = self.vcpu_or_err(vcpu)?;
        let p = self.pending_irq(v, line).ok_or(VgicError::InvalidLine(line))?;
        let old = p.phys();
        p.set_phys(None);
        Ok(old)
    }

    fn update_status(
        &self,
        vcpu: VcpuId,
        line: IrqLine,
        f: impl FnOnce(&PendingIrq),
    ) -> Result<(), VgicError> {
        let v = self.vcpu_or_err(vcpu)?;
        let p = self.pending_irq(v, line).ok_or(VgicError::InvalidLine(line))?;
        v.with_list(|_| f(p));
        Ok(())
    }
}
