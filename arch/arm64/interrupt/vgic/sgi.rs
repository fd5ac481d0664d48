//! Software-generated interrupt dispatch
//!
//! Turns a guest write of GICD_SGIR into injections on the target VCPUs.

use tock_registers::LocalRegisterCopy;

use super::regs::GICD_SGIR;
use super::{IrqLine, VcpuId, Vgic, VgicError, VgicVcpu, VGIC_MAX_NCPU};
use crate::utils::SetBits;

/// VCPUs an SGI is sent to
pub type SgiTargets = heapless::Vec<VcpuId, VGIC_MAX_NCPU>;

impl Vgic {
    /// Raise the SGI described by `sgir`, written by VCPU `vcpu`
    ///
    /// Bad targets and an invalid filter are reported and skipped; the
    /// write itself is always accepted.
    pub fn dispatch_sgi(&self, vcpu: VcpuId, sgir: u32) -> Result<(), VgicError> {
        let v = self.vcpu_or_err(vcpu)?;
        self.dispatch_sgi_from(v, sgir);
        Ok(())
    }

    pub(crate) fn dispatch_sgi_from(&self, v: &VgicVcpu, sgir: u32) {
        let reg = LocalRegisterCopy::<u32, GICD_SGIR::Register>::new(sgir);
        let line = reg.read(GICD_SGIR::SGIINTID) as IrqLine;

        let Some(targets) = self.sgi_targets(v, &reg) else {
            log::warn!(
                "VGIC: VCPU {} wrote SGIR {:#010x} with an invalid target filter",
                v.id(),
                sgir
            );
            return;
        };

        for target in targets {
            let Some(tv) = self.vcpu(target).filter(|_| self.host.is_online(target)) else {
                log::warn!(
                    "VGIC: SGIR {:#010x} from VCPU {} names bad target VCPU {}",
                    sgir,
                    v.id(),
                    target
                );
                continue;
            };
            // SGIINTID is four bits wide, so the private descriptor exists
            let Some(p) = tv.pending(line as usize) else {
                continue;
            };
            log::trace!("VGIC: SGI {} from VCPU {} to VCPU {}", line, v.id(), target);
            self.deliver(tv, p);
        }
    }

    /// Target set selected by the filter of `reg`, `None` for an invalid filter
    fn sgi_targets(
        &self,
        v: &VgicVcpu,
        reg: &LocalRegisterCopy<u32, GICD_SGIR::Register>,
    ) -> Option<SgiTargets> {
        use GICD_SGIR::TargetListFilter::Value;

        let mut targets = SgiTargets::new();
        match reg.read_as_enum::<Value>(GICD_SGIR::TargetListFilter)? {
            Value::List => {
                let mask = reg.read(GICD_SGIR::CPUTargetList);
                targets.extend(SetBits::new(mask));
            }
            Value::AllButSelf => {
                targets.extend(
                    self.vcpus()
                        .map(VgicVcpu::id)
                        .filter(|&id| id != v.id() && self.host.is_online(id)),
                );
            }
            Value::SelfOnly => {
                // Capacity is at least one
                let _ = targets.push(v.id());
            }
        }
        Some(targets)
    }
}
