//! Collaborator interfaces
//!
//! The distributor never touches physical interrupt hardware or the
//! scheduler directly. Both are reached through these traits, and every
//! call is fire-and-forget: implementations must not block.

use super::{IrqLine, PhysCpuId, PhysIrq, VcpuId};

/// Physical GIC driver, as seen by the virtual distributor
///
/// Owns the list registers and the queue of lines waiting for one, and
/// the physical interrupt descriptors with their locks.
pub trait GicInterface: Send + Sync {
    /// Make `line` visible to `vcpu` through a list register at `priority`,
    /// or queue it until a list register frees up
    fn raise_guest_irq(&self, vcpu: VcpuId, line: IrqLine, priority: u8);

    /// Re-latch a line that is already inflight on `vcpu`
    fn raise_inflight_irq(&self, vcpu: VcpuId, line: IrqLine);

    /// Drop `line` from every physical delivery queue of `vcpu`
    fn remove_from_queues(&self, vcpu: VcpuId, line: IrqLine);

    /// Drop every queued and list-register state of `vcpu`
    fn clear_pending_irqs(&self, vcpu: VcpuId);

    /// Unmask a physical line, under its own descriptor lock
    fn enable_physical(&self, irq: PhysIrq);

    /// Mask a physical line, under its own descriptor lock
    fn disable_physical(&self, irq: PhysIrq);
}

/// Scheduler and domain services
pub trait VgicHost: Send + Sync {
    /// Whether `vcpu` is up (not administratively offline)
    fn is_online(&self, vcpu: VcpuId) -> bool;

    /// Physical CPU `vcpu` is currently executing on, if any
    fn running_on(&self, vcpu: VcpuId) -> Option<PhysCpuId>;

    /// Physical CPU executing the caller
    fn current_cpu(&self) -> PhysCpuId;

    /// Wake `vcpu` if it is blocked
    fn unblock(&self, vcpu: VcpuId);

    /// Ask `cpu` to re-evaluate the interrupt state of whatever it runs
    fn send_event_check(&self, cpu: PhysCpuId);

    /// Whether the event-channel upcall of `vcpu` is latched
    fn evtchn_upcall_pending(&self, vcpu: VcpuId) -> bool;

    /// Terminate the domain for unrecoverable guest misbehavior
    fn crash_domain(&self);
}
