//! Recording collaborators for unit tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::vec::Vec;

use super::{GicInterface, IrqLine, PhysCpuId, PhysIrq, VcpuId, Vgic, VgicHost};
use crate::config::VgicConfig;

/// A call made on the physical GIC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GicCall {
    Raise(VcpuId, IrqLine, u8),
    RaiseInflight(VcpuId, IrqLine),
    Remove(VcpuId, IrqLine),
    ClearPending(VcpuId),
    EnablePhys(PhysIrq),
    DisablePhys(PhysIrq),
}

/// Physical GIC that records every call
#[derive(Debug, Default)]
pub struct MockGic {
    calls: Mutex<Vec<GicCall>>,
}

impl MockGic {
    pub fn calls(&self) -> Vec<GicCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn take_calls(&self) -> Vec<GicCall> {
        core::mem::take(&mut *self.calls.lock().unwrap())
    }

    fn record(&self, call: GicCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl GicInterface for MockGic {
    fn raise_guest_irq(&self, vcpu: VcpuId, line: IrqLine, priority: u8) {
        self.record(GicCall::Raise(vcpu, line, priority));
    }

    fn raise_inflight_irq(&self, vcpu: VcpuId, line: IrqLine) {
        self.record(GicCall::RaiseInflight(vcpu, line));
    }

    fn remove_from_queues(&self, vcpu: VcpuId, line: IrqLine) {
        self.record(GicCall::Remove(vcpu, line));
    }

    fn clear_pending_irqs(&self, vcpu: VcpuId) {
        self.record(GicCall::ClearPending(vcpu));
    }

    fn enable_physical(&self, irq: PhysIrq) {
        self.record(GicCall::EnablePhys(irq));
    }

    fn disable_physical(&self, irq: PhysIrq) {
        self.record(GicCall::DisablePhys(irq));
    }
}

/// A call made on the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCall {
    Unblock(VcpuId),
    EventCheck(PhysCpuId),
}

/// Host with settable VCPU state that records notifications
#[derive(Debug)]
pub struct MockHost {
    online: Vec<AtomicBool>,
    running: Mutex<Vec<Option<PhysCpuId>>>,
    evtchn_pending: Vec<AtomicBool>,
    current: AtomicUsize,
    crashed: AtomicBool,
    calls: Mutex<Vec<HostCall>>,
}

impl MockHost {
    /// All VCPUs online and descheduled, caller on physical CPU 0
    pub fn new(nr_vcpus: usize) -> Self {
        Self {
            online: (0..nr_vcpus).map(|_| AtomicBool::new(true)).collect(),
            running: Mutex::new(vec![None; nr_vcpus]),
            evtchn_pending: (0..nr_vcpus).map(|_| AtomicBool::new(false)).collect(),
            current: AtomicUsize::new(0),
            crashed: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_online(&self, vcpu: VcpuId, online: bool) {
        self.online[vcpu].store(online, Ordering::SeqCst);
    }

    pub fn set_running(&self, vcpu: VcpuId, cpu: Option<PhysCpuId>) {
        self.running.lock().unwrap()[vcpu] = cpu;
    }

    pub fn set_current_cpu(&self, cpu: PhysCpuId) {
        self.current.store(cpu, Ordering::SeqCst);
    }

    pub fn set_evtchn_pending(&self, vcpu: VcpuId, pending: bool) {
        self.evtchn_pending[vcpu].store(pending, Ordering::SeqCst);
    }

    pub fn crashed(&self) -> bool {
        self.crashed.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn take_calls(&self) -> Vec<HostCall> {
        core::mem::take(&mut *self.calls.lock().unwrap())
    }
}

impl VgicHost for MockHost {
    fn is_online(&self, vcpu: VcpuId) -> bool {
        self.online.get(vcpu).map_or(false, |online| online.load(Ordering::SeqCst))
    }

    fn running_on(&self, vcpu: VcpuId) -> Option<PhysCpuId> {
        self.running.lock().unwrap().get(vcpu).copied().flatten()
    }

    fn current_cpu(&self) -> PhysCpuId {
        self.current.load(Ordering::SeqCst)
    }

    fn unblock(&self, vcpu: VcpuId) {
        self.calls.lock().unwrap().push(HostCall::Unblock(vcpu));
    }

    fn send_event_check(&self, cpu: PhysCpuId) {
        self.calls.lock().unwrap().push(HostCall::EventCheck(cpu));
    }

    fn evtchn_upcall_pending(&self, vcpu: VcpuId) -> bool {
        self.evtchn_pending[vcpu].load(Ordering::SeqCst)
    }

    fn crash_domain(&self) {
        self.crashed.store(true, Ordering::SeqCst);
    }
}

/// Distributor with `nr_vcpus` initialized VCPUs and `nr_spis` shared lines
pub fn test_vgic(nr_vcpus: usize, nr_spis: u32) -> (Vgic, Arc<MockGic>, Arc<MockHost>) {
    let gic = Arc::new(MockGic::default());
    let host = Arc::new(MockHost::new(nr_vcpus));
    let config = VgicConfig { nr_spis, ..VgicConfig::for_guest(nr_vcpus) };
    let mut vgic = Vgic::new(config, gic.clone(), host.clone()).unwrap();
    for id in 0..nr_vcpus {
        vgic.init_vcpu(id).unwrap();
    }
    (vgic, gic, host)
}
