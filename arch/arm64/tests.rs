//! ARM64 scenario tests
//!
//! End-to-end guest flows through the trapped register interface, as
//! opposed to the per-module unit tests next to each component:
//! - `test_boot_*` - a guest bringing its distributor up
//! - `test_sgi_*` - inter-processor interrupts through GICD_SGIR
//! - `test_concurrent_*` - several VCPUs hammering the same domain

use std::sync::Arc;
use std::thread;

use crate::arch::arm64::interrupt::vgic::regs::gicd;
use crate::arch::arm64::interrupt::vgic::testing::{test_vgic, GicCall, HostCall};
use crate::arch::arm64::interrupt::{AccessWidth, MmioHandler, PendingStatus, Vgic};

const W: AccessWidth = AccessWidth::Word;
const B: AccessWidth = AccessWidth::Byte;

fn mmio_write(vgic: &Vgic, vcpu: usize, offset: u32, width: AccessWidth, value: u32) {
    let addr = vgic.base() + offset as u64;
    MmioHandler::write(vgic, vcpu, addr, width, value).unwrap();
}

fn mmio_read(vgic: &Vgic, vcpu: usize, offset: u32, width: AccessWidth) -> u32 {
    let addr = vgic.base() + offset as u64;
    MmioHandler::read(vgic, vcpu, addr, width, false).unwrap()
}

// ========================================================================
// Boot
// ========================================================================

/// A guest probing and enabling its distributor the way Linux does
#[test]
fn test_boot_distributor_bring_up() {
    let (vgic, gic, _) = test_vgic(2, 64);

    mmio_write(&vgic, 0, gicd::CTLR, W, 0);
    let typer = mmio_read(&vgic, 0, gicd::TYPER, W);
    let nr_lines = 32 * ((typer & 0x1f) + 1);
    assert_eq!(nr_lines, 96);
    assert_eq!(((typer >> 5) & 0x7) + 1, 2);

    // Default priority everywhere, all SPIs to VCPU 0, level triggered
    for offset in (gicd::IPRIORITYR..gicd::IPRIORITYR + nr_lines).step_by(4) {
        mmio_write(&vgic, 0, offset, W, 0xa0a0_a0a0);
    }
    for offset in (gicd::ITARGETSR + 32..gicd::ITARGETSR + nr_lines).step_by(4) {
        mmio_write(&vgic, 0, offset, W, 0x0101_0101);
    }
    for offset in (gicd::ICFGR + 8..gicd::ICFGR + nr_lines / 4).step_by(4) {
        mmio_write(&vgic, 0, offset, W, 0);
    }
    mmio_write(&vgic, 0, gicd::CTLR, W, 1);
    assert_eq!(mmio_read(&vgic, 0, gicd::CTLR, W), 1);

    // Lines past the configured count are simply not there
    mmio_write(&vgic, 0, gicd::ISENABLER + 0x0c, W, 0xffff_ffff);
    assert_eq!(mmio_read(&vgic, 0, gicd::ISENABLER + 0x0c, W), 0);

    // A device line fires before and after the guest enables it
    vgic.inject_spi(70).unwrap();
    assert!(gic.take_calls().is_empty());
    mmio_write(&vgic, 0, gicd::ISENABLER + 8, W, 1 << 6);
    assert_eq!(gic.take_calls(), vec![GicCall::Raise(0, 70, 0xa0)]);
    assert_eq!(
        vgic.pending_status(0, 70).unwrap(),
        PendingStatus::ENABLED | PendingStatus::QUEUED
    );
}

/// Priorities written by the guest order the inflight list
#[test]
fn test_boot_priority_ordering() {
    let (vgic, _, _) = test_vgic(1, 32);
    let lines = [(40, 0x80), (41, 0x10), (42, 0x80), (43, 0x40)];
    for (line, priority) in lines {
        mmio_write(&vgic, 0, gicd::IPRIORITYR + line, B, priority);
    }
    for (line, _) in lines {
        vgic.inject(0, line).unwrap();
    }
    assert_eq!(vgic.inflight_lines(0).unwrap(), vec![41, 43, 40, 42]);
}

// ========================================================================
// SGI
// ========================================================================

/// IPI round trip: raise, show, acknowledge, complete
#[test]
fn test_sgi_ipi_round_trip() {
    let (vgic, gic, host) = test_vgic(2, 0);
    host.set_running(1, Some(1));
    mmio_write(&vgic, 1, gicd::ISENABLER, W, 0x0000_ffff);

    mmio_write(&vgic, 0, gicd::SGIR, W, (0b10 << 16) | 1);
    assert_eq!(gic.take_calls(), vec![GicCall::Raise(1, 1, 0)]);
    assert_eq!(host.take_calls(), vec![HostCall::Unblock(1), HostCall::EventCheck(1)]);

    vgic.set_visible(1, 1, true).unwrap();
    vgic.set_active(1, 1, true).unwrap();
    assert!(!vgic.retire(1, 1).unwrap());
    assert!(vgic.inflight_lines(1).unwrap().is_empty());
    assert_eq!(vgic.pending_status(1, 1).unwrap(), PendingStatus::ENABLED);
}

/// SGIs sent to the sender only never reach other VCPUs
#[test]
fn test_sgi_self_only_through_mmio() {
    let (vgic, _, _) = test_vgic(3, 0);
    mmio_write(&vgic, 2, gicd::SGIR, W, (2 << 24) | 3);
    assert!(vgic.inflight_lines(0).unwrap().is_empty());
    assert!(vgic.inflight_lines(1).unwrap().is_empty());
    assert_eq!(vgic.inflight_lines(2).unwrap(), vec![3]);
}

// ========================================================================
// Concurrency
// ========================================================================

/// Injections and SGIs racing from several VCPUs keep every list
/// ordered and every line on at most one list
#[test]
fn test_concurrent_injection() {
    let (vgic, _, _) = test_vgic(4, 64);
    let vgic = Arc::new(vgic);
    for line in 32..96u32 {
        mmio_write(&vgic, 0, gicd::IPRIORITYR + line, B, (line * 7) & 0xf8);
    }

    let handles: Vec<_> = (0..4)
        .map(|id| {
            let vgic = Arc::clone(&vgic);
            thread::spawn(move || {
                for round in 0..50 {
                    let line = 32 + ((id * 16 + round) % 64) as u32;
                    vgic.inject(round % 4, line).unwrap();
                    vgic.dispatch_sgi(id, (1 << 24) | (round as u32 % 16)).unwrap();
                    if round % 5 == 0 {
                        vgic.disable_lines(id, 1 << (round % 32), 1 + round % 2).unwrap();
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut seen = std::collections::HashSet::new();
    for id in 0..4 {
        let v = vgic.vcpu(id).unwrap();
        let entries: Vec<_> = v.with_list(|list| list.iter().copied().collect());
        assert!(entries.windows(2).all(|pair| pair[0].priority <= pair[1].priority));
        for entry in entries {
            if entry.line >= 32 {
                assert!(seen.insert(entry.line), "line {} inflight twice", entry.line);
            }
            assert_eq!(vgic.pending_irq(v, entry.line).unwrap().inflight_on(), Some(id));
        }
    }
}
