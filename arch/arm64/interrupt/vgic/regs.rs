//! GICv2 distributor register layout
//!
//! Byte offsets into the 4 KiB distributor frame and the field layout of
//! the registers whose contents the emulation decodes or synthesizes.

use tock_registers::register_bitfields;

/// Size of the distributor register frame
pub const DIST_FRAME_SIZE: u64 = 0x1000;

/// Distributor register offsets
///
/// `*_END` constants name the last word of a register group.
pub mod gicd {
    /// GICD_CTLR - Distributor Control Register
    pub const CTLR: u32 = 0x000;
    /// GICD_TYPER - Interrupt Controller Type Register
    pub const TYPER: u32 = 0x004;
    /// GICD_IIDR - Distributor Implementer Identification Register
    pub const IIDR: u32 = 0x008;
    /// Reserved words after IIDR
    pub const RESERVED_0: u32 = 0x00c;
    pub const RESERVED_0_END: u32 = 0x01c;
    /// Implementation defined words
    pub const IMPDEF_0: u32 = 0x020;
    pub const IMPDEF_0_END: u32 = 0x03c;
    /// Reserved words before IGROUPR
    pub const RESERVED_1: u32 = 0x040;
    pub const RESERVED_1_END: u32 = 0x07c;
    /// GICD_IGROUPR - Interrupt Group Registers
    pub const IGROUPR: u32 = 0x080;
    pub const IGROUPR_END: u32 = 0x0fc;
    /// GICD_ISENABLER - Interrupt Set-Enable Registers
    pub const ISENABLER: u32 = 0x100;
    pub const ISENABLER_END: u32 = 0x17c;
    /// GICD_ICENABLER - Interrupt Clear-Enable Registers
    pub const ICENABLER: u32 = 0x180;
    pub const ICENABLER_END: u32 = 0x1fc;
    /// GICD_ISPENDR - Interrupt Set-Pending Registers
    pub const ISPENDR: u32 = 0x200;
    pub const ISPENDR_END: u32 = 0x27c;
    /// GICD_ICPENDR - Interrupt Clear-Pending Registers
    pub const ICPENDR: u32 = 0x280;
    pub const ICPENDR_END: u32 = 0x2fc;
    /// GICD_ISACTIVER - Interrupt Set-Active Registers
    pub const ISACTIVER: u32 = 0x300;
    pub const ISACTIVER_END: u32 = 0x37c;
    /// GICD_ICACTIVER - Interrupt Clear-Active Registers
    pub const ICACTIVER: u32 = 0x380;
    pub const ICACTIVER_END: u32 = 0x3fc;
    /// GICD_IPRIORITYR - Interrupt Priority Registers
    pub const IPRIORITYR: u32 = 0x400;
    pub const IPRIORITYR_END: u32 = 0x7f8;
    /// Reserved word after the priority registers
    pub const RESERVED_2: u32 = 0x7fc;
    /// GICD_ITARGETSR - Interrupt Processor Targets Registers
    pub const ITARGETSR: u32 = 0x800;
    pub const ITARGETSR_END: u32 = 0xbf8;
    /// First writable target word (lines 8 and up)
    pub const ITARGETSR_WRITABLE: u32 = 0x808;
    /// Reserved word after the target registers
    pub const RESERVED_3: u32 = 0xbfc;
    /// GICD_ICFGR - Interrupt Configuration Registers
    pub const ICFGR: u32 = 0xc00;
    pub const ICFGR_END: u32 = 0xcfc;
    /// First writable configuration word (SPIs)
    pub const ICFGR_WRITABLE: u32 = 0xc08;
    /// GICD_NSACR - Non-secure Access Control Registers
    pub const NSACR: u32 = 0xe00;
    pub const NSACR_END: u32 = 0xefc;
    /// GICD_SGIR - Software Generated Interrupt Register
    pub const SGIR: u32 = 0xf00;
    /// Reserved words after SGIR
    pub const RESERVED_4: u32 = 0xf04;
    pub const RESERVED_4_END: u32 = 0xf0c;
    /// GICD_CPENDSGIR - SGI Clear-Pending Registers
    pub const CPENDSGIR: u32 = 0xf10;
    pub const CPENDSGIR_END: u32 = 0xf1c;
    /// GICD_SPENDSGIR - SGI Set-Pending Registers
    pub const SPENDSGIR: u32 = 0xf20;
    pub const SPENDSGIR_END: u32 = 0xf2c;
    /// Reserved words before the identification block
    pub const RESERVED_5: u32 = 0xf30;
    pub const RESERVED_5_END: u32 = 0xfcc;
    /// Implementation defined identification words below ICPIDR2
    pub const IMPDEF_1: u32 = 0xfd0;
    pub const IMPDEF_1_END: u32 = 0xfe4;
    /// GICD_ICPIDR2 - Peripheral ID2 Register
    pub const ICPIDR2: u32 = 0xfe8;
    /// Implementation defined identification words above ICPIDR2
    pub const IMPDEF_2: u32 = 0xfec;
    pub const IMPDEF_2_END: u32 = 0xffc;
}

/// GICD_IIDR value: ARM as implementer, revision 0
pub const IIDR_VALUE: u32 = 0x0000_043b;

/// Value returned by reads of the write-only GICD_SGIR
pub const SGIR_READ_VALUE: u32 = 0xdead_beef;

register_bitfields! [
    u32,

    /// Distributor Control Register
    pub GICD_CTLR [
        /// Forward pending interrupts to the CPU interfaces
        EnableGrp0 OFFSET(0) NUMBITS(1) []
    ],

    /// Interrupt Controller Type Register
    pub GICD_TYPER [
        /// Number of 32-line shared blocks
        ITLinesNumber OFFSET(0) NUMBITS(5) [],
        /// Number of implemented CPU interfaces minus one
        CPUNumber OFFSET(5) NUMBITS(3) [],
        /// Security extensions implemented
        SecurityExtn OFFSET(10) NUMBITS(1) [],
        /// Maximum number of lockable SPIs
        LSPI OFFSET(11) NUMBITS(5) []
    ],

    /// Software Generated Interrupt Register
    pub GICD_SGIR [
        /// SGI line to raise
        SGIINTID OFFSET(0) NUMBITS(4) [],
        /// Secure-only group select, ignored without security extensions
        NSATT OFFSET(15) NUMBITS(1) [],
        /// Explicit target mask, one bit per VCPU
        CPUTargetList OFFSET(16) NUMBITS(8) [],
        /// How the target set is chosen
        TargetListFilter OFFSET(24) NUMBITS(2) [
            List = 0,
            AllButSelf = 1,
            SelfOnly = 2
        ]
    ]
];
