//! Advanced Interrupt Controller register map.

use tock_registers::registers::{ReadOnly, ReadWrite, WriteOnly};
use tock_registers::{register_bitfields, register_structs};

register_structs! {
    pub AicRegisters {
        /// Source mode: priority and trigger type, one per vector.
        (0x000 => pub smr: [ReadWrite<u32, SMR::Register>; 32]),
        /// Source vector: handler address, one per vector.
        (0x080 => pub svr: [ReadWrite<u32>; 32]),
        /// Interrupt vector (read by the IRQ entry veneer; the read
        /// also starts priority handling in the AIC).
        (0x100 => pub ivr: ReadOnly<u32>),
        (0x104 => pub fvr: ReadOnly<u32>),
        /// Number of the interrupt currently being serviced.
        (0x108 => pub isr: ReadOnly<u32>),
        (0x10c => pub ipr: ReadOnly<u32>),
        (0x110 => pub imr: ReadOnly<u32>),
        (0x114 => pub cisr: ReadOnly<u32>),
        (0x118 => _reserved0),
        (0x120 => pub iecr: WriteOnly<u32>),
        (0x124 => pub idcr: WriteOnly<u32>),
        (0x128 => pub iccr: WriteOnly<u32>),
        (0x12c => pub iscr: WriteOnly<u32>),
        /// End of interrupt: any write signals handler completion.
        (0x130 => pub eoicr: WriteOnly<u32>),
        /// Spurious interrupt vector.
        (0x134 => pub spu: ReadWrite<u32>),
        (0x138 => pub dcr: ReadWrite<u32>),
        (0x13c => @END),
    }
}

// MMIO register block: all access is through a `&'static` reference
// guarded by a critical section, never concurrently from more than one
// execution context at a time, so `Sync` is sound even though the
// generated fields use `UnsafeCell`.
unsafe impl Sync for AicRegisters {}

register_bitfields![u32,
    pub SMR [
        PRIOR OFFSET(0) NUMBITS(3) [],
        SRCTYPE OFFSET(5) NUMBITS(2) [
            LevelSensitive = 0,
            EdgeTriggered = 1,
            HighLevel = 2,
            PositiveEdge = 3
        ]
    ],
];
