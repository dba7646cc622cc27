//! USB Device Port register map.

use tock_registers::registers::{ReadOnly, ReadWrite, WriteOnly};
use tock_registers::{register_bitfields, register_structs};

/// Hardware endpoints on the SAM7S UDP. Endpoints 0 and 3 are
/// single-banked, 1 and 2 are dual-banked.
pub const N_ENDPOINTS: usize = 4;

register_structs! {
    pub UdpRegisters {
        (0x00 => pub frm_num: ReadOnly<u32>),
        (0x04 => pub glb_stat: ReadWrite<u32, GLB_STAT::Register>),
        (0x08 => pub faddr: ReadWrite<u32, FADDR::Register>),
        (0x0c => _reserved0),
        (0x10 => pub ier: WriteOnly<u32, INT::Register>),
        (0x14 => pub idr: WriteOnly<u32, INT::Register>),
        (0x18 => pub imr: ReadOnly<u32, INT::Register>),
        (0x1c => pub isr: ReadOnly<u32, INT::Register>),
        (0x20 => pub icr: WriteOnly<u32, INT::Register>),
        (0x24 => _reserved1),
        /// Endpoint reset: pulse a bit to reset that endpoint's FIFO
        /// and data toggle.
        (0x28 => pub rst_ep: ReadWrite<u32>),
        (0x2c => _reserved2),
        (0x30 => pub csr: [ReadWrite<u32, CSR::Register>; N_ENDPOINTS]),
        (0x40 => _reserved3),
        /// Endpoint FIFOs, one byte per access.
        (0x50 => pub fdr: [ReadWrite<u32>; N_ENDPOINTS]),
        (0x60 => _reserved4),
        (0x74 => pub txvc: ReadWrite<u32, TXVC::Register>),
        (0x78 => @END),
    }
}

register_bitfields![u32,
    pub GLB_STAT [
        /// Function address enabled (device is in the Addressed state).
        FADDEN OFFSET(0) NUMBITS(1) [],
        /// Configured state.
        CONFG OFFSET(1) NUMBITS(1) [],
        ESR OFFSET(2) NUMBITS(1) [],
        RSMINPR OFFSET(3) NUMBITS(1) [],
        RMWUPE OFFSET(4) NUMBITS(1) []
    ],
    pub FADDR [
        FADD OFFSET(0) NUMBITS(7) [],
        /// Function enable; must stay set for the UDP to answer at all.
        FEN OFFSET(8) NUMBITS(1) []
    ],
    pub INT [
        EP0 OFFSET(0) NUMBITS(1) [],
        EP1 OFFSET(1) NUMBITS(1) [],
        EP2 OFFSET(2) NUMBITS(1) [],
        EP3 OFFSET(3) NUMBITS(1) [],
        /// Suspend detected on the bus.
        RXSUSP OFFSET(8) NUMBITS(1) [],
        /// Resume detected.
        RXRSM OFFSET(9) NUMBITS(1) [],
        EXTRSM OFFSET(10) NUMBITS(1) [],
        SOFINT OFFSET(11) NUMBITS(1) [],
        /// End of bus reset (always enabled in hardware).
        ENDBUSRES OFFSET(12) NUMBITS(1) [],
        WAKEUP OFFSET(13) NUMBITS(1) []
    ],
    pub CSR [
        /// IN packet acknowledged by the host.
        TXCOMP OFFSET(0) NUMBITS(1) [],
        /// OUT data waiting in bank 0.
        RX_DATA_BK0 OFFSET(1) NUMBITS(1) [],
        /// SETUP packet waiting.
        RXSETUP OFFSET(2) NUMBITS(1) [],
        /// STALL handshake was sent (shares the bit with ISOERROR).
        STALLSENT OFFSET(3) NUMBITS(1) [],
        /// FIFO content is ready to transmit.
        TXPKTRDY OFFSET(4) NUMBITS(1) [],
        FORCESTALL OFFSET(5) NUMBITS(1) [],
        /// OUT data waiting in bank 1 (dual-bank endpoints only).
        RX_DATA_BK1 OFFSET(6) NUMBITS(1) [],
        /// Control-transfer data phase direction (set for IN).
        DIR OFFSET(7) NUMBITS(1) [],
        EPTYPE OFFSET(8) NUMBITS(3) [
            Control = 0,
            IsoOut = 1,
            BulkOut = 2,
            IntOut = 3,
            IsoIn = 5,
            BulkIn = 6,
            IntIn = 7
        ],
        DTGLE OFFSET(11) NUMBITS(1) [],
        /// Endpoint enable.
        EPEDS OFFSET(15) NUMBITS(1) [],
        /// Bytes available in the receive FIFO.
        RXBYTECNT OFFSET(16) NUMBITS(11) []
    ],
    pub TXVC [
        TXVDIS OFFSET(8) NUMBITS(1) [],
        PUON OFFSET(9) NUMBITS(1) []
    ],
];

// MMIO register block: all access is through a `&'static` reference
// guarded by a critical section, never concurrently from more than one
// execution context at a time, so `Sync` is sound even though the
// generated fields use `UnsafeCell`.
unsafe impl Sync for UdpRegisters {}
