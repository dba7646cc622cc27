//! Lock-free publication of multi-word snapshots.
//!
//! The AVR link decodes frames in interrupt context but its getters run
//! from task context; a plain struct copy there could tear across the
//! 16-bit fields. [`SeqCell`] is the classic single-writer sequence lock:
//! the writer bumps a counter to an odd value, stores, and bumps it even
//! again; readers retry until they observe the same even count on both
//! sides of their copy.

use core::cell::UnsafeCell;

use portable_atomic::{AtomicU32, Ordering};

/// A cell holding a `Copy` snapshot with tear-free reads from any context.
///
/// There must be exactly one writer (here: the interrupt handler that owns
/// the driver); readers are unrestricted and never block the writer.
pub struct SeqCell<T> {
    seq: AtomicU32,
    value: UnsafeCell<T>,
}

// Readers only ever copy the value out under the sequence protocol and the
// single writer is on the same core (or holds the cell exclusively in
// tests), so sharing references is sound for Copy + Send payloads.
unsafe impl<T: Copy + Send> Sync for SeqCell<T> {}

impl<T: Copy> SeqCell<T> {
    pub const fn new(value: T) -> Self {
        Self {
            seq: AtomicU32::new(0),
            value: UnsafeCell::new(value),
        }
    }

    /// Publish a new snapshot. Single-writer: must only be called from
    /// the one context that owns this cell.
    pub fn write(&self, value: T) {
        let seq = self.seq.load(Ordering::Relaxed);
        self.seq.store(seq.wrapping_add(1), Ordering::Relaxed);
        // Odd sequence number is now visible before the data store.
        portable_atomic::fence(Ordering::Release);
        // SAFETY: the sequence number is odd, so every concurrent reader
        // will discard whatever it copies while this store is in flight.
        unsafe { core::ptr::write_volatile(self.value.get(), value) };
        self.seq.store(seq.wrapping_add(2), Ordering::Release);
    }

    /// Copy the latest consistent snapshot, retrying over in-flight writes.
    pub fn read(&self) -> T {
        loop {
            let before = self.seq.load(Ordering::Acquire);
            if before & 1 != 0 {
                continue;
            }
            // SAFETY: torn data is possible here but is thrown away below
            // unless the sequence number proves the copy was quiescent.
            let value = unsafe { core::ptr::read_volatile(self.value.get()) };
            portable_atomic::fence(Ordering::Acquire);
            if self.seq.load(Ordering::Relaxed) == before {
                return value;
            }
        }
    }
}
