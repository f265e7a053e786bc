use std::sync::atomic::{fence, AtomicU32, Ordering};

/// Fixed set of f32 values shared by one writer and one reader.
///
/// A sequence lock over atomics: the writer never blocks, and the reader
/// either gets a complete snapshot or `None` when it raced a write. The
/// reader is expected to keep its previous copy on `None`.
pub(crate) struct SnapshotCell<const N: usize> {
    seq: AtomicU32,
    slots: [AtomicU32; N],
}

impl<const N: usize> SnapshotCell<N> {
    pub(crate) fn new(values: [f32; N]) -> Self {
        Self {
            seq: AtomicU32::new(0),
            slots: std::array::from_fn(|i| AtomicU32::new(values[i].to_bits())),
        }
    }

    /// Must only be called from a single thread at a time.
    pub(crate) fn publish(&self, values: [f32; N]) {
        let seq = self.seq.load(Ordering::Relaxed);
        self.seq.store(seq.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);
        for (slot, value) in self.slots.iter().zip(values) {
            slot.store(value.to_bits(), Ordering::Relaxed);
        }
        self.seq.store(seq.wrapping_add(2), Ordering::Release);
    }

    /// Current generation. Changes every time a write completes.
    pub(crate) fn generation(&self) -> u32 {
        self.seq.load(Ordering::Acquire)
    }

    pub(crate) fn read(&self) -> Option<[f32; N]> {
        let before = self.seq.load(Ordering::Acquire);
        if before & 1 == 1 {
            return None;
        }
        let values = std::array::from_fn(|i| f32::from_bits(self.slots[i].load(Ordering::Relaxed)));
        fence(Ordering::Acquire);
        let after = self.seq.load(Ordering::Relaxed);
        (before == after).then_some(values)
    }
}
