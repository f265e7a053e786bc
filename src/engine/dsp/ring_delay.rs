use crate::engine::error::LimiterError;

/// Stereo delay line with one shared write cursor.
///
/// Storage is allocated once in [`RingDelay::with_capacity`]; nothing on the
/// read/write path allocates.
pub struct RingDelay {
    left: Box<[f32]>,
    right: Box<[f32]>,
    write_pos: usize,
}

impl RingDelay {
    pub fn with_capacity(capacity: usize) -> Result<Self, LimiterError> {
        Ok(Self {
            left: allocate(capacity)?,
            right: allocate(capacity)?,
            write_pos: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.left.len()
    }

    /// Stores a frame at the cursor and advances it.
    #[inline]
    pub fn write(&mut self, left: f32, right: f32) {
        self.left[self.write_pos] = left;
        self.right[self.write_pos] = right;
        self.write_pos = (self.write_pos + 1) % self.left.len();
    }

    /// Returns the frame written `delay` writes ago; `0` is the latest one.
    #[inline]
    pub fn read(&self, delay: usize) -> (f32, f32) {
        let capacity = self.left.len();
        let delay = delay.min(capacity - 1);
        let read_pos = (self.write_pos + capacity - 1 - delay) % capacity;
        (self.left[read_pos], self.right[read_pos])
    }

    pub fn clear(&mut self) {
        self.left.fill(0.0);
        self.right.fill(0.0);
        self.write_pos = 0;
    }
}

fn allocate(len: usize) -> Result<Box<[f32]>, LimiterError> {
    if len == 0 {
        return Err(LimiterError::Allocation { what: "lookahead ring", len });
    }
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| LimiterError::Allocation { what: "lookahead ring", len })?;
    buf.resize(len, 0.0);
    Ok(buf.into_boxed_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn impulse_comes_back_after_exact_delay() {
        let mut ring = RingDelay::with_capacity(960).unwrap();
        let delay = 72;

        for n in 0..3000usize {
            let x = if n == 1234 { 0.75 } else { 0.0 };
            ring.write(x, -x);
            let (l, r) = ring.read(delay);
            if n == 1234 + delay {
                assert_eq!((l, r), (0.75, -0.75));
            } else {
                assert_eq!((l, r), (0.0, 0.0), "leak at {}", n);
            }
        }
    }

    #[test]
    fn zero_delay_reads_back_the_latest_write() {
        let mut ring = RingDelay::with_capacity(4).unwrap();
        ring.write(1.0, 2.0);
        assert_eq!(ring.read(0), (1.0, 2.0));
    }

    #[test]
    fn delay_is_clamped_to_capacity() {
        let mut ring = RingDelay::with_capacity(4).unwrap();
        for i in 1..=4 {
            ring.write(i as f32, 0.0);
        }
        // oldest frame still held is the first write
        assert_eq!(ring.read(3).0, 1.0);
        assert_eq!(ring.read(100).0, 1.0);
    }

    #[test]
    fn clear_silences_contents() {
        let mut ring = RingDelay::with_capacity(8).unwrap();
        for _ in 0..8 {
            ring.write(1.0, 1.0);
        }
        ring.clear();
        for d in 0..8 {
            assert_eq!(ring.read(d), (0.0, 0.0));
        }
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(RingDelay::with_capacity(0).is_err());
    }
}
