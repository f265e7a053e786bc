use std::sync::Arc;
use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    CachingCons, CachingProd, HeapRb,
};

/// Lock-free single-producer single-consumer queues.
///
/// Used for decoded samples (decoder -> output callback), for the analysis
/// tap (output callback -> analysis thread) and for level reports
/// (output callback -> control side). Storage is allocated once on creation.
pub struct RingProducer<T> {
    inner: CachingProd<Arc<HeapRb<T>>>,
}

pub struct RingConsumer<T> {
    inner: CachingCons<Arc<HeapRb<T>>>,
}

/// Producer for interleaved f32 audio.
pub type AudioBufferProducer = RingProducer<f32>;

/// Consumer for interleaved f32 audio.
pub type AudioBufferConsumer = RingConsumer<f32>;

impl<T> RingProducer<T> {
    /// Pushes one item, handing it back if the queue is full.
    pub fn push(&mut self, item: T) -> Result<(), T> {
        self.inner.try_push(item)
    }

    pub fn vacant_len(&self) -> usize {
        self.inner.vacant_len()
    }
}

impl<T: Copy> RingProducer<T> {
    /// Pushes as much of `items` as fits and returns how many went in.
    pub fn push_slice(&mut self, items: &[T]) -> usize {
        self.inner.push_slice(items)
    }
}

impl<T> RingConsumer<T> {
    pub fn pop(&mut self) -> Option<T> {
        self.inner.try_pop()
    }

    /// Drains the queue and keeps only the newest item.
    pub fn pop_latest(&mut self) -> Option<T> {
        let mut latest = None;
        while let Some(item) = self.inner.try_pop() {
            latest = Some(item);
        }
        latest
    }

    pub fn occupied_len(&self) -> usize {
        self.inner.occupied_len()
    }

    /// Drops everything queued and returns how many items were dropped.
    pub fn clear(&mut self) -> usize {
        self.inner.clear()
    }
}

impl<T: Copy> RingConsumer<T> {
    pub fn pop_slice(&mut self, items: &mut [T]) -> usize {
        self.inner.pop_slice(items)
    }
}

/// Creates a queue holding up to `capacity` items.
pub fn create_ring<T>(capacity: usize) -> (RingProducer<T>, RingConsumer<T>) {
    let rb = HeapRb::<T>::new(capacity);
    let (prod, cons) = rb.split();
    (RingProducer { inner: prod }, RingConsumer { inner: cons })
}

/// Creates an audio sample queue with the specified capacity.
pub fn create_audio_buffer(capacity: usize) -> (AudioBufferProducer, AudioBufferConsumer) {
    create_ring(capacity)
}
