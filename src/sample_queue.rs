//! The thread-safe buffer that carries [`Sample`]s from the acquisition
//! thread to the main loop.

use crate::sample::Sample;

use log::warn;
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

/// A FIFO of [`Sample`]s shared between one producer and one consumer.
///
/// Cloning a [`SampleQueue`] gives another handle to the same buffer, so the
/// producer callback and the main loop each own one.
///
/// The queue is unbounded unless built with [`SampleQueue::bounded`], in
/// which case a full queue drops its oldest sample to make room. Either way
/// [`SampleQueue::enqueue`] never waits on the consumer.
#[derive(Debug, Clone, Default)]
pub struct SampleQueue {
    samples: Arc<Mutex<VecDeque<Sample>>>,
    capacity: Option<usize>,
    enqueued: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
}

impl SampleQueue {
    /// Instantiate an empty, unbounded queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Instantiate an empty queue that holds at most `capacity` samples.
    pub fn bounded(capacity: usize) -> Self {
        Self {
            samples: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: Some(capacity.max(1)),
            ..Self::default()
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Sample>> {
        // A panic mid-push can't leave the deque half-written
        self.samples.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Push a sample onto the back of the queue. Called from the
    /// acquisition thread.
    pub fn enqueue(&self, sample: Sample) {
        let mut samples = self.lock();
        if let Some(capacity) = self.capacity {
            if samples.len() >= capacity {
                samples.pop_front();
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped.is_power_of_two() {
                    warn!("Sample queue is full, {} samples dropped so far", dropped);
                }
            }
        }
        samples.push_back(sample);
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// Take every sample currently queued, oldest first. Returns an empty
    /// `Vec` when nothing is waiting.
    pub fn drain_available(&self) -> Vec<Sample> {
        self.lock().drain(..).collect()
    }

    /// Number of samples waiting to be drained.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing is waiting to be drained.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Total samples ever enqueued, including ones later dropped.
    pub fn enqueued_count(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    /// Samples discarded because a bounded queue was full.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
