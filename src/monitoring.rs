//! In this module, we implement the runtime counters for the sample feed.
//! They are plain relaxed atomics so the feed path can bump them without taking the engine
//! lock, and anyone holding a reference to the engine can read them at any time.

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

#[derive(Debug, Default)]
pub struct FeedStats {
    batches: AtomicU64,
    deferred: AtomicU64,
    samples: AtomicU64,
    triggers: AtomicU64,
    frames: AtomicU64,
}

impl FeedStats {
    pub(crate) fn batch(&self, samples: usize) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.samples.fetch_add(samples as u64, Ordering::Relaxed);
    }

    pub(crate) fn deferred(&self) {
        self.deferred.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn trigger(&self) {
        self.triggers.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn frame(&self) {
        self.frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        FeedSnapshot {
            batches: self.batches.load(Ordering::Relaxed),
            deferred: self.deferred.load(Ordering::Relaxed),
            samples: self.samples.load(Ordering::Relaxed),
            triggers: self.triggers.load(Ordering::Relaxed),
            frames: self.frames.load(Ordering::Relaxed),
        }
    }
}

/// Point in time copy of [`FeedStats`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FeedSnapshot {
    /// Batches processed by the feed path
    pub batches: u64,
    /// Batches declined because a reconfiguration held the lock
    pub deferred: u64,
    /// Samples consumed
    pub samples: u64,
    pub triggers: u64,
    /// Frames published to the renderer
    pub frames: u64,
}

impl fmt::Display for FeedSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} samples in {} batches ({} deferred), {} triggers, {} frames",
            self.samples, self.batches, self.deferred, self.triggers, self.frames
        )
    }
}
