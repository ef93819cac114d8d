//! Ring of previously captured frames
//!
//! Each slot is a [`CaptureBuffer`] holding one frame: the trace-back lead followed by a full
//! trace. `recall(0)` is the most recent frame, `recall(depth - 1)` the oldest one kept.

use crate::{
    buffer::{CaptureBuffer, RingCursor},
    complex::Sample,
};

/// Frames kept by default
pub const HISTORY_DEPTH: usize = 50;

#[derive(Clone, Debug)]
pub struct HistoryMemory {
    slots: Vec<CaptureBuffer>,
    active: RingCursor,
    stored: usize,
    frame_len: usize,
}

impl HistoryMemory {
    pub fn new(depth: usize, frame_len: usize) -> Self {
        Self {
            slots: vec![CaptureBuffer::new(frame_len.max(1)); depth],
            active: RingCursor::new(depth),
            stored: 0,
            frame_len,
        }
    }

    /// Drop every frame and resize the slots
    pub fn resize(&mut self, frame_len: usize) {
        *self = Self::new(self.depth(), frame_len);
    }

    pub fn depth(&self) -> usize {
        self.active.len()
    }

    /// Frames currently held
    pub fn len(&self) -> usize {
        self.stored
    }

    pub fn is_empty(&self) -> bool {
        self.stored == 0
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Copy one frame into the next slot and make it the active one
    pub fn store(&mut self, frame: &[Sample]) {
        let next = if self.stored == 0 {
            self.active.get()
        } else {
            self.active.next()
        };
        let slot = &mut self.slots[next];
        slot.reset();
        slot.write(&frame[frame.len().saturating_sub(self.frame_len)..]);
        if self.stored > 0 {
            self.active.advance(1);
        }
        self.stored = (self.stored + 1).min(self.depth());
    }

    /// Store the frame ending `offset` samples before the live cursor
    ///
    /// Returns false if the live buffer no longer holds that window.
    pub fn store_from(&mut self, live: &CaptureBuffer, offset: usize) -> bool {
        match live.read_back(offset, self.frame_len) {
            Some(frame) => {
                self.store(frame);
                true
            }
            None => false,
        }
    }

    /// Frame `offset` positions behind the most recent one
    pub fn recall(&self, offset: usize) -> Option<&[Sample]> {
        if offset >= self.stored {
            return None;
        }
        let slot = &self.slots[self.active.behind(offset)];
        slot.read_back(0, slot.fill())
    }
}
