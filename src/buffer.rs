//! Fixed capacity sample ring with contiguous look-back
//!
//! Every sample is written twice, at its ring slot and one capacity further, so that any
//! window of up to `capacity` samples ending at the write cursor is one contiguous slice.

use crate::complex::Sample;

/// Index into a ring of `len` slots, always in `0..len`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RingCursor {
    pos: usize,
    len: usize,
}

impl RingCursor {
    pub fn new(len: usize) -> Self {
        assert!(len > 0, "ring must have at least one slot");
        Self { pos: 0, len }
    }

    pub fn get(self) -> usize {
        self.pos
    }

    pub fn len(self) -> usize {
        self.len
    }

    pub fn advance(&mut self, n: usize) {
        self.pos = (self.pos + n % self.len) % self.len;
    }

    /// Slot `n` positions behind this one
    pub fn behind(self, n: usize) -> usize {
        (self.pos + self.len - n % self.len) % self.len
    }

    /// Slot just after this one
    pub fn next(self) -> usize {
        (self.pos + 1) % self.len
    }
}

#[derive(Clone, Debug)]
pub struct CaptureBuffer {
    data: Vec<Sample>,
    head: RingCursor,
    written: u64,
}

impl CaptureBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![Sample::default(); 2 * capacity],
            head: RingCursor::new(capacity),
            written: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.head.len()
    }

    /// Absolute stream position just past the last written sample
    pub fn cursor(&self) -> u64 {
        self.written
    }

    /// Number of samples that can be read back
    pub fn fill(&self) -> usize {
        self.written.min(self.capacity() as u64) as usize
    }

    pub fn reset(&mut self) {
        self.head = RingCursor::new(self.capacity());
        self.written = 0;
    }

    /// Append a run of samples, overwriting the oldest ones past capacity
    pub fn write(&mut self, samples: &[Sample]) {
        let cap = self.capacity();
        let mut rest = samples;
        if rest.len() > cap {
            // Only the tail survives, but the cursor still moves by the full run
            let skip = rest.len() - cap;
            self.head.advance(skip);
            rest = &rest[skip..];
        }
        while !rest.is_empty() {
            let h = self.head.get();
            let n = rest.len().min(cap - h);
            self.data[h..h + n].copy_from_slice(&rest[..n]);
            self.data[h + cap..h + cap + n].copy_from_slice(&rest[..n]);
            self.head.advance(n);
            rest = &rest[n..];
        }
        self.written += samples.len() as u64;
    }

    /// `count` samples ending `offset` samples before the cursor
    ///
    /// Returns `None` if the window reaches past the oldest retained sample.
    pub fn read_back(&self, offset: usize, count: usize) -> Option<&[Sample]> {
        if offset.checked_add(count)? > self.fill() {
            return None;
        }
        let end = self.head.get() + self.capacity() - offset;
        Some(&self.data[end - count..end])
    }

    /// Samples between two absolute stream positions
    pub fn window(&self, start: u64, end: u64) -> Option<&[Sample]> {
        if start > end || end > self.written {
            return None;
        }
        let offset = usize::try_from(self.written - end).ok()?;
        let count = usize::try_from(end - start).ok()?;
        self.read_back(offset, count)
    }
}
