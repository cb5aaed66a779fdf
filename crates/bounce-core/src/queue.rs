//! Pre-resample staging queue
//!
//! Each input track stages samples here before they are handed to the
//! resampler in slices of up to [`PROCESS_LEN`]. The live window is kept
//! contiguous: refilling first compacts it to the front, then appends fresh
//! samples at the tail, reversing them in place for backward playback.

use crate::source::SourceResult;
use crate::types::Sample;

/// Samples handed to the resampler in one slice
pub const PROCESS_LEN: usize = 1024;

/// Capacity of the staging queue (4x slice headroom)
pub const QUEUE_MAX_LEN: usize = 4 * PROCESS_LEN;

/// Fixed-capacity staging buffer for one input track
pub struct SampleQueue {
    buf: Vec<Sample>,
    start: usize,
    len: usize,
}

impl SampleQueue {
    /// Create an empty queue at full capacity
    pub fn new() -> Self {
        Self {
            buf: vec![0.0; QUEUE_MAX_LEN],
            start: 0,
            len: 0,
        }
    }

    /// Number of staged samples
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the queue holds no samples
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the queue holds less than one full slice
    pub fn needs_refill(&self) -> bool {
        self.len < PROCESS_LEN
    }

    /// Remaining capacity
    pub fn free(&self) -> usize {
        QUEUE_MAX_LEN - self.len
    }

    /// The staged samples, oldest first in play order
    pub fn as_slice(&self) -> &[Sample] {
        &self.buf[self.start..self.start + self.len]
    }

    /// Drop all staged samples
    pub fn clear(&mut self) {
        self.start = 0;
        self.len = 0;
    }

    /// Discard `n` samples from the front
    pub fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.len, "consuming more than is staged");
        self.start += n;
        self.len -= n;
    }

    /// Compact and append up to `n_wanted` samples at the tail
    ///
    /// `fill` writes play-interval samples in track order into the slice it
    /// is given; for backward playback the appended segment is then reversed
    /// in place so the queue stays in play order throughout.
    pub fn refill<F>(&mut self, n_wanted: usize, backwards: bool, fill: F) -> SourceResult<usize>
    where
        F: FnOnce(&mut [Sample]) -> SourceResult<()>,
    {
        if self.start > 0 {
            self.buf.copy_within(self.start..self.start + self.len, 0);
            self.start = 0;
        }
        let n = n_wanted.min(self.free());
        if n == 0 {
            return Ok(0);
        }
        fill(&mut self.buf[self.len..self.len + n])?;
        if backwards {
            self.buf[self.len..self.len + n].reverse();
        }
        self.len += n;
        Ok(n)
    }
}

impl Default for SampleQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill_ramp(from: usize) -> impl FnOnce(&mut [Sample]) -> SourceResult<()> {
        move |out: &mut [Sample]| {
            for (i, v) in out.iter_mut().enumerate() {
                *v = (from + i) as Sample;
            }
            Ok(())
        }
    }

    #[test]
    fn test_refill_and_consume() {
        let mut queue = SampleQueue::new();
        let got = queue.refill(4, false, fill_ramp(0)).unwrap();
        assert_eq!(got, 4);
        assert_eq!(queue.as_slice(), &[0.0, 1.0, 2.0, 3.0]);

        queue.consume(2);
        assert_eq!(queue.as_slice(), &[2.0, 3.0]);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_compaction_preserves_window() {
        let mut queue = SampleQueue::new();
        queue.refill(4, false, fill_ramp(0)).unwrap();
        queue.consume(3);
        // the pending sample moves to the front, new data lands behind it
        queue.refill(2, false, fill_ramp(10)).unwrap();
        assert_eq!(queue.as_slice(), &[3.0, 10.0, 11.0]);
    }

    #[test]
    fn test_backward_refill_reverses_tail_only() {
        let mut queue = SampleQueue::new();
        queue.refill(2, true, fill_ramp(0)).unwrap();
        queue.refill(3, true, fill_ramp(10)).unwrap();
        // each appended segment is reversed; earlier samples keep their order
        assert_eq!(queue.as_slice(), &[1.0, 0.0, 12.0, 11.0, 10.0]);
    }

    #[test]
    fn test_refill_respects_capacity() {
        let mut queue = SampleQueue::new();
        let got = queue.refill(QUEUE_MAX_LEN + 100, false, fill_ramp(0)).unwrap();
        assert_eq!(got, QUEUE_MAX_LEN);
        assert_eq!(queue.free(), 0);
        assert_eq!(queue.refill(10, false, fill_ramp(0)).unwrap(), 0);
    }

    #[test]
    fn test_slice_headroom() {
        assert!(PROCESS_LEN < QUEUE_MAX_LEN);
        assert!(QUEUE_MAX_LEN >= 4 * PROCESS_LEN);
    }
}
