// Fixed-capacity ring buffer over 16-bit samples
//
// Capacity is rounded up to the next power of two so index arithmetic is a
// mask, not a modulo. Writes always succeed, dropping the oldest sample once
// full; reads validate their range and return silence on violation instead
// of panicking - nothing in here may take down the audio thread.

use colored::Colorize;
use tracing::warn;

/// Fixed-capacity ring of i16 samples with a byte-oriented read API.
#[derive(Debug)]
pub struct CircularSampleBuffer {
    samples: Vec<i16>,
    mask: usize,
    write_index: usize,
    filled: usize,
}

impl CircularSampleBuffer {
    /// Create a buffer holding at least `min_samples`; actual capacity is
    /// the next power of two.
    pub fn new(min_samples: usize) -> Self {
        let capacity = min_samples.max(1).next_power_of_two();
        Self {
            samples: vec![0; capacity],
            mask: capacity - 1,
            write_index: 0,
            filled: 0,
        }
    }

    /// Push one sample, overwriting the oldest once full. O(1), always
    /// succeeds.
    #[inline]
    pub fn put(&mut self, sample: i16) {
        self.samples[self.write_index] = sample;
        self.write_index = (self.write_index + 1) & self.mask;
        if self.filled < self.samples.len() {
            self.filled += 1;
        }
    }

    /// Read the sample at `byte_offset` into the valid region, oldest first.
    ///
    /// Out-of-range or sample-misaligned offsets return 0 with a warning -
    /// never a panic.
    pub fn get(&self, byte_offset: usize) -> i16 {
        if byte_offset % 2 != 0 || byte_offset >= self.available_data_size() {
            warn!(
                "{}: read at byte offset {} outside available {} bytes - returning 0",
                "SAMPLE_RING".on_yellow().black(),
                byte_offset,
                self.available_data_size()
            );
            return 0;
        }
        let oldest = (self.write_index + self.samples.len() - self.filled) & self.mask;
        self.samples[(oldest + byte_offset / 2) & self.mask]
    }

    /// Current fill in bytes; never exceeds capacity.
    pub fn available_data_size(&self) -> usize {
        self.filled * 2
    }

    /// Capacity in samples (power of two).
    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    /// Copy the most recent `out.len()` samples, newest window last.
    ///
    /// Returns false without touching `out` when fewer samples are buffered -
    /// the caller treats that as "skip this analysis pass", not an error.
    pub fn copy_latest(&self, out: &mut [i16]) -> bool {
        let wanted = out.len();
        if wanted > self.filled {
            return false;
        }
        let start = (self.write_index + self.samples.len() - wanted) & self.mask;
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.samples[(start + i) & self.mask];
        }
        true
    }

    /// Drop all buffered samples, keeping the allocation.
    pub fn clear(&mut self) {
        self.write_index = 0;
        self.filled = 0;
    }
}
