// Shared processor lifecycle contract and PCM conversion utilities
//
// Everything on the render path implements `AudioProcessor`: the host
// configures once, then calls `process` from its audio callback. `process`
// is infallible by contract - internal faults degrade to passthrough, they
// never surface to the pipeline.

use crate::audio::types::{AudioProcessorError, Encoding};

/// Lifecycle contract for pass-through processors on the audio render path.
///
/// `process` runs on whatever thread the host invokes it from - a periodic,
/// near-real-time context where blocking or unbounded work is unacceptable.
/// Control mutations arrive through per-processor handles and take effect no
/// earlier than the next full buffer.
pub trait AudioProcessor {
    /// Validate the stream format. Anything other than 16-bit linear PCM is
    /// rejected with `UnsupportedFormat`; prior configuration is retained.
    fn configure(
        &mut self,
        sample_rate: u32,
        channels: u16,
        encoding: Encoding,
    ) -> Result<(), AudioProcessorError>;

    /// Transform one buffer of interleaved 16-bit little-endian PCM.
    ///
    /// Consumes whole sample groups only; trailing bytes that do not form a
    /// complete frame are dropped, not emitted. Returns the number of bytes
    /// written to `output`. Never panics or errors across this boundary -
    /// internal faults cost at most the current buffer, passed through
    /// unprocessed.
    fn process(&mut self, input: &[u8], output: &mut [u8], sample_rate: u32, channels: u16)
        -> usize;

    /// Seek semantics: drop delay-line / ring-buffer state, keep user
    /// configuration (band gains, FFT size).
    fn flush(&mut self);

    /// Pipeline rebuild: tear down lazily-built state, keep user
    /// configuration. Must not race an in-flight `process` call (enforced by
    /// `&mut self`).
    fn reset(&mut self);

    /// Final teardown: eagerly free large buffers rather than waiting for
    /// the owning object to drop.
    fn release(&mut self);
}

/// PCM format conversion helpers shared by the processors.
pub struct PcmConverter;

impl PcmConverter {
    /// i16 to normalized f32 with asymmetric scaling for better symmetry
    /// around zero.
    #[inline]
    pub fn i16_to_f32(sample: i16) -> f32 {
        if sample >= 0 {
            sample as f32 / 32767.0
        } else {
            sample as f32 / 32768.0
        }
    }

    /// Normalized f32 back to i16 with rounding and saturation.
    #[inline]
    pub fn f32_to_i16(sample: f32) -> i16 {
        let clamped = if sample.is_finite() {
            sample.clamp(-1.0, 1.0)
        } else {
            0.0
        };
        if clamped >= 0.0 {
            (clamped * 32767.0).round() as i16
        } else {
            (clamped * 32768.0).round() as i16
        }
    }

    /// Read one little-endian i16 at `byte_index`. Caller guarantees bounds.
    #[inline]
    pub fn read_i16_le(bytes: &[u8], byte_index: usize) -> i16 {
        i16::from_le_bytes([bytes[byte_index], bytes[byte_index + 1]])
    }

    /// Write one little-endian i16 at `byte_index`. Caller guarantees bounds.
    #[inline]
    pub fn write_i16_le(bytes: &mut [u8], byte_index: usize, sample: i16) {
        let le = sample.to_le_bytes();
        bytes[byte_index] = le[0];
        bytes[byte_index + 1] = le[1];
    }

    /// Number of bytes covering only complete frames, bounded by both the
    /// input length and the output capacity.
    #[inline]
    pub fn usable_bytes(input_len: usize, output_len: usize, channels: u16) -> usize {
        let frame_bytes = channels as usize * 2;
        if frame_bytes == 0 {
            return 0;
        }
        let bounded = input_len.min(output_len);
        (bounded / frame_bytes) * frame_bytes
    }

    /// Whole-frame copy used for the fast path and for fault fallback.
    #[inline]
    pub fn passthrough(input: &[u8], output: &mut [u8], channels: u16) -> usize {
        let usable = Self::usable_bytes(input.len(), output.len(), channels);
        output[..usable].copy_from_slice(&input[..usable]);
        usable
    }
}
