//! soundpath - real-time audio DSP core for media playback.
//!
//! Two pass-through processors sit on the PCM decode/render path:
//!
//! - [`ParametricEqualizer`]: a 10-band peaking EQ with per-sample
//!   coefficient interpolation (no clicks on gain changes), a global
//!   pre-cut stage guarding against multi-band clipping, and a lock-free
//!   per-sample loop driven from a once-per-buffer control snapshot.
//! - [`SpectrumAnalyzer`]: O(1) sample ingestion into a ring buffer with a
//!   rate-limited Hann-window FFT pass dispatching raw bins and a shaped
//!   magnitude curve to visualization listeners.
//!
//! Nothing in this crate blocks, allocates unboundedly, or propagates
//! errors across the `process` boundary - internal faults cost at most one
//! buffer of unprocessed audio.

pub mod audio;
pub mod log;

// Re-export the public surface at the crate root for ergonomic imports.
pub use audio::{
    AudioFormat, AudioProcessor, AudioProcessorError, BiquadFilter, CircularSampleBuffer,
    Encoding, EqualizerConfig, EqualizerHandle, ParametricEqualizer, PcmConverter,
    SpectrumAnalyzer, SpectrumConfig, SpectrumHandle, SpectrumListener,
};
