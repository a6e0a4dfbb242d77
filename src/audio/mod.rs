// Audio module - the DSP core of the playback pipeline
//
// This module provides the real-time signal path broken down into logical
// components:
// - types: core data types, configs and the error taxonomy
// - processor: the shared AudioProcessor lifecycle contract + PCM helpers
// - buffer: fixed-capacity ring buffer feeding the analyzer
// - effects: the processors themselves (parametric EQ, spectrum analysis)

pub mod buffer;
pub mod effects;
pub mod processor;
pub mod types;

// Re-export commonly used types for easier imports
pub use buffer::CircularSampleBuffer;
pub use effects::{
    BiquadFilter, EqualizerHandle, ParametricEqualizer, SpectrumAnalyzer, SpectrumHandle,
    SpectrumListener,
};
pub use processor::{AudioProcessor, PcmConverter};
pub use types::{
    is_valid_fft_size, AudioFormat, AudioProcessorError, Encoding, EqualizerConfig,
    SpectrumConfig, MAX_FFT_SIZE, MIN_FFT_SIZE,
};
