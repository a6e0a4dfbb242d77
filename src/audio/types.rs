// Core data types and configuration for the DSP pipeline
//
// This module contains the fundamental data structures shared by the
// parametric equalizer and the spectrum analyzer: the PCM format
// description, the immutable construction-time configs, and the error
// taxonomy for the configuration boundary.

use serde::{Deserialize, Serialize};

/// Smallest FFT size the spectrum analyzer accepts.
pub const MIN_FFT_SIZE: usize = 64;
/// Largest FFT size the spectrum analyzer accepts.
pub const MAX_FFT_SIZE: usize = 2048;

/// Sample encodings the host pipeline may hand us.
///
/// Only `Pcm16` is processable; everything else is rejected at the
/// `configure` boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Encoding {
    Pcm8,
    Pcm16,
    Pcm24,
    PcmFloat32,
}

impl Encoding {
    pub fn bits_per_sample(&self) -> u32 {
        match self {
            Encoding::Pcm8 => 8,
            Encoding::Pcm16 => 16,
            Encoding::Pcm24 => 24,
            Encoding::PcmFloat32 => 32,
        }
    }
}

/// Immutable per-configuration stream format.
///
/// A sample-rate or channel-count change observed by `process` triggers a
/// lazy rebuild of filter banks / analysis buffers; it never causes
/// per-buffer work.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub encoding: Encoding,
}

impl AudioFormat {
    /// Bytes per interleaved sample group (one sample for every channel).
    pub fn frame_bytes(&self) -> usize {
        self.channels as usize * 2
    }
}

/// Construction-time equalizer configuration.
///
/// Explicit value object instead of process-wide tunables so multiple
/// independent pipeline instances can coexist and tests stay deterministic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EqualizerConfig {
    /// Band center frequencies in Hz, ascending.
    pub center_frequencies: Vec<f32>,
    /// Shared Q factor for every peaking section.
    pub q: f32,
    /// Lower clamp for band gains, dB.
    pub min_gain_db: f32,
    /// Upper clamp for band gains, dB.
    pub max_gain_db: f32,
    /// |gain| at or below this is treated as flat for the fast path, dB.
    pub active_threshold_db: f32,
    /// Fraction of the max positive band gain pre-cut before filtering.
    pub pre_cut_factor: f32,
    /// Clip ceiling for the normalized output, linear.
    pub clip_threshold: f32,
    /// Use a soft S-curve near the ceiling instead of a hard clamp.
    pub soft_clip: bool,
}

impl Default for EqualizerConfig {
    fn default() -> Self {
        Self {
            center_frequencies: vec![
                31.25, 62.5, 125.0, 250.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0, 16000.0,
            ],
            q: 1.725,
            min_gain_db: -15.0,
            max_gain_db: 15.0,
            active_threshold_db: 0.1,
            pre_cut_factor: 0.8,
            clip_threshold: 1.0,
            soft_clip: false,
        }
    }
}

impl EqualizerConfig {
    pub fn band_count(&self) -> usize {
        self.center_frequencies.len()
    }

    /// Validate configuration invariants at construction time.
    pub fn validate(&self) -> Result<(), AudioProcessorError> {
        if self.center_frequencies.is_empty() {
            return Err(AudioProcessorError::InvalidConfig(
                "equalizer needs at least one band".to_string(),
            ));
        }
        if self
            .center_frequencies
            .windows(2)
            .any(|pair| pair[0] >= pair[1])
        {
            return Err(AudioProcessorError::InvalidConfig(
                "band center frequencies must be strictly ascending".to_string(),
            ));
        }
        if self.q <= 0.0 {
            return Err(AudioProcessorError::InvalidConfig(format!(
                "Q must be positive, got {}",
                self.q
            )));
        }
        if self.min_gain_db >= self.max_gain_db {
            return Err(AudioProcessorError::InvalidConfig(format!(
                "gain range [{}, {}] is empty",
                self.min_gain_db, self.max_gain_db
            )));
        }
        if self.clip_threshold <= 0.0 {
            return Err(AudioProcessorError::InvalidConfig(format!(
                "clip threshold must be positive, got {}",
                self.clip_threshold
            )));
        }
        Ok(())
    }
}

/// Construction-time spectrum analyzer configuration.
///
/// `fft_size` can later be changed at runtime through the analyzer handle;
/// everything else is fixed for the lifetime of the instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpectrumConfig {
    /// FFT window size; power of two in [`MIN_FFT_SIZE`, `MAX_FFT_SIZE`].
    pub fft_size: usize,
    /// Upper bound on analysis passes per second.
    pub max_fps: u32,
    /// Run the magnitude shaping stage and emit `on_magnitude_ready`.
    pub magnitude_enabled: bool,
    /// k of the v/(v+k) log-style compression.
    pub compression_k: f32,
    /// Quadratic low-frequency boost applies below this frequency, Hz.
    pub low_boost_cutoff_hz: f32,
    /// Peak amount of the low-frequency boost.
    pub low_boost_amount: f32,
    /// Quadratic high-frequency boost applies above this frequency, Hz.
    pub high_boost_start_hz: f32,
    /// Peak amount of the high-frequency boost.
    pub high_boost_amount: f32,
    /// Raised-cosine mid-band boost range, Hz.
    pub mid_boost_range_hz: (f32, f32),
    /// Peak amount of the mid-band boost.
    pub mid_boost_amount: f32,
    /// Exponent applied to the shaped curve to spread the dynamics.
    pub spread_exponent: f32,
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            fft_size: 1024,
            max_fps: 60,
            magnitude_enabled: true,
            compression_k: 0.25,
            low_boost_cutoff_hz: 150.0,
            low_boost_amount: 0.15,
            high_boost_start_hz: 8000.0,
            high_boost_amount: 0.25,
            mid_boost_range_hz: (400.0, 4000.0),
            mid_boost_amount: 0.1,
            spread_exponent: 0.8,
        }
    }
}

impl SpectrumConfig {
    pub fn validate(&self) -> Result<(), AudioProcessorError> {
        if !is_valid_fft_size(self.fft_size) {
            return Err(AudioProcessorError::InvalidFftSize {
                requested: self.fft_size,
            });
        }
        if self.max_fps == 0 {
            return Err(AudioProcessorError::InvalidConfig(
                "max_fps must be at least 1".to_string(),
            ));
        }
        if self.mid_boost_range_hz.0 >= self.mid_boost_range_hz.1 {
            return Err(AudioProcessorError::InvalidConfig(format!(
                "mid boost range [{}, {}] is empty",
                self.mid_boost_range_hz.0, self.mid_boost_range_hz.1
            )));
        }
        Ok(())
    }
}

/// FFT sizes must be a power of two within the supported window range.
pub fn is_valid_fft_size(fft_size: usize) -> bool {
    fft_size.is_power_of_two() && (MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&fft_size)
}

/// Errors rejected synchronously at the configuration boundary.
///
/// Nothing in this taxonomy ever crosses the `process` boundary; runtime
/// faults inside the per-sample loop are absorbed with passthrough instead.
#[derive(Debug, thiserror::Error)]
pub enum AudioProcessorError {
    #[error("unsupported encoding {encoding:?} - only 16-bit linear PCM is processable")]
    UnsupportedFormat { encoding: Encoding },

    #[error(
        "invalid FFT size {requested} - must be a power of two in [{min}, {max}]",
        min = MIN_FFT_SIZE,
        max = MAX_FFT_SIZE
    )]
    InvalidFftSize { requested: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
