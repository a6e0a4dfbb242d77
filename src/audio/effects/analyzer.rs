// Rate-limited FFT spectrum analysis for visualizers
//
// Ingestion is O(1) per frame into a ring buffer regardless of the
// visualization frame rate; the O(N log N) analysis pass runs at most
// `max_fps` times per second and only when a full window is buffered.
// Audio passes through untouched.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use colored::Colorize;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use tracing::{debug, warn};

use crate::audio::buffer::CircularSampleBuffer;
use crate::audio::processor::{AudioProcessor, PcmConverter};
use crate::audio::types::{
    is_valid_fft_size, AudioFormat, AudioProcessorError, Encoding, SpectrumConfig,
};
use crate::audio_debug;

const LOG_TAG: &str = "SPECTRUM";

/// A pass longer than this since the previous one means playback paused or
/// seeked; the limiter timestamp is reset so the next frame runs fresh.
const STALE_GAP: Duration = Duration::from_secs(1);

/// Peaks below this are treated as silence and skip magnitude shaping, so a
/// silent window emits near-zero magnitudes instead of boost residue.
const SILENCE_PEAK: f32 = 1e-6;

/// Downstream visualization collaborators.
///
/// Called on the audio thread at most `max_fps` times per second; listener
/// work must be cheap or hand off elsewhere.
pub trait SpectrumListener: Send + Sync {
    /// Raw FFT output: interleaved re/im pairs, `fft_size` bins.
    fn on_fft_ready(&self, sample_rate: u32, channels: u16, bins: &[f32]);

    /// Shaped magnitude curve: `fft_size / 2` values in [0, 1], ready for
    /// direct visualization.
    fn on_magnitude_ready(&self, sample_rate: u32, magnitudes: &[f32]);
}

#[derive(Debug)]
struct SpectrumControl {
    /// FFT size staged by the control thread, applied at next buffer entry.
    pending_fft_size: Option<usize>,
}

/// Cloneable control surface for a [`SpectrumAnalyzer`].
#[derive(Debug, Clone)]
pub struct SpectrumHandle {
    control: Arc<Mutex<SpectrumControl>>,
}

impl SpectrumHandle {
    fn lock(&self) -> MutexGuard<'_, SpectrumControl> {
        match self.control.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Stage a new FFT window size. Non-power-of-two or out-of-range values
    /// are a logged no-op; valid sizes take effect at the next processed
    /// buffer, never mid-analysis.
    pub fn set_sample_size(&self, fft_size: usize) {
        if !is_valid_fft_size(fft_size) {
            warn!(
                "{}: rejecting FFT size {} - keeping current window",
                LOG_TAG.on_blue().white(),
                fft_size
            );
            return;
        }
        self.lock().pending_fft_size = Some(fft_size);
        debug!(
            "{}: staged FFT size {}",
            LOG_TAG.on_blue().white(),
            fft_size
        );
    }
}

/// FFT-based spectrum analyzer implementing the [`AudioProcessor`]
/// lifecycle as a transparent pass-through.
pub struct SpectrumAnalyzer {
    config: SpectrumConfig,
    handle: SpectrumHandle,
    listeners: Vec<Arc<dyn SpectrumListener>>,

    fft_size: usize,
    ring: CircularSampleBuffer,
    planner: FftPlanner<f32>,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,

    // Reused per-pass scratch; listener payloads are fresh slices of these.
    frame: Vec<i16>,
    complex: Vec<Complex<f32>>,
    fft_bins: Vec<f32>,
    magnitudes: Vec<f32>,
    shaped: Vec<f32>,

    last_pass: Option<Instant>,
    format: Option<AudioFormat>,
}

impl SpectrumAnalyzer {
    pub fn new(config: SpectrumConfig) -> Result<Self, AudioProcessorError> {
        config.validate()?;
        let fft_size = config.fft_size;
        let mut analyzer = Self {
            config,
            handle: SpectrumHandle {
                control: Arc::new(Mutex::new(SpectrumControl {
                    pending_fft_size: None,
                })),
            },
            listeners: Vec::new(),
            fft_size: 0,
            ring: CircularSampleBuffer::new(1),
            planner: FftPlanner::new(),
            fft: FftPlanner::new().plan_fft_forward(1),
            window: Vec::new(),
            frame: Vec::new(),
            complex: Vec::new(),
            fft_bins: Vec::new(),
            magnitudes: Vec::new(),
            shaped: Vec::new(),
            last_pass: None,
            format: None,
        };
        analyzer.rebuild(fft_size);
        Ok(analyzer)
    }

    pub fn with_defaults() -> Self {
        // Default config is statically valid.
        Self::new(SpectrumConfig::default()).expect("default spectrum config is valid")
    }

    /// Control surface for the UI/control thread.
    pub fn handle(&self) -> SpectrumHandle {
        self.handle.clone()
    }

    pub fn add_listener(&mut self, listener: Arc<dyn SpectrumListener>) {
        self.listeners.push(listener);
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn config(&self) -> &SpectrumConfig {
        &self.config
    }

    /// Stream format accepted by the last successful `configure`, if any.
    pub fn format(&self) -> Option<AudioFormat> {
        self.format
    }

    /// Size the ring, plan and scratch buffers for `fft_size`. The ring
    /// holds two windows so analysis always has a recent full window even
    /// while new samples stream in.
    fn rebuild(&mut self, fft_size: usize) {
        self.fft_size = fft_size;
        self.ring = CircularSampleBuffer::new(fft_size * 2);
        self.fft = self.planner.plan_fft_forward(fft_size);
        self.window = (0..fft_size)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * i as f32 / (fft_size - 1) as f32;
                0.5 * (1.0 - phase.cos())
            })
            .collect();
        self.frame = vec![0; fft_size];
        self.complex = vec![Complex::new(0.0, 0.0); fft_size];
        self.fft_bins = vec![0.0; fft_size * 2];
        self.magnitudes = vec![0.0; fft_size / 2];
        self.shaped = vec![0.0; fft_size / 2];
        self.last_pass = None;
        debug!(
            "{}: window rebuilt, FFT size {} (ring capacity {} samples)",
            LOG_TAG.on_blue().white(),
            fft_size,
            self.ring.capacity()
        );
    }

    /// Apply a staged FFT-size change, if any. Buffer-entry only.
    fn apply_pending_size(&mut self) {
        let pending = self.handle.lock().pending_fft_size.take();
        if let Some(size) = pending {
            if size != self.fft_size {
                self.rebuild(size);
            }
        }
    }

    /// Elapsed-time rate limiter. A gap above [`STALE_GAP`] resets the
    /// timestamp so a pause never skews the next frame.
    fn pass_due(&mut self, now: Instant) -> bool {
        // Sub-millisecond precision matters: at 60 fps a whole-ms interval
        // truncates 16.67 ms down to 16 ms and overshoots the bound.
        let min_interval = Duration::from_secs_f64(1.0 / f64::from(self.config.max_fps.max(1)));
        match self.last_pass {
            None => true,
            Some(last) => {
                let elapsed = now.duration_since(last);
                if elapsed >= STALE_GAP {
                    self.last_pass = Some(now);
                    true
                } else {
                    elapsed >= min_interval
                }
            }
        }
    }

    /// Run one analysis pass if due and enough samples are buffered.
    /// Insufficient data is a silent skip, retried next eligible call.
    fn maybe_analyze(&mut self, sample_rate: u32, channels: u16) {
        if self.ring.available_data_size() < self.fft_size * 2 {
            return;
        }
        let now = Instant::now();
        if !self.pass_due(now) {
            return;
        }
        self.last_pass = Some(now);
        self.analyze(sample_rate, channels);
    }

    fn analyze(&mut self, sample_rate: u32, channels: u16) {
        // Most recent window, not the oldest - minimizes visual latency.
        if !self.ring.copy_latest(&mut self.frame) {
            return;
        }

        for (i, &sample) in self.frame.iter().enumerate() {
            let x = PcmConverter::i16_to_f32(sample) * self.window[i];
            self.complex[i] = Complex::new(x, 0.0);
        }
        self.fft.process(&mut self.complex);

        for (i, bin) in self.complex.iter().enumerate() {
            self.fft_bins[i * 2] = bin.re;
            self.fft_bins[i * 2 + 1] = bin.im;
        }
        for listener in &self.listeners {
            listener.on_fft_ready(sample_rate, channels, &self.fft_bins);
        }

        if self.config.magnitude_enabled {
            self.shape_magnitudes(sample_rate);
            for listener in &self.listeners {
                listener.on_magnitude_ready(sample_rate, &self.shaped);
            }
        }
        audio_debug!("{}: analysis pass, {} bins", LOG_TAG, self.fft_size);
    }

    /// Shape raw bin magnitudes into a [0, 1] curve for visualization:
    /// scale, compress, peak-normalize, perceptual boosts, spread, smooth.
    fn shape_magnitudes(&mut self, sample_rate: u32) {
        let n = self.fft_size;
        let half = n / 2;
        let scale = 2.0 / n as f32;
        let k = self.config.compression_k;

        for i in 0..half {
            let magnitude = self.complex[i].norm() * scale;
            self.magnitudes[i] = magnitude / (magnitude + k);
        }

        // Normalize by the larger of the two half-spectrum peaks: preserves
        // relative inter-frame dynamics rather than absolute level.
        let (low_half, high_half) = self.magnitudes.split_at(half / 2);
        let peak = |bins: &[f32]| bins.iter().fold(0.0_f32, |acc, &v| acc.max(v));
        let norm = peak(low_half).max(peak(high_half));
        if norm < SILENCE_PEAK {
            // Silence: emit the raw near-zero curve, no boost residue.
            self.shaped[..half].copy_from_slice(&self.magnitudes[..half]);
            return;
        }

        let bin_hz = sample_rate as f32 / n as f32;
        let nyquist = sample_rate as f32 / 2.0;
        let low_cutoff = self.config.low_boost_cutoff_hz;
        let high_start = self.config.high_boost_start_hz;
        let (mid_lo, mid_hi) = self.config.mid_boost_range_hz;

        for i in 0..half {
            let mut v = self.magnitudes[i] / norm;
            let freq = i as f32 * bin_hz;

            if freq < low_cutoff && low_cutoff > 0.0 {
                let t = 1.0 - freq / low_cutoff;
                v += self.config.low_boost_amount * t * t;
            }
            if freq > high_start && nyquist > high_start {
                let t = ((freq - high_start) / (nyquist - high_start)).clamp(0.0, 1.0);
                v += self.config.high_boost_amount * t * t;
            }
            if freq >= mid_lo && freq <= mid_hi {
                let phase = (freq - mid_lo) / (mid_hi - mid_lo);
                let raised_cosine =
                    0.5 * (1.0 - (2.0 * std::f32::consts::PI * phase).cos());
                v += self.config.mid_boost_amount * raised_cosine;
            }

            self.magnitudes[i] = v.clamp(0.0, 1.0).powf(self.config.spread_exponent);
        }

        // 3-tap smoothing kernel: center plus both neighbors.
        for i in 0..half {
            let prev = if i > 0 { self.magnitudes[i - 1] } else { self.magnitudes[i] };
            let next = if i + 1 < half {
                self.magnitudes[i + 1]
            } else {
                self.magnitudes[i]
            };
            self.shaped[i] = (0.25 * prev + 0.5 * self.magnitudes[i] + 0.25 * next).clamp(0.0, 1.0);
        }
    }
}

impl std::fmt::Debug for SpectrumAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumAnalyzer")
            .field("fft_size", &self.fft_size)
            .field("max_fps", &self.config.max_fps)
            .field("magnitude_enabled", &self.config.magnitude_enabled)
            .field("listeners", &self.listeners.len())
            .field("buffered_bytes", &self.ring.available_data_size())
            .finish()
    }
}

impl AudioProcessor for SpectrumAnalyzer {
    fn configure(
        &mut self,
        sample_rate: u32,
        channels: u16,
        encoding: Encoding,
    ) -> Result<(), AudioProcessorError> {
        if encoding != Encoding::Pcm16 {
            warn!(
                "{}: rejecting unsupported encoding {:?}",
                LOG_TAG.on_blue().white(),
                encoding
            );
            return Err(AudioProcessorError::UnsupportedFormat { encoding });
        }
        if sample_rate == 0 || channels == 0 {
            return Err(AudioProcessorError::InvalidConfig(format!(
                "invalid stream format: {sample_rate} Hz, {channels} ch"
            )));
        }
        self.format = Some(AudioFormat {
            sample_rate,
            channels,
            encoding,
        });
        debug!(
            "{}: configured for {} ch @ {} Hz",
            LOG_TAG.on_blue().white(),
            channels,
            sample_rate
        );
        Ok(())
    }

    fn process(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        sample_rate: u32,
        channels: u16,
    ) -> usize {
        if channels == 0 || sample_rate == 0 || input.is_empty() {
            return 0;
        }
        self.apply_pending_size();

        let written = PcmConverter::passthrough(input, output, channels);

        // O(1) per frame: average the channels into one sample and push it.
        let frame_bytes = channels as usize * 2;
        for frame_start in (0..written).step_by(frame_bytes) {
            let mut acc: i32 = 0;
            for channel in 0..channels as usize {
                acc += i32::from(PcmConverter::read_i16_le(input, frame_start + channel * 2));
            }
            self.ring.put((acc / i32::from(channels)) as i16);
        }

        self.maybe_analyze(sample_rate, channels);
        written
    }

    fn flush(&mut self) {
        self.ring.clear();
        self.last_pass = None;
        debug!(
            "{}: flushed ring buffer (FFT size preserved)",
            LOG_TAG.on_blue().white()
        );
    }

    fn reset(&mut self) {
        let size = self.fft_size;
        self.rebuild(size);
        debug!("{}: reset", LOG_TAG.on_blue().white());
    }

    fn release(&mut self) {
        self.listeners.clear();
        self.ring = CircularSampleBuffer::new(1);
        // The planner caches twiddle tables for every size it has planned;
        // drop it along with the last plan so teardown frees them too.
        self.planner = FftPlanner::new();
        self.fft = self.planner.plan_fft_forward(1);
        self.window = Vec::new();
        self.frame = Vec::new();
        self.complex = Vec::new();
        self.fft_bins = Vec::new();
        self.magnitudes = Vec::new();
        self.shaped = Vec::new();
        self.format = None;
        debug!("{}: released", LOG_TAG.on_blue().white());
    }
}
