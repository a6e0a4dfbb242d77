// Multi-band parametric equalizer for the media playback path
//
// One biquad bank per channel plus a global pre-cut stage that attenuates
// ahead of multi-band boosts so constructive gain can't clip. Control calls
// arrive from the UI thread through a cloneable handle; the audio thread
// takes one short lock per buffer to snapshot the control state, then runs
// the per-sample loop lock-free.

use std::sync::{Arc, Mutex, MutexGuard};

use colored::Colorize;
use tracing::{debug, warn};

use super::filter::BiquadFilter;
use super::safe_db_to_linear;
use crate::audio::processor::{AudioProcessor, PcmConverter};
use crate::audio::types::{AudioFormat, AudioProcessorError, Encoding, EqualizerConfig};
use crate::audio_debug;

/// Per-frame step the smoothed global gain moves toward its target.
pub const GAIN_SMOOTHING: f32 = 0.005;
/// Global gain snaps to target once within this distance.
const GAIN_EPSILON: f32 = 1e-4;

const LOG_TAG: &str = "PARAMETRIC_EQ";

/// Control-thread state, guarded by the one lock per equalizer instance.
///
/// The lock is held for O(bands) by setters and once per buffer by the
/// audio thread - never across the per-sample loop.
#[derive(Debug)]
struct EqControl {
    /// Target gains in dB, always clamped to the configured range.
    gains: Vec<f32>,
    /// Gains stashed by `set_enabled(false)`, restored on re-enable.
    stashed_gains: Option<Vec<f32>>,
    enabled: bool,
    /// Linear pre-cut target the audio thread smooths toward.
    global_gain_target: f32,
    /// Any |gain| above the active threshold.
    active: bool,
    /// Bumped on every mutation; the audio thread retargets filters when it
    /// observes a change.
    generation: u64,
}

/// Cloneable control surface for a [`ParametricEqualizer`].
///
/// Safe to call from any thread; mutations take effect no earlier than the
/// next full buffer processed by the audio thread.
#[derive(Debug, Clone)]
pub struct EqualizerHandle {
    config: Arc<EqualizerConfig>,
    control: Arc<Mutex<EqControl>>,
}

impl EqualizerHandle {
    /// Recover from poisoning instead of panicking - a control-thread panic
    /// must not take the audio thread with it.
    fn lock(&self) -> MutexGuard<'_, EqControl> {
        match self.control.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Set one band's target gain, clamped to the configured range.
    /// Out-of-range band indices and non-finite gains are a logged no-op.
    pub fn set_band_gain(&self, band: usize, gain_db: f32) {
        if band >= self.config.band_count() {
            warn!(
                "{}: band index {} out of range (bands: {})",
                LOG_TAG.on_cyan().white(),
                band,
                self.config.band_count()
            );
            return;
        }
        // clamp passes NaN through, so the finite check has to come first.
        if !gain_db.is_finite() {
            warn!(
                "{}: rejecting non-finite gain {} for band {}",
                LOG_TAG.on_cyan().white(),
                gain_db,
                band
            );
            return;
        }
        let clamped = gain_db.clamp(self.config.min_gain_db, self.config.max_gain_db);
        let mut control = self.lock();
        control.gains[band] = clamped;
        control.active = self.any_band_active(&control.gains);
        control.generation += 1;
        debug!(
            "{}: band {} ({:.0} Hz) -> {:+.1} dB",
            LOG_TAG.on_cyan().white(),
            band,
            self.config.center_frequencies[band],
            clamped
        );
    }

    /// Set every band gain at once and recompute the global pre-cut from the
    /// maximum positive gain. Idempotent: the same array twice yields the
    /// same targets and the same pre-cut.
    pub fn set_band_gains(&self, gains_db: &[f32]) {
        if gains_db.len() != self.config.band_count() {
            warn!(
                "{}: expected {} band gains, got {} - ignoring",
                LOG_TAG.on_cyan().white(),
                self.config.band_count(),
                gains_db.len()
            );
            return;
        }
        if gains_db.iter().any(|g| !g.is_finite()) {
            warn!(
                "{}: rejecting gain array with non-finite values: {:?}",
                LOG_TAG.on_cyan().white(),
                gains_db
            );
            return;
        }
        let mut control = self.lock();
        self.apply_gains(&mut control, gains_db);
        debug!(
            "{}: gains set to {:?} (pre-cut {:.3})",
            LOG_TAG.on_cyan().white(),
            control.gains,
            control.global_gain_target
        );
    }

    /// Clamp, store, and refresh the active flag and the pre-cut target.
    /// Lock must already be held.
    fn apply_gains(&self, control: &mut EqControl, gains_db: &[f32]) {
        for (slot, &gain) in control.gains.iter_mut().zip(gains_db) {
            *slot = gain.clamp(self.config.min_gain_db, self.config.max_gain_db);
        }
        control.active = self.any_band_active(&control.gains);
        control.global_gain_target = if control.active {
            let max_positive = control.gains.iter().fold(0.0_f32, |acc, &g| acc.max(g));
            safe_db_to_linear(-(max_positive * self.config.pre_cut_factor))
        } else {
            // Flat gains must pass audio through bit-exact, so no
            // fractional-dB pre-cut remnant is allowed here.
            1.0
        };
        control.generation += 1;
    }

    fn any_band_active(&self, gains: &[f32]) -> bool {
        gains
            .iter()
            .any(|g| g.abs() > self.config.active_threshold_db)
    }

    /// Synchronous, thread-safe read of one band's target gain in dB.
    /// Returns 0.0 for an invalid index.
    pub fn get_target_gain(&self, band: usize) -> f32 {
        let control = self.lock();
        control.gains.get(band).copied().unwrap_or(0.0)
    }

    /// Snapshot of all target gains in dB.
    pub fn target_gains(&self) -> Vec<f32> {
        self.lock().gains.clone()
    }

    /// Current linear pre-cut target (1.0 when flat).
    pub fn pre_cut_linear(&self) -> f32 {
        self.lock().global_gain_target
    }

    /// Any band currently above the active threshold.
    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    /// Whether the user-facing toggle is on.
    pub fn is_enabled(&self) -> bool {
        self.lock().enabled
    }

    /// User-facing enable toggle: disabling stashes the gain array and zeros
    /// it; enabling restores the stash. Independent of the Active/Inactive
    /// fast-path state, which simply follows the resulting gains.
    pub fn set_enabled(&self, enabled: bool) {
        let mut control = self.lock();
        if control.enabled == enabled {
            return;
        }
        control.enabled = enabled;
        if enabled {
            let restored = control
                .stashed_gains
                .take()
                .unwrap_or_else(|| vec![0.0; self.config.band_count()]);
            self.apply_gains(&mut control, &restored);
        } else {
            control.stashed_gains = Some(control.gains.clone());
            let flat = vec![0.0; self.config.band_count()];
            self.apply_gains(&mut control, &flat);
        }
        debug!(
            "{}: {}",
            LOG_TAG.on_cyan().white(),
            if enabled { "enabled" } else { "disabled" }
        );
    }

    /// Serialize the target gains as comma-separated floats - the shape the
    /// host persists.
    pub fn gains_to_csv(&self) -> String {
        self.lock()
            .gains
            .iter()
            .map(|g| g.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Restore gains from the comma-separated form written by
    /// [`gains_to_csv`](Self::gains_to_csv).
    pub fn set_band_gains_csv(&self, csv: &str) -> Result<(), AudioProcessorError> {
        let parsed: Result<Vec<f32>, _> = csv.split(',').map(|s| s.trim().parse()).collect();
        let gains = parsed.map_err(|e| {
            AudioProcessorError::InvalidConfig(format!("bad gain CSV {csv:?}: {e}"))
        })?;
        // "NaN" and "inf" parse successfully; they are still not gains.
        if gains.iter().any(|g| !g.is_finite()) {
            return Err(AudioProcessorError::InvalidConfig(format!(
                "gain CSV {csv:?} contains non-finite values"
            )));
        }
        if gains.len() != self.config.band_count() {
            return Err(AudioProcessorError::InvalidConfig(format!(
                "gain CSV has {} values, expected {}",
                gains.len(),
                self.config.band_count()
            )));
        }
        self.set_band_gains(&gains);
        Ok(())
    }
}

/// One filter bank instance, keyed to a sample rate and channel count.
/// Owned exclusively by the audio thread; rebuilt lazily when the stream
/// format changes.
#[derive(Debug)]
struct FilterBank {
    sample_rate: u32,
    channels: u16,
    /// filters[channel][band]
    filters: Vec<Vec<BiquadFilter>>,
}

impl FilterBank {
    fn new(config: &EqualizerConfig, sample_rate: u32, channels: u16, gains_db: &[f32]) -> Self {
        let mut bank = Self {
            sample_rate,
            channels,
            filters: (0..channels)
                .map(|_| (0..config.band_count()).map(|_| BiquadFilter::new()).collect())
                .collect(),
        };
        bank.retarget(config, gains_db);
        bank
    }

    /// Push new target coefficients into every section. Delay lines are
    /// untouched - this is what keeps gain changes click-free. Gains inside
    /// the active threshold retarget to exactly flat so the bank can glide
    /// all the way back to bypass and re-enable the fast path.
    fn retarget(&mut self, config: &EqualizerConfig, gains_db: &[f32]) {
        for channel_filters in &mut self.filters {
            for (band, filter) in channel_filters.iter_mut().enumerate() {
                let gain = gains_db.get(band).copied().unwrap_or(0.0);
                let effective = if gain.abs() <= config.active_threshold_db {
                    0.0
                } else {
                    gain
                };
                filter.set_peaking_eq(
                    config.center_frequencies[band],
                    self.sample_rate,
                    config.q,
                    effective,
                );
            }
        }
    }

    fn all_bypassed(&self) -> bool {
        self.filters
            .iter()
            .flatten()
            .all(BiquadFilter::is_bypassed)
    }

    fn reset(&mut self) {
        for filter in self.filters.iter_mut().flatten() {
            filter.reset();
        }
    }
}

/// Hard clamp at the threshold, or a tanh S-curve above 80% of it.
#[inline]
fn clip(x: f32, threshold: f32, soft: bool) -> f32 {
    if !soft {
        return x.clamp(-threshold, threshold);
    }
    let knee = 0.8 * threshold;
    let magnitude = x.abs();
    if magnitude <= knee {
        x
    } else {
        let over = (magnitude - knee) / (threshold - knee);
        x.signum() * (knee + (threshold - knee) * over.tanh())
    }
}

/// Multi-band peaking equalizer implementing the [`AudioProcessor`]
/// lifecycle.
///
/// Constructed once per playback session. The filter bank is built lazily on
/// the first processed buffer (and rebuilt on sample-rate/channel-count
/// changes), so construction needs no stream format.
#[derive(Debug)]
pub struct ParametricEqualizer {
    config: Arc<EqualizerConfig>,
    handle: EqualizerHandle,
    bank: Option<FilterBank>,
    seen_generation: u64,
    /// Smoothed linear pre-cut gain, audio-thread owned.
    current_gain: f32,
    /// Buffer-entry snapshot of the control target.
    target_gain: f32,
    format: Option<AudioFormat>,
}

impl ParametricEqualizer {
    pub fn new(config: EqualizerConfig) -> Result<Self, AudioProcessorError> {
        config.validate()?;
        let config = Arc::new(config);
        let handle = EqualizerHandle {
            config: Arc::clone(&config),
            control: Arc::new(Mutex::new(EqControl {
                gains: vec![0.0; config.band_count()],
                stashed_gains: None,
                enabled: true,
                global_gain_target: 1.0,
                active: false,
                generation: 0,
            })),
        };
        Ok(Self {
            config,
            handle,
            bank: None,
            seen_generation: 0,
            current_gain: 1.0,
            target_gain: 1.0,
            format: None,
        })
    }

    pub fn with_defaults() -> Self {
        // Default config is statically valid.
        Self::new(EqualizerConfig::default()).expect("default equalizer config is valid")
    }

    /// Control surface for the UI/control thread.
    pub fn handle(&self) -> EqualizerHandle {
        self.handle.clone()
    }

    pub fn config(&self) -> &EqualizerConfig {
        &self.config
    }

    /// Stream format accepted by the last successful `configure`, if any.
    pub fn format(&self) -> Option<AudioFormat> {
        self.format
    }

    // Thin delegators so local (same-thread) callers don't need to keep a
    // separate handle around.
    pub fn set_band_gain(&self, band: usize, gain_db: f32) {
        self.handle.set_band_gain(band, gain_db);
    }

    pub fn set_band_gains(&self, gains_db: &[f32]) {
        self.handle.set_band_gains(gains_db);
    }

    pub fn get_target_gain(&self, band: usize) -> f32 {
        self.handle.get_target_gain(band)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.handle.set_enabled(enabled);
    }

    /// Buffer-entry snapshot: the only place the audio thread takes the
    /// control lock. Rebuilds or retargets the bank as needed and returns
    /// the active flag.
    fn snapshot(&mut self, sample_rate: u32, channels: u16) -> bool {
        let rebuild = match &self.bank {
            None => true,
            Some(bank) => bank.sample_rate != sample_rate || bank.channels != channels,
        };
        let control = self.handle.lock();
        if rebuild {
            self.bank = Some(FilterBank::new(
                &self.config,
                sample_rate,
                channels,
                &control.gains,
            ));
            self.seen_generation = control.generation;
            debug!(
                "{}: built {}-band bank for {} ch @ {} Hz",
                LOG_TAG.on_cyan().white(),
                self.config.band_count(),
                channels,
                sample_rate
            );
        } else if control.generation != self.seen_generation {
            if let Some(bank) = &mut self.bank {
                bank.retarget(&self.config, &control.gains);
            }
            self.seen_generation = control.generation;
        }
        self.target_gain = control.global_gain_target;
        control.active
    }

    fn gain_is_unity(&self) -> bool {
        (self.current_gain - 1.0).abs() <= GAIN_EPSILON
            && (self.target_gain - 1.0).abs() <= GAIN_EPSILON
    }
}

impl AudioProcessor for ParametricEqualizer {
    fn configure(
        &mut self,
        sample_rate: u32,
        channels: u16,
        encoding: Encoding,
    ) -> Result<(), AudioProcessorError> {
        if encoding != Encoding::Pcm16 {
            warn!(
                "{}: rejecting unsupported encoding {:?}",
                LOG_TAG.on_cyan().white(),
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
            LOG_TAG.on_cyan().white(),
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
        let frame_bytes = channels as usize * 2;
        let input_whole = (input.len() / frame_bytes) * frame_bytes;
        if output.len() < input_whole {
            warn!(
                "{}: output buffer {} B shorter than input {} B - truncating",
                LOG_TAG.on_cyan().white(),
                output.len(),
                input_whole
            );
        }
        let usable = PcmConverter::usable_bytes(input.len(), output.len(), channels);
        if usable == 0 {
            return 0;
        }

        let active = self.snapshot(sample_rate, channels);

        // Fast path: nothing to do once every section has glided back to
        // unity and the pre-cut has decayed.
        let bank_flat = self.bank.as_ref().map(FilterBank::all_bypassed).unwrap_or(true);
        if !active && bank_flat && self.gain_is_unity() {
            self.current_gain = 1.0;
            audio_debug!("{}: fast-path passthrough of {} bytes", LOG_TAG, usable);
            return PcmConverter::passthrough(input, output, channels);
        }

        let Some(bank) = self.bank.as_mut() else {
            // Snapshot always builds the bank; reaching here means internal
            // state is inconsistent. Pass audio through rather than halt.
            warn!(
                "{}: filter bank missing mid-process - passing buffer through",
                LOG_TAG.on_cyan().white()
            );
            return PcmConverter::passthrough(input, output, channels);
        };

        let clip_threshold = self.config.clip_threshold;
        let soft_clip = self.config.soft_clip;
        let target_gain = self.target_gain;
        let mut gain = self.current_gain;

        for frame_start in (0..usable).step_by(frame_bytes) {
            // Smooth the pre-cut once per frame so channels stay matched.
            let delta = target_gain - gain;
            gain = if delta.abs() <= GAIN_EPSILON {
                target_gain
            } else {
                gain + delta * GAIN_SMOOTHING
            };

            for (channel, channel_filters) in bank.filters.iter_mut().enumerate() {
                let index = frame_start + channel * 2;
                let sample = PcmConverter::read_i16_le(input, index);
                let mut x = PcmConverter::i16_to_f32(sample) * gain;
                for filter in channel_filters.iter_mut() {
                    if !filter.is_bypassed() {
                        x = filter.process(x);
                    }
                }
                let clipped = clip(x, clip_threshold, soft_clip);
                PcmConverter::write_i16_le(output, index, PcmConverter::f32_to_i16(clipped));
            }
        }

        self.current_gain = gain;
        usable
    }

    fn flush(&mut self) {
        if let Some(bank) = &mut self.bank {
            bank.reset();
        }
        debug!(
            "{}: flushed delay lines (gains preserved)",
            LOG_TAG.on_cyan().white()
        );
    }

    fn reset(&mut self) {
        self.bank = None;
        self.current_gain = 1.0;
        debug!(
            "{}: reset - bank dropped, user gains preserved",
            LOG_TAG.on_cyan().white()
        );
    }

    fn release(&mut self) {
        self.bank = None;
        self.format = None;
        let mut control = self.handle.lock();
        control.stashed_gains = None;
        debug!("{}: released", LOG_TAG.on_cyan().white());
    }
}
