pub mod analyzer;
pub mod equalizer;
pub mod filter;

pub use analyzer::{SpectrumAnalyzer, SpectrumHandle, SpectrumListener};
pub use equalizer::{EqualizerHandle, ParametricEqualizer};
pub use filter::BiquadFilter;

/// Audio stability constants for denormal protection
const DENORMAL_THRESHOLD: f32 = 1e-15;
const MIN_DB: f32 = -100.0;
const MAX_DB: f32 = 40.0;

/// Flush denormals and clamp runaway values that would destabilize the
/// filter feedback path.
#[inline]
pub(crate) fn flush_denormal(x: f32) -> f32 {
    let abs_x = x.abs();
    if abs_x < DENORMAL_THRESHOLD || !x.is_finite() {
        0.0
    } else if abs_x > 100.0 {
        if x > 0.0 {
            100.0
        } else {
            -100.0
        }
    } else {
        x
    }
}

/// Safe dB conversion with clamping
#[inline]
pub(crate) fn safe_db_to_linear(db: f32) -> f32 {
    let clamped_db = db.clamp(MIN_DB, MAX_DB);
    10.0_f32.powf(clamped_db / 20.0)
}

/// Clamp and validate floating point values
#[inline]
pub(crate) fn validate_float(x: f32) -> f32 {
    if x.is_finite() {
        flush_denormal(x)
    } else {
        0.0
    }
}
