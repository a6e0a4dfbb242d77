use colored::Colorize;
use tracing::warn;

use super::{flush_denormal, validate_float};

/// Per-sample step each working coefficient moves toward its target.
pub const COEFF_SMOOTHING: f32 = 0.005;
/// Working coefficients snap to target once within this distance.
pub const COEFF_EPSILON: f32 = 1e-6;

/// One normalized set of second-order section coefficients.
///
/// `a0` is already divided out; `a1`/`a2` are the feedback terms.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Coefficients {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
}

impl Coefficients {
    const UNITY: Self = Self {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    /// Unity gain in the normalized form: b0 == 1, b1 == a1, b2 == a2.
    /// A 0 dB peaking section lands here regardless of frequency and Q.
    fn is_unity(&self) -> bool {
        (self.b0 - 1.0).abs() <= COEFF_EPSILON
            && (self.b1 - self.a1).abs() <= COEFF_EPSILON
            && (self.b2 - self.a2).abs() <= COEFF_EPSILON
    }
}

/// Single second-order IIR peaking-EQ section with click-free coefficient
/// changes.
///
/// New targets from `set_peaking_eq` are never applied instantly; every
/// `process` call nudges the working coefficients a fixed step toward the
/// target until they converge, so a gain change glides instead of stepping.
#[derive(Debug)]
pub struct BiquadFilter {
    target: Coefficients,
    working: Coefficients,
    converged: bool,
    // Transposed direct-form-II delay line
    z1: f32,
    z2: f32,
}

impl Default for BiquadFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl BiquadFilter {
    /// Start at unity gain (bypassed).
    pub fn new() -> Self {
        Self {
            target: Coefficients::UNITY,
            working: Coefficients::UNITY,
            converged: true,
            z1: 0.0,
            z2: 0.0,
        }
    }

    /// Set the peaking-EQ target via the RBJ Audio-EQ-Cookbook formulas.
    ///
    /// Center frequencies at or above Nyquist are rejected as a logged
    /// no-op; previous coefficients stay in force. The new coefficients are
    /// stored as the target only - `process` interpolates toward them.
    pub fn set_peaking_eq(&mut self, center_hz: f32, sample_rate: u32, q: f32, gain_db: f32) {
        let nyquist = sample_rate as f32 / 2.0;
        if !(center_hz > 0.0) || center_hz >= nyquist || q <= 0.0 {
            warn!(
                "{}: rejecting peaking EQ at {:.1} Hz (Q {:.2}) - Nyquist is {:.1} Hz",
                "BIQUAD".on_magenta().white(),
                center_hz,
                q,
                nyquist
            );
            return;
        }

        let a = 10.0_f32.powf(gain_db / 40.0);
        let w0 = 2.0 * std::f32::consts::PI * center_hz / sample_rate as f32;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / (2.0 * q);

        let b0 = 1.0 + alpha * a;
        let b1 = -2.0 * cos_w0;
        let b2 = 1.0 - alpha * a;
        let a0 = 1.0 + alpha / a;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha / a;

        self.target = Coefficients {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        };
        self.converged = false;
    }

    /// Filter one normalized sample through the transposed DF-II section,
    /// advancing the coefficient interpolation first.
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        if !self.converged {
            self.smooth_coefficients();
        }

        let x = validate_float(input);
        let c = &self.working;
        let y = c.b0 * x + self.z1;
        self.z1 = flush_denormal(c.b1 * x - c.a1 * y + self.z2);
        self.z2 = flush_denormal(c.b2 * x - c.a2 * y);
        validate_float(y)
    }

    /// Move each working coefficient a fixed fraction of its remaining
    /// distance; snap once inside the epsilon. Monotonic - no overshoot.
    fn smooth_coefficients(&mut self) {
        #[inline]
        fn step(working: &mut f32, target: f32) -> bool {
            let delta = target - *working;
            if delta.abs() <= COEFF_EPSILON {
                *working = target;
                true
            } else {
                *working += delta * COEFF_SMOOTHING;
                false
            }
        }

        let mut done = step(&mut self.working.b0, self.target.b0);
        done &= step(&mut self.working.b1, self.target.b1);
        done &= step(&mut self.working.b2, self.target.b2);
        done &= step(&mut self.working.a1, self.target.a1);
        done &= step(&mut self.working.a2, self.target.a2);
        self.converged = done;
    }

    /// True only when both working and target coefficients are unity gain -
    /// a transition still in flight is never reported bypassed, so skipping
    /// a bypassed filter can't truncate an audible glide.
    pub fn is_bypassed(&self) -> bool {
        self.working.is_unity() && self.target.is_unity()
    }

    /// Working coefficients have reached the current target.
    pub fn is_converged(&self) -> bool {
        self.converged
    }

    /// Zero the delay line only - coefficients (working and target) survive.
    /// Called on seek/flush so pre-seek ringing doesn't carry into post-seek
    /// audio.
    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}
