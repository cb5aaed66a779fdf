//! Warp configuration - playback speed ranges and resample factors
//!
//! [`WarpOptions`] describes how playback time relates to track time:
//! driven by an envelope, bounded by a speed range, or constant. From it and
//! the output rate, [`ResampleParameters`] derives the per-track factor
//! range each resampler must be built for.

use std::sync::Arc;

use crate::envelope::WarpEnvelope;
use crate::source::SampleSource;

/// Time-warp configuration for a mixdown
#[derive(Clone)]
pub struct WarpOptions {
    /// Speed envelope, when the rate varies over time
    pub envelope: Option<Arc<dyn WarpEnvelope>>,
    /// Lower bound of the speed range; zero disables the range
    pub min_speed: f64,
    /// Upper bound of the speed range; zero disables the range
    pub max_speed: f64,
    /// Playback speed the mixdown starts at
    pub initial_speed: f64,
}

impl Default for WarpOptions {
    fn default() -> Self {
        Self {
            envelope: None,
            min_speed: 0.0,
            max_speed: 0.0,
            initial_speed: 1.0,
        }
    }
}

impl WarpOptions {
    /// Constant-rate playback at unit speed
    pub fn constant() -> Self {
        Self::default()
    }

    /// Variable rate driven by a speed envelope
    pub fn from_envelope(envelope: Arc<dyn WarpEnvelope>) -> Self {
        Self {
            envelope: Some(envelope),
            ..Self::default()
        }
    }

    /// Variable rate bounded by `[min, max]`, starting at `initial`
    pub fn from_speed_range(min: f64, max: f64, initial: f64) -> Self {
        assert!(min >= 0.0 && max >= 0.0, "speed bounds must not be negative");
        assert!(min <= max, "speed bounds must be ordered");
        Self {
            envelope: None,
            min_speed: min,
            max_speed: max,
            initial_speed: initial,
        }
    }

    /// Whether this configuration requires variable-rate resampling
    pub fn is_variable(&self) -> bool {
        self.envelope.is_some() || (self.min_speed > 0.0 && self.max_speed > 0.0)
    }
}

/// Per-track resample factor ranges derived from the warp configuration
///
/// The factor for track `i` is `out_rate / track_rate`, widened by the
/// effective speed range: a faster possible speed lowers the minimum factor
/// and a slower one raises the maximum.
#[derive(Debug, Clone, Default)]
pub struct ResampleParameters {
    /// Whether any input needs variable-rate conversion
    pub variable_rates: bool,
    /// Per-track lower factor bound
    pub min_factor: Vec<f64>,
    /// Per-track upper factor bound
    pub max_factor: Vec<f64>,
}

impl ResampleParameters {
    /// Derive factor ranges for `inputs` mixed at `out_rate` under `warp`
    pub fn new(inputs: &[Arc<dyn SampleSource>], out_rate: f64, warp: &WarpOptions) -> Self {
        let mut params = Self {
            variable_rates: false,
            min_factor: Vec::with_capacity(inputs.len()),
            max_factor: Vec::with_capacity(inputs.len()),
        };
        for source in inputs {
            let factor = out_rate / source.sample_rate() as f64;
            let (min, max) = if let Some(envelope) = &warp.envelope {
                params.variable_rates = true;
                (factor / envelope.range_upper(), factor / envelope.range_lower())
            } else if warp.min_speed > 0.0 && warp.max_speed > 0.0 {
                params.variable_rates = true;
                (factor / warp.max_speed, factor / warp.min_speed)
            } else {
                (factor, factor)
            };
            assert!(
                min.is_finite() && max.is_finite() && min > 0.0 && min <= max,
                "resample factors must be finite, positive and ordered"
            );
            params.min_factor.push(min);
            params.max_factor.push(max);
        }
        params
    }
}

/// Average warp factor over `[t0, t1]`
///
/// This is the relative length increase of the warped interval: a slow
/// envelope stretches the output, so the factor grows above one.
pub fn warp_factor(envelope: &dyn WarpEnvelope, t0: f64, t1: f64) -> f64 {
    envelope.average_of_inverse(t0, t1)
}
