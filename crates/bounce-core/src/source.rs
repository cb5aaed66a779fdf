//! Sample sources - the engine's view of an input track
//!
//! A [`SampleSource`] is a random-access store of float samples plus the
//! track metadata the mixer needs: native rate, channel designation, time
//! span, per-channel gains and a sampled gain envelope. Sample indices are
//! absolute: index `i` holds the sample for time `i / rate`, and everything
//! outside `[start_time, end_time]` reads as silence.

use thiserror::Error;

use crate::envelope::PiecewiseCurve;
use crate::types::{ChannelKind, Sample, SampleIndex};

/// Errors raised by sample-source reads
#[derive(Error, Debug)]
pub enum SourceError {
    /// The backing store failed to produce samples
    #[error("sample read failed at index {index}: {reason}")]
    Read { index: SampleIndex, reason: String },
}

/// Result type for sample-source operations
pub type SourceResult<T> = Result<T, SourceError>;

/// Random-access view of one input track
pub trait SampleSource {
    /// Native sample rate in Hz, always positive
    fn sample_rate(&self) -> u32;

    /// Channel designation used when no route map overrides it
    fn channel(&self) -> ChannelKind {
        ChannelKind::Mono
    }

    /// Length of the contiguous input run this source leads
    ///
    /// Multi-channel material is presented as a run of consecutive sources;
    /// the leader reports the run length and the rest keep the default.
    fn channel_group_size(&self) -> usize {
        1
    }

    /// Time of the first sample in seconds
    fn start_time(&self) -> f64;

    /// Time just past the last sample in seconds
    fn end_time(&self) -> f64;

    /// Gain applied when this track feeds output channel `channel`
    fn channel_gain(&self, _channel: usize) -> f32 {
        1.0
    }

    /// Fill `out[i]` with the gain envelope at `start_time + i / rate`
    fn envelope_values(&self, out: &mut [Sample], _start_time: f64) {
        out.fill(1.0);
    }

    /// Map a time in seconds to a sample index, rounding half up
    fn time_to_samples(&self, t: f64) -> SampleIndex {
        (t * self.sample_rate() as f64 + 0.5).floor() as SampleIndex
    }

    /// Read `out.len()` consecutive samples starting at index `start`
    ///
    /// `Ok(true)` means `out` was filled; `Ok(false)` means the data is
    /// unavailable and the caller substitutes silence; `Err` is a read
    /// failure the caller may propagate or silence depending on policy.
    fn read_floats(&self, start: SampleIndex, out: &mut [Sample]) -> SourceResult<bool>;
}

/// In-memory sample source
///
/// Holds a fully decoded track and serves reads straight from the vector.
/// Useful for pre-rendered material and as the reference source in tests.
#[derive(Debug, Clone)]
pub struct BufferSource {
    samples: Vec<Sample>,
    rate: u32,
    channel: ChannelKind,
    group_size: usize,
    start_time: f64,
    channel_gains: Vec<f32>,
    gain_curve: Option<PiecewiseCurve>,
}

impl BufferSource {
    /// Create a source over decoded samples at the given rate
    pub fn new(samples: Vec<Sample>, rate: u32) -> Self {
        assert!(rate > 0, "sample rate must be positive");
        Self {
            samples,
            rate,
            channel: ChannelKind::Mono,
            group_size: 1,
            start_time: 0.0,
            channel_gains: Vec::new(),
            gain_curve: None,
        }
    }

    /// Set the channel designation
    pub fn with_channel(mut self, channel: ChannelKind) -> Self {
        self.channel = channel;
        self
    }

    /// Mark this source as the leader of a run of `n` consecutive inputs
    pub fn with_group_size(mut self, n: usize) -> Self {
        assert!(n >= 1, "a channel run has at least one member");
        self.group_size = n;
        self
    }

    /// Place the first sample at `t` seconds instead of zero
    pub fn with_start_time(mut self, t: f64) -> Self {
        self.start_time = t;
        self
    }

    /// Set per-output-channel gains (missing entries default to 1.0)
    pub fn with_channel_gains(mut self, gains: Vec<f32>) -> Self {
        self.channel_gains = gains;
        self
    }

    /// Attach a gain envelope sampled over time
    pub fn with_gain_curve(mut self, curve: PiecewiseCurve) -> Self {
        self.gain_curve = Some(curve);
        self
    }

    /// Number of samples held
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the source holds no samples
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl SampleSource for BufferSource {
    fn sample_rate(&self) -> u32 {
        self.rate
    }

    fn channel(&self) -> ChannelKind {
        self.channel
    }

    fn channel_group_size(&self) -> usize {
        self.group_size
    }

    fn start_time(&self) -> f64 {
        self.start_time
    }

    fn end_time(&self) -> f64 {
        self.start_time + self.samples.len() as f64 / self.rate as f64
    }

    fn channel_gain(&self, channel: usize) -> f32 {
        self.channel_gains.get(channel).copied().unwrap_or(1.0)
    }

    fn envelope_values(&self, out: &mut [Sample], start_time: f64) {
        match &self.gain_curve {
            Some(curve) => {
                let step = 1.0 / self.rate as f64;
                for (i, v) in out.iter_mut().enumerate() {
                    *v = curve.value_at(start_time + i as f64 * step) as f32;
                }
            }
            None => out.fill(1.0),
        }
    }

    fn read_floats(&self, start: SampleIndex, out: &mut [Sample]) -> SourceResult<bool> {
        let first = self.time_to_samples(self.start_time);
        for (i, v) in out.iter_mut().enumerate() {
            let idx = start + i as SampleIndex - first;
            *v = if idx >= 0 && (idx as usize) < self.samples.len() {
                self.samples[idx as usize]
            } else {
                0.0
            };
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_inside_and_outside_span() {
        let source = BufferSource::new(vec![1.0, 2.0, 3.0], 44100);
        let mut out = [0.0f32; 5];
        source.read_floats(-1, &mut out).unwrap();
        assert_eq!(out, [0.0, 1.0, 2.0, 3.0, 0.0]);
    }

    #[test]
    fn test_start_time_offsets_indices() {
        // one second in: content begins at index 44100
        let source = BufferSource::new(vec![0.5, 0.6], 44100).with_start_time(1.0);
        let mut out = [0.0f32; 2];
        source.read_floats(44100, &mut out).unwrap();
        assert_eq!(out, [0.5, 0.6]);
        assert!((source.end_time() - (1.0 + 2.0 / 44100.0)).abs() < 1e-9);
    }

    #[test]
    fn test_time_to_samples_rounds_half_up() {
        let source = BufferSource::new(vec![0.0; 4], 10);
        assert_eq!(source.time_to_samples(0.25), 3); // 2.5 rounds up
        assert_eq!(source.time_to_samples(0.24), 2);
        assert_eq!(source.time_to_samples(-0.25), -2); // -2.5 rounds toward -2
    }

    #[test]
    fn test_envelope_defaults_to_identity() {
        let source = BufferSource::new(vec![0.0; 4], 44100);
        let mut env = [0.0f32; 4];
        source.envelope_values(&mut env, 0.0);
        assert_eq!(env, [1.0; 4]);
    }

    #[test]
    fn test_envelope_from_curve() {
        let curve = PiecewiseCurve::new(vec![(0.0, 0.0), (1.0, 1.0)]);
        let source = BufferSource::new(vec![0.0; 4], 4).with_gain_curve(curve);
        let mut env = [0.0f32; 4];
        source.envelope_values(&mut env, 0.0);
        assert!((env[0] - 0.0).abs() < 1e-6);
        assert!((env[1] - 0.25).abs() < 1e-6);
        assert!((env[3] - 0.75).abs() < 1e-6);
    }
}
