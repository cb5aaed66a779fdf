//! Mixdown orchestration
//!
//! [`Mixer`] pulls blocks from every input track, applies per-channel gains
//! and routing while summing into channel accumulators, then converts the
//! accumulated floats to the output format with dither.
//!
//! The engine is single-threaded cooperative: the caller drives progress by
//! calling [`Mixer::process`] repeatedly over the configured time interval,
//! forward or backward, and reads the converted bytes between calls.

use std::sync::Arc;

use crate::dither::{write_samples, DitherMode, HIGH_QUALITY_DITHER, LOW_QUALITY_DITHER};
use crate::envelope::WarpEnvelope;
use crate::resample::{LinearResamplerFactory, ResamplerFactory};
use crate::routing::RouteMap;
use crate::source::{SampleSource, SourceResult};
use crate::types::{ChannelKind, Sample, SampleFormat};
use crate::warp::{ResampleParameters, WarpOptions};

use super::track::{MixParams, TrackMixer};

/// Configuration for a mixdown session
pub struct MixerOptions {
    /// Propagate source read failures instead of substituting silence
    pub strict: bool,
    /// Time-warp configuration
    pub warp: WarpOptions,
    /// Interval start in seconds; above `stop_time` plays in reverse
    pub start_time: f64,
    /// Interval end in seconds
    pub stop_time: f64,
    /// Output channel count
    pub channels: usize,
    /// Block capacity in samples per channel
    pub buffer_size: usize,
    /// Output sample rate in Hz
    pub rate: f64,
    /// Output sample format
    pub format: SampleFormat,
    /// One interleaved buffer instead of a buffer per channel
    pub interleaved: bool,
    /// High-quality resampling and dither
    pub high_quality: bool,
    /// Custom routing; ignored unless its dimensions match the mix
    pub route_map: Option<RouteMap>,
    /// Apply per-track channel gains while summing
    pub apply_gains: bool,
    /// Builds one resampler per input track
    pub resampler_factory: Box<dyn ResamplerFactory>,
}

impl Default for MixerOptions {
    fn default() -> Self {
        Self {
            strict: false,
            warp: WarpOptions::default(),
            start_time: 0.0,
            stop_time: 0.0,
            channels: 2,
            buffer_size: 4096,
            rate: 44100.0,
            format: SampleFormat::Float32,
            interleaved: true,
            high_quality: true,
            route_map: None,
            apply_gains: true,
            resampler_factory: Box::new(LinearResamplerFactory),
        }
    }
}

/// Offline mixdown engine over a fixed set of input tracks
pub struct Mixer {
    tracks: Vec<TrackMixer>,
    channels: usize,
    buffer_size: usize,
    rate: f64,
    format: SampleFormat,
    interleaved: bool,
    high_quality: bool,
    apply_gains: bool,
    strict: bool,
    route_map: Option<RouteMap>,
    envelope: Option<Arc<dyn WarpEnvelope>>,
    resample_params: ResampleParameters,
    resampler_factory: Box<dyn ResamplerFactory>,
    t0: f64,
    t1: f64,
    time: f64,
    speed: f64,
    /// Per-run scratch, one slot larger than a block: resamplers may touch
    /// one element past the region they fill
    scratch: [Vec<Sample>; 2],
    /// Channel accumulators, `channels` rows of `buffer_size`
    accum: Vec<Vec<Sample>>,
    /// Converted output: one interleaved buffer, or one per channel
    out: Vec<Vec<u8>>,
    flags: Vec<bool>,
    gains: Vec<f32>,
}

impl Mixer {
    /// Create an engine mixing `inputs` over the configured interval
    ///
    /// The input set is fixed for the engine's lifetime. Sources are shared
    /// handles; the caller keeps them alive and must not mutate their
    /// contents while a block is being processed.
    pub fn new(inputs: Vec<Arc<dyn SampleSource>>, options: MixerOptions) -> Self {
        let MixerOptions {
            strict,
            warp,
            start_time,
            stop_time,
            channels,
            buffer_size,
            rate,
            format,
            interleaved,
            high_quality,
            route_map,
            apply_gains,
            resampler_factory,
        } = options;

        assert!(channels > 0, "mix needs at least one output channel");
        assert!(buffer_size > 0, "mix needs a non-empty block buffer");
        assert!(rate.is_finite() && rate > 0.0, "output rate must be positive");
        assert!(warp.initial_speed.is_finite(), "playback speed must be finite");

        let resample_params = ResampleParameters::new(&inputs, rate, &warp);
        let route_map = route_map.filter(|map| {
            let matches = map.num_channels() == channels && map.num_tracks() == inputs.len();
            if !matches {
                log::warn!(
                    "route map is {}x{} but the mix is {}x{}; ignoring it",
                    map.num_tracks(),
                    map.num_channels(),
                    inputs.len(),
                    channels
                );
            }
            matches
        });

        let tracks: Vec<TrackMixer> = inputs
            .into_iter()
            .enumerate()
            .map(|(i, source)| {
                let resampler = resampler_factory.make(
                    high_quality,
                    resample_params.min_factor[i],
                    resample_params.max_factor[i],
                );
                TrackMixer::new(source, start_time, resampler, buffer_size)
            })
            .collect();

        let sample_bytes = format.bytes_per_sample();
        let out = if interleaved {
            vec![vec![0u8; buffer_size * channels * sample_bytes]]
        } else {
            vec![vec![0u8; buffer_size * sample_bytes]; channels]
        };

        Self {
            tracks,
            channels,
            buffer_size,
            rate,
            format,
            interleaved,
            high_quality,
            apply_gains,
            strict,
            route_map,
            envelope: warp.envelope.clone(),
            resample_params,
            resampler_factory,
            t0: start_time,
            t1: stop_time,
            time: start_time,
            speed: warp.initial_speed,
            scratch: [vec![0.0; buffer_size + 1], vec![0.0; buffer_size + 1]],
            accum: vec![vec![0.0; buffer_size]; channels],
            out,
            flags: vec![false; channels],
            gains: vec![1.0; channels],
        }
    }

    /// Block capacity in samples per channel
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Mix the next block of up to `max_to_process` samples per channel
    ///
    /// Returns how many samples every output channel received; short counts
    /// mean the interval or the tracks ran out, and later calls return zero.
    /// In strict mode a failed source read aborts the block with the error;
    /// cursors may have advanced, so reposition before resuming.
    pub fn process(&mut self, max_to_process: usize) -> SourceResult<usize> {
        assert!(
            max_to_process <= self.buffer_size,
            "block exceeds the configured buffer size"
        );

        for acc in &mut self.accum {
            acc.fill(0.0);
        }
        if !self.apply_gains {
            self.gains.fill(1.0);
        }

        let backwards = self.t0 > self.t1;
        let mut max_out = 0;
        let mut new_time = self.time;
        let mut mixed = [0usize; 2];

        let n_tracks = self.tracks.len();
        let mut i = 0;
        while i < n_tracks {
            let n_in = self.tracks[i].source().channel_group_size().max(1);
            assert!(i + n_in <= n_tracks, "channel run exceeds the input list");
            // runs wider than the scratch pair mix only their first two members
            let limit = n_in.min(self.scratch.len());

            let params = MixParams {
                t0: self.t0,
                t1: self.t1,
                out_rate: self.rate,
                speed: self.speed,
                envelope: self.envelope.as_deref(),
                strict: self.strict,
            };

            for j in 0..limit {
                let ii = i + j;
                let track_rate = self.tracks[ii].source().sample_rate() as f64;
                let track = &mut self.tracks[ii];
                let buf = &mut self.scratch[j];
                let result = if self.resample_params.variable_rates || track_rate != self.rate {
                    track.mix_variable_rates(max_to_process, buf, &params)?
                } else {
                    track.mix_same_rate(max_to_process, buf, &params)?
                };
                mixed[j] = result;
                max_out = max_out.max(result);

                let new_t = self.tracks[ii].position() as f64 / track_rate;
                new_time = if backwards {
                    new_time.min(new_t)
                } else {
                    new_time.max(new_t)
                };
            }

            for j in 0..limit {
                let ii = i + j;
                let source = self.tracks[ii].source();
                if self.apply_gains {
                    for c in 0..self.channels {
                        self.gains[c] = source.channel_gain(c);
                    }
                }

                self.flags.fill(false);
                if let Some(map) = &self.route_map {
                    for c in 0..self.channels {
                        self.flags[c] = map.is_routed(ii, c);
                    }
                } else {
                    match source.channel() {
                        ChannelKind::Mono => self.flags.fill(true),
                        ChannelKind::Left => self.flags[0] = true,
                        ChannelKind::Right => {
                            let c = if self.channels >= 2 { 1 } else { 0 };
                            self.flags[c] = true;
                        }
                    }
                }

                // the actual mixing: sum this run member into its channels
                let len = mixed[j];
                let src = &self.scratch[j][..len];
                for c in 0..self.channels {
                    if !self.flags[c] {
                        continue;
                    }
                    let gain = self.gains[c];
                    for (dst, &s) in self.accum[c][..len].iter_mut().zip(src.iter()) {
                        *dst += s * gain;
                    }
                }
            }

            i += n_in;
        }

        self.time = if backwards {
            new_time.clamp(self.t1, self.time)
        } else {
            new_time.clamp(self.time, self.t1)
        };

        let dither = if self.format.is_integer() {
            if self.high_quality {
                HIGH_QUALITY_DITHER
            } else {
                LOW_QUALITY_DITHER
            }
        } else {
            DitherMode::None
        };
        for c in 0..self.channels {
            let (buf, start, stride) = if self.interleaved {
                (&mut self.out[0], c, self.channels)
            } else {
                (&mut self.out[c], 0, 1)
            };
            write_samples(&self.accum[c][..max_out], buf, start, stride, self.format, dither);
        }

        debug_assert!(max_out <= max_to_process);
        Ok(max_out)
    }

    /// Converted output bytes: the interleaved buffer, or channel zero
    pub fn buffer(&self) -> &[u8] {
        &self.out[0]
    }

    /// Converted output bytes for one channel of a planar mix
    pub fn channel_buffer(&self, channel: usize) -> &[u8] {
        &self.out[channel]
    }

    /// Current mix time in seconds, driven by the track cursors
    pub fn current_time(&self) -> f64 {
        self.time
    }

    /// Jump to `time`, clamped into the mix interval
    ///
    /// Dropping staged samples is always safe; `skipping` additionally
    /// rebuilds every resampler, which is required once one has flushed.
    pub fn reposition(&mut self, time: f64, skipping: bool) {
        let (lo, hi) = if self.t1 < self.t0 {
            (self.t1, self.t0)
        } else {
            (self.t0, self.t1)
        };
        self.time = time.clamp(lo, hi);
        log::debug!("repositioning to {:.6}s (skipping: {})", self.time, skipping);
        for track in &mut self.tracks {
            track.reposition(self.time);
        }
        if skipping {
            self.make_resamplers();
        }
    }

    /// Set a new interval and playback speed, then jump to its start
    pub fn set_times_and_speed(&mut self, t0: f64, t1: f64, speed: f64, skipping: bool) {
        assert!(speed.is_finite(), "playback speed must be finite");
        self.t0 = t0;
        self.t1 = t1;
        self.speed = speed.abs();
        self.reposition(t0, skipping);
    }

    /// Adjust the scrub speed, flipping direction when the sign disagrees
    ///
    /// A flip opens the interval wide (zero to the largest finite time);
    /// mixing never reads outside a track's span, so the open bound is safe.
    pub fn set_speed_for_keyboard_scrubbing(&mut self, speed: f64, start_time: f64) {
        assert!(speed.is_finite(), "playback speed must be finite");
        if (speed > 0.0 && self.t1 < self.t0) || (speed < 0.0 && self.t1 > self.t0) {
            if speed > 0.0 {
                self.t0 = 0.0;
                self.t1 = f64::MAX;
            } else {
                self.t0 = f64::MAX;
                self.t1 = 0.0;
            }
            self.reposition(start_time, true);
        }
        self.speed = speed.abs();
    }

    fn make_resamplers(&mut self) {
        for (i, track) in self.tracks.iter_mut().enumerate() {
            track.replace_resampler(self.resampler_factory.make(
                self.high_quality,
                self.resample_params.min_factor[i],
                self.resample_params.max_factor[i],
            ));
        }
    }
}
