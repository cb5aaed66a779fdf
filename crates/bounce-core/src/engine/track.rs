//! Per-track mix pipeline
//!
//! A [`TrackMixer`] owns one input's cursor, staging queue and resampler.
//! The engine asks it for up to `max_out` floats per block, either straight
//! through at the output rate or via the variable-rate path that stages
//! samples, applies the warp factor per slice and resamples.
//!
//! Backward playback reads the mirror window `[pos - len, pos)` of the
//! forward `[pos, pos + len)` and reverses it after envelope application,
//! so reverse playback over an interval yields exactly the reversed forward
//! samples.

use std::sync::Arc;

use crate::envelope::WarpEnvelope;
use crate::queue::{SampleQueue, PROCESS_LEN, QUEUE_MAX_LEN};
use crate::resample::Resampler;
use crate::source::{SampleSource, SourceResult};
use crate::types::{Sample, SampleIndex};
use crate::warp::warp_factor;

/// Engine-wide parameters a track sees while mixing one block
pub(crate) struct MixParams<'a> {
    pub t0: f64,
    pub t1: f64,
    pub out_rate: f64,
    pub speed: f64,
    pub envelope: Option<&'a dyn WarpEnvelope>,
    pub strict: bool,
}

impl MixParams<'_> {
    pub fn backwards(&self) -> bool {
        self.t1 < self.t0
    }
}

/// Clamp a sample-count estimate into `[0, max]`
fn limit_len(max: usize, want: f64) -> usize {
    if want <= 0.0 {
        0
    } else if want >= max as f64 {
        max
    } else {
        want as usize
    }
}

/// Per-input mix state: cursor, staging queue, resampler, envelope scratch
pub(crate) struct TrackMixer {
    source: Arc<dyn SampleSource>,
    pos: SampleIndex,
    queue: SampleQueue,
    resampler: Box<dyn Resampler>,
    env_values: Vec<Sample>,
}

impl TrackMixer {
    pub fn new(
        source: Arc<dyn SampleSource>,
        start_time: f64,
        resampler: Box<dyn Resampler>,
        buffer_size: usize,
    ) -> Self {
        let pos = source.time_to_samples(start_time);
        Self {
            source,
            pos,
            queue: SampleQueue::new(),
            resampler,
            env_values: vec![0.0; QUEUE_MAX_LEN.max(buffer_size)],
        }
    }

    pub fn source(&self) -> &Arc<dyn SampleSource> {
        &self.source
    }

    /// Sample index of the next read boundary
    pub fn position(&self) -> SampleIndex {
        self.pos
    }

    /// Move the cursor to `time` and drop staged samples
    pub fn reposition(&mut self, time: f64) {
        self.pos = self.source.time_to_samples(time);
        self.queue.clear();
    }

    /// Swap in a fresh resampler (a flushed one cannot be fed again)
    pub fn replace_resampler(&mut self, resampler: Box<dyn Resampler>) {
        self.resampler = resampler;
    }

    /// End of the mixable span for the current direction
    fn end_time(&self, params: &MixParams<'_>) -> f64 {
        if params.backwards() {
            self.source.start_time().max(params.t1)
        } else {
            self.source.end_time().min(params.t1)
        }
    }

    /// Produce up to `max_out` samples with no rate conversion
    pub fn mix_same_rate(
        &mut self,
        max_out: usize,
        out: &mut [Sample],
        params: &MixParams<'_>,
    ) -> SourceResult<usize> {
        let rate = self.source.sample_rate() as f64;
        let backwards = params.backwards();
        let t = self.pos as f64 / rate;
        let t_end = self.end_time(params);

        // nothing left of the selection or the track in this direction
        if backwards && t <= t_end || !backwards && t >= t_end {
            return Ok(0);
        }

        let span = if backwards { t - t_end } else { t_end - t };
        let slen = limit_len(max_out, (span * rate + 0.5).floor());
        if slen == 0 {
            return Ok(0);
        }

        let read_start = if backwards {
            self.pos - slen as SampleIndex
        } else {
            self.pos
        };
        read_or_silence(&self.source, read_start, &mut out[..slen], params.strict)?;
        self.source
            .envelope_values(&mut self.env_values[..slen], read_start as f64 / rate);
        for (s, &e) in out[..slen].iter_mut().zip(self.env_values.iter()) {
            *s *= e;
        }
        if backwards {
            out[..slen].reverse();
            self.pos -= slen as SampleIndex;
        } else {
            self.pos += slen as SampleIndex;
        }

        debug_assert!(slen <= max_out);
        Ok(slen)
    }

    /// Produce up to `max_out` samples through the staging queue and
    /// resampler, applying the warp factor per slice
    pub fn mix_variable_rates(
        &mut self,
        max_out: usize,
        out: &mut [Sample],
        params: &MixParams<'_>,
    ) -> SourceResult<usize> {
        let rate = self.source.sample_rate() as f64;
        let tstep = 1.0 / rate;
        let backwards = params.backwards();
        let base_factor = params.out_rate / params.speed / rate;
        let end_pos = self.source.time_to_samples(self.end_time(params));

        // play-order time at the front of the staged window; the resampler's
        // actual consumption drives it forward, so it can drift slightly
        // against the envelope's notion of warped time near interval ends
        let queued = self.queue.len() as SampleIndex;
        let mut t = (self.pos + if backwards { queued } else { -queued }) as f64 / rate;

        let mut written = 0;
        while written < max_out {
            if self.queue.needs_refill() {
                let remaining = if backwards {
                    self.pos - end_pos
                } else {
                    end_pos - self.pos
                };
                let n_wanted = limit_len(self.queue.free(), remaining as f64);
                let read_start = if backwards {
                    self.pos - n_wanted as SampleIndex
                } else {
                    self.pos
                };

                let source = &self.source;
                let env_values = &mut self.env_values;
                let strict = params.strict;
                let got = self.queue.refill(n_wanted, backwards, |tail| {
                    read_or_silence(source, read_start, tail, strict)?;
                    let env = &mut env_values[..tail.len()];
                    source.envelope_values(env, read_start as f64 / rate);
                    for (s, &e) in tail.iter_mut().zip(env.iter()) {
                        *s *= e;
                    }
                    Ok(())
                })?;
                if backwards {
                    self.pos -= got as SampleIndex;
                } else {
                    self.pos += got as SampleIndex;
                }
            }

            let slice_len = self.queue.len().min(PROCESS_LEN);
            let is_last = self.queue.len() < PROCESS_LEN;

            let mut factor = base_factor;
            if let Some(envelope) = params.envelope {
                if slice_len > 0 {
                    let span = slice_len as f64 / rate;
                    factor *= if backwards {
                        warp_factor(envelope, t - span + tstep, t + tstep)
                    } else {
                        warp_factor(envelope, t, t + span)
                    };
                }
            }

            let (used, produced) = self.resampler.process(
                factor,
                &self.queue.as_slice()[..slice_len],
                is_last,
                &mut out[written..],
                max_out - written,
            );
            self.queue.consume(used);
            written += produced;
            t += used as f64 / rate * if backwards { -1.0 } else { 1.0 };

            if is_last {
                break;
            }
        }

        debug_assert!(written <= max_out);
        Ok(written)
    }
}

/// Read a span from the source, substituting silence for unavailable data
/// (and for failures unless `strict`)
fn read_or_silence(
    source: &Arc<dyn SampleSource>,
    start: SampleIndex,
    out: &mut [Sample],
    strict: bool,
) -> SourceResult<()> {
    match source.read_floats(start, out) {
        Ok(true) => Ok(()),
        Ok(false) => {
            out.fill(0.0);
            Ok(())
        }
        Err(e) => {
            if strict {
                return Err(e);
            }
            log::warn!("substituting silence for failed read at {}: {}", start, e);
            out.fill(0.0);
            Ok(())
        }
    }
}
