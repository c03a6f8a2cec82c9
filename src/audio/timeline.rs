use crate::audio::decode::AudioDecoder;
use crate::foundation::core::{CHANNELS, SAMPLE_RATE, secs_to_samples};
use crate::foundation::error::{SpectrumError, SpectrumResult};
use crate::playlist::Playlist;
use std::sync::Arc;

/// Position of one track inside a single playlist pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackSpan {
    pub track_id: String,
    pub start_frame: u64,
    pub frames: u64,
}

/// Continuous 48 kHz stereo signal for the whole render: the playlist repeated `loop_count` times.
///
/// Only one decoded pass is held in memory; later loops are views onto the same samples.
#[derive(Clone, Debug)]
pub struct AudioTimeline {
    pass: Arc<[f32]>,
    pass_frames: u64,
    total_frames: u64,
    loop_count: u32,
    spans: Vec<TrackSpan>,
}

impl AudioTimeline {
    /// Build a timeline from one already-fitted interleaved stereo pass.
    pub fn from_pass(pass: Vec<f32>, loop_count: u32, spans: Vec<TrackSpan>) -> SpectrumResult<Self> {
        if loop_count == 0 {
            return Err(SpectrumError::validation("loop_count must be >= 1"));
        }
        if !pass.len().is_multiple_of(usize::from(CHANNELS)) {
            return Err(SpectrumError::validation(
                "timeline pass must hold whole stereo frames",
            ));
        }
        let pass_frames = (pass.len() / usize::from(CHANNELS)) as u64;
        Ok(Self {
            pass: pass.into(),
            pass_frames,
            total_frames: pass_frames * u64::from(loop_count),
            loop_count,
            spans,
        })
    }

    /// Override the total length so it matches `loop_count * sum(durations)` exactly.
    fn with_total_frames(mut self, total_frames: u64) -> Self {
        self.total_frames = total_frames;
        self
    }

    pub fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    pub fn channels(&self) -> u16 {
        CHANNELS
    }

    pub fn loop_count(&self) -> u32 {
        self.loop_count
    }

    /// Track layout of one pass.
    pub fn spans(&self) -> &[TrackSpan] {
        &self.spans
    }

    pub fn pass_frames(&self) -> u64 {
        self.pass_frames
    }

    /// Total sample frames across all loops.
    pub fn len_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn duration_secs(&self) -> f64 {
        self.total_frames as f64 / f64::from(SAMPLE_RATE)
    }

    /// Stereo sample frame at absolute index `idx` (silence past the end).
    pub fn frame(&self, idx: u64) -> [f32; 2] {
        match self.pass_index(idx) {
            Some(i) => [self.pass[i * 2], self.pass[i * 2 + 1]],
            None => [0.0, 0.0],
        }
    }

    /// Copy interleaved frames starting at `start` into `out` (whose length must be even).
    ///
    /// Frames past the end of the timeline are written as silence.
    pub fn copy_frames(&self, start: u64, out: &mut [f32]) {
        let ch = usize::from(CHANNELS);
        let mut written = 0usize;
        let mut cursor = start;
        while written < out.len() {
            let remaining = (out.len() - written) / ch;
            if remaining == 0 {
                break;
            }
            let Some(local) = self.pass_index(cursor) else {
                out[written..].fill(0.0);
                return;
            };
            let run_in_pass = (self.pass_frames as usize) - local;
            let run_in_total = (self.total_frames - cursor) as usize;
            let run = remaining.min(run_in_pass).min(run_in_total);
            out[written..written + run * ch]
                .copy_from_slice(&self.pass[local * ch..(local + run) * ch]);
            written += run * ch;
            cursor += run as u64;
        }
    }

    /// Materialize the full looped signal. Intended for tests and short renders.
    pub fn to_interleaved(&self) -> Vec<f32> {
        let mut out = vec![0.0; self.total_frames as usize * usize::from(CHANNELS)];
        self.copy_frames(0, &mut out);
        out
    }

    fn pass_index(&self, idx: u64) -> Option<usize> {
        if idx >= self.total_frames || self.pass_frames == 0 {
            return None;
        }
        let looped_len = self.pass_frames * u64::from(self.loop_count);
        if idx >= looped_len {
            return None;
        }
        Some((idx % self.pass_frames) as usize)
    }
}

/// Decode every track once and lay the playlist out `loop_count` times.
///
/// Each decoded track is fitted (truncated or padded with silence) to its declared duration so the
/// audio length always matches the video timeline. Any decode failure aborts the whole timeline.
#[tracing::instrument(skip_all, fields(tracks = playlist.len(), loop_count))]
pub fn compose_timeline(
    playlist: &Playlist,
    loop_count: u32,
    decoder: &dyn AudioDecoder,
) -> SpectrumResult<AudioTimeline> {
    if playlist.is_empty() {
        return Err(SpectrumError::validation("playlist is empty"));
    }
    if loop_count == 0 {
        return Err(SpectrumError::validation("loop_count must be >= 1"));
    }

    let ch = usize::from(CHANNELS);
    let pass_frames = secs_to_samples(playlist.total_duration_secs(), SAMPLE_RATE);
    let mut pass = Vec::<f32>::with_capacity(pass_frames as usize * ch);
    let mut spans = Vec::with_capacity(playlist.len());
    let mut cum_secs = 0.0f64;

    for (i, track) in playlist.tracks().iter().enumerate() {
        let pcm = decoder.decode(track).map_err(|e| {
            SpectrumError::decode(format!(
                "track {} '{}' ({}): {}",
                i + 1,
                track.name(),
                track.id(),
                strip_prefix(&e)
            ))
        })?;
        let samples = pcm.into_pipeline_format().map_err(|e| {
            SpectrumError::decode(format!("track '{}': {}", track.id(), strip_prefix(&e)))
        })?;

        // Cumulative rounding keeps the pass length equal to round(sum(durations) * rate).
        let start = secs_to_samples(cum_secs, SAMPLE_RATE);
        cum_secs += track.duration_secs();
        let end = secs_to_samples(cum_secs, SAMPLE_RATE);
        let want = (end - start) as usize;

        let have = samples.len() / ch;
        if have.abs_diff(want) > SAMPLE_RATE as usize / 10 {
            tracing::warn!(
                track = track.id(),
                declared_frames = want,
                decoded_frames = have,
                "decoded length differs from declared duration; fitting"
            );
        }
        let take = have.min(want);
        pass.extend_from_slice(&samples[..take * ch]);
        pass.resize(pass.len() + (want - take) * ch, 0.0);

        spans.push(TrackSpan {
            track_id: track.id().to_owned(),
            start_frame: start,
            frames: want as u64,
        });
        tracing::debug!(track = track.id(), frames = want, "track decoded");
    }

    let total_frames = secs_to_samples(
        playlist.total_duration_secs() * f64::from(loop_count),
        SAMPLE_RATE,
    );
    let timeline = AudioTimeline::from_pass(pass, loop_count, spans)?.with_total_frames(total_frames);
    tracing::info!(
        duration_secs = timeline.duration_secs(),
        frames = timeline.len_frames(),
        "audio timeline composed"
    );
    Ok(timeline)
}

fn strip_prefix(e: &SpectrumError) -> String {
    match e {
        SpectrumError::Decode(msg) => msg.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/audio/timeline.rs"]
mod tests;
