use crate::audio::analyser::{FrequencyData, SpectrumAnalyser};
use crate::audio::timeline::AudioTimeline;
use crate::foundation::core::{CHANNELS, Fps, FrameIndex, SAMPLE_RATE, frame_to_sample, secs_to_samples};
use crate::foundation::error::{SpectrumError, SpectrumResult};
use std::sync::Arc;

/// Job-scoped audio graph: a cursor over the composed timeline feeding a frequency analyser.
///
/// The cursor only moves forward. Querying the spectrum analyses the `fft_size` samples ending at
/// the cursor, zero-padded before the start of the timeline.
#[derive(Debug)]
pub struct AudioGraph {
    timeline: Arc<AudioTimeline>,
    analyser: SpectrumAnalyser,
    cursor: u64,
    stereo: Vec<f32>,
    mono: Vec<f32>,
}

impl AudioGraph {
    pub fn new(timeline: Arc<AudioTimeline>, fft_size: usize, smoothing: f64) -> SpectrumResult<Self> {
        let analyser = SpectrumAnalyser::new(fft_size, smoothing)?;
        Ok(Self {
            timeline,
            analyser,
            cursor: 0,
            stereo: vec![0.0; fft_size * usize::from(CHANNELS)],
            mono: vec![0.0; fft_size],
        })
    }

    /// Move the cursor to virtual time `t_secs`.
    pub fn advance_to(&mut self, t_secs: f64) -> SpectrumResult<()> {
        if !t_secs.is_finite() || t_secs < 0.0 {
            return Err(SpectrumError::validation(format!(
                "audio graph time must be finite and >= 0, got {t_secs}"
            )));
        }
        self.advance_to_sample(secs_to_samples(t_secs, SAMPLE_RATE))
    }

    /// Move the cursor to the sample that corresponds to frame `idx`.
    pub fn advance_to_frame(&mut self, idx: FrameIndex, fps: Fps) -> SpectrumResult<()> {
        self.advance_to_sample(frame_to_sample(idx.0, fps, SAMPLE_RATE))
    }

    pub fn advance_to_sample(&mut self, sample: u64) -> SpectrumResult<()> {
        if sample < self.cursor {
            return Err(SpectrumError::validation(format!(
                "audio graph cannot move backwards ({} -> {sample})",
                self.cursor
            )));
        }
        self.cursor = sample;
        Ok(())
    }

    pub fn position_samples(&self) -> u64 {
        self.cursor
    }

    pub fn position_secs(&self) -> f64 {
        self.cursor as f64 / f64::from(SAMPLE_RATE)
    }

    pub fn frequency_bin_count(&self) -> usize {
        self.analyser.frequency_bin_count()
    }

    /// Analyse the window ending at the cursor and return byte magnitudes.
    pub fn frequency_data(&mut self) -> SpectrumResult<FrequencyData> {
        let n = self.analyser.fft_size();
        let ch = usize::from(CHANNELS);
        let start = self.cursor as i64 - n as i64;
        let pad = if start < 0 { (-start) as usize } else { 0 };

        self.stereo[..pad * ch].fill(0.0);
        self.timeline
            .copy_frames(start.max(0) as u64, &mut self.stereo[pad * ch..]);
        for (m, frame) in self.mono.iter_mut().zip(self.stereo.chunks_exact(ch)) {
            *m = 0.5 * (frame[0] + frame[1]);
        }
        self.analyser.analyse(&self.mono)?;
        Ok(self.analyser.byte_frequency_data())
    }

    /// The full rendered audio signal, for the encoder.
    pub fn rendered_audio(&self) -> Arc<AudioTimeline> {
        Arc::clone(&self.timeline)
    }

    /// Tear the graph down and hand back the rendered signal.
    pub fn finish(self) -> Arc<AudioTimeline> {
        tracing::debug!(position_secs = self.position_secs(), "audio graph finished");
        self.timeline
    }
}
