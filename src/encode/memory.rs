use crate::audio::chunk::AudioBlock;
use crate::encode::chunk::{EncodedChunk, EncoderEvent, TrackKind};
use crate::encode::codec::{AudioEncoderConfig, Deadline, VideoCodec, VideoEncoderConfig};
use crate::encode::runtime::{AudioEncoder, EncoderRuntime, MediaSession, VideoEncoder};
use crate::foundation::core::{Fps, FrameIndex, SAMPLE_RATE, samples_to_us};
use crate::foundation::error::{SpectrumError, SpectrumResult};
use crate::mux::SampleLogMuxer;
use crate::render::backend::FrameRGBA;
use crate::sink::queue::WriteQueue;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

/// Deterministic in-process encoders for tests and debugging.
///
/// Chunks carry small synthetic payloads (a checksum of the input) and are packaged by a
/// [`SampleLogMuxer`], so a whole render can run without libav while still exercising the bridge,
/// the mux pump and the sink.
#[derive(Debug, Default)]
pub struct InMemoryRuntime {
    supported: Option<Vec<(VideoCodec, Deadline)>>,
    unavailable: bool,
    fail_video_at: Option<u64>,
    fail_audio_at: Option<u64>,
    stats: Arc<Mutex<InMemoryStats>>,
}

/// What the in-memory encoders have seen so far.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InMemoryStats {
    /// Labels of every configuration queried, in order.
    pub queried: Vec<String>,
    pub video_started: u32,
    pub audio_started: u32,
    pub video_timestamps_us: Vec<u64>,
    /// Indices (0-based submission order) of frames submitted with the keyframe flag.
    pub keyframes: Vec<u64>,
    pub audio_timestamps_us: Vec<u64>,
    pub audio_frames: u64,
    pub video_flushed: bool,
    pub audio_flushed: bool,
    pub aborted: bool,
}

impl InMemoryRuntime {
    /// Runtime supporting every configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Support only the listed `(codec, deadline)` pairs.
    pub fn supporting(mut self, configs: &[(VideoCodec, Deadline)]) -> Self {
        self.supported = Some(configs.to_vec());
        self
    }

    /// Support nothing: negotiation always fails.
    pub fn supporting_nothing(self) -> Self {
        self.supporting(&[])
    }

    /// Fail the environment check.
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Report an asynchronous error instead of encoding the `n`-th video frame (0-based).
    pub fn fail_video_at(mut self, n: u64) -> Self {
        self.fail_video_at = Some(n);
        self
    }

    /// Report an asynchronous error instead of encoding the `n`-th audio block (0-based).
    pub fn fail_audio_at(mut self, n: u64) -> Self {
        self.fail_audio_at = Some(n);
        self
    }

    pub fn stats(&self) -> InMemoryStats {
        lock(&self.stats).clone()
    }
}

fn lock(stats: &Mutex<InMemoryStats>) -> std::sync::MutexGuard<'_, InMemoryStats> {
    stats.lock().unwrap_or_else(|e| e.into_inner())
}

impl EncoderRuntime for InMemoryRuntime {
    fn name(&self) -> &str {
        "in-memory"
    }

    fn check_environment(&self) -> SpectrumResult<()> {
        if self.unavailable {
            return Err(SpectrumError::unsupported("in-memory runtime marked unavailable"));
        }
        Ok(())
    }

    fn is_config_supported(&self, cfg: &VideoEncoderConfig) -> bool {
        lock(&self.stats).queried.push(cfg.label.clone());
        match &self.supported {
            None => true,
            Some(list) => list.contains(&(cfg.codec, cfg.deadline)),
        }
    }

    fn open_session(
        &self,
        video: &VideoEncoderConfig,
        audio: &AudioEncoderConfig,
        queue: WriteQueue,
        events: Sender<EncoderEvent>,
    ) -> SpectrumResult<MediaSession> {
        if audio.sample_rate != SAMPLE_RATE {
            return Err(SpectrumError::validation("in-memory audio encoder expects 48 kHz"));
        }
        let muxer = SampleLogMuxer::new(queue)?;
        {
            let mut s = lock(&self.stats);
            s.video_started += 1;
            s.audio_started += 1;
        }
        Ok(MediaSession {
            video: Box::new(MemoryVideoEncoder {
                width: video.width,
                height: video.height,
                fps: video.fps,
                events: Some(events.clone()),
                submitted: 0,
                last_ts: None,
                fail_at: self.fail_video_at,
                stats: Arc::clone(&self.stats),
            }),
            audio: Box::new(MemoryAudioEncoder {
                events: Some(events),
                blocks: 0,
                last_ts: None,
                fail_at: self.fail_audio_at,
                stats: Arc::clone(&self.stats),
            }),
            muxer: Box::new(muxer),
        })
    }
}

struct MemoryVideoEncoder {
    width: u32,
    height: u32,
    fps: Fps,
    events: Option<Sender<EncoderEvent>>,
    submitted: u64,
    last_ts: Option<u64>,
    fail_at: Option<u64>,
    stats: Arc<Mutex<InMemoryStats>>,
}

impl VideoEncoder for MemoryVideoEncoder {
    fn encode(&mut self, frame: &FrameRGBA, timestamp_us: u64, keyframe: bool) -> SpectrumResult<()> {
        if frame.width != self.width || frame.height != self.height {
            return Err(SpectrumError::validation("frame size mismatch"));
        }
        if self.last_ts.is_some_and(|last| timestamp_us <= last) {
            return Err(SpectrumError::encode("video timestamps must strictly increase"));
        }
        self.last_ts = Some(timestamp_us);
        let Some(events) = &self.events else {
            return Err(SpectrumError::encode("video encoder is already finished"));
        };
        let idx = self.submitted;
        self.submitted += 1;
        {
            let mut s = lock(&self.stats);
            s.video_timestamps_us.push(timestamp_us);
            if keyframe {
                s.keyframes.push(idx);
            }
        }
        let event = if self.fail_at == Some(idx) {
            EncoderEvent::Error {
                track: TrackKind::Video,
                message: format!("injected failure at frame {idx}"),
            }
        } else {
            let mut data = Vec::with_capacity(12);
            data.extend_from_slice(&(idx as u32).to_be_bytes());
            data.extend_from_slice(&checksum(&frame.data).to_be_bytes());
            let next_us = self.fps.frame_timestamp_us(FrameIndex(idx + 1));
            EncoderEvent::Chunk(EncodedChunk {
                track: TrackKind::Video,
                timestamp_us: timestamp_us as i64,
                duration_us: Some(next_us.saturating_sub(timestamp_us).max(1)),
                keyframe,
                data,
            })
        };
        let _ = events.send(event);
        Ok(())
    }

    fn flush(&mut self) -> SpectrumResult<()> {
        self.events = None;
        lock(&self.stats).video_flushed = true;
        Ok(())
    }

    fn abort(&mut self) {
        self.events = None;
        lock(&self.stats).aborted = true;
    }
}

struct MemoryAudioEncoder {
    events: Option<Sender<EncoderEvent>>,
    blocks: u64,
    last_ts: Option<u64>,
    fail_at: Option<u64>,
    stats: Arc<Mutex<InMemoryStats>>,
}

impl AudioEncoder for MemoryAudioEncoder {
    fn encode(&mut self, block: &AudioBlock) -> SpectrumResult<()> {
        if self.last_ts.is_some_and(|last| block.timestamp_us <= last) {
            return Err(SpectrumError::encode("audio timestamps must strictly increase"));
        }
        self.last_ts = Some(block.timestamp_us);
        let Some(events) = &self.events else {
            return Err(SpectrumError::encode("audio encoder is already finished"));
        };
        let idx = self.blocks;
        self.blocks += 1;
        {
            let mut s = lock(&self.stats);
            s.audio_timestamps_us.push(block.timestamp_us);
            s.audio_frames += block.frames as u64;
        }
        if self.fail_at == Some(idx) {
            let _ = events.send(EncoderEvent::Error {
                track: TrackKind::Audio,
                message: format!("injected failure at block {idx}"),
            });
            return Ok(());
        }
        let mut data = Vec::with_capacity(8);
        data.push(31 << 3);
        data.extend_from_slice(&checksum(f32_le_bytes(&block.planar[0]).as_slice()).to_be_bytes());
        let start = block.timestamp_us;
        let end = start + samples_to_us(block.frames as u64, SAMPLE_RATE);
        let _ = events.send(EncoderEvent::Chunk(EncodedChunk {
            track: TrackKind::Audio,
            timestamp_us: start as i64,
            duration_us: Some(end - start),
            keyframe: true,
            data,
        }));
        Ok(())
    }

    fn flush(&mut self) -> SpectrumResult<()> {
        self.events = None;
        lock(&self.stats).audio_flushed = true;
        Ok(())
    }

    fn abort(&mut self) {
        self.events = None;
        lock(&self.stats).aborted = true;
    }
}

fn f32_le_bytes(samples: &[f32]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// FNV-1a over the payload.
fn checksum(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0x811c_9dc5u32, |h, &b| {
        (h ^ u32::from(b)).wrapping_mul(0x0100_0193)
    })
}
