use crate::audio::chunk::AudioBlock;
use crate::encode::chunk::EncoderEvent;
use crate::encode::codec::{AudioEncoderConfig, VideoEncoderConfig};
use crate::encode::runtime::{AudioEncoder, EncoderRuntime, MediaSession, VideoEncoder};
use crate::foundation::error::{SpectrumError, SpectrumResult};
use crate::job::cancel::CancelToken;
use crate::mux::{MuxSummary, Muxer};
use crate::render::backend::FrameRGBA;
use crate::sink::OutputSink;
use crate::sink::queue::WriteQueue;
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// First fatal problem seen by the mux pump.
#[derive(Clone, Debug, PartialEq, Eq)]
enum PumpFailure {
    Encode(String),
    Sink(String),
    Cancelled,
}

impl PumpFailure {
    fn from_error(e: &SpectrumError) -> Self {
        match e {
            SpectrumError::Sink(msg) => Self::Sink(msg.clone()),
            SpectrumError::Cancelled => Self::Cancelled,
            SpectrumError::Encode(msg) => Self::Encode(msg.clone()),
            other => Self::Encode(other.to_string()),
        }
    }

    fn to_error(&self) -> SpectrumError {
        match self {
            Self::Encode(msg) => SpectrumError::encode(msg.clone()),
            Self::Sink(msg) => SpectrumError::sink(msg.clone()),
            Self::Cancelled => SpectrumError::Cancelled,
        }
    }
}

type FailureSlot = Arc<Mutex<Option<PumpFailure>>>;

/// Owns the two encoders, the mux pump thread and (through it) the muxer and write queue.
///
/// Encoders push [`EncoderEvent`]s onto one channel; the pump hands chunks to the muxer as they
/// arrive. Any encoder error or write failure is recorded once and surfaced by [`Bridge::check`].
pub struct Bridge {
    video: Option<Box<dyn VideoEncoder>>,
    audio: Option<Box<dyn AudioEncoder>>,
    pump: Option<JoinHandle<Box<dyn Muxer>>>,
    failure: FailureSlot,
    target: String,
}

impl Bridge {
    pub fn start(
        runtime: &dyn EncoderRuntime,
        video_cfg: &VideoEncoderConfig,
        audio_cfg: &AudioEncoderConfig,
        sink: Box<dyn OutputSink>,
        cancel: CancelToken,
    ) -> SpectrumResult<Self> {
        let target = sink.describe();
        let queue = WriteQueue::new(sink, cancel);
        let (tx, rx) = mpsc::channel();
        let MediaSession {
            mut video,
            mut audio,
            muxer,
        } = runtime.open_session(video_cfg, audio_cfg, queue, tx)?;

        let failure: FailureSlot = Arc::default();
        let pump_failure = Arc::clone(&failure);
        let pump = std::thread::Builder::new()
            .name("wavyte-spectrum-mux".to_owned())
            .spawn(move || mux_pump(muxer, rx, &pump_failure))
            .map_err(|e| SpectrumError::encode(format!("failed to spawn mux pump: {e}")));
        // An unspawned closure drops the muxer, and its write queue aborts the sink on drop.
        let pump = match pump {
            Ok(p) => p,
            Err(e) => {
                video.abort();
                audio.abort();
                return Err(e);
            }
        };

        tracing::debug!(
            target_path = %target,
            runtime = runtime.name(),
            codec = %video_cfg.codec_string(),
            "bridge started"
        );
        Ok(Self {
            video: Some(video),
            audio: Some(audio),
            pump: Some(pump),
            failure,
            target,
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Surface any asynchronous encoder or write failure.
    pub fn check(&self) -> SpectrumResult<()> {
        match lock(&self.failure).as_ref() {
            Some(f) => Err(f.to_error()),
            None => Ok(()),
        }
    }

    pub fn encode_video(&mut self, frame: &FrameRGBA, timestamp_us: u64, keyframe: bool) -> SpectrumResult<()> {
        self.check()?;
        let video = self
            .video
            .as_mut()
            .ok_or_else(|| SpectrumError::encode("video encoder already finished"))?;
        video
            .encode(frame, timestamp_us, keyframe)
            .map_err(|e| self.prefer_recorded(e))
    }

    pub fn encode_audio(&mut self, block: &AudioBlock) -> SpectrumResult<()> {
        self.check()?;
        let audio = self
            .audio
            .as_mut()
            .ok_or_else(|| SpectrumError::encode("audio encoder already finished"))?;
        audio.encode(block).map_err(|e| self.prefer_recorded(e))
    }

    /// Flush both encoders, drain the pump, write the index and return the write queue
    /// ready to close. The caller closes it after reporting finalization.
    pub fn finish(mut self) -> SpectrumResult<(WriteQueue, MuxSummary)> {
        let flushed = self.flush_encoders();
        let muxer = self.join_pump()?;
        if let Err(e) = flushed.and_then(|()| self.check()) {
            muxer.abort();
            return Err(e);
        }
        muxer.finalize()
    }

    /// Tear everything down without finalizing. The sink is aborted.
    pub fn abort(mut self) {
        self.abort_inner();
    }

    fn abort_inner(&mut self) {
        if let Some(mut v) = self.video.take() {
            v.abort();
        }
        if let Some(mut a) = self.audio.take() {
            a.abort();
        }
        if let Ok(muxer) = self.join_pump() {
            muxer.abort();
        }
        tracing::debug!(target_path = %self.target, "bridge aborted");
    }

    fn flush_encoders(&mut self) -> SpectrumResult<()> {
        let mut result = Ok(());
        if let Some(mut v) = self.video.take()
            && let Err(e) = v.flush()
        {
            result = Err(e);
        }
        if let Some(mut a) = self.audio.take() {
            if result.is_ok() {
                result = a.flush();
            } else {
                a.abort();
            }
        }
        result
    }

    fn join_pump(&mut self) -> SpectrumResult<Box<dyn Muxer>> {
        let pump = self
            .pump
            .take()
            .ok_or_else(|| SpectrumError::encode("mux pump already joined"))?;
        pump.join()
            .map_err(|_| SpectrumError::encode("mux pump panicked"))
    }

    /// Encoder stdin errors usually mean the encoder already reported why it died.
    fn prefer_recorded(&self, e: SpectrumError) -> SpectrumError {
        match lock(&self.failure).as_ref() {
            Some(f) => f.to_error(),
            None => e,
        }
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        if self.pump.is_some() {
            self.abort_inner();
        }
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("target", &self.target)
            .field("failure", &*lock(&self.failure))
            .finish_non_exhaustive()
    }
}

fn lock(slot: &FailureSlot) -> std::sync::MutexGuard<'_, Option<PumpFailure>> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}

fn record(slot: &FailureSlot, f: PumpFailure) {
    let mut guard = lock(slot);
    if guard.is_none() {
        *guard = Some(f);
    }
}

/// Runs until every encoder has dropped its sender. After a failure remaining chunks are discarded.
fn mux_pump(mut muxer: Box<dyn Muxer>, rx: Receiver<EncoderEvent>, failure: &FailureSlot) -> Box<dyn Muxer> {
    for event in rx {
        if lock(failure).is_some() {
            continue;
        }
        match event {
            EncoderEvent::Chunk(chunk) => {
                if let Err(e) = muxer.push(chunk) {
                    tracing::warn!(error = %e, "mux push failed");
                    record(failure, PumpFailure::from_error(&e));
                }
            }
            EncoderEvent::Error { track, message } => {
                tracing::warn!(%track, %message, "encoder reported an error");
                record(failure, PumpFailure::Encode(format!("{track} encoder: {message}")));
            }
        }
    }
    muxer
}
