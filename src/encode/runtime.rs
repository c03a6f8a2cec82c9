use crate::audio::chunk::AudioBlock;
use crate::encode::chunk::EncoderEvent;
use crate::encode::codec::{AudioEncoderConfig, VideoEncoderConfig};
use crate::foundation::error::{SpectrumError, SpectrumResult};
use crate::mux::Muxer;
use crate::render::backend::FrameRGBA;
use crate::sink::queue::WriteQueue;
use std::sync::mpsc::Sender;

/// A source of encoders and the muxer that packages their output.
///
/// Encoders report output asynchronously: every chunk (and any fatal error) is sent on the
/// `events` channel handed to [`EncoderRuntime::open_session`].
pub trait EncoderRuntime: Send + Sync {
    fn name(&self) -> &str;

    /// Fail with `UnsupportedEnvironment` when the runtime cannot encode at all.
    fn check_environment(&self) -> SpectrumResult<()>;

    fn is_config_supported(&self, cfg: &VideoEncoderConfig) -> bool;

    /// Open both encoders and a muxer writing through `queue`.
    ///
    /// On error the queue is dropped, which aborts its sink.
    fn open_session(
        &self,
        video: &VideoEncoderConfig,
        audio: &AudioEncoderConfig,
        queue: WriteQueue,
        events: Sender<EncoderEvent>,
    ) -> SpectrumResult<MediaSession>;
}

/// Encoders and muxer of one render.
pub struct MediaSession {
    pub video: Box<dyn VideoEncoder>,
    pub audio: Box<dyn AudioEncoder>,
    pub muxer: Box<dyn Muxer>,
}

impl std::fmt::Debug for MediaSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaSession").finish_non_exhaustive()
    }
}

/// Streaming video encoder. Driven from the render thread only.
///
/// Ordering contract: `encode` is called with strictly increasing timestamps.
pub trait VideoEncoder {
    fn encode(&mut self, frame: &FrameRGBA, timestamp_us: u64, keyframe: bool) -> SpectrumResult<()>;

    /// Finish encoding. Returns once every chunk has been sent.
    fn flush(&mut self) -> SpectrumResult<()>;

    /// Stop immediately, discarding buffered input.
    fn abort(&mut self);
}

/// Streaming audio encoder. Blocks arrive in strictly increasing timestamp order.
pub trait AudioEncoder {
    fn encode(&mut self, block: &AudioBlock) -> SpectrumResult<()>;

    fn flush(&mut self) -> SpectrumResult<()>;

    fn abort(&mut self);
}

/// Runtime used when the crate is built without libav support. Every render fails its
/// environment check.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnavailableRuntime;

impl EncoderRuntime for UnavailableRuntime {
    fn name(&self) -> &str {
        "unavailable"
    }

    fn check_environment(&self) -> SpectrumResult<()> {
        Err(SpectrumError::unsupported(
            "built without the `ffmpeg` feature; rebuild with `--features ffmpeg` to encode video",
        ))
    }

    fn is_config_supported(&self, _cfg: &VideoEncoderConfig) -> bool {
        false
    }

    fn open_session(
        &self,
        _video: &VideoEncoderConfig,
        _audio: &AudioEncoderConfig,
        _queue: WriteQueue,
        _events: Sender<EncoderEvent>,
    ) -> SpectrumResult<MediaSession> {
        self.check_environment()?;
        Err(SpectrumError::unsupported("no encoders available"))
    }
}

/// The encoder runtime this build renders with: libav when the `ffmpeg` feature is enabled.
pub fn default_runtime() -> Box<dyn EncoderRuntime> {
    #[cfg(all(feature = "ffmpeg", unix))]
    {
        Box::new(crate::encode::libav::FfmpegRuntime::new())
    }
    #[cfg(not(all(feature = "ffmpeg", unix)))]
    {
        Box::new(UnavailableRuntime)
    }
}
