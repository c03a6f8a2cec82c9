//! Video/audio encoders, codec negotiation and the encoder-to-muxer bridge.

pub mod bridge;
pub mod chunk;
pub mod codec;
#[cfg(all(feature = "ffmpeg", unix))]
pub mod libav;
pub mod memory;
pub mod runtime;

pub use bridge::Bridge;
pub use chunk::{EncodedChunk, EncoderEvent, TrackKind};
pub use codec::{
    AudioEncoderConfig, CODEC_PRIORITY, CodecCandidate, Deadline, VideoCodec, VideoEncoderConfig,
    negotiate,
};
#[cfg(all(feature = "ffmpeg", unix))]
pub use libav::FfmpegRuntime;
pub use memory::{InMemoryRuntime, InMemoryStats};
pub use runtime::{
    AudioEncoder, EncoderRuntime, MediaSession, UnavailableRuntime, VideoEncoder, default_runtime,
};
