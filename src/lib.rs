//! Offline renderer for audio-reactive spectrum videos.
//!
//! A [`Playlist`] is decoded once into a looped [`AudioTimeline`], then walked on a virtual clock:
//! for every frame the analyser is advanced to the frame's timestamp, a [`FrameRenderer`] draws the
//! spectrum, and the frame is streamed through an encoder into an MP4 container. Audio follows in
//! one-second blocks. Output is written incrementally through an [`OutputSink`].
//!
//! - Build a [`Playlist`] (or load a [`ProjectFile`])
//! - Pick an [`EncoderRuntime`] ([`default_runtime`], which is libav when built with the `ffmpeg`
//!   feature, or [`InMemoryRuntime`]) and a [`SinkProvider`]
//! - Call [`RenderController::run`] or [`run_render`]
#![forbid(unsafe_code)]

mod foundation;

pub mod audio;
pub mod encode;
pub mod job;
pub mod mux;
pub mod playlist;
pub mod project;
pub mod render;
pub mod settings;
pub mod sink;

pub use crate::foundation::core::{CHANNELS, Canvas, Fps, FrameIndex, SAMPLE_RATE};
pub use crate::foundation::error::{SpectrumError, SpectrumResult};

pub use crate::audio::{
    AudioDecoder, AudioGraph, AudioPcm, AudioTimeline, FfmpegDecoder, FrequencyData,
    SpectrumAnalyser, compose_timeline, is_ffmpeg_on_path,
};
#[cfg(all(feature = "ffmpeg", unix))]
pub use crate::encode::FfmpegRuntime;
pub use crate::encode::{
    EncoderRuntime, InMemoryRuntime, VideoCodec, VideoEncoderConfig, default_runtime, negotiate,
};
pub use crate::job::{
    CancelToken, NoPreview, NoProgress, PreviewControl, ProgressListener, ProgressUpdate,
    RenderController, RenderDeps, RenderOutcome, RenderPhase, RenderReport, RenderRequest,
    run_render,
};
pub use crate::playlist::{Playlist, Track, TrackSource};
pub use crate::project::{PlaylistEntry, ProjectFile};
pub use crate::render::{FrameRGBA, FrameRenderer, HexColor, SpectrumRenderer};
pub use crate::settings::{
    ColorMode, EncodingSettings, QualityPreset, RenderConfig, SpectrumStyle, VisualSettings,
};
pub use crate::sink::{FileSinkProvider, MemorySinkProvider, OutputSink, SinkProvider};
