//! Audio side of the render: decoding, timeline composition, analysis and re-chunking.

pub mod analyser;
pub mod chunk;
pub mod decode;
pub mod graph;
pub mod timeline;

pub use analyser::{FrequencyData, SpectrumAnalyser};
pub use chunk::{AudioBlock, AudioBlocks};
pub use decode::{
    AudioDecoder, AudioPcm, FfmpegDecoder, decode_audio_f32_stereo, is_ffmpeg_on_path,
    query_duration_secs,
};
pub use graph::AudioGraph;
pub use timeline::{AudioTimeline, TrackSpan, compose_timeline};
