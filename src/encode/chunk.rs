use std::fmt;

/// Which container track a chunk belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Video => "video",
            Self::Audio => "audio",
        })
    }
}

/// One compressed access unit produced by an encoder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedChunk {
    pub track: TrackKind,
    /// Presentation timestamp in microseconds. Negative for codec priming (Opus pre-skip).
    pub timestamp_us: i64,
    /// Duration in microseconds when the encoder knows it.
    pub duration_us: Option<u64>,
    pub keyframe: bool,
    pub data: Vec<u8>,
}

/// Message sent from an encoder to the mux pump.
#[derive(Debug)]
pub enum EncoderEvent {
    Chunk(EncodedChunk),
    /// Fatal encoder failure. The render is aborted when the pump sees it.
    Error { track: TrackKind, message: String },
}
