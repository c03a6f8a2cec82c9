//! Container muxers fed by the encoder bridge.
//!
//! The production container is fragmented MP4 written by libav (see `encode::libav`). The
//! [`SampleLogMuxer`] here stores chunks verbatim with a JSON index and backs the in-memory runtime.

pub mod sample_log;

pub use sample_log::{SAMPLE_LOG_MAGIC, SampleLog, SampleLogMuxer, SampleRecord};

use crate::encode::chunk::EncodedChunk;
use crate::foundation::error::SpectrumResult;
use crate::sink::queue::WriteQueue;

/// Summary of a finalized container.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MuxSummary {
    pub video_samples: u64,
    pub audio_samples: u64,
    pub keyframes: u64,
    /// Encoded payload bytes handed to the muxer (container overhead excluded).
    pub payload_bytes: u64,
    /// Bytes the muxer wrote, container overhead included.
    pub file_bytes: u64,
    /// End of the last video sample.
    pub duration_secs: f64,
}

/// Consumes encoded chunks in arrival order and writes a container through a [`WriteQueue`].
///
/// Runs on the mux pump thread. Within one track timestamps never go backwards.
pub trait Muxer: Send {
    fn push(&mut self, chunk: EncodedChunk) -> SpectrumResult<()>;

    /// Write the index or trailer and hand back the queue for closing.
    fn finalize(self: Box<Self>) -> SpectrumResult<(WriteQueue, MuxSummary)>;

    /// Drop everything without finishing the container. The sink is aborted.
    fn abort(self: Box<Self>);
}
