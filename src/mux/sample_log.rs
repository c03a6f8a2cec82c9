use crate::encode::chunk::{EncodedChunk, TrackKind};
use crate::foundation::error::{SpectrumError, SpectrumResult};
use crate::mux::{MuxSummary, Muxer};
use crate::sink::queue::WriteQueue;

/// Leading bytes of every sample log.
pub const SAMPLE_LOG_MAGIC: &[u8; 8] = b"WSPLOG01";
const FOOTER_LEN: usize = 8;

/// Where one chunk landed in a sample log.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SampleRecord {
    pub track: TrackKind,
    pub timestamp_us: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_us: Option<u64>,
    pub keyframe: bool,
    pub offset: u64,
    pub size: u64,
}

impl SampleRecord {
    fn end_us(&self) -> i64 {
        self.timestamp_us
            .saturating_add(self.duration_us.unwrap_or(0).min(i64::MAX as u64) as i64)
    }
}

/// Parsed index of a finished sample log.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SampleLog {
    pub records: Vec<SampleRecord>,
}

impl SampleLog {
    /// Read the index back from a complete file.
    pub fn parse(file: &[u8]) -> SpectrumResult<Self> {
        if file.len() < SAMPLE_LOG_MAGIC.len() + FOOTER_LEN || !file.starts_with(SAMPLE_LOG_MAGIC) {
            return Err(SpectrumError::validation("not a sample log"));
        }
        let (body, footer) = file.split_at(file.len() - FOOTER_LEN);
        let mut len_bytes = [0u8; FOOTER_LEN];
        len_bytes.copy_from_slice(footer);
        let index_len = u64::from_be_bytes(len_bytes);
        let index_start = (body.len() as u64)
            .checked_sub(index_len)
            .filter(|&start| start >= SAMPLE_LOG_MAGIC.len() as u64)
            .ok_or_else(|| SpectrumError::validation("sample log index length is out of range"))?;
        let log: Self = serde_json::from_slice(&body[index_start as usize..])
            .map_err(|e| SpectrumError::serde(format!("sample log index: {e}")))?;
        if let Some(r) = log.records.iter().find(|r| r.offset + r.size > index_start) {
            return Err(SpectrumError::validation(format!(
                "sample at offset {} overruns the payload area",
                r.offset
            )));
        }
        Ok(log)
    }

    pub fn track(&self, kind: TrackKind) -> impl Iterator<Item = &SampleRecord> + '_ {
        self.records.iter().filter(move |r| r.track == kind)
    }

    /// Payload bytes of `record` within `file`.
    pub fn payload<'f>(&self, file: &'f [u8], record: &SampleRecord) -> &'f [u8] {
        &file[record.offset as usize..(record.offset + record.size) as usize]
    }
}

/// Appends chunk payloads in arrival order and closes the file with a JSON index.
///
/// Layout: [`SAMPLE_LOG_MAGIC`], the payloads back to back, the serialized [`SampleLog`], then the
/// index length as a big-endian `u64`. Payloads are written through the queue as they arrive and
/// never kept.
pub struct SampleLogMuxer {
    queue: WriteQueue,
    log: SampleLog,
    last_ts: [Option<i64>; 2],
    cursor: u64,
}

impl SampleLogMuxer {
    pub fn new(queue: WriteQueue) -> SpectrumResult<Self> {
        queue.write_at(0, SAMPLE_LOG_MAGIC.to_vec())?;
        Ok(Self {
            queue,
            log: SampleLog::default(),
            last_ts: [None; 2],
            cursor: SAMPLE_LOG_MAGIC.len() as u64,
        })
    }

    fn summary(&self, file_bytes: u64) -> MuxSummary {
        let video: Vec<&SampleRecord> = self.log.track(TrackKind::Video).collect();
        let end_us = video.iter().map(|r| r.end_us()).max().unwrap_or(0).max(0);
        MuxSummary {
            video_samples: video.len() as u64,
            audio_samples: self.log.track(TrackKind::Audio).count() as u64,
            keyframes: video.iter().filter(|r| r.keyframe).count() as u64,
            payload_bytes: self.log.records.iter().map(|r| r.size).sum(),
            file_bytes,
            duration_secs: end_us as f64 / 1e6,
        }
    }
}

impl Muxer for SampleLogMuxer {
    fn push(&mut self, chunk: EncodedChunk) -> SpectrumResult<()> {
        let slot = &mut self.last_ts[chunk.track as usize];
        if let Some(last) = *slot
            && chunk.timestamp_us < last
        {
            return Err(SpectrumError::encode(format!(
                "{} timestamp went backwards: {} us after {} us",
                chunk.track, chunk.timestamp_us, last
            )));
        }
        *slot = Some(chunk.timestamp_us);

        let size = chunk.data.len() as u64;
        self.log.records.push(SampleRecord {
            track: chunk.track,
            timestamp_us: chunk.timestamp_us,
            duration_us: chunk.duration_us,
            keyframe: chunk.keyframe,
            offset: self.cursor,
            size,
        });
        let offset = self.cursor;
        self.cursor += size;
        self.queue.write_at(offset, chunk.data)
    }

    fn finalize(self: Box<Self>) -> SpectrumResult<(WriteQueue, MuxSummary)> {
        if self.log.track(TrackKind::Video).next().is_none() {
            self.queue.abort();
            return Err(SpectrumError::encode("no video samples were produced"));
        }
        let mut index = match serde_json::to_vec(&self.log) {
            Ok(index) => index,
            Err(e) => {
                self.queue.abort();
                return Err(SpectrumError::serde(e.to_string()));
            }
        };
        index.extend_from_slice(&(index.len() as u64).to_be_bytes());
        let file_bytes = self.cursor + index.len() as u64;
        let summary = self.summary(file_bytes);
        self.queue.write_at(self.cursor, index)?;
        tracing::debug!(
            video_samples = summary.video_samples,
            audio_samples = summary.audio_samples,
            bytes = file_bytes,
            "sample log finalized"
        );
        Ok((self.queue, summary))
    }

    fn abort(self: Box<Self>) {
        self.queue.abort();
    }
}

#[cfg(test)]
#[path = "../../tests/unit/mux/sample_log.rs"]
mod tests;
