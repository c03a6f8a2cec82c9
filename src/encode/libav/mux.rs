use super::{StreamSetup, libav_err, us_to_ticks};
use crate::encode::chunk::{EncodedChunk, TrackKind};
use crate::foundation::error::{SpectrumError, SpectrumResult};
use crate::mux::{MuxSummary, Muxer};
use crate::sink::queue::WriteQueue;
use ffmpeg::{Dictionary, Packet, Rational, format};
use ffmpeg_next as ffmpeg;
use std::io::{PipeReader, PipeWriter, Read};
use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

/// Fragments start at keyframes and the `moov` goes up front, so the output never needs seeking.
const MOVFLAGS: &str = "frag_keyframe+empty_moov+default_base_moof";
const PIPE_CHUNK: usize = 64 * 1024;

#[derive(Clone, Copy, Debug)]
struct StreamSlot {
    index: usize,
    time_base: Rational,
    last_ts: Option<i64>,
}

/// libav MP4 muxer writing into a pipe. A forwarding thread moves the pipe's bytes into the
/// write queue in order, so container bytes reach the sink while the render runs.
pub struct LibavMuxer {
    octx: Option<format::context::Output>,
    writer: Option<PipeWriter>,
    forward: Option<JoinHandle<std::io::Result<u64>>>,
    queue: Option<Arc<WriteQueue>>,
    discard: Arc<AtomicBool>,
    streams: [Option<StreamSlot>; 2],
    summary: MuxSummary,
    video_end_us: i64,
}

impl LibavMuxer {
    pub fn create(queue: WriteQueue) -> SpectrumResult<Self> {
        let (reader, writer) = std::io::pipe()
            .map_err(|e| SpectrumError::encode(format!("failed to open muxer pipe: {e}")))?;
        // The pipe protocol writes to the descriptor without closing it; `writer` owns it.
        let url = format!("pipe:{}", writer.as_raw_fd());
        let octx = format::output_as(&url, "mp4").map_err(libav_err("open mp4 output"))?;

        let queue = Arc::new(queue);
        let discard = Arc::new(AtomicBool::new(false));
        let forward = {
            let queue = Arc::clone(&queue);
            let discard = Arc::clone(&discard);
            std::thread::Builder::new()
                .name("wavyte-spectrum-libav-out".to_owned())
                .spawn(move || forward_pipe(reader, &queue, &discard))
                .map_err(|e| SpectrumError::encode(format!("failed to spawn muxer output thread: {e}")))?
        };
        Ok(Self {
            octx: Some(octx),
            writer: Some(writer),
            forward: Some(forward),
            queue: Some(queue),
            discard,
            streams: [None; 2],
            summary: MuxSummary::default(),
            video_end_us: 0,
        })
    }

    pub fn needs_global_header(&self) -> bool {
        self.octx
            .as_ref()
            .is_some_and(|o| o.format().flags().contains(format::Flags::GLOBAL_HEADER))
    }

    pub fn add_stream(&mut self, track: TrackKind, setup: StreamSetup) -> SpectrumResult<()> {
        let octx = self.output()?;
        let mut ost = octx.add_stream(setup.codec).map_err(libav_err("add stream"))?;
        ost.set_parameters(setup.parameters);
        ost.set_time_base(setup.time_base);
        self.streams[track_slot(track)] = Some(StreamSlot {
            index: ost.index(),
            time_base: setup.time_base,
            last_ts: None,
        });
        Ok(())
    }

    pub fn write_header(&mut self) -> SpectrumResult<()> {
        let mut opts = Dictionary::new();
        opts.set("movflags", MOVFLAGS);
        let octx = self.output()?;
        octx.write_header_with(opts).map_err(libav_err("write mp4 header"))?;
        // The muxer may pick its own timescale while writing the header.
        let tbs: Vec<(usize, Rational)> = octx.streams().map(|s| (s.index(), s.time_base())).collect();
        for slot in self.streams.iter_mut().flatten() {
            if let Some((_, tb)) = tbs.iter().find(|(i, _)| *i == slot.index) {
                slot.time_base = *tb;
            }
        }
        tracing::debug!(movflags = MOVFLAGS, "mp4 header written");
        Ok(())
    }

    fn output(&mut self) -> SpectrumResult<&mut format::context::Output> {
        self.octx
            .as_mut()
            .ok_or_else(|| SpectrumError::encode("mp4 muxer is already closed"))
    }

    /// The write queue's sticky failure, if it has one.
    fn queue_failure(&self) -> Option<SpectrumError> {
        self.queue.as_ref().and_then(|q| q.check().err())
    }

    /// Close libav's side of the pipe and wait for the forwarder to drain it.
    fn close_pipe(&mut self) -> SpectrumResult<u64> {
        drop(self.octx.take());
        drop(self.writer.take());
        let Some(forward) = self.forward.take() else {
            return Ok(self.summary.file_bytes);
        };
        forward
            .join()
            .map_err(|_| SpectrumError::sink("muxer output thread panicked"))?
            .map_err(|e| SpectrumError::sink(format!("reading muxer output failed: {e}")))
    }

    fn take_queue(&mut self) -> SpectrumResult<WriteQueue> {
        let queue = self
            .queue
            .take()
            .ok_or_else(|| SpectrumError::sink("write queue already released"))?;
        Arc::try_unwrap(queue).map_err(|_| SpectrumError::sink("write queue is still shared"))
    }

    fn abort_inner(&mut self) {
        self.discard.store(true, Ordering::SeqCst);
        let _ = self.close_pipe();
        if let Ok(queue) = self.take_queue() {
            queue.abort();
        }
        tracing::debug!("mp4 muxer aborted");
    }
}

impl Muxer for LibavMuxer {
    fn push(&mut self, chunk: EncodedChunk) -> SpectrumResult<()> {
        if let Some(e) = self.queue_failure() {
            return Err(e);
        }
        let slot = self.streams[track_slot(chunk.track)]
            .as_mut()
            .ok_or_else(|| SpectrumError::encode(format!("no {} stream in the mp4 output", chunk.track)))?;
        if let Some(last) = slot.last_ts
            && chunk.timestamp_us < last
        {
            return Err(SpectrumError::encode(format!(
                "{} timestamp went backwards: {} us after {} us",
                chunk.track, chunk.timestamp_us, last
            )));
        }
        slot.last_ts = Some(chunk.timestamp_us);

        let ts = us_to_ticks(chunk.timestamp_us, slot.time_base);
        let mut packet = Packet::copy(&chunk.data);
        packet.set_stream(slot.index);
        packet.set_pts(Some(ts));
        packet.set_dts(Some(ts));
        if let Some(d) = chunk.duration_us {
            packet.set_duration(us_to_ticks(d as i64, slot.time_base));
        }
        if chunk.keyframe {
            packet.set_flags(ffmpeg::packet::Flags::KEY);
        }

        let size = chunk.data.len() as u64;
        match chunk.track {
            TrackKind::Video => {
                self.summary.video_samples += 1;
                self.summary.keyframes += u64::from(chunk.keyframe);
                let end = chunk.timestamp_us + chunk.duration_us.unwrap_or(0) as i64;
                self.video_end_us = self.video_end_us.max(end);
            }
            TrackKind::Audio => self.summary.audio_samples += 1,
        }
        self.summary.payload_bytes += size;

        let octx = self.output()?;
        if let Err(e) = packet.write_interleaved(octx) {
            return Err(self
                .queue_failure()
                .unwrap_or_else(|| SpectrumError::encode(format!("libav write packet: {e}"))));
        }
        Ok(())
    }

    fn finalize(mut self: Box<Self>) -> SpectrumResult<(WriteQueue, MuxSummary)> {
        if self.summary.video_samples == 0 {
            self.abort_inner();
            return Err(SpectrumError::encode("no video samples were produced"));
        }
        let trailer = self
            .output()
            .and_then(|o| o.write_trailer().map_err(libav_err("write mp4 trailer")));
        let forwarded = self.close_pipe();
        let queue = self.take_queue()?;
        let file_bytes = match trailer.and(forwarded) {
            Ok(bytes) => bytes,
            Err(e) => {
                let e = queue.check().err().unwrap_or(e);
                queue.abort();
                return Err(e);
            }
        };
        let mut summary = self.summary;
        summary.file_bytes = file_bytes;
        summary.duration_secs = self.video_end_us.max(0) as f64 / 1e6;
        tracing::debug!(
            video_samples = summary.video_samples,
            audio_samples = summary.audio_samples,
            bytes = file_bytes,
            "mp4 finalized"
        );
        Ok((queue, summary))
    }

    fn abort(mut self: Box<Self>) {
        self.abort_inner();
    }
}

impl Drop for LibavMuxer {
    fn drop(&mut self) {
        if self.forward.is_some() || self.queue.is_some() {
            self.abort_inner();
        }
    }
}

fn track_slot(track: TrackKind) -> usize {
    match track {
        TrackKind::Video => 0,
        TrackKind::Audio => 1,
    }
}

/// Copy everything libav writes into the queue at increasing offsets until the pipe closes.
/// After a write failure (or an abort) the rest is read and dropped so libav never blocks.
fn forward_pipe(mut reader: PipeReader, queue: &WriteQueue, discard: &AtomicBool) -> std::io::Result<u64> {
    let mut buf = vec![0u8; PIPE_CHUNK];
    let mut offset = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(offset),
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if !discard.load(Ordering::SeqCst) && queue.write_at(offset, buf[..n].to_vec()).is_err() {
            discard.store(true, Ordering::SeqCst);
        }
        offset += n as u64;
    }
}
