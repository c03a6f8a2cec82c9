use super::{OPUS_ENCODER, StreamSetup, libav_err, ticks_to_us, us_to_ticks};
use crate::audio::chunk::AudioBlock;
use crate::encode::chunk::{EncodedChunk, EncoderEvent, TrackKind};
use crate::encode::codec::AudioEncoderConfig;
use crate::encode::runtime::AudioEncoder;
use crate::foundation::core::{CHANNELS, SAMPLE_RATE};
use crate::foundation::error::{SpectrumError, SpectrumResult};
use ffmpeg::format::Sample;
use ffmpeg::format::sample::Type as SampleType;
use ffmpeg::util::frame::audio::Audio as AudioFrame;
use ffmpeg::{ChannelLayout, Dictionary, Packet, Rational, codec};
use ffmpeg_next as ffmpeg;
use std::sync::mpsc::Sender;

/// 20 ms at 48 kHz, used when the encoder does not report its frame size.
const DEFAULT_FRAME_SIZE: usize = 960;

/// libopus encoder over packed stereo `f32`. Blocks are re-cut into encoder-sized frames; the
/// remainder is carried to the next block and sent short at flush.
pub struct LibavAudioEncoder {
    encoder: codec::encoder::audio::Encoder,
    codec: ffmpeg::Codec,
    time_base: Rational,
    frame_size: usize,
    pending: Vec<f32>,
    next_pts: Option<i64>,
    events: Option<Sender<EncoderEvent>>,
    last_ts: Option<u64>,
    blocks: u64,
}

impl LibavAudioEncoder {
    pub fn open(cfg: &AudioEncoderConfig, global_header: bool, events: Sender<EncoderEvent>) -> SpectrumResult<Self> {
        if cfg.sample_rate != SAMPLE_RATE || cfg.channels != CHANNELS {
            return Err(SpectrumError::validation(format!(
                "opus encoder expects {SAMPLE_RATE} Hz stereo, got {} Hz x{}",
                cfg.sample_rate, cfg.channels
            )));
        }
        let codec = codec::encoder::find_by_name(OPUS_ENCODER)
            .ok_or_else(|| SpectrumError::unsupported("libav has no libopus encoder"))?;
        let mut ctx = codec::context::Context::new_with_codec(codec)
            .encoder()
            .audio()
            .map_err(libav_err("audio encoder context"))?;

        let time_base = Rational::new(1, SAMPLE_RATE as i32);
        ctx.set_rate(SAMPLE_RATE as i32);
        ctx.set_channel_layout(ChannelLayout::STEREO);
        ctx.set_format(Sample::F32(SampleType::Packed));
        ctx.set_bit_rate(cfg.bitrate as usize);
        ctx.set_time_base(time_base);
        if global_header {
            ctx.set_flags(codec::Flags::GLOBAL_HEADER);
        }

        let mut opts = Dictionary::new();
        opts.set("application", "audio");
        opts.set("frame_duration", "20");
        let encoder = ctx
            .open_as_with(codec, opts)
            .map_err(libav_err("open audio encoder"))?;
        let frame_size = match encoder.frame_size() as usize {
            0 => DEFAULT_FRAME_SIZE,
            n => n,
        };

        tracing::info!(bitrate = cfg.bitrate, frame_size, "audio encoder opened");
        Ok(Self {
            encoder,
            codec,
            time_base,
            frame_size,
            pending: Vec::with_capacity(SAMPLE_RATE as usize * usize::from(CHANNELS)),
            next_pts: None,
            events: Some(events),
            last_ts: None,
            blocks: 0,
        })
    }

    pub fn stream_setup(&self) -> StreamSetup {
        StreamSetup {
            codec: self.codec,
            parameters: codec::Parameters::from(&self.encoder),
            time_base: self.time_base,
        }
    }

    /// Encode the first `samples` pending sample frames.
    fn send_samples(&mut self, samples: usize) -> SpectrumResult<()> {
        let ch = usize::from(CHANNELS);
        let mut frame = AudioFrame::new(Sample::F32(SampleType::Packed), samples, ChannelLayout::STEREO);
        frame.set_rate(SAMPLE_RATE);
        for (dst, s) in frame
            .data_mut(0)
            .chunks_exact_mut(4)
            .zip(self.pending.drain(..samples * ch))
        {
            dst.copy_from_slice(&s.to_ne_bytes());
        }
        let pts = self.next_pts.unwrap_or(0);
        frame.set_pts(Some(pts));
        self.next_pts = Some(pts + samples as i64);
        self.encoder
            .send_frame(&frame)
            .map_err(libav_err("send audio frame"))?;
        self.drain()
    }

    fn drain(&mut self) -> SpectrumResult<()> {
        let Some(events) = &self.events else {
            return Err(SpectrumError::encode("audio encoder is already finished"));
        };
        let mut packet = Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            let Some(data) = packet.data() else {
                continue;
            };
            let duration = packet.duration();
            let chunk = EncodedChunk {
                track: TrackKind::Audio,
                timestamp_us: ticks_to_us(packet.pts().unwrap_or(0), self.time_base),
                duration_us: (duration > 0).then(|| ticks_to_us(duration, self.time_base) as u64),
                keyframe: true,
                data: data.to_vec(),
            };
            if events.send(EncoderEvent::Chunk(chunk)).is_err() {
                break;
            }
        }
        Ok(())
    }
}

impl AudioEncoder for LibavAudioEncoder {
    fn encode(&mut self, block: &AudioBlock) -> SpectrumResult<()> {
        if let Some(last) = self.last_ts
            && block.timestamp_us <= last
        {
            return Err(SpectrumError::encode(format!(
                "audio block timestamp {} is not after {last}",
                block.timestamp_us
            )));
        }
        if self.events.is_none() {
            return Err(SpectrumError::encode("audio encoder is already finished"));
        }
        self.last_ts = Some(block.timestamp_us);
        if self.next_pts.is_none() {
            self.next_pts = Some(us_to_ticks(block.timestamp_us as i64, self.time_base));
        }
        self.pending.extend(block.interleaved());
        let ch = usize::from(CHANNELS);
        while self.pending.len() >= self.frame_size * ch {
            self.send_samples(self.frame_size)?;
        }
        self.blocks += 1;
        Ok(())
    }

    fn flush(&mut self) -> SpectrumResult<()> {
        if self.events.is_none() {
            return Ok(());
        }
        let rest = self.pending.len() / usize::from(CHANNELS);
        if rest > 0 {
            self.send_samples(rest)?;
        }
        self.encoder
            .send_eof()
            .map_err(libav_err("flush audio encoder"))?;
        self.drain()?;
        self.events = None;
        tracing::info!(blocks = self.blocks, "audio encoder flushed");
        Ok(())
    }

    fn abort(&mut self) {
        self.events = None;
        self.pending.clear();
    }
}
