use super::{StreamSetup, libav_err, ticks_to_us, us_to_ticks};
use crate::encode::chunk::{EncodedChunk, EncoderEvent, TrackKind};
use crate::encode::codec::{VideoCodec, VideoEncoderConfig};
use crate::encode::runtime::VideoEncoder;
use crate::foundation::error::{SpectrumError, SpectrumResult};
use crate::render::backend::FrameRGBA;
use ffmpeg::format::Pixel;
use ffmpeg::software::scaling;
use ffmpeg::util::frame::video::Video as VideoFrame;
use ffmpeg::{Dictionary, Packet, Rational, codec, picture};
use ffmpeg_next as ffmpeg;
use std::sync::mpsc::Sender;

/// libvpx VP9/VP8 encoder. Frames are flattened onto black, converted to yuv420p and encoded on
/// the calling thread; packets go out as [`EncodedChunk`]s.
pub struct LibavVideoEncoder {
    encoder: codec::encoder::video::Encoder,
    codec: ffmpeg::Codec,
    scaler: scaling::Context,
    rgba: VideoFrame,
    yuv: VideoFrame,
    flat: Vec<u8>,
    time_base: Rational,
    width: u32,
    height: u32,
    events: Option<Sender<EncoderEvent>>,
    last_ts: Option<u64>,
    frames: u64,
}

impl LibavVideoEncoder {
    pub fn open(cfg: &VideoEncoderConfig, global_header: bool, events: Sender<EncoderEvent>) -> SpectrumResult<Self> {
        if !cfg.width.is_multiple_of(2) || !cfg.height.is_multiple_of(2) {
            return Err(SpectrumError::validation(
                "video width/height must be even (required for yuv420p output)",
            ));
        }
        let codec = codec::encoder::find_by_name(cfg.codec.ffmpeg_encoder()).ok_or_else(|| {
            SpectrumError::unsupported(format!("libav has no {} encoder", cfg.codec.ffmpeg_encoder()))
        })?;
        let mut ctx = codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .map_err(libav_err("video encoder context"))?;

        let time_base = Rational::new(cfg.fps.den as i32, cfg.fps.num as i32);
        let gop = cfg.keyframe_interval.max(1);
        ctx.set_width(cfg.width);
        ctx.set_height(cfg.height);
        ctx.set_format(Pixel::YUV420P);
        ctx.set_time_base(time_base);
        ctx.set_frame_rate(Some(Rational::new(cfg.fps.num as i32, cfg.fps.den as i32)));
        ctx.set_bit_rate(cfg.bitrate as usize);
        ctx.set_gop(gop as u32);
        if global_header {
            ctx.set_flags(codec::Flags::GLOBAL_HEADER);
        }

        let mut opts = Dictionary::new();
        opts.set("deadline", cfg.deadline.as_str());
        opts.set("cpu-used", &cfg.cpu_used.to_string());
        match cfg.codec {
            VideoCodec::Vp9 => opts.set("row-mt", "1"),
            // One packet per input frame.
            VideoCodec::Vp8 => opts.set("auto-alt-ref", "0"),
        }
        let encoder = ctx
            .open_as_with(codec, opts)
            .map_err(libav_err("open video encoder"))?;

        let scaler = scaling::Context::get(
            Pixel::RGBA,
            cfg.width,
            cfg.height,
            Pixel::YUV420P,
            cfg.width,
            cfg.height,
            scaling::Flags::BILINEAR,
        )
        .map_err(libav_err("rgba to yuv420p scaler"))?;

        tracing::info!(
            encoder = cfg.codec.ffmpeg_encoder(),
            width = cfg.width,
            height = cfg.height,
            fps = cfg.fps.as_f64(),
            bitrate = cfg.bitrate,
            gop,
            "video encoder opened"
        );
        Ok(Self {
            encoder,
            codec,
            scaler,
            rgba: VideoFrame::new(Pixel::RGBA, cfg.width, cfg.height),
            yuv: VideoFrame::empty(),
            flat: vec![0u8; cfg.width as usize * cfg.height as usize * 4],
            time_base,
            width: cfg.width,
            height: cfg.height,
            events: Some(events),
            last_ts: None,
            frames: 0,
        })
    }

    pub fn stream_setup(&self) -> StreamSetup {
        StreamSetup {
            codec: self.codec,
            parameters: codec::Parameters::from(&self.encoder),
            time_base: self.time_base,
        }
    }

    /// Copy the flattened frame into the RGBA input frame, honouring its row stride.
    fn fill_rgba(&mut self) {
        let row = self.width as usize * 4;
        let stride = self.rgba.stride(0);
        let plane = self.rgba.data_mut(0);
        for (y, src) in self.flat.chunks_exact(row).enumerate() {
            plane[y * stride..y * stride + row].copy_from_slice(src);
        }
    }

    fn drain(&mut self) -> SpectrumResult<()> {
        let Some(events) = &self.events else {
            return Err(SpectrumError::encode("video encoder is already finished"));
        };
        let mut packet = Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            let Some(data) = packet.data() else {
                continue;
            };
            let duration = packet.duration();
            let chunk = EncodedChunk {
                track: TrackKind::Video,
                timestamp_us: ticks_to_us(packet.pts().unwrap_or(0), self.time_base),
                duration_us: (duration > 0).then(|| ticks_to_us(duration, self.time_base) as u64),
                keyframe: packet.is_key(),
                data: data.to_vec(),
            };
            if events.send(EncoderEvent::Chunk(chunk)).is_err() {
                // Mux pump is gone; the render is being torn down.
                break;
            }
        }
        Ok(())
    }
}

impl VideoEncoder for LibavVideoEncoder {
    fn encode(&mut self, frame: &FrameRGBA, timestamp_us: u64, keyframe: bool) -> SpectrumResult<()> {
        if frame.width != self.width || frame.height != self.height {
            return Err(SpectrumError::validation(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, self.width, self.height
            )));
        }
        if let Some(last) = self.last_ts
            && timestamp_us <= last
        {
            return Err(SpectrumError::encode(format!(
                "video frame timestamp {timestamp_us} is not after {last}"
            )));
        }
        if self.events.is_none() {
            return Err(SpectrumError::encode("video encoder is already finished"));
        }
        self.last_ts = Some(timestamp_us);

        frame.flatten_into(&mut self.flat, [0, 0, 0])?;
        self.fill_rgba();
        self.scaler
            .run(&self.rgba, &mut self.yuv)
            .map_err(libav_err("convert frame to yuv420p"))?;
        self.yuv
            .set_pts(Some(us_to_ticks(timestamp_us as i64, self.time_base)));
        self.yuv.set_kind(if keyframe {
            picture::Type::I
        } else {
            picture::Type::None
        });
        self.encoder
            .send_frame(&self.yuv)
            .map_err(libav_err("send video frame"))?;
        tracing::trace!(frame = self.frames, timestamp_us, keyframe, "frame submitted");
        self.frames += 1;
        self.drain()
    }

    fn flush(&mut self) -> SpectrumResult<()> {
        if self.events.is_none() {
            return Ok(());
        }
        self.encoder
            .send_eof()
            .map_err(libav_err("flush video encoder"))?;
        self.drain()?;
        self.events = None;
        tracing::info!(frames = self.frames, "video encoder flushed");
        Ok(())
    }

    fn abort(&mut self) {
        self.events = None;
    }
}
