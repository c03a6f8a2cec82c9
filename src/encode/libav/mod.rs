//! In-process libav runtime: libvpx and libopus encoders feeding the libav MP4 muxer.
//!
//! Built with the `ffmpeg` feature, which links the system FFmpeg libraries through
//! `ffmpeg-next`. The container is fragmented MP4 streamed through a pipe into the write queue,
//! so the muxer never seeks and never holds the encoded stream in memory.

mod audio;
mod mux;
mod video;

pub use audio::LibavAudioEncoder;
pub use mux::LibavMuxer;
pub use video::LibavVideoEncoder;

use crate::encode::chunk::{EncoderEvent, TrackKind};
use crate::encode::codec::{AudioEncoderConfig, VideoEncoderConfig};
use crate::encode::runtime::{EncoderRuntime, MediaSession};
use crate::foundation::error::{SpectrumError, SpectrumResult};
use crate::sink::queue::WriteQueue;
use ffmpeg::Rational;
use ffmpeg_next as ffmpeg;
use std::sync::OnceLock;
use std::sync::mpsc::Sender;

const OPUS_ENCODER: &str = "libopus";

/// Encoder runtime backed by the linked libav libraries (libvpx + libopus).
#[derive(Debug, Default)]
pub struct FfmpegRuntime {
    init: OnceLock<Result<(), String>>,
}

impl FfmpegRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn init(&self) -> SpectrumResult<()> {
        self.init
            .get_or_init(|| {
                ffmpeg::init().map_err(|e| e.to_string())?;
                tracing::debug!("libav initialized");
                Ok(())
            })
            .clone()
            .map_err(|e| SpectrumError::unsupported(format!("libav failed to initialize: {e}")))
    }
}

impl EncoderRuntime for FfmpegRuntime {
    fn name(&self) -> &str {
        "libav"
    }

    fn check_environment(&self) -> SpectrumResult<()> {
        self.init()?;
        if ffmpeg::codec::encoder::find_by_name(OPUS_ENCODER).is_none() {
            return Err(SpectrumError::unsupported(
                "the linked libav has no libopus encoder",
            ));
        }
        Ok(())
    }

    fn is_config_supported(&self, cfg: &VideoEncoderConfig) -> bool {
        self.init().is_ok() && ffmpeg::codec::encoder::find_by_name(cfg.codec.ffmpeg_encoder()).is_some()
    }

    #[tracing::instrument(skip_all, fields(codec = %video.codec_string(), width = video.width, height = video.height))]
    fn open_session(
        &self,
        video: &VideoEncoderConfig,
        audio: &AudioEncoderConfig,
        queue: WriteQueue,
        events: Sender<EncoderEvent>,
    ) -> SpectrumResult<MediaSession> {
        self.init()?;
        let mut muxer = LibavMuxer::create(queue)?;
        let global_header = muxer.needs_global_header();
        let video_enc = LibavVideoEncoder::open(video, global_header, events.clone())?;
        let audio_enc = LibavAudioEncoder::open(audio, global_header, events)?;
        muxer.add_stream(TrackKind::Video, video_enc.stream_setup())?;
        muxer.add_stream(TrackKind::Audio, audio_enc.stream_setup())?;
        muxer.write_header()?;
        Ok(MediaSession {
            video: Box::new(video_enc),
            audio: Box::new(audio_enc),
            muxer: Box::new(muxer),
        })
    }
}

/// What the muxer needs from an opened encoder to describe its stream.
pub struct StreamSetup {
    pub codec: ffmpeg::Codec,
    pub parameters: ffmpeg::codec::Parameters,
    pub time_base: Rational,
}

fn libav_err(what: &'static str) -> impl FnOnce(ffmpeg::Error) -> SpectrumError {
    move |e| SpectrumError::encode(format!("libav {what}: {e}"))
}

/// Microseconds to ticks of `time_base`, rounded to nearest.
fn us_to_ticks(us: i64, time_base: Rational) -> i64 {
    div_round(
        i128::from(us) * i128::from(time_base.denominator()),
        1_000_000 * i128::from(time_base.numerator()),
    )
}

/// Ticks of `time_base` to microseconds, rounded to nearest.
fn ticks_to_us(ticks: i64, time_base: Rational) -> i64 {
    div_round(
        i128::from(ticks) * i128::from(time_base.numerator()) * 1_000_000,
        i128::from(time_base.denominator()),
    )
}

fn div_round(n: i128, d: i128) -> i64 {
    if d == 0 {
        return 0;
    }
    let q = (2 * n.abs() + d.abs()) / (2 * d.abs());
    if (n < 0) != (d < 0) { -q as i64 } else { q as i64 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_conversion_rounds_to_nearest() {
        let fps30 = Rational::new(1, 30);
        assert_eq!(us_to_ticks(33_333, fps30), 1);
        assert_eq!(us_to_ticks(9_966_666, fps30), 299);
        assert_eq!(ticks_to_us(1, fps30), 33_333);
        assert_eq!(ticks_to_us(2, fps30), 66_667);

        let opus = Rational::new(1, 48_000);
        assert_eq!(ticks_to_us(-312, opus), -6_500);
        assert_eq!(us_to_ticks(-6_500, opus), -312);
        assert_eq!(us_to_ticks(20_000, opus), 960);
    }
}
