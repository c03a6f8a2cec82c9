use crate::encode::runtime::EncoderRuntime;
use crate::foundation::core::{CHANNELS, Canvas, Fps, SAMPLE_RATE};
use crate::foundation::error::{SpectrumError, SpectrumResult};

/// Video codec family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VideoCodec {
    Vp9,
    Vp8,
}

impl VideoCodec {
    /// ffmpeg encoder name.
    pub fn ffmpeg_encoder(self) -> &'static str {
        match self {
            Self::Vp9 => "libvpx-vp9",
            Self::Vp8 => "libvpx",
        }
    }
}

/// libvpx encoding deadline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Deadline {
    Good,
    Realtime,
}

impl Deadline {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Good => "good",
            Self::Realtime => "realtime",
        }
    }
}

/// One entry of the negotiation priority list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CodecCandidate {
    pub codec: VideoCodec,
    pub deadline: Deadline,
    /// libvpx `cpu-used` speed setting.
    pub cpu_used: u8,
    pub label: &'static str,
}

/// Candidates in negotiation order: quality first, then compatibility, then speed.
pub const CODEC_PRIORITY: [CodecCandidate; 3] = [
    CodecCandidate {
        codec: VideoCodec::Vp9,
        deadline: Deadline::Good,
        cpu_used: 4,
        label: "VP9 profile 0",
    },
    CodecCandidate {
        codec: VideoCodec::Vp8,
        deadline: Deadline::Good,
        cpu_used: 4,
        label: "VP8",
    },
    CodecCandidate {
        codec: VideoCodec::Vp8,
        deadline: Deadline::Realtime,
        cpu_used: 8,
        label: "VP8 realtime",
    },
];

/// Fully specified video encoder configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoEncoderConfig {
    pub codec: VideoCodec,
    pub deadline: Deadline,
    pub cpu_used: u8,
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub fps: Fps,
    /// Target bitrate in bits per second.
    pub bitrate: u32,
    /// GOP length in frames.
    pub keyframe_interval: u64,
}

impl VideoEncoderConfig {
    pub fn from_candidate(candidate: &CodecCandidate, canvas: Canvas, fps: Fps, bitrate: u32) -> Self {
        Self {
            codec: candidate.codec,
            deadline: candidate.deadline,
            cpu_used: candidate.cpu_used,
            label: candidate.label.to_owned(),
            width: canvas.width,
            height: canvas.height,
            fps,
            bitrate,
            keyframe_interval: fps.keyframe_interval(),
        }
    }

    /// VP codec level (`31` = level 3.1) for this picture size and rate.
    pub fn level(&self) -> u8 {
        vp9_level(self.width, self.height, self.fps)
    }

    /// Codec string as used by browsers and in `RenderReport`.
    pub fn codec_string(&self) -> String {
        match self.codec {
            VideoCodec::Vp9 => format!("vp09.00.{:02}.08", self.level()),
            VideoCodec::Vp8 => "vp8".to_owned(),
        }
    }
}

/// Opus encoder configuration. Sample rate and channel count are fixed by the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioEncoderConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub bitrate: u32,
}

impl AudioEncoderConfig {
    pub fn opus(bitrate: u32) -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            channels: CHANNELS,
            bitrate,
        }
    }

    pub fn codec_string(&self) -> &'static str {
        "opus"
    }
}

/// Pick the first supported candidate from [`CODEC_PRIORITY`].
///
/// Deterministic for identical inputs. Fails with `CodecNegotiation` when nothing is supported.
pub fn negotiate(
    runtime: &dyn EncoderRuntime,
    canvas: Canvas,
    fps: Fps,
    bitrate: u32,
) -> SpectrumResult<VideoEncoderConfig> {
    let mut tried = Vec::with_capacity(CODEC_PRIORITY.len());
    for candidate in &CODEC_PRIORITY {
        let cfg = VideoEncoderConfig::from_candidate(candidate, canvas, fps, bitrate);
        if runtime.is_config_supported(&cfg) {
            tracing::info!(
                codec = %cfg.codec_string(),
                label = cfg.label,
                deadline = cfg.deadline.as_str(),
                "video codec negotiated"
            );
            return Ok(cfg);
        }
        tracing::debug!(label = cfg.label, runtime = runtime.name(), "codec candidate unsupported");
        tried.push(cfg.label);
    }
    Err(SpectrumError::negotiation(format!(
        "no supported video encoder configuration on runtime '{}' (tried: {})",
        runtime.name(),
        tried.join(", ")
    )))
}

fn vp9_level(width: u32, height: u32, fps: Fps) -> u8 {
    // (level, max luma picture size, max luma sample rate)
    const LEVELS: [(u8, u64, u64); 14] = [
        (10, 36_864, 829_440),
        (11, 73_728, 2_764_800),
        (20, 122_880, 4_608_000),
        (21, 245_760, 9_216_000),
        (30, 552_960, 20_736_000),
        (31, 983_040, 36_864_000),
        (40, 2_228_224, 83_558_400),
        (41, 2_228_224, 160_432_128),
        (50, 8_912_896, 311_951_360),
        (51, 8_912_896, 588_251_136),
        (52, 8_912_896, 1_176_502_272),
        (60, 35_651_584, 1_176_502_272),
        (61, 35_651_584, 2_353_004_544),
        (62, 35_651_584, 4_706_009_088),
    ];
    let pixels = u64::from(width) * u64::from(height);
    let rate = (pixels * u64::from(fps.num)).div_ceil(u64::from(fps.den.max(1)));
    LEVELS
        .iter()
        .find(|(_, size, sr)| pixels <= *size && rate <= *sr)
        .map(|(l, _, _)| *l)
        .unwrap_or(62)
}
