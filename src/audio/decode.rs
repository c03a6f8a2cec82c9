use crate::foundation::core::{CHANNELS, SAMPLE_RATE};
use crate::foundation::error::{SpectrumError, SpectrumResult};
use crate::playlist::{Track, TrackSource};
use std::path::Path;
use std::process::{Command, Stdio};

/// Decoded interleaved PCM.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioPcm {
    pub sample_rate: u32,
    pub channels: u16,
    pub interleaved_f32: Vec<f32>,
}

impl AudioPcm {
    /// Number of sample frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.interleaved_f32.len() / usize::from(self.channels.max(1))
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / f64::from(self.sample_rate)
    }

    /// Return this buffer as 48 kHz stereo, upmixing mono. Other layouts are rejected.
    pub(crate) fn into_pipeline_format(self) -> SpectrumResult<Vec<f32>> {
        if self.sample_rate != SAMPLE_RATE {
            return Err(SpectrumError::decode(format!(
                "pcm sample rate must be {SAMPLE_RATE} Hz, got {}",
                self.sample_rate
            )));
        }
        match self.channels {
            2 => Ok(self.interleaved_f32),
            1 => Ok(self
                .interleaved_f32
                .iter()
                .flat_map(|&s| [s, s])
                .collect()),
            n => Err(SpectrumError::decode(format!(
                "pcm must be mono or stereo, got {n} channels"
            ))),
        }
    }
}

/// Decodes a track into 48 kHz interleaved stereo `f32`.
pub trait AudioDecoder: Send + Sync {
    fn decode(&self, track: &Track) -> SpectrumResult<AudioPcm>;

    /// Duration of an encoded file in seconds, used to fill missing playlist durations.
    fn read_duration(&self, path: &Path) -> SpectrumResult<f64>;
}

/// Decoder backed by the system `ffmpeg`/`ffprobe` binaries.
///
/// In-memory PCM tracks bypass ffmpeg entirely.
#[derive(Clone, Copy, Debug, Default)]
pub struct FfmpegDecoder;

impl AudioDecoder for FfmpegDecoder {
    fn decode(&self, track: &Track) -> SpectrumResult<AudioPcm> {
        match track.source() {
            TrackSource::Pcm(pcm) => Ok(AudioPcm::clone(pcm)),
            TrackSource::File(path) => decode_audio_f32_stereo(path, SAMPLE_RATE),
        }
    }

    fn read_duration(&self, path: &Path) -> SpectrumResult<f64> {
        query_duration_secs(path)
    }
}

/// Decode any ffmpeg-readable audio file into interleaved stereo `f32` at `sample_rate`.
pub fn decode_audio_f32_stereo(path: &Path, sample_rate: u32) -> SpectrumResult<AudioPcm> {
    if !path.is_file() {
        return Err(SpectrumError::decode(format!(
            "audio file '{}' does not exist",
            path.display()
        )));
    }

    let out = Command::new("ffmpeg")
        .args(["-v", "error", "-i"])
        .arg(path)
        .args([
            "-vn",
            "-f",
            "f32le",
            "-acodec",
            "pcm_f32le",
            "-ac",
            &CHANNELS.to_string(),
            "-ar",
            &sample_rate.to_string(),
            "pipe:1",
        ])
        .stdin(Stdio::null())
        .output()
        .map_err(|e| {
            SpectrumError::unsupported(format!("failed to run ffmpeg for audio decode: {e}"))
        })?;

    if !out.status.success() {
        return Err(SpectrumError::decode(format!(
            "ffmpeg audio decode failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    if !out.stdout.len().is_multiple_of(4) {
        return Err(SpectrumError::decode(
            "decoded audio byte length is not aligned to f32 samples",
        ));
    }
    let mut pcm = Vec::<f32>::with_capacity(out.stdout.len() / 4);
    for chunk in out.stdout.chunks_exact(4) {
        pcm.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
    if pcm.is_empty() {
        return Err(SpectrumError::decode(format!(
            "'{}' contains no audio samples",
            path.display()
        )));
    }

    Ok(AudioPcm {
        sample_rate,
        channels: CHANNELS,
        interleaved_f32: pcm,
    })
}

/// Read the container duration of `path` through `ffprobe`.
pub fn query_duration_secs(path: &Path) -> SpectrumResult<f64> {
    #[derive(serde::Deserialize)]
    struct FormatSection {
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct FormatReport {
        format: Option<FormatSection>,
    }

    let out = Command::new("ffprobe")
        .args(["-v", "error", "-print_format", "json", "-show_format"])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| SpectrumError::unsupported(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(SpectrumError::decode(format!(
            "ffprobe failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let parsed: FormatReport = serde_json::from_slice(&out.stdout)
        .map_err(|e| SpectrumError::decode(format!("ffprobe json parse failed: {e}")))?;
    parsed
        .format
        .and_then(|f| f.duration)
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .ok_or_else(|| {
            SpectrumError::decode(format!("ffprobe reported no duration for '{}'", path.display()))
        })
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
