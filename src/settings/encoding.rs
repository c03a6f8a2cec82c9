use crate::foundation::core::Fps;
use crate::foundation::error::{SpectrumError, SpectrumResult};
use serde::{Deserialize, Serialize};

/// Audio-side encoding settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EncodingSettings {
    /// How many times the whole playlist repeats (>= 1).
    pub loop_count: u32,
    /// Opus bitrate in bits per second (> 0).
    pub audio_bitrate: u32,
}

impl Default for EncodingSettings {
    fn default() -> Self {
        Self {
            loop_count: 1,
            audio_bitrate: 192_000,
        }
    }
}

impl EncodingSettings {
    pub fn validate(&self) -> SpectrumResult<()> {
        if self.loop_count == 0 {
            return Err(SpectrumError::validation("loop_count must be >= 1"));
        }
        if self.audio_bitrate == 0 {
            return Err(SpectrumError::validation("audio_bitrate must be > 0"));
        }
        Ok(())
    }
}

/// Named quality presets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum QualityPreset {
    Draft,
    #[default]
    Standard,
    High,
}

impl QualityPreset {
    pub const ALL: [QualityPreset; 3] = [Self::Draft, Self::Standard, Self::High];

    pub fn config(self) -> RenderConfig {
        match self {
            Self::Draft => RenderConfig {
                fps: 24,
                video_bitrate: 2_500_000,
                label: "Draft (24 fps, 2.5 Mbps)".to_owned(),
            },
            Self::Standard => RenderConfig {
                fps: 30,
                video_bitrate: 5_000_000,
                label: "Standard (30 fps, 5 Mbps)".to_owned(),
            },
            Self::High => RenderConfig {
                fps: 60,
                video_bitrate: 8_000_000,
                label: "High (60 fps, 8 Mbps)".to_owned(),
            },
        }
    }
}

/// Video quality preset selected before a render starts. Immutable during the render.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenderConfig {
    pub fps: u32,
    /// Target video bitrate in bits per second.
    pub video_bitrate: u32,
    pub label: String,
}

impl RenderConfig {
    pub fn validate(&self) -> SpectrumResult<()> {
        if !(1..=120).contains(&self.fps) {
            return Err(SpectrumError::validation(format!(
                "fps must be in 1..=120, got {}",
                self.fps
            )));
        }
        if self.video_bitrate == 0 {
            return Err(SpectrumError::validation("video_bitrate must be > 0"));
        }
        Ok(())
    }

    pub fn frame_rate(&self) -> SpectrumResult<Fps> {
        Fps::whole(self.fps)
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        QualityPreset::default().config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_valid_and_ordered() {
        let mut prev = 0;
        for p in QualityPreset::ALL {
            let cfg = p.config();
            cfg.validate().unwrap();
            assert!(cfg.video_bitrate > prev);
            prev = cfg.video_bitrate;
        }
    }

    #[test]
    fn encoding_settings_reject_zero() {
        assert!(
            EncodingSettings {
                loop_count: 0,
                ..Default::default()
            }
            .validate()
            .is_err()
        );
        assert!(
            EncodingSettings {
                audio_bitrate: 0,
                ..Default::default()
            }
            .validate()
            .is_err()
        );
        EncodingSettings::default().validate().unwrap();
    }
}
