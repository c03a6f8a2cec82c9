use crate::foundation::error::{SpectrumError, SpectrumResult};

/// Sample rate of every audio buffer in the render pipeline.
pub const SAMPLE_RATE: u32 = 48_000;

/// Channel count of every audio buffer in the render pipeline.
pub const CHANNELS: u16 = 2;

const FRAME_EPSILON: f64 = 1e-6;

/// Absolute 0-based frame index on the virtual timeline.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FrameIndex(pub u64);

/// Frames-per-second represented as a rational `num/den`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fps {
    /// Numerator (frames).
    pub num: u32,
    /// Denominator (seconds), must be non-zero.
    pub den: u32,
}

impl Fps {
    /// Create a validated FPS value.
    pub fn new(num: u32, den: u32) -> SpectrumResult<Self> {
        if den == 0 {
            return Err(SpectrumError::validation("Fps den must be > 0"));
        }
        if num == 0 {
            return Err(SpectrumError::validation("Fps num must be > 0"));
        }
        Ok(Self { num, den })
    }

    /// Integer frame rate shorthand (`Fps::whole(30)` is `30/1`).
    pub fn whole(fps: u32) -> SpectrumResult<Self> {
        Self::new(fps, 1)
    }

    /// Convert to floating-point FPS.
    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Duration of one frame in seconds.
    pub fn frame_duration_secs(self) -> f64 {
        f64::from(self.den) / f64::from(self.num)
    }

    /// Virtual time of frame `idx` in seconds (`idx / fps`).
    pub fn frame_time_secs(self, idx: FrameIndex) -> f64 {
        (idx.0 as f64) * self.frame_duration_secs()
    }

    /// Presentation timestamp of frame `idx` in microseconds (floor).
    pub fn frame_timestamp_us(self, idx: FrameIndex) -> u64 {
        let num = u128::from(idx.0) * 1_000_000 * u128::from(self.den);
        (num / u128::from(self.num)) as u64
    }

    /// Frame count of the keyframe interval (two seconds of video, at least one frame).
    pub fn keyframe_interval(self) -> u64 {
        ((self.as_f64() * 2.0).round() as u64).max(1)
    }

    /// Frames needed to cover `secs` of playback: `ceil(secs * fps)`.
    ///
    /// Products within a millionth of a frame of a whole number count as that number, so float
    /// sums such as `0.1 + 0.2` seconds never gain a spurious frame.
    pub fn frames_for_secs(self, secs: f64) -> u64 {
        if !secs.is_finite() || secs <= 0.0 {
            return 0;
        }
        let exact = secs * f64::from(self.num) / f64::from(self.den);
        let nearest = exact.round();
        if (exact - nearest).abs() < FRAME_EPSILON {
            nearest as u64
        } else {
            exact.ceil() as u64
        }
    }
}

/// Output canvas dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Canvas {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Canvas {
    pub const MIN_SIDE: u32 = 16;
    pub const MAX_SIDE: u32 = 4096;

    /// Validate the canvas for yuv420p video output.
    pub fn validate(self) -> SpectrumResult<()> {
        for (name, v) in [("width", self.width), ("height", self.height)] {
            if !(Self::MIN_SIDE..=Self::MAX_SIDE).contains(&v) {
                return Err(SpectrumError::validation(format!(
                    "canvas {name} must be in {}..={}, got {v}",
                    Self::MIN_SIDE,
                    Self::MAX_SIDE
                )));
            }
            if !v.is_multiple_of(2) {
                return Err(SpectrumError::validation(format!(
                    "canvas {name} must be even (required for yuv420p output), got {v}"
                )));
            }
        }
        Ok(())
    }

    /// Byte length of one RGBA8 frame.
    pub fn rgba_len(self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

impl Default for Canvas {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// Convert a frame delta to the nearest sample index at `sample_rate`.
pub fn frame_to_sample(frame_delta: u64, fps: Fps, sample_rate: u32) -> u64 {
    let num = u128::from(frame_delta) * u128::from(sample_rate) * u128::from(fps.den);
    let den = u128::from(fps.num);
    ((num + (den / 2)) / den) as u64
}

/// Convert seconds to the nearest sample index at `sample_rate`.
pub fn secs_to_samples(secs: f64, sample_rate: u32) -> u64 {
    (secs * f64::from(sample_rate)).round().max(0.0) as u64
}

/// Convert a sample count to microseconds (floor).
pub fn samples_to_us(samples: u64, sample_rate: u32) -> u64 {
    ((u128::from(samples) * 1_000_000) / u128::from(sample_rate.max(1))) as u64
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
