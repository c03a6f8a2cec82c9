use crate::foundation::error::{SpectrumError, SpectrumResult};
use crate::render::color::HexColor;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::path::PathBuf;

/// Spectrum drawing style.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpectrumStyle {
    /// Vertical bars rising from the bottom edge.
    #[default]
    Bars,
    /// Bars mirrored around the horizontal center line.
    Mirror,
    /// Bars radiating outward from a center circle.
    Radial,
    /// Filled waveform-like envelope through the bar tops.
    Wave,
}

/// How bar colors are chosen.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ColorMode {
    /// One fixed color for every bar.
    Fixed { color: HexColor },
    /// Hue rotating with virtual time, spread across the bars.
    Cycle {
        /// Hue rotation speed in degrees per second of virtual time.
        speed_deg_per_sec: f64,
        /// Hue difference between the first and the last bar.
        spread_deg: f64,
    },
}

impl Default for ColorMode {
    fn default() -> Self {
        Self::Fixed {
            color: HexColor::rgb(0x36, 0xc5, 0xf0),
        }
    }
}

/// Placement anchor for overlay images.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    #[default]
    Center,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackgroundSettings {
    pub color: HexColor,
    /// Optional image, scaled to cover the canvas.
    pub image: Option<PathBuf>,
    /// Darkening applied over the background image (0 = none, 1 = black).
    pub dim: f64,
}

impl Default for BackgroundSettings {
    fn default() -> Self {
        Self {
            color: HexColor::rgb(0x0b, 0x0d, 0x14),
            image: None,
            dim: 0.35,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogoSettings {
    pub image: PathBuf,
    #[serde(default)]
    pub anchor: Anchor,
    /// Logo height as a fraction of the canvas height.
    #[serde(default = "default_logo_scale")]
    pub scale: f64,
    /// Distance from the canvas edge in pixels (ignored for `center`).
    #[serde(default = "default_logo_margin")]
    pub margin: f64,
}

fn default_logo_scale() -> f64 {
    0.18
}

fn default_logo_margin() -> f64 {
    24.0
}

/// Flat visual configuration consumed by the frame renderer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VisualSettings {
    pub style: SpectrumStyle,
    pub bar_count: u32,
    /// Gap between bars as a fraction of one bar slot.
    pub bar_gap: f64,
    /// Gain applied to analyser magnitudes before drawing.
    pub sensitivity: f64,
    /// Minimum drawn bar length in pixels.
    pub min_bar_height: f64,
    /// Maximum bar length as a fraction of the canvas height.
    pub height_ratio: f64,
    /// Radial style inner radius as a fraction of the shorter canvas side.
    pub radius: f64,
    /// Opacity of the spectrum layer.
    pub opacity: f64,
    /// Analyser smoothing time constant.
    pub smoothing: f64,
    /// Analyser FFT size (power of two).
    pub fft_size: u32,
    pub color: ColorMode,
    pub background: BackgroundSettings,
    pub logo: Option<LogoSettings>,
}

impl Default for VisualSettings {
    fn default() -> Self {
        Self {
            style: SpectrumStyle::Bars,
            bar_count: 64,
            bar_gap: 0.2,
            sensitivity: 1.0,
            min_bar_height: 2.0,
            height_ratio: 0.6,
            radius: 0.2,
            opacity: 1.0,
            smoothing: 0.8,
            fft_size: 2048,
            color: ColorMode::default(),
            background: BackgroundSettings::default(),
            logo: None,
        }
    }
}

impl VisualSettings {
    pub const BAR_COUNT: RangeInclusive<u32> = 8..=256;
    pub const BAR_GAP: RangeInclusive<f64> = 0.0..=0.9;
    pub const SENSITIVITY: RangeInclusive<f64> = 0.1..=4.0;
    pub const MIN_BAR_HEIGHT: RangeInclusive<f64> = 0.0..=64.0;
    pub const HEIGHT_RATIO: RangeInclusive<f64> = 0.05..=1.0;
    pub const RADIUS: RangeInclusive<f64> = 0.05..=0.45;
    pub const UNIT: RangeInclusive<f64> = 0.0..=1.0;
    pub const SMOOTHING: RangeInclusive<f64> = 0.0..=0.99;
    pub const FFT_SIZE: RangeInclusive<u32> = 256..=16_384;
    pub const LOGO_SCALE: RangeInclusive<f64> = 0.01..=1.0;

    /// Check every numeric field against its declared range.
    pub fn validate(&self) -> SpectrumResult<()> {
        if !Self::BAR_COUNT.contains(&self.bar_count) {
            return Err(out_of_range("bar_count", self.bar_count, &Self::BAR_COUNT));
        }
        check_f64("bar_gap", self.bar_gap, &Self::BAR_GAP)?;
        check_f64("sensitivity", self.sensitivity, &Self::SENSITIVITY)?;
        check_f64("min_bar_height", self.min_bar_height, &Self::MIN_BAR_HEIGHT)?;
        check_f64("height_ratio", self.height_ratio, &Self::HEIGHT_RATIO)?;
        check_f64("radius", self.radius, &Self::RADIUS)?;
        check_f64("opacity", self.opacity, &Self::UNIT)?;
        check_f64("smoothing", self.smoothing, &Self::SMOOTHING)?;
        check_f64("background.dim", self.background.dim, &Self::UNIT)?;
        if !Self::FFT_SIZE.contains(&self.fft_size) || !self.fft_size.is_power_of_two() {
            return Err(SpectrumError::validation(format!(
                "fft_size must be a power of two in {}..={}, got {}",
                Self::FFT_SIZE.start(),
                Self::FFT_SIZE.end(),
                self.fft_size
            )));
        }
        if let ColorMode::Cycle {
            speed_deg_per_sec,
            spread_deg,
        } = &self.color
            && (!speed_deg_per_sec.is_finite() || !spread_deg.is_finite())
        {
            return Err(SpectrumError::validation(
                "color cycle speed and spread must be finite",
            ));
        }
        if let Some(logo) = &self.logo {
            check_f64("logo.scale", logo.scale, &Self::LOGO_SCALE)?;
            if !logo.margin.is_finite() || logo.margin < 0.0 {
                return Err(SpectrumError::validation("logo.margin must be >= 0"));
            }
        }
        Ok(())
    }
}

fn check_f64(name: &str, v: f64, range: &RangeInclusive<f64>) -> SpectrumResult<()> {
    if v.is_finite() && range.contains(&v) {
        Ok(())
    } else {
        Err(out_of_range(name, v, range))
    }
}

fn out_of_range<T: std::fmt::Display>(name: &str, v: T, range: &RangeInclusive<T>) -> SpectrumError {
    SpectrumError::validation(format!(
        "{name} must be in {}..={}, got {v}",
        range.start(),
        range.end()
    ))
}
