//! Render inputs: visual style, audio encoding and quality presets.

pub mod encoding;
pub mod visual;

pub use encoding::{EncodingSettings, QualityPreset, RenderConfig};
pub use visual::{Anchor, BackgroundSettings, ColorMode, LogoSettings, SpectrumStyle, VisualSettings};
