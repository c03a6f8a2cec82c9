//! Frame rendering: the [`FrameRenderer`] seam and the built-in `vello_cpu` spectrum renderer.

pub(crate) mod assets;
pub mod backend;
pub mod color;
pub mod spectrum;

pub use backend::{FrameRGBA, FrameRenderer};
pub use color::HexColor;
pub use spectrum::SpectrumRenderer;
