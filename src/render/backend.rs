use crate::foundation::core::Canvas;
use crate::foundation::error::{SpectrumError, SpectrumResult};
use crate::foundation::math::mul_div255_u16;

/// A rendered frame as RGBA8 pixels.
///
/// Frames are **premultiplied alpha**. The `premultiplied` flag keeps that explicit at API
/// boundaries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameRGBA {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// RGBA8 bytes, tightly packed, row-major.
    pub data: Vec<u8>,
    /// Whether the `data` is premultiplied alpha.
    pub premultiplied: bool,
}

impl FrameRGBA {
    pub fn canvas(&self) -> Canvas {
        Canvas {
            width: self.width,
            height: self.height,
        }
    }

    /// Convert to straight alpha (for PNG output).
    pub fn to_straight_rgba8(&self) -> Vec<u8> {
        let mut out = self.data.clone();
        if !self.premultiplied {
            return out;
        }
        for px in out.chunks_exact_mut(4) {
            let a = u16::from(px[3]);
            if a == 0 {
                px[..3].fill(0);
                continue;
            }
            for c in &mut px[..3] {
                *c = ((u16::from(*c) * 255 + a / 2) / a).min(255) as u8;
            }
        }
        out
    }

    /// Composite over an opaque background into `dst` (opaque RGBA8, same length as `data`).
    pub fn flatten_into(&self, dst: &mut [u8], bg_rgb: [u8; 3]) -> SpectrumResult<()> {
        if dst.len() != self.data.len() || !dst.len().is_multiple_of(4) {
            return Err(SpectrumError::validation(
                "flatten_into expects an rgba8 buffer of the frame's size",
            ));
        }
        for (d, s) in dst.chunks_exact_mut(4).zip(self.data.chunks_exact(4)) {
            let a = u16::from(s[3]);
            if a == 255 {
                d.copy_from_slice(s);
                continue;
            }
            let inv = 255 - a;
            for c in 0..3 {
                let src = if self.premultiplied {
                    u16::from(s[c])
                } else {
                    mul_div255_u16(u16::from(s[c]), a)
                };
                d[c] = (src + mul_div255_u16(u16::from(bg_rgb[c]), inv)).min(255) as u8;
            }
            d[3] = 255;
        }
        Ok(())
    }
}

/// Draws one video frame from the analyser output at a virtual time.
///
/// Implementations must be deterministic: identical `(time_ms, magnitudes)` and settings produce
/// identical pixels. The scheduler never passes wall-clock time.
pub trait FrameRenderer {
    fn canvas(&self) -> Canvas;

    fn render(&mut self, time_ms: f64, magnitudes: &[u8]) -> SpectrumResult<FrameRGBA>;
}

impl<R: FrameRenderer + ?Sized> FrameRenderer for Box<R> {
    fn canvas(&self) -> Canvas {
        (**self).canvas()
    }

    fn render(&mut self, time_ms: f64, magnitudes: &[u8]) -> SpectrumResult<FrameRGBA> {
        (**self).render(time_ms, magnitudes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(px: [u8; 4], premultiplied: bool) -> FrameRGBA {
        FrameRGBA {
            width: 1,
            height: 1,
            data: px.to_vec(),
            premultiplied,
        }
    }

    #[test]
    fn flatten_transparent_pixel_returns_background() {
        let mut dst = [0u8; 4];
        frame([0, 0, 0, 0], true).flatten_into(&mut dst, [10, 20, 30]).unwrap();
        assert_eq!(dst, [10, 20, 30, 255]);
    }

    #[test]
    fn flatten_opaque_pixel_is_identity() {
        let mut dst = [0u8; 4];
        frame([1, 2, 3, 255], true).flatten_into(&mut dst, [10, 20, 30]).unwrap();
        assert_eq!(dst, [1, 2, 3, 255]);
    }

    #[test]
    fn flatten_half_alpha_blends_both_encodings() {
        let mut premul = [0u8; 4];
        frame([100, 0, 0, 128], true).flatten_into(&mut premul, [0, 0, 200]).unwrap();
        let mut straight = [0u8; 4];
        frame([200, 0, 0, 128], false).flatten_into(&mut straight, [0, 0, 200]).unwrap();
        assert_eq!(premul, [100, 0, 100, 255]);
        assert_eq!(straight, premul);
        assert!(frame([0; 4], true).flatten_into(&mut [0u8; 3], [0; 3]).is_err());
    }
}
