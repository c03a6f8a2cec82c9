use crate::foundation::error::{SpectrumError, SpectrumResult};
use anyhow::Context;
use std::path::Path;
use std::sync::Arc;

/// Decoded image ready to be used as a `vello_cpu` paint.
#[derive(Clone)]
pub(crate) struct ImagePaint {
    pub(crate) paint: vello_cpu::Image,
    pub(crate) w: u32,
    pub(crate) h: u32,
}

impl std::fmt::Debug for ImagePaint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImagePaint")
            .field("w", &self.w)
            .field("h", &self.h)
            .finish()
    }
}

/// Load an image file (any format the `image` crate decodes) as a premultiplied paint.
pub(crate) fn load_image_paint(path: &Path) -> SpectrumResult<ImagePaint> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("read image '{}'", path.display()))?;
    decode_image_paint(&bytes)
        .map_err(|e| SpectrumError::validation(format!("image '{}': {e}", path.display())))
}

pub(crate) fn decode_image_paint(bytes: &[u8]) -> SpectrumResult<ImagePaint> {
    let dyn_img = image::load_from_memory(bytes).context("decode image from memory")?;
    let rgba = dyn_img.to_rgba8();
    let (width, height) = rgba.dimensions();
    if width == 0 || height == 0 {
        return Err(SpectrumError::validation("image has zero size"));
    }
    let mut premul = rgba.into_raw();
    premultiply_rgba8_in_place(&mut premul);
    let pixmap = pixmap_from_premul_bytes(&premul, width, height)?;
    Ok(ImagePaint {
        paint: vello_cpu::Image {
            image: vello_cpu::ImageSource::Pixmap(Arc::new(pixmap)),
            sampler: vello_cpu::peniko::ImageSampler::default(),
        },
        w: width,
        h: height,
    })
}

fn pixmap_from_premul_bytes(
    bytes: &[u8],
    width: u32,
    height: u32,
) -> SpectrumResult<vello_cpu::Pixmap> {
    let w: u16 = width
        .try_into()
        .map_err(|_| SpectrumError::validation("image width exceeds u16"))?;
    let h: u16 = height
        .try_into()
        .map_err(|_| SpectrumError::validation("image height exceeds u16"))?;
    let pixels = bytes
        .chunks_exact(4)
        .map(|px| vello_cpu::peniko::color::PremulRgba8::from_u8_array([px[0], px[1], px[2], px[3]]))
        .collect::<Vec<_>>();
    Ok(vello_cpu::Pixmap::from_parts_with_opacity(pixels, w, h, true))
}

fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3];
        let [r, g, b, _] = crate::foundation::math::premul_rgba8(px[0], px[1], px[2], a);
        px[0] = r;
        px[1] = g;
        px[2] = b;
    }
}
