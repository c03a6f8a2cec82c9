use crate::foundation::core::Canvas;
use crate::foundation::error::{SpectrumError, SpectrumResult};
use crate::render::assets::{ImagePaint, load_image_paint};
use crate::render::backend::{FrameRGBA, FrameRenderer};
use crate::render::color::{HexColor, cycle_color};
use crate::settings::{Anchor, ColorMode, SpectrumStyle, VisualSettings};
use kurbo::{Affine, BezPath, Circle, Point, Rect, Shape};

/// CPU spectrum renderer powered by `vello_cpu`.
///
/// Draw order: background color, background image (cover-fit) with dim overlay, spectrum layer
/// (at `opacity`), logo.
pub struct SpectrumRenderer {
    canvas: Canvas,
    settings: VisualSettings,
    background: Option<ImagePaint>,
    logo: Option<ImagePaint>,
    ctx: Option<vello_cpu::RenderContext>,
    pixmap: Option<vello_cpu::Pixmap>,
}

impl SpectrumRenderer {
    /// Validate settings and load image assets. Paths are used as given.
    pub fn new(canvas: Canvas, settings: VisualSettings) -> SpectrumResult<Self> {
        canvas.validate()?;
        settings.validate()?;
        let background = settings
            .background
            .image
            .as_deref()
            .map(load_image_paint)
            .transpose()?;
        let logo = settings
            .logo
            .as_ref()
            .map(|l| load_image_paint(&l.image))
            .transpose()?;
        tracing::debug!(
            width = canvas.width,
            height = canvas.height,
            style = ?settings.style,
            background_image = background.is_some(),
            logo = logo.is_some(),
            "spectrum renderer ready"
        );
        Ok(Self {
            canvas,
            settings,
            background,
            logo,
            ctx: None,
            pixmap: None,
        })
    }

    pub fn settings(&self) -> &VisualSettings {
        &self.settings
    }

    fn bar_color(&self, time_ms: f64, bar: usize, bars: usize) -> HexColor {
        match &self.settings.color {
            ColorMode::Fixed { color } => *color,
            ColorMode::Cycle {
                speed_deg_per_sec,
                spread_deg,
            } => cycle_color(time_ms, *speed_deg_per_sec, *spread_deg, bar, bars),
        }
    }

    fn draw(&self, ctx: &mut vello_cpu::RenderContext, time_ms: f64, magnitudes: &[u8]) {
        let w = f64::from(self.canvas.width);
        let h = f64::from(self.canvas.height);
        let full = Rect::new(0.0, 0.0, w, h);

        ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
        ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
        ctx.set_paint(self.settings.background.color.to_cpu());
        ctx.fill_rect(&rect_to_cpu(full));

        if let Some(bg) = &self.background {
            let scale = (w / f64::from(bg.w)).max(h / f64::from(bg.h));
            let dx = (w - f64::from(bg.w) * scale) * 0.5;
            let dy = (h - f64::from(bg.h) * scale) * 0.5;
            draw_image(ctx, bg, Affine::translate((dx, dy)) * Affine::scale(scale), 1.0);

            let dim = self.settings.background.dim;
            if dim > 0.0 {
                ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
                ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
                    0,
                    0,
                    0,
                    (dim * 255.0).round() as u8,
                ));
                ctx.fill_rect(&rect_to_cpu(full));
            }
        }

        let levels = bar_levels(
            magnitudes,
            self.settings.bar_count as usize,
            self.settings.sensitivity,
        );
        let opacity = self.settings.opacity as f32;
        if opacity > 0.0 {
            if opacity < 1.0 {
                ctx.push_opacity_layer(opacity);
            }
            match self.settings.style {
                SpectrumStyle::Bars => self.draw_bars(ctx, time_ms, &levels, false),
                SpectrumStyle::Mirror => self.draw_bars(ctx, time_ms, &levels, true),
                SpectrumStyle::Radial => self.draw_radial(ctx, time_ms, &levels),
                SpectrumStyle::Wave => self.draw_wave(ctx, time_ms, &levels),
            }
            if opacity < 1.0 {
                ctx.pop_layer();
            }
        }

        if let (Some(logo), Some(cfg)) = (&self.logo, &self.settings.logo) {
            let lh = h * cfg.scale;
            let scale = lh / f64::from(logo.h);
            let lw = f64::from(logo.w) * scale;
            let origin = anchor_origin(cfg.anchor, (w, h), (lw, lh), cfg.margin);
            draw_image(ctx, logo, Affine::translate(origin) * Affine::scale(scale), 1.0);
        }
    }

    fn draw_bars(&self, ctx: &mut vello_cpu::RenderContext, time_ms: f64, levels: &[f64], mirror: bool) {
        let w = f64::from(self.canvas.width);
        let h = f64::from(self.canvas.height);
        let n = levels.len();
        let slot = w / n as f64;
        let bar_w = slot * (1.0 - self.settings.bar_gap);
        let inset = (slot - bar_w) * 0.5;
        let max_len = h * self.settings.height_ratio;

        ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
        for (i, &v) in levels.iter().enumerate() {
            let len = (v * max_len).max(self.settings.min_bar_height);
            let x0 = i as f64 * slot + inset;
            let rect = if mirror {
                let cy = h * 0.5;
                Rect::new(x0, cy - len * 0.5, x0 + bar_w, cy + len * 0.5)
            } else {
                Rect::new(x0, h - len, x0 + bar_w, h)
            };
            ctx.set_paint(self.bar_color(time_ms, i, n).to_cpu());
            ctx.fill_rect(&rect_to_cpu(rect));
        }
    }

    fn draw_radial(&self, ctx: &mut vello_cpu::RenderContext, time_ms: f64, levels: &[f64]) {
        let w = f64::from(self.canvas.width);
        let h = f64::from(self.canvas.height);
        let short = w.min(h);
        let center = Point::new(w * 0.5, h * 0.5);
        let r0 = short * self.settings.radius;
        let max_len = (short * 0.5 - r0).max(0.0) * self.settings.height_ratio;
        let n = levels.len();
        let step = std::f64::consts::TAU / n as f64;
        let bar_w = (step * r0 * (1.0 - self.settings.bar_gap)).max(1.0);

        for (i, &v) in levels.iter().enumerate() {
            let len = (v * max_len).max(self.settings.min_bar_height);
            let angle = i as f64 * step - std::f64::consts::FRAC_PI_2;
            let tr = Affine::translate(center.to_vec2()) * Affine::rotate(angle);
            ctx.set_transform(affine_to_cpu(tr));
            ctx.set_paint(self.bar_color(time_ms, i, n).to_cpu());
            ctx.fill_rect(&rect_to_cpu(Rect::new(r0, -bar_w * 0.5, r0 + len, bar_w * 0.5)));
        }

        let ring = Circle::new(center, r0 * 0.92).to_path(0.1);
        ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
        let c = self.bar_color(time_ms, 0, n);
        ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(c.r, c.g, c.b, c.a / 3));
        ctx.fill_path(&bezpath_to_cpu(&ring));
    }

    fn draw_wave(&self, ctx: &mut vello_cpu::RenderContext, time_ms: f64, levels: &[f64]) {
        let w = f64::from(self.canvas.width);
        let h = f64::from(self.canvas.height);
        let n = levels.len();
        let max_len = h * self.settings.height_ratio;

        let mut path = BezPath::new();
        path.move_to((0.0, h));
        for (i, &v) in levels.iter().enumerate() {
            let x = if n <= 1 { 0.0 } else { w * i as f64 / (n - 1) as f64 };
            let len = (v * max_len).max(self.settings.min_bar_height);
            path.line_to((x, h - len));
        }
        path.line_to((w, h));
        path.close_path();

        ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
        ctx.set_paint(self.bar_color(time_ms, n / 2, n).to_cpu());
        ctx.fill_path(&bezpath_to_cpu(&path));
    }
}

impl FrameRenderer for SpectrumRenderer {
    fn canvas(&self) -> Canvas {
        self.canvas
    }

    fn render(&mut self, time_ms: f64, magnitudes: &[u8]) -> SpectrumResult<FrameRGBA> {
        if !time_ms.is_finite() {
            return Err(SpectrumError::validation("frame time must be finite"));
        }
        let width: u16 = self
            .canvas
            .width
            .try_into()
            .map_err(|_| SpectrumError::validation("canvas width exceeds u16"))?;
        let height: u16 = self
            .canvas
            .height
            .try_into()
            .map_err(|_| SpectrumError::validation("canvas height exceeds u16"))?;

        let mut ctx = match self.ctx.take() {
            Some(ctx) if ctx.width() == width && ctx.height() == height => ctx,
            _ => vello_cpu::RenderContext::new(width, height),
        };
        ctx.reset();
        self.draw(&mut ctx, time_ms, magnitudes);

        let mut pixmap = match self.pixmap.take() {
            Some(p) if p.width() == width && p.height() == height => p,
            _ => vello_cpu::Pixmap::new(width, height),
        };
        pixmap.data_as_u8_slice_mut().fill(0);
        ctx.flush();
        ctx.render_to_pixmap(&mut pixmap);
        let data = pixmap.data_as_u8_slice().to_vec();

        self.ctx = Some(ctx);
        self.pixmap = Some(pixmap);
        Ok(FrameRGBA {
            width: self.canvas.width,
            height: self.canvas.height,
            data,
            premultiplied: true,
        })
    }
}

/// Collapse analyser bins into `bars` levels in `0..=1`.
///
/// Each bar averages an equal share of the bins; with fewer bins than bars, bars share bins.
pub(crate) fn bar_levels(magnitudes: &[u8], bars: usize, sensitivity: f64) -> Vec<f64> {
    if bars == 0 {
        return Vec::new();
    }
    if magnitudes.is_empty() {
        return vec![0.0; bars];
    }
    let len = magnitudes.len();
    (0..bars)
        .map(|i| {
            let start = i * len / bars;
            let end = ((i + 1) * len / bars).max(start + 1).min(len);
            let start = start.min(end - 1);
            let group = &magnitudes[start..end];
            let sum: u32 = group.iter().map(|&m| u32::from(m)).sum();
            let avg = f64::from(sum) / group.len() as f64;
            (avg / 255.0 * sensitivity).clamp(0.0, 1.0)
        })
        .collect()
}

fn anchor_origin(anchor: Anchor, canvas: (f64, f64), size: (f64, f64), margin: f64) -> (f64, f64) {
    let (w, h) = canvas;
    let (lw, lh) = size;
    match anchor {
        Anchor::Center => ((w - lw) * 0.5, (h - lh) * 0.5),
        Anchor::TopLeft => (margin, margin),
        Anchor::TopRight => (w - lw - margin, margin),
        Anchor::BottomLeft => (margin, h - lh - margin),
        Anchor::BottomRight => (w - lw - margin, h - lh - margin),
    }
}

fn draw_image(ctx: &mut vello_cpu::RenderContext, img: &ImagePaint, tr: Affine, opacity: f32) {
    ctx.set_transform(affine_to_cpu(tr));
    ctx.set_paint(img.paint.clone());
    if opacity < 1.0 {
        ctx.push_opacity_layer(opacity);
    }
    ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
        0.0,
        0.0,
        f64::from(img.w),
        f64::from(img.h),
    ));
    if opacity < 1.0 {
        ctx.pop_layer();
    }
}

fn affine_to_cpu(a: Affine) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::new(a.as_coeffs())
}

fn rect_to_cpu(r: Rect) -> vello_cpu::kurbo::Rect {
    vello_cpu::kurbo::Rect::new(r.x0, r.y0, r.x1, r.y1)
}

fn bezpath_to_cpu(path: &BezPath) -> vello_cpu::kurbo::BezPath {
    use kurbo::PathEl;

    let mut out = vello_cpu::kurbo::BezPath::new();
    for &el in path.elements() {
        match el {
            PathEl::MoveTo(p) => out.move_to(vello_cpu::kurbo::Point::new(p.x, p.y)),
            PathEl::LineTo(p) => out.line_to(vello_cpu::kurbo::Point::new(p.x, p.y)),
            PathEl::QuadTo(p1, p2) => out.quad_to(
                vello_cpu::kurbo::Point::new(p1.x, p1.y),
                vello_cpu::kurbo::Point::new(p2.x, p2.y),
            ),
            PathEl::CurveTo(p1, p2, p3) => out.curve_to(
                vello_cpu::kurbo::Point::new(p1.x, p1.y),
                vello_cpu::kurbo::Point::new(p2.x, p2.y),
                vello_cpu::kurbo::Point::new(p3.x, p3.y),
            ),
            PathEl::ClosePath => out.close_path(),
        }
    }
    out
}

#[cfg(test)]
#[path = "../../tests/unit/render/spectrum.rs"]
mod tests;
