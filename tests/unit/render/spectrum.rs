use super::*;
use crate::settings::LogoSettings;
use std::io::Cursor;

fn small_canvas() -> Canvas {
    Canvas {
        width: 64,
        height: 36,
    }
}

fn pixel(frame: &FrameRGBA, x: u32, y: u32) -> [u8; 4] {
    let i = ((y * frame.width + x) * 4) as usize;
    [frame.data[i], frame.data[i + 1], frame.data[i + 2], frame.data[i + 3]]
}

fn write_png(path: &std::path::Path, rgba: [u8; 4], w: u32, h: u32) {
    let img = image::RgbaImage::from_pixel(w, h, image::Rgba(rgba));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    std::fs::write(path, buf).unwrap();
}

#[test]
fn identical_inputs_produce_identical_pixels() {
    let mags: Vec<u8> = (0..1024).map(|i| (i % 256) as u8).collect();
    for style in [
        SpectrumStyle::Bars,
        SpectrumStyle::Mirror,
        SpectrumStyle::Radial,
        SpectrumStyle::Wave,
    ] {
        let settings = VisualSettings {
            style,
            color: ColorMode::Cycle {
                speed_deg_per_sec: 90.0,
                spread_deg: 180.0,
            },
            ..Default::default()
        };
        let mut a = SpectrumRenderer::new(small_canvas(), settings.clone()).unwrap();
        let mut b = SpectrumRenderer::new(small_canvas(), settings).unwrap();
        let fa = a.render(1234.0, &mags).unwrap();
        let fb = b.render(1234.0, &mags).unwrap();
        assert_eq!(fa, fb, "{style:?}");
        // Re-rendering on a reused context is stable too.
        assert_eq!(a.render(1234.0, &mags).unwrap(), fa, "{style:?}");
        assert_eq!(fa.data.len(), small_canvas().rgba_len());
        assert!(fa.premultiplied);
    }
}

#[test]
fn loud_spectrum_lights_up_bars() {
    let settings = VisualSettings {
        bar_count: 8,
        bar_gap: 0.0,
        min_bar_height: 0.0,
        height_ratio: 1.0,
        ..Default::default()
    };
    let bg = settings.background.color;
    let mut r = SpectrumRenderer::new(small_canvas(), settings).unwrap();

    let silent = r.render(0.0, &[0u8; 64]).unwrap();
    assert_eq!(pixel(&silent, 4, 20), [bg.r, bg.g, bg.b, 255]);

    let loud = r.render(0.0, &[255u8; 64]).unwrap();
    assert_eq!(pixel(&loud, 4, 20), [0x36, 0xc5, 0xf0, 255]);
}

#[test]
fn cycle_colors_change_with_time_only() {
    let settings = VisualSettings {
        bar_count: 8,
        min_bar_height: 36.0,
        color: ColorMode::Cycle {
            speed_deg_per_sec: 120.0,
            spread_deg: 0.0,
        },
        ..Default::default()
    };
    let mut r = SpectrumRenderer::new(small_canvas(), settings).unwrap();
    let mags = [0u8; 32];
    let t0 = r.render(0.0, &mags).unwrap();
    let t1 = r.render(1000.0, &mags).unwrap();
    let t0_again = r.render(0.0, &mags).unwrap();
    assert_ne!(pixel(&t0, 4, 30), pixel(&t1, 4, 30));
    assert_eq!(t0, t0_again);
}

#[test]
fn background_image_and_logo_are_drawn() {
    let dir = std::env::temp_dir().join(format!("wavyte-spectrum-render-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let bg_path = dir.join("bg.png");
    let logo_path = dir.join("logo.png");
    write_png(&bg_path, [255, 0, 0, 255], 8, 8);
    write_png(&logo_path, [0, 255, 0, 255], 4, 4);

    let mut settings = VisualSettings {
        opacity: 0.0,
        ..Default::default()
    };
    settings.background.image = Some(bg_path);
    settings.background.dim = 0.0;
    settings.logo = Some(LogoSettings {
        image: logo_path,
        anchor: Anchor::TopLeft,
        scale: 0.25,
        margin: 2.0,
    });

    let mut r = SpectrumRenderer::new(small_canvas(), settings).unwrap();
    let f = r.render(0.0, &[]).unwrap();
    let bg = pixel(&f, 60, 30);
    assert!(bg[0] >= 250 && bg[1] <= 5 && bg[3] >= 250, "{bg:?}");
    let logo = pixel(&f, 5, 5);
    assert!(logo[1] >= 250 && logo[0] <= 5 && logo[3] >= 250, "{logo:?}");

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn missing_asset_fails_at_construction() {
    let mut settings = VisualSettings::default();
    settings.background.image = Some("target/does/not/exist.png".into());
    assert!(SpectrumRenderer::new(small_canvas(), settings).is_err());
}

#[test]
fn bar_levels_average_groups() {
    let mags = [0u8, 255, 255, 255];
    let levels = bar_levels(&mags, 2, 1.0);
    assert_eq!(levels.len(), 2);
    assert!((levels[0] - 0.5).abs() < 1e-9);
    assert!((levels[1] - 1.0).abs() < 1e-9);

    // Sensitivity scales and clamps.
    let levels = bar_levels(&mags, 2, 4.0);
    assert_eq!(levels, vec![1.0, 1.0]);

    // More bars than bins reuse bins.
    assert_eq!(bar_levels(&[255], 4, 1.0), vec![1.0; 4]);
    assert_eq!(bar_levels(&[], 3, 1.0), vec![0.0; 3]);
}

#[test]
fn anchors_respect_margin() {
    let c = (100.0, 50.0);
    let s = (10.0, 5.0);
    assert_eq!(anchor_origin(Anchor::TopLeft, c, s, 4.0), (4.0, 4.0));
    assert_eq!(anchor_origin(Anchor::BottomRight, c, s, 4.0), (86.0, 41.0));
    assert_eq!(anchor_origin(Anchor::Center, c, s, 4.0), (45.0, 22.5));
}
