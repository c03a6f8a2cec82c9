pub(crate) fn mul_div255_u16(x: u16, y: u16) -> u16 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u16
}

/// Straight-alpha RGBA8 to premultiplied RGBA8.
pub(crate) fn premul_rgba8(r: u8, g: u8, b: u8, a: u8) -> [u8; 4] {
    let a16 = u16::from(a);
    [
        mul_div255_u16(u16::from(r), a16) as u8,
        mul_div255_u16(u16::from(g), a16) as u8,
        mul_div255_u16(u16::from(b), a16) as u8,
        a,
    ]
}

/// HSL (degrees, 0..1, 0..1) to RGB8.
pub(crate) fn hsl_to_rgb8(h_deg: f64, s: f64, l: f64) -> [u8; 3] {
    let h = h_deg.rem_euclid(360.0) / 60.0;
    let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let x = c * (1.0 - ((h % 2.0) - 1.0).abs());
    let (r1, g1, b1) = match h as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = l - c / 2.0;
    let to8 = |v: f64| ((v + m).clamp(0.0, 1.0) * 255.0).round() as u8;
    [to8(r1), to8(g1), to8(b1)]
}
