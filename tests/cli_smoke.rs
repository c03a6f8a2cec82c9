use std::path::PathBuf;
use std::process::Command;

fn exe() -> PathBuf {
    std::env::var_os("CARGO_BIN_EXE_wavyte-spectrum")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let mut p = PathBuf::from("target").join("debug");
            p.push(if cfg!(windows) {
                "wavyte-spectrum.exe"
            } else {
                "wavyte-spectrum"
            });
            p
        })
}

/// 16-bit PCM mono WAV.
fn write_wav(path: &std::path::Path, secs: f64) {
    let rate = 48_000u32;
    let frames = (secs * f64::from(rate)) as u32;
    let mut data = Vec::with_capacity(frames as usize * 2);
    for i in 0..frames {
        let s = (0.5 * (std::f64::consts::TAU * 330.0 * f64::from(i) / f64::from(rate)).sin()
            * f64::from(i16::MAX)) as i16;
        data.extend_from_slice(&s.to_le_bytes());
    }
    let mut wav = Vec::with_capacity(44 + data.len());
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data.len() as u32).to_le_bytes());
    wav.extend_from_slice(b"WAVEfmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes());
    wav.extend_from_slice(&rate.to_le_bytes());
    wav.extend_from_slice(&(rate * 2).to_le_bytes());
    wav.extend_from_slice(&2u16.to_le_bytes());
    wav.extend_from_slice(&16u16.to_le_bytes());
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&(data.len() as u32).to_le_bytes());
    wav.extend_from_slice(&data);
    std::fs::write(path, wav).unwrap();
}

#[test]
fn cli_lists_presets() {
    let out = Command::new(exe()).arg("presets").output().unwrap();
    assert!(out.status.success());
    let text = String::from_utf8_lossy(&out.stdout);
    for name in ["draft", "standard", "high"] {
        assert!(text.contains(name), "{text}");
    }
}

#[test]
fn cli_frame_writes_png() {
    if !wavyte_spectrum::is_ffmpeg_on_path() {
        eprintln!("skipping: ffmpeg not on PATH");
        return;
    }
    let dir = PathBuf::from("target").join("cli_smoke");
    std::fs::create_dir_all(&dir).unwrap();
    write_wav(&dir.join("tone.wav"), 1.0);

    let project = serde_json::json!({
        "name": "cli smoke",
        "playlist": [{ "path": "tone.wav", "duration": 1.0 }],
        "canvas": { "width": 64, "height": 36 },
        "visual": { "style": "radial", "fft_size": 1024 }
    });
    let project_path = dir.join("project.json");
    std::fs::write(&project_path, serde_json::to_vec_pretty(&project).unwrap()).unwrap();
    let out_path = dir.join("frame.png");
    let _ = std::fs::remove_file(&out_path);

    let status = Command::new(exe())
        .arg("frame")
        .arg("--in")
        .arg(&project_path)
        .args(["--time", "0.5", "--out"])
        .arg(&out_path)
        .status()
        .unwrap();

    assert!(status.success());
    let img = image::open(&out_path).unwrap();
    assert_eq!((img.width(), img.height()), (64, 36));
}
