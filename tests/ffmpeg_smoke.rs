#![cfg(all(feature = "ffmpeg", unix))]

use std::process::Command;

use wavyte_spectrum::{
    AudioPcm, CancelToken, Canvas, EncoderRuntime, EncodingSettings, FfmpegDecoder, FfmpegRuntime,
    FileSinkProvider, NoPreview, NoProgress, Playlist, RenderConfig, RenderDeps, RenderOutcome,
    RenderRequest, SpectrumRenderer, Track, VisualSettings, run_render,
};

fn libav_usable(runtime: &FfmpegRuntime) -> bool {
    if let Err(e) = runtime.check_environment() {
        eprintln!("skipping: {e}");
        return false;
    }
    true
}

fn tone(secs: f64, freq: f64) -> AudioPcm {
    let frames = (secs * 48_000.0) as usize;
    let mut interleaved = Vec::with_capacity(frames * 2);
    for i in 0..frames {
        let s = (0.4 * (std::f64::consts::TAU * freq * i as f64 / 48_000.0).sin()) as f32;
        interleaved.extend_from_slice(&[s, s * 0.5]);
    }
    AudioPcm {
        sample_rate: 48_000,
        channels: 2,
        interleaved_f32: interleaved,
    }
}

#[test]
fn libav_render_produces_a_fragmented_mp4() {
    let runtime = FfmpegRuntime::new();
    if !libav_usable(&runtime) {
        return;
    }

    let dir = std::env::temp_dir().join(format!("wavyte-spectrum-smoke-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();

    let mut playlist = Playlist::new();
    playlist
        .push(Track::from_pcm("a", "A", tone(0.6, 220.0)).unwrap())
        .unwrap();
    playlist
        .push(Track::from_pcm("b", "B", tone(0.6, 880.0)).unwrap())
        .unwrap();

    let canvas = Canvas {
        width: 64,
        height: 48,
    };
    let visual = VisualSettings {
        fft_size: 512,
        bar_count: 16,
        ..VisualSettings::default()
    };
    let request = RenderRequest {
        playlist: &playlist,
        visual: &visual,
        encoding: EncodingSettings {
            loop_count: 1,
            audio_bitrate: 64_000,
        },
        config: RenderConfig {
            fps: 10,
            video_bitrate: 200_000,
            label: "smoke".to_owned(),
        },
        canvas,
        output_name: "smoke".to_owned(),
    };
    let sinks = FileSinkProvider::new(&dir);
    let deps = RenderDeps {
        runtime: &runtime,
        decoder: &FfmpegDecoder,
        sinks: &sinks,
        preview: &NoPreview,
    };
    let mut renderer = SpectrumRenderer::new(canvas, visual.clone()).unwrap();

    let outcome = run_render(&deps, &request, &mut renderer, &mut NoProgress, &CancelToken::new())
        .unwrap();
    let RenderOutcome::Completed(report) = outcome else {
        panic!("render did not complete");
    };
    assert_eq!(report.frames, 12);

    let out = dir.join("smoke.mp4");
    let bytes = std::fs::read(&out).unwrap();
    assert_eq!(&bytes[4..8], b"ftyp");
    assert!(bytes.windows(4).any(|w| w == b"moof"), "output is not fragmented");
    // Audio arrives after video, but the interleaving writer still places both tracks in the
    // first fragment of a short clip.
    assert_eq!(first_fragment_track_count(&bytes), 2);
    assert_eq!(report.bytes, bytes.len() as u64);
    assert!(report.keyframes >= 1);
    assert!(!dir.join("smoke.mp4.part").exists());

    let streams = Command::new("ffprobe")
        .args(["-v", "error", "-show_entries", "stream=codec_type", "-of", "csv=p=0"])
        .arg(&out)
        .output();
    if let Ok(streams) = streams
        && streams.status.success()
    {
        let text = String::from_utf8_lossy(&streams.stdout);
        assert!(text.contains("video"), "{text}");
        assert!(text.contains("audio"), "{text}");
    }

    let _ = std::fs::remove_dir_all(&dir);
}

/// Number of `traf` boxes between the first `moof` and the `mdat` that follows it.
fn first_fragment_track_count(bytes: &[u8]) -> usize {
    let Some(moof) = bytes.windows(4).position(|w| w == b"moof") else {
        return 0;
    };
    let fragment = &bytes[moof..];
    let end = fragment
        .windows(4)
        .position(|w| w == b"mdat")
        .unwrap_or(fragment.len());
    fragment[..end].windows(4).filter(|w| *w == b"traf").count()
}
