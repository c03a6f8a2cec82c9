use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use wavyte_spectrum::encode::{Deadline, InMemoryRuntime, TrackKind, VideoCodec};
use wavyte_spectrum::mux::{SAMPLE_LOG_MAGIC, SampleLog};
use wavyte_spectrum::{
    AudioDecoder, AudioPcm, CancelToken, Canvas, EncodingSettings, FrameRGBA, FrameRenderer,
    MemorySinkProvider, NoPreview, NoProgress, Playlist, PreviewControl, ProgressUpdate,
    RenderConfig, RenderController, RenderDeps, RenderOutcome, RenderPhase, RenderRequest,
    SpectrumError, SpectrumRenderer, SpectrumResult, Track, TrackSource, VisualSettings,
    run_render,
};

const CANVAS: Canvas = Canvas {
    width: 32,
    height: 18,
};

/// Synthesizes a tone of the track's declared length; paths containing "broken" fail.
struct ToneDecoder;

impl AudioDecoder for ToneDecoder {
    fn decode(&self, track: &Track) -> SpectrumResult<AudioPcm> {
        match track.source() {
            TrackSource::Pcm(pcm) => Ok(AudioPcm::clone(pcm)),
            TrackSource::File(p) if p.to_string_lossy().contains("broken") => {
                Err(SpectrumError::decode("invalid frame header"))
            }
            TrackSource::File(_) => {
                let frames = (track.duration_secs() * 48_000.0).round() as usize;
                let mut interleaved = Vec::with_capacity(frames * 2);
                for i in 0..frames {
                    let s = (0.3 * (std::f64::consts::TAU * 440.0 * i as f64 / 48_000.0).sin()) as f32;
                    interleaved.extend_from_slice(&[s, s]);
                }
                Ok(AudioPcm {
                    sample_rate: 48_000,
                    channels: 2,
                    interleaved_f32: interleaved,
                })
            }
        }
    }

    fn read_duration(&self, _path: &Path) -> SpectrumResult<f64> {
        Ok(1.0)
    }
}

/// Solid frame whose gray level is the first magnitude.
struct FlatRenderer;

impl FrameRenderer for FlatRenderer {
    fn canvas(&self) -> Canvas {
        CANVAS
    }

    fn render(&mut self, _time_ms: f64, magnitudes: &[u8]) -> SpectrumResult<FrameRGBA> {
        let v = magnitudes.first().copied().unwrap_or(0);
        Ok(FrameRGBA {
            width: CANVAS.width,
            height: CANVAS.height,
            data: [v, v, v, 255].repeat(CANVAS.rgba_len() / 4),
            premultiplied: true,
        })
    }
}

#[derive(Default)]
struct CountingPreview {
    suspended: AtomicUsize,
    restored: AtomicUsize,
}

impl PreviewControl for CountingPreview {
    fn suspend(&self) {
        self.suspended.fetch_add(1, Ordering::SeqCst);
    }

    fn restore(&self) {
        self.restored.fetch_add(1, Ordering::SeqCst);
    }
}

fn playlist(paths: &[(&str, f64)]) -> Playlist {
    let mut p = Playlist::new();
    for (i, (path, secs)) in paths.iter().enumerate() {
        p.push(Track::from_file(format!("t{i}"), *path, *secs, *path).unwrap())
            .unwrap();
    }
    p
}

fn request<'a>(playlist: &'a Playlist, visual: &'a VisualSettings, loop_count: u32) -> RenderRequest<'a> {
    RenderRequest {
        playlist,
        visual,
        encoding: EncodingSettings {
            loop_count,
            audio_bitrate: 96_000,
        },
        config: RenderConfig {
            fps: 30,
            video_bitrate: 500_000,
            label: "test".to_owned(),
        },
        canvas: CANVAS,
        output_name: "Night Drive!".to_owned(),
    }
}

fn visual() -> VisualSettings {
    VisualSettings {
        fft_size: 256,
        bar_count: 8,
        ..VisualSettings::default()
    }
}

#[test]
fn looped_playlist_renders_every_frame_with_fixed_gop() {
    let runtime = InMemoryRuntime::new();
    let sinks = MemorySinkProvider::new();
    let preview = CountingPreview::default();
    let deps = RenderDeps {
        runtime: &runtime,
        decoder: &ToneDecoder,
        sinks: &sinks,
        preview: &preview,
    };
    let list = playlist(&[("a.mp3", 3.0), ("b.mp3", 2.0)]);
    let visual = visual();
    let req = request(&list, &visual, 2);

    let mut updates: Vec<ProgressUpdate> = Vec::new();
    let mut listener = |u: &ProgressUpdate| {
        if u.percent >= 100.0 {
            let (_, sink) = sinks.last().unwrap();
            assert!(sink.is_closed(), "100% reported before the sink closed");
        }
        updates.push(u.clone());
    };
    let outcome = RenderController::new()
        .run(&deps, &req, &mut FlatRenderer, &mut listener)
        .unwrap();

    let RenderOutcome::Completed(report) = outcome else {
        panic!("render did not complete");
    };
    assert_eq!(report.frames, 300);
    assert_eq!(report.keyframes, 5);
    assert_eq!(report.audio_blocks, 10);
    assert_eq!(report.codec, "vp09.00.10.08");
    assert!((report.duration_secs - 10.0).abs() < 1e-6);

    let stats = runtime.stats();
    assert_eq!(stats.keyframes, vec![0, 60, 120, 180, 240]);
    assert_eq!(stats.video_timestamps_us.len(), 300);
    for (i, ts) in stats.video_timestamps_us.iter().enumerate() {
        assert_eq!(*ts, i as u64 * 1_000_000 / 30);
    }
    assert_eq!(stats.audio_frames, 480_000);
    assert_eq!(stats.audio_timestamps_us, (0..10u64).map(|s| s * 1_000_000).collect::<Vec<_>>());
    assert!(stats.video_flushed && stats.audio_flushed && !stats.aborted);

    let (name, sink) = sinks.last().unwrap();
    assert_eq!(name, "NightDrive.mp4");
    let state = sink.snapshot();
    assert!(state.closed && !state.aborted);
    assert_eq!(&state.bytes[..8], SAMPLE_LOG_MAGIC);
    assert_eq!(report.bytes, state.bytes.len() as u64);
    let log = SampleLog::parse(&state.bytes).unwrap();
    assert_eq!(log.track(TrackKind::Video).count(), 300);
    assert_eq!(log.track(TrackKind::Video).filter(|r| r.keyframe).count(), 5);
    assert_eq!(log.track(TrackKind::Audio).count(), 10);

    drop(listener);
    assert!(updates.windows(2).all(|w| w[0].percent <= w[1].percent));
    assert_eq!(updates.last().unwrap().phase, RenderPhase::Done);
    assert_eq!(updates.last().unwrap().percent, 100.0);
    assert!(updates.iter().any(|u| u.status.contains("Encoding audio")));
    assert_eq!(preview.suspended.load(Ordering::SeqCst), 1);
    assert_eq!(preview.restored.load(Ordering::SeqCst), 1);
}

#[test]
fn frame_count_rounds_the_declared_duration_up() {
    let runtime = InMemoryRuntime::new();
    let sinks = MemorySinkProvider::new();
    let deps = RenderDeps {
        runtime: &runtime,
        decoder: &ToneDecoder,
        sinks: &sinks,
        preview: &NoPreview,
    };
    let list = playlist(&[("a.mp3", 1.000_01)]);
    let visual = visual();
    let req = request(&list, &visual, 1);

    let outcome = run_render(&deps, &req, &mut FlatRenderer, &mut NoProgress, &CancelToken::new()).unwrap();
    let RenderOutcome::Completed(report) = outcome else {
        panic!("render did not complete");
    };
    assert_eq!(report.frames, 31);
    assert_eq!(runtime.stats().video_timestamps_us.len(), 31);
}

#[test]
fn rendering_progress_counts_frames_already_finished() {
    let runtime = InMemoryRuntime::new();
    let sinks = MemorySinkProvider::new();
    let deps = RenderDeps {
        runtime: &runtime,
        decoder: &ToneDecoder,
        sinks: &sinks,
        preview: &NoPreview,
    };
    let list = playlist(&[("a.mp3", 0.5)]);
    let visual = visual();
    let mut rendering = Vec::new();
    let mut listener = |u: &ProgressUpdate| {
        if let RenderPhase::Rendering { frame, total } = u.phase
            && frame > 0
        {
            rendering.push((frame, total, u.percent));
        }
    };

    run_render(
        &deps,
        &request(&list, &visual, 1),
        &mut FlatRenderer,
        &mut listener,
        &CancelToken::new(),
    )
    .unwrap();

    drop(listener);
    assert_eq!(rendering.len(), 15);
    for (frame, total, percent) in rendering {
        let expected = (frame - 1) as f64 / total as f64 * 90.0;
        assert!((percent - expected).abs() < 1e-9, "frame {frame}: {percent} != {expected}");
    }
}

#[test]
fn builtin_renderer_drives_a_short_render() {
    let runtime = InMemoryRuntime::new().supporting(&[(VideoCodec::Vp8, Deadline::Good)]);
    let sinks = MemorySinkProvider::new();
    let deps = RenderDeps {
        runtime: &runtime,
        decoder: &ToneDecoder,
        sinks: &sinks,
        preview: &NoPreview,
    };
    let list = playlist(&[("a.mp3", 0.5)]);
    let visual = visual();
    let req = request(&list, &visual, 1);
    let mut renderer = SpectrumRenderer::new(CANVAS, visual.clone()).unwrap();

    let outcome = run_render(&deps, &req, &mut renderer, &mut NoProgress, &CancelToken::new()).unwrap();
    let RenderOutcome::Completed(report) = outcome else {
        panic!("render did not complete");
    };
    assert_eq!(report.frames, 15);
    assert_eq!(report.codec, "vp8");
    assert_eq!(report.codec_label, "VP8");
    assert!(sinks.last().unwrap().1.is_closed());
}

#[test]
fn missing_codec_fails_before_any_sink_request() {
    let runtime = InMemoryRuntime::new().supporting_nothing();
    let sinks = MemorySinkProvider::new();
    let preview = CountingPreview::default();
    let deps = RenderDeps {
        runtime: &runtime,
        decoder: &ToneDecoder,
        sinks: &sinks,
        preview: &preview,
    };
    let list = playlist(&[("a.mp3", 1.0)]);
    let visual = visual();
    let err = RenderController::new()
        .run(&deps, &request(&list, &visual, 1), &mut FlatRenderer, &mut NoProgress)
        .unwrap_err();

    assert!(matches!(err, SpectrumError::CodecNegotiation(_)), "{err}");
    assert_eq!(sinks.acquire_count(), 0);
    assert_eq!(runtime.stats().queried.len(), 3);
    assert_eq!(runtime.stats().video_started, 0);
    assert_eq!(preview.restored.load(Ordering::SeqCst), 1);
}

#[test]
fn unavailable_runtime_is_an_environment_error() {
    let runtime = InMemoryRuntime::new().unavailable();
    let sinks = MemorySinkProvider::new();
    let deps = RenderDeps {
        runtime: &runtime,
        decoder: &ToneDecoder,
        sinks: &sinks,
        preview: &NoPreview,
    };
    let list = playlist(&[("a.mp3", 1.0)]);
    let visual = visual();
    let err = run_render(
        &deps,
        &request(&list, &visual, 1),
        &mut FlatRenderer,
        &mut NoProgress,
        &CancelToken::new(),
    )
    .unwrap_err();
    assert!(matches!(err, SpectrumError::UnsupportedEnvironment(_)));
    assert!(err.is_setup_failure());
    assert_eq!(sinks.acquire_count(), 0);
}

#[test]
fn decode_failure_on_second_track_submits_nothing() {
    let runtime = InMemoryRuntime::new();
    let sinks = MemorySinkProvider::new();
    let deps = RenderDeps {
        runtime: &runtime,
        decoder: &ToneDecoder,
        sinks: &sinks,
        preview: &NoPreview,
    };
    let list = playlist(&[("a.mp3", 1.0), ("broken.mp3", 1.0)]);
    let visual = visual();
    let err = run_render(
        &deps,
        &request(&list, &visual, 1),
        &mut FlatRenderer,
        &mut NoProgress,
        &CancelToken::new(),
    )
    .unwrap_err();

    let SpectrumError::Decode(msg) = &err else {
        panic!("expected a decode error, got {err}");
    };
    assert!(msg.contains("broken.mp3"), "{msg}");
    assert_eq!(sinks.acquire_count(), 0);
    assert!(runtime.stats().video_timestamps_us.is_empty());
}

#[test]
fn cancellation_aborts_the_sink_and_stops_scheduling() {
    let runtime = InMemoryRuntime::new();
    let sinks = MemorySinkProvider::new();
    let preview = CountingPreview::default();
    let deps = RenderDeps {
        runtime: &runtime,
        decoder: &ToneDecoder,
        sinks: &sinks,
        preview: &preview,
    };
    let list = playlist(&[("a.mp3", 2.0)]);
    let visual = visual();
    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    let mut phases = Vec::new();
    let mut listener = |u: &ProgressUpdate| {
        if let RenderPhase::Rendering { frame: 10, .. } = u.phase {
            trigger.cancel();
        }
        phases.push(u.phase.clone());
    };

    let outcome = run_render(
        &deps,
        &request(&list, &visual, 1),
        &mut FlatRenderer,
        &mut listener,
        &cancel,
    )
    .unwrap();

    assert_eq!(outcome, RenderOutcome::Cancelled);
    assert_eq!(runtime.stats().video_timestamps_us.len(), 10);
    assert!(runtime.stats().audio_timestamps_us.is_empty());
    let (_, sink) = sinks.last().unwrap();
    assert!(sink.is_aborted());
    assert!(!sink.is_closed());
    drop(listener);
    assert_eq!(phases.last(), Some(&RenderPhase::Cancelled));
    assert_eq!(preview.restored.load(Ordering::SeqCst), 1);
}

#[test]
fn second_render_on_a_busy_controller_is_refused() {
    let runtime = InMemoryRuntime::new();
    let sinks = MemorySinkProvider::new();
    let deps = RenderDeps {
        runtime: &runtime,
        decoder: &ToneDecoder,
        sinks: &sinks,
        preview: &NoPreview,
    };
    let list = playlist(&[("a.mp3", 1.0)]);
    let visual = visual();
    let controller = RenderController::new();
    let held = controller.begin().unwrap();

    let err = controller
        .run(&deps, &request(&list, &visual, 1), &mut FlatRenderer, &mut NoProgress)
        .unwrap_err();
    assert!(matches!(err, SpectrumError::Busy));
    assert_eq!(sinks.acquire_count(), 0);

    drop(held);
    let outcome = controller
        .run(&deps, &request(&list, &visual, 1), &mut FlatRenderer, &mut NoProgress)
        .unwrap();
    assert!(matches!(outcome, RenderOutcome::Completed(_)));
}

#[test]
fn asynchronous_encoder_error_fails_and_aborts_the_sink() {
    let runtime = InMemoryRuntime::new().fail_video_at(5);
    let sinks = MemorySinkProvider::new();
    let preview = CountingPreview::default();
    let deps = RenderDeps {
        runtime: &runtime,
        decoder: &ToneDecoder,
        sinks: &sinks,
        preview: &preview,
    };
    let list = playlist(&[("a.mp3", 1.0)]);
    let visual = visual();
    let mut last = None;
    let mut listener = |u: &ProgressUpdate| last = Some(u.phase.clone());
    let err = run_render(
        &deps,
        &request(&list, &visual, 1),
        &mut FlatRenderer,
        &mut listener,
        &CancelToken::new(),
    )
    .unwrap_err();

    assert!(matches!(err, SpectrumError::Encode(_)), "{err}");
    assert!(!err.is_setup_failure());
    let (_, sink) = sinks.last().unwrap();
    assert!(sink.is_aborted() && !sink.is_closed());
    assert!(matches!(last, Some(RenderPhase::Failed(_))));
    assert_eq!(preview.restored.load(Ordering::SeqCst), 1);
}

#[test]
fn write_failure_is_a_sink_error() {
    let runtime = InMemoryRuntime::new();
    let sinks = MemorySinkProvider::failing_after(3);
    let deps = RenderDeps {
        runtime: &runtime,
        decoder: &ToneDecoder,
        sinks: &sinks,
        preview: &NoPreview,
    };
    let list = playlist(&[("a.mp3", 1.0)]);
    let visual = visual();
    let err = run_render(
        &deps,
        &request(&list, &visual, 1),
        &mut FlatRenderer,
        &mut NoProgress,
        &CancelToken::new(),
    )
    .unwrap_err();

    assert!(matches!(err, SpectrumError::Sink(_)), "{err}");
    assert!(err.to_string().contains("may be corrupt"));
    assert!(sinks.last().unwrap().1.is_aborted());
}

#[test]
fn mismatched_renderer_canvas_is_rejected_up_front() {
    let runtime = InMemoryRuntime::new();
    let sinks = MemorySinkProvider::new();
    let deps = RenderDeps {
        runtime: &runtime,
        decoder: &ToneDecoder,
        sinks: &sinks,
        preview: &NoPreview,
    };
    let list = playlist(&[("a.mp3", 1.0)]);
    let visual = visual();
    let mut req = request(&list, &visual, 1);
    req.canvas = Canvas {
        width: 64,
        height: 36,
    };
    let err = run_render(&deps, &req, &mut FlatRenderer, &mut NoProgress, &CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, SpectrumError::Validation(_)));
    assert_eq!(sinks.acquire_count(), 0);
}
