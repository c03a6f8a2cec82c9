use std::io::BufRead as _;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use wavyte_spectrum::{
    AudioGraph, Canvas, EncoderRuntime as _, FfmpegDecoder, FileSinkProvider, FrameRenderer as _,
    NoPreview, ProgressUpdate, ProjectFile, QualityPreset, RenderController, RenderDeps,
    RenderOutcome, RenderRequest, SpectrumRenderer, compose_timeline, default_runtime, negotiate,
};

#[derive(Parser, Debug)]
#[command(name = "wavyte-spectrum", version, about = "Render audio-reactive spectrum videos")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a project to MP4 (requires a build with the `ffmpeg` feature and `ffmpeg` on PATH for decoding).
    Render(RenderArgs),
    /// Render a single frame as a PNG.
    Frame(FrameArgs),
    /// Show which video codec configuration would be used.
    Codec(CodecArgs),
    /// List quality presets.
    Presets,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Input project JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output MP4 path. Defaults to the sanitized project name next to the project file.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Quality preset; overrides the project's video settings.
    #[arg(long, value_enum)]
    quality: Option<QualityPreset>,
}

#[derive(Parser, Debug)]
struct FrameArgs {
    /// Input project JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Virtual time in seconds.
    #[arg(long, default_value_t = 0.0)]
    time: f64,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct CodecArgs {
    #[arg(long, default_value_t = 1280)]
    width: u32,

    #[arg(long, default_value_t = 720)]
    height: u32,

    #[arg(long, value_enum, default_value_t = QualityPreset::Standard)]
    quality: QualityPreset,
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Frame(args) => cmd_frame(args),
        Command::Codec(args) => cmd_codec(args),
        Command::Presets => cmd_presets(),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_project(path: &Path) -> anyhow::Result<ProjectFile> {
    let project = ProjectFile::from_path(path)
        .with_context(|| format!("load project '{}'", path.display()))?;
    project
        .validate()
        .with_context(|| format!("validate project '{}'", path.display()))?;
    Ok(project)
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let mut project = load_project(&args.in_path)?;
    if let Some(q) = args.quality {
        project.set_quality(q);
    }

    let decoder = FfmpegDecoder;
    let playlist = project.build_playlist(&decoder).context("build playlist")?;
    let runtime = default_runtime();
    let sinks = match &args.out {
        Some(out) => FileSinkProvider::fixed(out),
        None => FileSinkProvider::new(args.in_path.parent().unwrap_or_else(|| Path::new("."))),
    };
    let mut renderer = SpectrumRenderer::new(project.canvas, project.visual.clone())
        .context("create spectrum renderer")?;

    let controller = RenderController::new();
    let watcher = controller.clone();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().eq_ignore_ascii_case("q") && watcher.cancel() {
                eprintln!("cancelling...");
                break;
            }
        }
    });
    eprintln!("rendering; type q + enter to cancel");

    let deps = RenderDeps {
        runtime: runtime.as_ref(),
        decoder: &decoder,
        sinks: &sinks,
        preview: &NoPreview,
    };
    let request = RenderRequest {
        playlist: &playlist,
        visual: &project.visual,
        encoding: project.encoding,
        config: project.render_config(),
        canvas: project.canvas,
        output_name: project.name.clone(),
    };
    let mut last_whole = -1i64;
    let mut on_progress = |u: &ProgressUpdate| {
        let whole = u.percent.floor() as i64;
        if whole != last_whole || u.phase.is_terminal() {
            last_whole = whole;
            eprintln!("[{:>3}%] {}", whole, u.status);
        }
    };

    match controller.run(&deps, &request, &mut renderer, &mut on_progress)? {
        RenderOutcome::Completed(report) => {
            eprintln!(
                "wrote {} ({} frames, {}, {:.1} s, {} bytes in {:.1} s)",
                report.output,
                report.frames,
                report.codec,
                report.duration_secs,
                report.bytes,
                report.elapsed.as_secs_f64()
            );
        }
        RenderOutcome::Cancelled => eprintln!("render cancelled; no output written"),
    }
    Ok(())
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    anyhow::ensure!(
        args.time.is_finite() && args.time >= 0.0,
        "--time must be a non-negative number of seconds"
    );
    let project = load_project(&args.in_path)?;
    let decoder = FfmpegDecoder;
    let playlist = project.build_playlist(&decoder).context("build playlist")?;
    let timeline = compose_timeline(&playlist, project.encoding.loop_count, &decoder)
        .context("decode playlist audio")?;
    anyhow::ensure!(
        args.time <= timeline.duration_secs(),
        "--time {} is past the end of the render ({:.3} s)",
        args.time,
        timeline.duration_secs()
    );

    let mut graph = AudioGraph::new(
        timeline.into(),
        project.visual.fft_size as usize,
        project.visual.smoothing,
    )?;
    graph.advance_to(args.time)?;
    let bins = graph.frequency_data()?;

    let mut renderer = SpectrumRenderer::new(project.canvas, project.visual.clone())
        .context("create spectrum renderer")?;
    let frame = renderer.render(args.time * 1000.0, bins.as_slice())?;

    if let Some(parent) = args.out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    image::save_buffer_with_format(
        &args.out,
        &frame.to_straight_rgba8(),
        frame.width,
        frame.height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_codec(args: CodecArgs) -> anyhow::Result<()> {
    let canvas = Canvas {
        width: args.width,
        height: args.height,
    };
    canvas.validate()?;
    let config = args.quality.config();
    let runtime = default_runtime();
    runtime.check_environment()?;
    let cfg = negotiate(runtime.as_ref(), canvas, config.frame_rate()?, config.video_bitrate)?;
    println!("runtime:  {}", runtime.name());
    println!("codec:    {} ({})", cfg.codec_string(), cfg.label);
    println!(
        "encoder:  {} deadline={} cpu-used={}",
        cfg.codec.ffmpeg_encoder(),
        cfg.deadline.as_str(),
        cfg.cpu_used
    );
    println!("keyframe: every {} frames", cfg.keyframe_interval);
    println!("audio:    opus 48000 Hz stereo");
    Ok(())
}

fn cmd_presets() -> anyhow::Result<()> {
    for preset in QualityPreset::ALL {
        let cfg = preset.config();
        println!("{:<9} {}", format!("{preset:?}").to_lowercase(), cfg.label);
    }
    Ok(())
}
