use crate::audio::chunk::AudioBlocks;
use crate::audio::decode::AudioDecoder;
use crate::audio::graph::AudioGraph;
use crate::audio::timeline::compose_timeline;
use crate::encode::bridge::Bridge;
use crate::encode::codec::{AudioEncoderConfig, negotiate};
use crate::encode::runtime::EncoderRuntime;
use crate::foundation::core::{Canvas, FrameIndex};
use crate::foundation::error::{SpectrumError, SpectrumResult};
use crate::job::cancel::CancelToken;
use crate::job::controller::PreviewControl;
use crate::job::filename::output_file_name;
use crate::job::progress::{ProgressListener, ProgressTracker};
use crate::job::state::RenderPhase;
use crate::playlist::Playlist;
use crate::render::backend::FrameRenderer;
use crate::settings::encoding::{EncodingSettings, RenderConfig};
use crate::settings::visual::VisualSettings;
use crate::sink::SinkProvider;
use std::sync::Arc;
use std::time::{Duration, Instant};

const VIDEO_PHASE_END: f64 = 90.0;
const AUDIO_PHASE_END: f64 = 95.0;
const FINALIZE_MARK: f64 = 98.0;

/// External collaborators of a render.
pub struct RenderDeps<'a> {
    pub runtime: &'a dyn EncoderRuntime,
    pub decoder: &'a dyn AudioDecoder,
    pub sinks: &'a dyn SinkProvider,
    pub preview: &'a dyn PreviewControl,
}

/// Everything that defines the output. Borrowed immutably for the whole render.
#[derive(Clone, Debug)]
pub struct RenderRequest<'a> {
    pub playlist: &'a Playlist,
    pub visual: &'a VisualSettings,
    pub encoding: EncodingSettings,
    pub config: RenderConfig,
    pub canvas: Canvas,
    /// Base name for the output; sanitized before the sink is requested.
    pub output_name: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RenderReport {
    /// Sink destination.
    pub output: String,
    pub codec: String,
    pub codec_label: String,
    pub frames: u64,
    pub keyframes: u64,
    pub audio_blocks: u64,
    pub duration_secs: f64,
    pub bytes: u64,
    pub elapsed: Duration,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RenderOutcome {
    Completed(RenderReport),
    /// The user cancelled. Nothing was kept.
    Cancelled,
}

/// Render the playlist to one container file, frame by frame on a virtual clock.
///
/// Setup failures (environment, codec negotiation, decoding) surface before any sink is
/// requested. Mid-render failures abort the encoders and the sink before returning. The preview
/// is restored on every exit.
#[tracing::instrument(
    skip_all,
    fields(
        tracks = request.playlist.len(),
        loop_count = request.encoding.loop_count,
        fps = request.config.fps,
        width = request.canvas.width,
        height = request.canvas.height
    )
)]
pub fn run_render(
    deps: &RenderDeps<'_>,
    request: &RenderRequest<'_>,
    renderer: &mut dyn FrameRenderer,
    progress: &mut dyn ProgressListener,
    cancel: &CancelToken,
) -> SpectrumResult<RenderOutcome> {
    let started = Instant::now();
    deps.preview.suspend();
    let mut tracker = ProgressTracker::new(progress);
    let mut phase = RenderPhase::Idle;

    let result = Job {
        deps,
        request,
        cancel,
        phase: &mut phase,
        tracker: &mut tracker,
    }
    .run(renderer, started);

    deps.preview.restore();
    match result {
        Ok(report) => {
            tracing::info!(
                output = %report.output,
                codec = %report.codec,
                frames = report.frames,
                bytes = report.bytes,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "render complete"
            );
            Ok(RenderOutcome::Completed(report))
        }
        Err(SpectrumError::Cancelled) => {
            phase = RenderPhase::Cancelled;
            let pct = tracker.percent();
            tracker.report(pct, &phase);
            tracing::info!("render cancelled");
            Ok(RenderOutcome::Cancelled)
        }
        Err(e) => {
            phase = RenderPhase::Failed(e.to_string());
            let pct = tracker.percent();
            tracker.report(pct, &phase);
            tracing::warn!(error = %e, "render failed");
            Err(e)
        }
    }
}

struct Job<'r, 'a, 't> {
    deps: &'r RenderDeps<'a>,
    request: &'r RenderRequest<'a>,
    cancel: &'r CancelToken,
    phase: &'r mut RenderPhase,
    tracker: &'r mut ProgressTracker<'t>,
}

impl Job<'_, '_, '_> {
    fn enter(&mut self, next: RenderPhase, percent: f64) -> SpectrumResult<()> {
        *self.phase = self.phase.transition(next)?;
        self.tracker.report(percent, self.phase);
        Ok(())
    }

    fn check_cancel(&self) -> SpectrumResult<()> {
        if self.cancel.is_cancelled() {
            Err(SpectrumError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn validate(&self, renderer: &dyn FrameRenderer) -> SpectrumResult<()> {
        let r = self.request;
        r.canvas.validate()?;
        r.visual.validate()?;
        r.encoding.validate()?;
        r.config.validate()?;
        if renderer.canvas() != r.canvas {
            return Err(SpectrumError::validation(format!(
                "renderer canvas {}x{} does not match output {}x{}",
                renderer.canvas().width,
                renderer.canvas().height,
                r.canvas.width,
                r.canvas.height
            )));
        }
        if r.playlist.is_empty() {
            return Err(SpectrumError::validation("playlist is empty"));
        }
        Ok(())
    }

    fn run(mut self, renderer: &mut dyn FrameRenderer, started: Instant) -> SpectrumResult<RenderReport> {
        let deps = self.deps;
        let request = self.request;

        self.enter(RenderPhase::Preparing, 0.0)?;
        self.validate(renderer)?;
        self.check_cancel()?;

        deps.runtime.check_environment()?;
        let fps = request.config.frame_rate()?;
        let video_cfg = negotiate(deps.runtime, request.canvas, fps, request.config.video_bitrate)?;
        let codec = video_cfg.codec_string();
        self.tracker.set_codec(codec.clone());
        self.tracker.report(0.0, self.phase);

        let timeline = Arc::new(compose_timeline(
            request.playlist,
            request.encoding.loop_count,
            deps.decoder,
        )?);
        let mut graph = AudioGraph::new(
            Arc::clone(&timeline),
            request.visual.fft_size as usize,
            request.visual.smoothing,
        )?;
        drop(timeline);
        // Frame count follows the declared duration; decoded audio may be a few samples short.
        let declared_secs = request.playlist.total_duration_secs() * f64::from(request.encoding.loop_count);
        let total_frames = fps.frames_for_secs(declared_secs);
        if total_frames == 0 {
            return Err(SpectrumError::validation("render would produce no frames"));
        }
        let keyframe_interval = fps.keyframe_interval();
        tracing::info!(
            total_frames,
            keyframe_interval,
            declared_secs,
            rendered_secs = graph.rendered_audio().duration_secs(),
            "render prepared"
        );

        self.check_cancel()?;
        let sink = deps.sinks.acquire(&output_file_name(&request.output_name))?;
        let audio_cfg = AudioEncoderConfig::opus(request.encoding.audio_bitrate);
        let mut bridge = Bridge::start(deps.runtime, &video_cfg, &audio_cfg, sink, self.cancel.clone())?;
        let output = bridge.target().to_owned();

        let streamed = self.stream(&mut bridge, &mut graph, renderer, total_frames, keyframe_interval);
        let audio_blocks = match streamed {
            Ok(blocks) => blocks,
            Err(e) => {
                bridge.abort();
                return Err(e);
            }
        };

        self.enter(RenderPhase::Finalizing, FINALIZE_MARK)?;
        let (queue, summary) = bridge.finish()?;
        if let Err(e) = self.check_cancel() {
            queue.abort();
            return Err(e);
        }
        let writes = queue.close()?;
        self.enter(RenderPhase::Done, 100.0)?;

        Ok(RenderReport {
            output,
            codec,
            codec_label: video_cfg.label,
            frames: total_frames,
            keyframes: summary.keyframes,
            audio_blocks,
            duration_secs: summary.duration_secs,
            bytes: writes.bytes.max(summary.file_bytes),
            elapsed: started.elapsed(),
        })
    }

    /// Submit every video frame and then every audio block. Returns the audio block count.
    fn stream(
        &mut self,
        bridge: &mut Bridge,
        graph: &mut AudioGraph,
        renderer: &mut dyn FrameRenderer,
        total_frames: u64,
        keyframe_interval: u64,
    ) -> SpectrumResult<u64> {
        let fps = self.request.config.frame_rate()?;
        self.enter(
            RenderPhase::Rendering {
                frame: 0,
                total: total_frames,
            },
            0.0,
        )?;
        for i in 0..total_frames {
            self.check_cancel()?;
            // Percent counts frames finished before this one.
            self.enter(
                RenderPhase::Rendering {
                    frame: i + 1,
                    total: total_frames,
                },
                i as f64 / total_frames as f64 * VIDEO_PHASE_END,
            )?;
            let idx = FrameIndex(i);
            graph.advance_to_frame(idx, fps)?;
            let bins = graph.frequency_data()?;
            let frame = renderer.render(fps.frame_time_secs(idx) * 1000.0, bins.as_slice())?;
            bridge.encode_video(&frame, fps.frame_timestamp_us(idx), i % keyframe_interval == 0)?;
            bridge.check()?;
        }

        let audio = graph.rendered_audio();
        let blocks = AudioBlocks::new(&audio);
        let total_blocks = blocks.block_count();
        self.enter(
            RenderPhase::EncodingAudio {
                block: 0,
                total: total_blocks,
            },
            VIDEO_PHASE_END,
        )?;
        for (k, block) in blocks.enumerate() {
            self.check_cancel()?;
            bridge.encode_audio(&block)?;
            bridge.check()?;
            let done = k as u64 + 1;
            self.enter(
                RenderPhase::EncodingAudio {
                    block: done,
                    total: total_blocks,
                },
                VIDEO_PHASE_END + (AUDIO_PHASE_END - VIDEO_PHASE_END) * done as f64 / total_blocks as f64,
            )?;
        }
        Ok(total_blocks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_marks_are_ordered() {
        assert!(VIDEO_PHASE_END < AUDIO_PHASE_END);
        assert!(AUDIO_PHASE_END < FINALIZE_MARK);
        assert!(FINALIZE_MARK < 100.0);
    }
}
