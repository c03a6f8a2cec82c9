use crate::job::state::RenderPhase;

/// One progress notification.
#[derive(Clone, Debug, PartialEq)]
pub struct ProgressUpdate {
    /// Completion in `0.0..=100.0`. Never decreases within a job.
    pub percent: f64,
    pub phase: RenderPhase,
    pub status: String,
    /// Negotiated codec string, once known.
    pub codec: Option<String>,
}

/// Receives progress updates on the render thread.
pub trait ProgressListener {
    fn on_progress(&mut self, update: &ProgressUpdate);
}

impl<F: FnMut(&ProgressUpdate)> ProgressListener for F {
    fn on_progress(&mut self, update: &ProgressUpdate) {
        self(update)
    }
}

/// Listener that drops every update.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressListener for NoProgress {
    fn on_progress(&mut self, _update: &ProgressUpdate) {}
}

/// Keeps reported progress monotonic and attaches the codec string.
pub(crate) struct ProgressTracker<'a> {
    listener: &'a mut dyn ProgressListener,
    percent: f64,
    codec: Option<String>,
}

impl<'a> ProgressTracker<'a> {
    pub(crate) fn new(listener: &'a mut dyn ProgressListener) -> Self {
        Self {
            listener,
            percent: 0.0,
            codec: None,
        }
    }

    pub(crate) fn set_codec(&mut self, codec: impl Into<String>) {
        self.codec = Some(codec.into());
    }

    pub(crate) fn percent(&self) -> f64 {
        self.percent
    }

    pub(crate) fn report(&mut self, percent: f64, phase: &RenderPhase) {
        let p = if percent.is_finite() { percent.clamp(0.0, 100.0) } else { 0.0 };
        self.percent = self.percent.max(p);
        let mut status = phase.status();
        if let Some(codec) = &self.codec
            && !phase.is_terminal()
        {
            status = format!("{status} ({codec})");
        }
        self.listener.on_progress(&ProgressUpdate {
            percent: self.percent,
            phase: phase.clone(),
            status,
            codec: self.codec.clone(),
        });
    }
}
