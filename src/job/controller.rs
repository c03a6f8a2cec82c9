use crate::foundation::error::{SpectrumError, SpectrumResult};
use crate::job::cancel::CancelToken;
use crate::job::progress::ProgressListener;
use crate::job::scheduler::{RenderDeps, RenderOutcome, RenderRequest, run_render};
use crate::render::backend::FrameRenderer;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Hooks into whatever live preview the host application runs.
///
/// `suspend` is called before a render starts; `restore` on every exit path, success included.
pub trait PreviewControl: Send + Sync {
    fn suspend(&self) {}

    fn restore(&self);
}

/// For hosts without a live preview.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoPreview;

impl PreviewControl for NoPreview {
    fn restore(&self) {}
}

/// Admits at most one render at a time.
#[derive(Clone, Debug, Default)]
pub struct RenderController {
    active: Arc<AtomicBool>,
    cancel: Arc<std::sync::Mutex<Option<CancelToken>>>,
}

/// Held for the lifetime of an admitted render.
#[derive(Debug)]
pub struct ActiveRender {
    active: Arc<AtomicBool>,
    cancel: CancelToken,
}

impl ActiveRender {
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }
}

impl Drop for ActiveRender {
    fn drop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

impl RenderController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Claim the render slot. Fails with `Busy` while another render holds it.
    pub fn begin(&self) -> SpectrumResult<ActiveRender> {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SpectrumError::Busy);
        }
        let cancel = CancelToken::new();
        *self.cancel.lock().unwrap_or_else(|e| e.into_inner()) = Some(cancel.clone());
        Ok(ActiveRender {
            active: Arc::clone(&self.active),
            cancel,
        })
    }

    /// Cancel the active render, if any. Returns whether one was running.
    pub fn cancel(&self) -> bool {
        match self.cancel.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
            Some(token) if self.is_active() => {
                token.cancel();
                true
            }
            _ => false,
        }
    }

    /// Admit and run one render on the calling thread.
    pub fn run(
        &self,
        deps: &RenderDeps<'_>,
        request: &RenderRequest<'_>,
        renderer: &mut dyn FrameRenderer,
        progress: &mut dyn ProgressListener,
    ) -> SpectrumResult<RenderOutcome> {
        let slot = self.begin()?;
        run_render(deps, request, renderer, progress, slot.cancel_token())
    }
}
