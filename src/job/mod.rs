//! Render job orchestration: lifecycle, progress, cancellation and the single-job controller.

pub mod cancel;
pub mod controller;
pub mod filename;
pub mod progress;
pub mod scheduler;
pub mod state;

pub use cancel::CancelToken;
pub use controller::{ActiveRender, NoPreview, PreviewControl, RenderController};
pub use filename::output_file_name;
pub use progress::{NoProgress, ProgressListener, ProgressUpdate};
pub use scheduler::{RenderDeps, RenderOutcome, RenderReport, RenderRequest, run_render};
pub use state::RenderPhase;
