use crate::foundation::error::{SpectrumError, SpectrumResult};
use std::fmt;

/// Lifecycle of one render job.
///
/// `Idle -> Preparing -> Rendering -> EncodingAudio -> Finalizing -> Done`, with `Cancelled`
/// and `Failed` reachable from every non-terminal phase.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RenderPhase {
    Idle,
    Preparing,
    /// `frame` frames of `total` have been submitted.
    Rendering { frame: u64, total: u64 },
    /// `block` one-second audio blocks of `total` have been submitted.
    EncodingAudio { block: u64, total: u64 },
    Finalizing,
    Done,
    Cancelled,
    Failed(String),
}

impl RenderPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Cancelled | Self::Failed(_))
    }

    /// Short machine-friendly name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Preparing => "preparing",
            Self::Rendering { .. } => "rendering",
            Self::EncodingAudio { .. } => "encoding_audio",
            Self::Finalizing => "finalizing",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
            Self::Failed(_) => "failed",
        }
    }

    /// Human status phrase shown next to the progress percentage.
    pub fn status(&self) -> String {
        match self {
            Self::Idle => "Idle".to_owned(),
            Self::Preparing => "Preparing audio".to_owned(),
            Self::Rendering { frame, total } => format!("Rendering frame {frame} / {total}"),
            Self::EncodingAudio { block, total } => format!("Encoding audio {block} / {total}"),
            Self::Finalizing => "Finalizing".to_owned(),
            Self::Done => "Done".to_owned(),
            Self::Cancelled => "Cancelled".to_owned(),
            Self::Failed(reason) => format!("Failed: {reason}"),
        }
    }

    /// Move to `next`, rejecting edges the lifecycle does not allow.
    pub fn transition(&self, next: RenderPhase) -> SpectrumResult<RenderPhase> {
        use RenderPhase::*;
        let ok = match (self, &next) {
            (s, _) if s.is_terminal() => false,
            (_, Cancelled | Failed(_)) => true,
            (Idle, Preparing) => true,
            (Preparing, Rendering { frame: 0, .. }) => true,
            (Rendering { frame: a, total: t }, Rendering { frame: b, total: u }) => t == u && b >= a && b <= u,
            (Rendering { frame, total }, EncodingAudio { block: 0, .. }) => frame == total,
            (EncodingAudio { block: a, total: t }, EncodingAudio { block: b, total: u }) => {
                t == u && b >= a && b <= u
            }
            (EncodingAudio { block, total }, Finalizing) => block == total,
            (Finalizing, Done) => true,
            _ => false,
        };
        if ok {
            Ok(next)
        } else {
            Err(SpectrumError::validation(format!(
                "illegal render transition {} -> {}",
                self, next
            )))
        }
    }
}

impl fmt::Display for RenderPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rendering { frame, total } => write!(f, "rendering({frame}/{total})"),
            Self::EncodingAudio { block, total } => write!(f, "encoding_audio({block}/{total})"),
            other => f.write_str(other.name()),
        }
    }
}
