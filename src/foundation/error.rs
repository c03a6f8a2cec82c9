/// Result alias used throughout the crate.
pub type SpectrumResult<T> = Result<T, SpectrumError>;

/// Error taxonomy for the offline render pipeline.
///
/// `UnsupportedEnvironment`, `CodecNegotiation` and `Decode` are raised before any output sink
/// is acquired. `Encode` and `Sink` are raised mid-render, after the job has torn down its
/// encoders and aborted the sink.
#[derive(thiserror::Error, Debug)]
pub enum SpectrumError {
    /// A required runtime capability (encoder runtime, direct-to-storage write) is missing.
    #[error("unsupported environment: {0}")]
    UnsupportedEnvironment(String),

    /// None of the prioritised video encoder configurations is usable.
    #[error("codec negotiation failed: {0}")]
    CodecNegotiation(String),

    /// A track's audio payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// An encoder reported an error while the render was running.
    #[error("encode error: {0}")]
    Encode(String),

    /// Writing or closing the output failed. The output must be treated as corrupt.
    #[error("output error (file may be corrupt): {0}")]
    Sink(String),

    /// The user aborted the render.
    #[error("render cancelled")]
    Cancelled,

    /// Another render is already active on the same controller.
    #[error("a render is already in progress")]
    Busy,

    #[error("validation error: {0}")]
    Validation(String),

    #[error("serialization error: {0}")]
    Serde(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SpectrumError {
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedEnvironment(msg.into())
    }

    pub fn negotiation(msg: impl Into<String>) -> Self {
        Self::CodecNegotiation(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    pub fn sink(msg: impl Into<String>) -> Self {
        Self::Sink(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// Return `true` for errors raised before any output resource was allocated.
    pub fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedEnvironment(_)
                | Self::CodecNegotiation(_)
                | Self::Decode(_)
                | Self::Validation(_)
                | Self::Busy
        )
    }
}
