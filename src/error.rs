//! Error taxonomy for dream runs

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DreamError {
    #[error("Layer '{layer}' does not exist in the network (available: {available:?})")]
    InvalidLayerHandle {
        layer: String,
        available: Vec<String>,
    },

    #[error("No activation captured for layer '{layer}': read before any forward pass reached it")]
    MissingActivation { layer: String },

    #[error("Invalid octave schedule: {0}")]
    InvalidScaleSchedule(String),

    #[error("Channel {channel} out of range for an activation with {available} channels")]
    InvalidChannel { channel: usize, available: usize },

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O failure on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Codec failure on {}: {source}", path.display())]
    Codec {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Compute backend ran out of memory: {0}")]
    ResourceExhaustion(#[source] candle_core::Error),

    #[error("Tensor backend error: {0}")]
    Backend(#[source] candle_core::Error),
}

impl DreamError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn codec(path: impl Into<PathBuf>, source: image::ImageError) -> Self {
        Self::Codec {
            path: path.into(),
            source,
        }
    }

    /// True for decode/encode collaborator failures.
    pub fn is_io_failure(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Codec { .. })
    }
}

// Allocation failures surface from candle as formatted driver errors, so the
// message is the only thing to classify on.
fn is_out_of_memory(err: &candle_core::Error) -> bool {
    let msg = err.to_string();
    msg.contains("out of memory") || msg.contains("OUT_OF_MEMORY") || msg.contains("OutOfMemory")
}

impl From<candle_core::Error> for DreamError {
    fn from(err: candle_core::Error) -> Self {
        if is_out_of_memory(&err) {
            Self::ResourceExhaustion(err)
        } else {
            Self::Backend(err)
        }
    }
}

pub type Result<T> = std::result::Result<T, DreamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oom_is_resource_exhaustion() {
        let err: DreamError = candle_core::Error::Msg("CUDA_ERROR_OUT_OF_MEMORY".into()).into();
        assert!(matches!(err, DreamError::ResourceExhaustion(_)));

        let err: DreamError = candle_core::Error::Msg("shape mismatch".into()).into();
        assert!(matches!(err, DreamError::Backend(_)));
    }

    #[test]
    fn test_io_failure_class() {
        let err = DreamError::io(
            "missing.gif",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.is_io_failure());
        assert!(err.to_string().contains("missing.gif"));
        assert!(!DreamError::InvalidArgument("x".into()).is_io_failure());
    }
}
