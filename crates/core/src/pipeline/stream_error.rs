use thiserror::Error;

use crate::shared::model_resolver::ModelResolveError;
use crate::shared::onnx_session::ModelLoadError;

/// Failures surfaced by the streaming pipeline.
///
/// Only `Configuration` and `Display` end a run; the per-frame kinds are
/// logged and contained.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("frame source failed: {0}")]
    Source(String),
    #[error("face locator failed: {0}")]
    Locator(String),
    #[error("classifier failed: {0}")]
    Classifier(String),
    #[error("display failed: {0}")]
    Display(String),
}

impl From<ModelLoadError> for StreamError {
    fn from(e: ModelLoadError) -> Self {
        StreamError::Configuration(e.to_string())
    }
}

impl From<ModelResolveError> for StreamError {
    fn from(e: ModelResolveError) -> Self {
        StreamError::Configuration(e.to_string())
    }
}
