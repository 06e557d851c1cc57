//! Two-stage ONNX Runtime session loading shared by the face locator and
//! the emotion classifier.
//!
//! Native mode uses the platform's accelerated execution provider and full
//! graph optimization. Compatibility mode falls back to the CPU provider
//! with optimizations disabled, which accepts models that fail to fuse or
//! were exported with operators the accelerated provider rejects.

use std::path::{Path, PathBuf};

use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("model file not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to load model {path} (native: {native}; compatibility: {compat})")]
    Unloadable {
        path: PathBuf,
        native: String,
        compat: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadMode {
    Native,
    Compatibility,
}

/// Return the preferred ONNX execution providers for the current platform.
///
/// Falls back to CPU if the platform-specific provider is unavailable.
pub fn preferred_execution_providers() -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        vec![]
    }
}

/// Loads `model_path`, retrying once in compatibility mode.
pub fn load_session(
    model_path: &Path,
    intra_threads: usize,
) -> Result<(Session, LoadMode), ModelLoadError> {
    load_with(model_path, |mode| build_session(model_path, mode, intra_threads))
}

/// Loads `model_path` directly in compatibility mode.
pub fn load_compatibility_session(
    model_path: &Path,
    intra_threads: usize,
) -> Result<(Session, LoadMode), ModelLoadError> {
    if !model_path.is_file() {
        return Err(ModelLoadError::NotFound(model_path.to_path_buf()));
    }
    build_session(model_path, LoadMode::Compatibility, intra_threads)
        .map(|session| (session, LoadMode::Compatibility))
        .map_err(|e| ModelLoadError::Unloadable {
            path: model_path.to_path_buf(),
            native: "skipped".to_string(),
            compat: e.to_string(),
        })
}

fn load_with<T, F>(model_path: &Path, mut build: F) -> Result<(T, LoadMode), ModelLoadError>
where
    F: FnMut(LoadMode) -> Result<T, Box<dyn std::error::Error>>,
{
    if !model_path.is_file() {
        return Err(ModelLoadError::NotFound(model_path.to_path_buf()));
    }

    let native = match build(LoadMode::Native) {
        Ok(session) => return Ok((session, LoadMode::Native)),
        Err(e) => e.to_string(),
    };
    log::warn!(
        "Native load of {} failed ({native}); retrying in compatibility mode",
        model_path.display()
    );

    match build(LoadMode::Compatibility) {
        Ok(session) => Ok((session, LoadMode::Compatibility)),
        Err(e) => Err(ModelLoadError::Unloadable {
            path: model_path.to_path_buf(),
            native,
            compat: e.to_string(),
        }),
    }
}

fn build_session(
    model_path: &Path,
    mode: LoadMode,
    intra_threads: usize,
) -> Result<Session, Box<dyn std::error::Error>> {
    let builder = Session::builder()?
        .with_inter_threads(1)?
        .with_intra_threads(intra_threads.max(1))?;
    let session = match mode {
        LoadMode::Native => builder
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_execution_providers(preferred_execution_providers())?
            .commit_from_file(model_path)?,
        LoadMode::Compatibility => builder
            .with_optimization_level(GraphOptimizationLevel::Disable)?
            .commit_from_file(model_path)?,
    };
    Ok(session)
}

/// Reads the square spatial input size from an NCHW model input, if static.
pub fn static_input_size(session: &Session) -> Option<u32> {
    session.inputs().first().and_then(|input| {
        if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
            if shape.len() >= 4 && shape[2] > 0 {
                return Some(shape[2] as u32);
            }
        }
        None
    })
}
