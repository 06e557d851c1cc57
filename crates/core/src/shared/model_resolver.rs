use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelResolveError {
    #[error("failed to create cache directory: {0}")]
    CacheDir(#[source] std::io::Error),
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to write model to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not determine cache directory")]
    NoCacheDir,
}

/// Progress callback: `(bytes_downloaded, total_bytes)`.
/// `total_bytes` is 0 if the server didn't provide Content-Length.
pub type ProgressFn = Box<dyn Fn(u64, u64) + Send>;

/// Locates a model file that was not given explicitly on the command line.
///
/// Looks in `cache_dir` first and downloads from `url` into it otherwise.
/// An explicit path always wins and is returned untouched.
pub fn resolve(
    explicit: Option<&Path>,
    name: &str,
    url: &str,
    progress: Option<ProgressFn>,
) -> Result<PathBuf, ModelResolveError> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    resolve_in(&model_cache_dir()?, name, url, progress)
}

fn resolve_in(
    cache_dir: &Path,
    name: &str,
    url: &str,
    progress: Option<ProgressFn>,
) -> Result<PathBuf, ModelResolveError> {
    let cached_path = cache_dir.join(name);
    if cached_path.exists() {
        log::debug!("Using cached model {}", cached_path.display());
        return Ok(cached_path);
    }

    fs::create_dir_all(cache_dir).map_err(ModelResolveError::CacheDir)?;
    log::info!("Downloading {name} from {url}");
    download(url, &cached_path, progress)?;
    Ok(cached_path)
}

/// Platform-specific model cache directory.
///
/// - macOS: `~/Library/Application Support/Emotion Stream/models/`
/// - Linux: `$XDG_CACHE_HOME/Emotion Stream/models/` or `~/.cache/Emotion Stream/models/`
/// - Windows: `%LOCALAPPDATA%/Emotion Stream/models/`
pub fn model_cache_dir() -> Result<PathBuf, ModelResolveError> {
    #[cfg(target_os = "macos")]
    {
        dirs::data_dir()
            .map(|d| d.join("Emotion Stream").join("models"))
            .ok_or(ModelResolveError::NoCacheDir)
    }
    #[cfg(not(target_os = "macos"))]
    {
        dirs::cache_dir()
            .map(|d| d.join("Emotion Stream").join("models"))
            .ok_or(ModelResolveError::NoCacheDir)
    }
}

fn download(url: &str, dest: &Path, progress: Option<ProgressFn>) -> Result<(), ModelResolveError> {
    let response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| ModelResolveError::Download {
            url: url.to_string(),
            source: e,
        })?;

    let total = response.content_length().unwrap_or(0);
    let bytes = response.bytes().map_err(|e| ModelResolveError::Download {
        url: url.to_string(),
        source: e,
    })?;

    // Write to a temp file first, then rename for atomicity
    let temp_path = dest.with_extension("part");
    let write_err = |source| ModelResolveError::Write {
        path: temp_path.clone(),
        source,
    };
    let mut file = fs::File::create(&temp_path).map_err(write_err)?;

    let mut downloaded: u64 = 0;
    for chunk in bytes.chunks(1024 * 1024) {
        file.write_all(chunk).map_err(write_err)?;
        downloaded += chunk.len() as u64;
        if let Some(ref cb) = progress {
            cb(downloaded, total);
        }
    }
    file.flush().map_err(write_err)?;
    drop(file);

    fs::rename(&temp_path, dest).map_err(|e| ModelResolveError::Write {
        path: dest.to_path_buf(),
        source: e,
    })
}
