use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::detection::infrastructure::onnx_yolo_locator::DEFAULT_CONFIDENCE;
use crate::pipeline::admission_controller::ConcurrencyLimit;
use crate::pipeline::stream_error::StreamError;
use crate::shared::constants::{
    DEFAULT_CROP_SIZE, DEFAULT_DISPLAY_HEIGHT, DEFAULT_DISPLAY_WIDTH, DEFAULT_KEY_POLL_MS,
    DEFAULT_MAX_CONCURRENT, DEFAULT_MAX_FACES, DEFAULT_SOURCE,
};

/// Runtime settings for a streaming session, loadable from JSON.
///
/// Missing fields take their defaults, so a file may set only what it
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Camera device, video file, image file or stream URL.
    pub source: String,
    pub classifier_model: Option<PathBuf>,
    /// Resolved from the model cache (downloading if needed) when unset.
    pub locator_model: Option<PathBuf>,
    /// Zero means unbounded; the default is one per face slot.
    pub max_concurrent: usize,
    pub max_faces: usize,
    /// Zero in either dimension keeps the source resolution.
    pub display_width: u32,
    pub display_height: u32,
    pub confidence: f64,
    pub crop_size: u32,
    pub key_poll_ms: u64,
    /// Annotated output video; frames are only logged when unset.
    pub record: Option<PathBuf>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            source: DEFAULT_SOURCE.to_string(),
            classifier_model: None,
            locator_model: None,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            max_faces: DEFAULT_MAX_FACES,
            display_width: DEFAULT_DISPLAY_WIDTH,
            display_height: DEFAULT_DISPLAY_HEIGHT,
            confidence: DEFAULT_CONFIDENCE,
            crop_size: DEFAULT_CROP_SIZE,
            key_poll_ms: DEFAULT_KEY_POLL_MS,
            record: None,
        }
    }
}

impl StreamConfig {
    pub fn load(path: &Path) -> Result<Self, StreamError> {
        let json = fs::read_to_string(path).map_err(|e| {
            StreamError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&json).map_err(|e| {
            StreamError::Configuration(format!("invalid config {}: {e}", path.display()))
        })
    }

    /// Checks everything that can be known before any model is loaded.
    pub fn validate(&self) -> Result<(), StreamError> {
        let fail = |msg: String| Err(StreamError::Configuration(msg));

        if self.source.trim().is_empty() {
            return fail("source must not be empty".into());
        }
        if self.max_faces == 0 {
            return fail("max_faces must be at least 1".into());
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return fail(format!(
                "confidence must be between 0 and 1, got {}",
                self.confidence
            ));
        }
        if self.crop_size == 0 {
            return fail("crop_size must be at least 1".into());
        }
        match &self.classifier_model {
            None => return fail("classifier_model is required".into()),
            Some(path) if !path.is_file() => {
                return fail(format!("classifier model not found: {}", path.display()));
            }
            Some(_) => {}
        }
        if let Some(path) = self.locator_model.as_ref().filter(|p| !p.is_file()) {
            return fail(format!("locator model not found: {}", path.display()));
        }
        Ok(())
    }

    pub fn concurrency_limit(&self) -> ConcurrencyLimit {
        ConcurrencyLimit::from_max(self.max_concurrent)
    }

    pub fn display_size(&self) -> Option<(u32, u32)> {
        (self.display_width > 0 && self.display_height > 0)
            .then_some((self.display_width, self.display_height))
    }

    pub fn key_poll_timeout(&self) -> Duration {
        Duration::from_millis(self.key_poll_ms)
    }

    /// One inference session per worker that can run at once, capped by
    /// the number of face slots.
    pub fn classifier_sessions(&self) -> usize {
        self.concurrency_limit()
            .max()
            .map_or(self.max_faces, |max| max.min(self.max_faces))
            .max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn valid_config(dir: &Path) -> StreamConfig {
        let model = dir.join("emotion.onnx");
        fs::write(&model, b"onnx").unwrap();
        StreamConfig {
            classifier_model: Some(model),
            ..StreamConfig::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = StreamConfig::default();
        assert_eq!(config.source, "/dev/video0");
        assert_eq!(config.max_faces, 5);
        assert_eq!(config.concurrency_limit(), ConcurrencyLimit::from_max(5));
        assert_eq!(config.classifier_sessions(), 5);
        assert_eq!(config.display_size(), Some((1024, 574)));
        assert_eq!(config.key_poll_timeout(), Duration::from_millis(20));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream.json");
        fs::write(&path, r#"{ "max_concurrent": 2, "source": "clip.mp4" }"#).unwrap();

        let config = StreamConfig::load(&path).unwrap();
        assert_eq!(config.max_concurrent, 2);
        assert_eq!(config.source, "clip.mp4");
        assert_eq!(config.max_faces, DEFAULT_MAX_FACES);
    }

    #[test]
    fn test_load_rejects_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream.json");
        fs::write(&path, "{ nope").unwrap();
        assert!(matches!(
            StreamConfig::load(&path),
            Err(StreamError::Configuration(_))
        ));
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(StreamConfig::load(Path::new("/nonexistent/stream.json")).is_err());
    }

    #[test]
    fn test_valid_config_passes() {
        let dir = tempfile::tempdir().unwrap();
        assert!(valid_config(dir.path()).validate().is_ok());
    }

    #[rstest]
    #[case::no_faces(|c: &mut StreamConfig| c.max_faces = 0)]
    #[case::confidence_high(|c: &mut StreamConfig| c.confidence = 1.5)]
    #[case::confidence_nan(|c: &mut StreamConfig| c.confidence = f64::NAN)]
    #[case::zero_crop(|c: &mut StreamConfig| c.crop_size = 0)]
    #[case::empty_source(|c: &mut StreamConfig| c.source = " ".into())]
    #[case::no_classifier(|c: &mut StreamConfig| c.classifier_model = None)]
    #[case::missing_classifier(|c: &mut StreamConfig| c.classifier_model = Some("/nonexistent.onnx".into()))]
    #[case::missing_locator(|c: &mut StreamConfig| c.locator_model = Some("/nonexistent.onnx".into()))]
    fn test_validate_rejects(#[case] mutate: fn(&mut StreamConfig)) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = valid_config(dir.path());
        mutate(&mut config);
        assert!(matches!(
            config.validate(),
            Err(StreamError::Configuration(_))
        ));
    }

    #[rstest]
    #[case(0, 5, 5)]
    #[case(2, 5, 2)]
    #[case(9, 3, 3)]
    fn test_classifier_sessions(
        #[case] max_concurrent: usize,
        #[case] max_faces: usize,
        #[case] expected: usize,
    ) {
        let config = StreamConfig {
            max_concurrent,
            max_faces,
            ..StreamConfig::default()
        };
        assert_eq!(config.classifier_sessions(), expected);
    }

    #[test]
    fn test_zero_display_keeps_source_size() {
        let config = StreamConfig {
            display_width: 0,
            ..StreamConfig::default()
        };
        assert_eq!(config.display_size(), None);
    }
}
