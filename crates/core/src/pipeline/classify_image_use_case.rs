use std::path::PathBuf;
use std::sync::Arc;

use crate::classification::domain::emotion_classifier::EmotionClassifier;
use crate::classification::domain::ranked_result::RankedResult;
use crate::detection::domain::face_locator::FaceLocator;
use crate::pipeline::result_formatter::format_result;
use crate::pipeline::stream_error::StreamError;
use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;
use crate::shared::overlay::OverlayLine;
use crate::video::domain::frame_source::FrameSource;
use crate::video::domain::image_writer::ImageWriter;

/// Outcome of classifying one still.
#[derive(Clone, Debug, PartialEq)]
pub struct SingleShotResult {
    /// Faces found in the frame; only the first is classified.
    pub faces: usize,
    pub bbox: BoundingBox,
    pub result: RankedResult,
    pub lines: Vec<OverlayLine>,
}

/// Grabs one frame, classifies its first face synchronously and optionally
/// saves the aligned crop.
///
/// Cameras need a few frames for exposure to settle, so `warmup_frames`
/// frames are read and discarded first.
pub struct ClassifyImageUseCase {
    source: Box<dyn FrameSource>,
    locator: Box<dyn FaceLocator>,
    classifier: Arc<dyn EmotionClassifier>,
    crop_output: Option<(Box<dyn ImageWriter>, PathBuf)>,
    warmup_frames: usize,
}

impl ClassifyImageUseCase {
    pub fn new(
        source: Box<dyn FrameSource>,
        locator: Box<dyn FaceLocator>,
        classifier: Arc<dyn EmotionClassifier>,
        crop_output: Option<(Box<dyn ImageWriter>, PathBuf)>,
        warmup_frames: usize,
    ) -> Self {
        Self {
            source,
            locator,
            classifier,
            crop_output,
            warmup_frames,
        }
    }

    /// Returns `None` when the frame holds no face.
    pub fn execute(&mut self) -> Result<Option<SingleShotResult>, StreamError> {
        let frame = self.capture();
        self.source.close();
        let frame = frame?;

        let mut detections = self
            .locator
            .locate(&frame)
            .map_err(|e| StreamError::Locator(e.to_string()))?;
        let faces = detections.len();
        if faces == 0 {
            log::info!("No face found in frame {}", frame.index());
            return Ok(None);
        }
        let face = detections.swap_remove(0);

        let result = self
            .classifier
            .classify(&face.crop)
            .map_err(|e| StreamError::Classifier(e.to_string()))?;
        let lines = format_result(&result);
        for line in &lines {
            log::info!("{line}");
        }

        if let Some((writer, path)) = &self.crop_output {
            match writer.write(path, &face.crop, None) {
                Ok(()) => log::info!("Saved aligned face to {}", path.display()),
                Err(e) => log::warn!("Could not save aligned face to {}: {e}", path.display()),
            }
        }

        Ok(Some(SingleShotResult {
            faces,
            bbox: face.bbox,
            result,
            lines,
        }))
    }

    /// Keeps the last frame read; a source that ends during warm-up still
    /// yields whatever it produced.
    fn capture(&mut self) -> Result<Frame, StreamError> {
        let mut last = None;
        for _ in 0..=self.warmup_frames {
            match self.source.next_frame() {
                Ok(Some(frame)) => last = Some(frame),
                Ok(None) => break,
                Err(e) => return Err(StreamError::Source(e.to_string())),
            }
        }
        last.ok_or_else(|| StreamError::Source("source produced no frame".into()))
    }
}
