use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

/// One face found in the current frame.
///
/// Produced fresh every frame and discarded after render; its position in
/// the locator's output is the only link to a slot.
#[derive(Clone, Debug)]
pub struct Detection {
    pub bbox: BoundingBox,
    /// Aligned, square crop ready for the classifier.
    pub crop: Frame,
}

/// Domain interface for finding and aligning faces.
///
/// Implementations may keep per-frame scratch state, hence `&mut self`.
pub trait FaceLocator: Send {
    /// Returns faces in a stable order; may be empty.
    fn locate(&mut self, frame: &Frame) -> Result<Vec<Detection>, Box<dyn std::error::Error>>;
}
