use std::fmt;

use crate::classification::domain::emotion::Emotion;
use crate::shared::bounding_box::BoundingBox;

/// One rendered line of a face overlay, e.g. `happy: 55.6%`.
#[derive(Clone, Debug, PartialEq)]
pub struct OverlayLine {
    pub emotion: Emotion,
    /// Relative-contrast percentage in `[0, 100]`.
    pub percentage: f64,
}

impl fmt::Display for OverlayLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:.1}%", self.emotion, self.percentage)
    }
}

/// Everything the display surface needs to annotate one detected face.
#[derive(Clone, Debug, PartialEq)]
pub struct Overlay {
    pub slot: usize,
    pub bbox: BoundingBox,
    pub lines: Vec<OverlayLine>,
}
