use std::path::Path;

use crate::shared::frame::Frame;

/// Saves a single frame or face crop as an image file.
pub trait ImageWriter: Send {
    /// Writes `frame` to `path`, optionally resizing to `size`.
    fn write(
        &self,
        path: &Path,
        frame: &Frame,
        size: Option<(u32, u32)>,
    ) -> Result<(), Box<dyn std::error::Error>>;
}
