use std::path::{Path, PathBuf};

use crate::shared::frame::Frame;
use crate::video::domain::frame_source::FrameSource;

/// Presents a still image as a one-frame source.
pub struct ImageFileSource {
    path: PathBuf,
    frame: Option<Frame>,
}

impl ImageFileSource {
    /// Decodes the image eagerly so a bad file fails at open time.
    pub fn open(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let img = image::open(path)
            .map_err(|e| format!("Cannot read image {}: {e}", path.display()))?
            .to_rgb8();
        let (width, height) = img.dimensions();
        log::info!("Opened image {}: {width}x{height}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            frame: Some(Frame::new(img.into_raw(), width, height, 3, 0)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameSource for ImageFileSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        Ok(self.frame.take())
    }

    fn close(&mut self) {
        self.frame = None;
    }
}

/// True when `path` carries one of the still-image extensions.
pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            crate::shared::constants::IMAGE_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(e))
        })
        .unwrap_or(false)
}
