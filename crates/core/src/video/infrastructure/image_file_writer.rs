use std::path::Path;

use crate::shared::frame::Frame;
use crate::video::domain::image_writer::ImageWriter;

/// Saves frames and face crops with the `image` crate.
#[derive(Default)]
pub struct ImageFileWriter;

impl ImageFileWriter {
    pub fn new() -> Self {
        Self
    }
}

impl ImageWriter for ImageFileWriter {
    fn write(
        &self,
        path: &Path,
        frame: &Frame,
        size: Option<(u32, u32)>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let img = image::RgbImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
            .ok_or("Frame is not a packed RGB buffer")?;
        let img = match size {
            Some((w, h)) if (w, h) != (img.width(), img.height()) => {
                image::imageops::resize(&img, w, h, image::imageops::FilterType::Triangle)
            }
            _ => img,
        };

        img.save(path)?;
        log::debug!("Saved {}x{} image to {}", img.width(), img.height(), path.display());
        Ok(())
    }
}
