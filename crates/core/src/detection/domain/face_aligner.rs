use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

use super::face_landmarks::FaceLandmarks;

/// Default margin added around the face box before cropping.
pub const DEFAULT_PADDING: f64 = 0.25;

/// Cuts an upright, square face chip out of a frame.
///
/// The chip is centred on the landmark centroid (box centre without
/// landmarks), sized from the box plus padding, and rotated so the eye
/// line is horizontal. Samples falling outside the frame are black.
#[derive(Clone, Debug)]
pub struct FaceAligner {
    output_size: u32,
    padding: f64,
}

impl FaceAligner {
    pub fn new(output_size: u32, padding: f64) -> Self {
        Self {
            output_size: output_size.max(1),
            padding: padding.max(0.0),
        }
    }

    pub fn output_size(&self) -> u32 {
        self.output_size
    }

    pub fn align(
        &self,
        frame: &Frame,
        bbox: &BoundingBox,
        landmarks: Option<&FaceLandmarks>,
    ) -> Frame {
        let (cx, cy) = landmarks
            .and_then(FaceLandmarks::center)
            .unwrap_or_else(|| bbox.center());
        let side = (bbox.width().max(bbox.height()).max(1) as f64) * (1.0 + self.padding);
        let angle = landmarks.and_then(FaceLandmarks::roll).unwrap_or(0.0);
        self.sample(frame, (cx, cy), side, angle)
    }

    fn sample(&self, frame: &Frame, center: (f64, f64), side: f64, angle: f64) -> Frame {
        let size = self.output_size as usize;
        let src = frame.as_ndarray();
        let src_w = frame.width() as i64;
        let src_h = frame.height() as i64;
        let channels = (frame.channels() as usize).min(3);
        let (sin, cos) = angle.sin_cos();
        let scale = side / size as f64;

        let mut out = Frame::blank(self.output_size, self.output_size, frame.index());
        let mut dst = out.as_ndarray_mut();
        for oy in 0..size {
            let dy = (oy as f64 + 0.5 - size as f64 / 2.0) * scale;
            for ox in 0..size {
                let dx = (ox as f64 + 0.5 - size as f64 / 2.0) * scale;
                // Output x-axis follows the eye line in the source frame.
                let sx = (center.0 + dx * cos - dy * sin).floor() as i64;
                let sy = (center.1 + dx * sin + dy * cos).floor() as i64;
                if sx < 0 || sy < 0 || sx >= src_w || sy >= src_h {
                    continue;
                }
                for c in 0..channels {
                    dst[[oy, ox, c]] = src[[sy as usize, sx as usize, c]];
                }
            }
        }
        out
    }
}

impl Default for FaceAligner {
    fn default() -> Self {
        Self::new(crate::shared::constants::DEFAULT_CROP_SIZE, DEFAULT_PADDING)
    }
}
