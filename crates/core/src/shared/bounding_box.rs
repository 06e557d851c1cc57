/// Axis-aligned face box in frame pixel coordinates.
///
/// `(left, top)` is inclusive, `(right, bottom)` exclusive, so
/// `width = right - left`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl BoundingBox {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Rounds a floating-point `(x1, y1, x2, y2)` box to pixel coordinates.
    pub fn from_xyxy(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self::new(
            x1.round() as i32,
            y1.round() as i32,
            x2.round() as i32,
            y2.round() as i32,
        )
    }

    pub fn width(&self) -> i32 {
        (self.right - self.left).max(0)
    }

    pub fn height(&self) -> i32 {
        (self.bottom - self.top).max(0)
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.left + self.right) as f64 / 2.0,
            (self.top + self.bottom) as f64 / 2.0,
        )
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Intersects the box with a `frame_w` x `frame_h` frame.
    pub fn clamp_to(&self, frame_w: u32, frame_h: u32) -> Self {
        let fw = frame_w as i32;
        let fh = frame_h as i32;
        let left = self.left.clamp(0, fw);
        let top = self.top.clamp(0, fh);
        Self {
            left,
            top,
            right: self.right.clamp(left, fw),
            bottom: self.bottom.clamp(top, fh),
        }
    }

    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let ix1 = self.left.max(other.left);
        let iy1 = self.top.max(other.top);
        let ix2 = self.right.min(other.right);
        let iy2 = self.bottom.min(other.bottom);

        let inter = (ix2 - ix1).max(0) as f64 * (iy2 - iy1).max(0) as f64;
        if inter == 0.0 {
            return 0.0;
        }

        let area_a = self.width() as f64 * self.height() as f64;
        let area_b = other.width() as f64 * other.height() as f64;
        inter / (area_a + area_b - inter)
    }
}
