use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;
use crate::shared::overlay::Overlay;

pub const OVERLAY_COLOR: [u8; 3] = [255, 1, 1];

/// Baseline offsets of the three overlay lines below the box top.
pub const LINE_OFFSETS: [i32; 3] = [25, 45, 65];

pub const BAR_MAX_WIDTH: i32 = 100;
pub const BAR_HEIGHT: i32 = 12;
const BAR_GAP: i32 = 4;

/// Draws a one-pixel rectangle outline. Parts outside the frame are clipped.
pub fn draw_rectangle(frame: &mut Frame, bbox: &BoundingBox, color: [u8; 3]) {
    for x in bbox.left..=bbox.right {
        frame.put_pixel(x, bbox.top, color);
        frame.put_pixel(x, bbox.bottom, color);
    }
    for y in bbox.top..=bbox.bottom {
        frame.put_pixel(bbox.left, y, color);
        frame.put_pixel(bbox.right, y, color);
    }
}

fn fill_rect(frame: &mut Frame, left: i32, top: i32, width: i32, height: i32, color: [u8; 3]) {
    for y in top..top + height {
        for x in left..left + width {
            frame.put_pixel(x, y, color);
        }
    }
}

/// Paints the face box plus one bar per overlay line.
///
/// Bars start just right of the box and sit on the line baselines; their
/// length is proportional to the line percentage.
pub fn draw_overlay(frame: &mut Frame, overlay: &Overlay) {
    draw_rectangle(frame, &overlay.bbox, OVERLAY_COLOR);

    let left = overlay.bbox.right + BAR_GAP;
    for (line, offset) in overlay.lines.iter().zip(LINE_OFFSETS) {
        let fraction = (line.percentage / 100.0).clamp(0.0, 1.0);
        let width = (fraction * BAR_MAX_WIDTH as f64).round() as i32;
        let top = overlay.bbox.top + offset - BAR_HEIGHT;
        fill_rect(frame, left, top, width, BAR_HEIGHT, OVERLAY_COLOR);
    }
}
