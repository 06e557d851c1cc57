//! 5-point face landmarks used to align face crops before classification.
//!
//! Weights emphasize nose (3x) over eyes (2x) and mouth (1x) for stable
//! centering, since nose position is the most reliable anchor across head
//! rotations.

const LEFT_EYE: usize = 0;
const RIGHT_EYE: usize = 1;
#[cfg(test)]
const NOSE: usize = 2;

/// Landmark weights: [left_eye, right_eye, nose, left_mouth, right_mouth].
const WEIGHTS: [f64; 5] = [2.0, 2.0, 3.0, 1.0, 1.0];

#[derive(Clone, Debug, PartialEq)]
pub struct FaceLandmarks {
    /// Points with x <= 0 are treated as invisible.
    points: [(f64, f64); 5],
}

impl FaceLandmarks {
    pub fn new(points: [(f64, f64); 5]) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[(f64, f64); 5] {
        &self.points
    }

    pub fn has_visible(&self) -> bool {
        self.points.iter().any(|(x, _)| *x > 0.0)
    }

    /// Weighted centroid of visible landmarks, `None` when none are visible.
    pub fn center(&self) -> Option<(f64, f64)> {
        let mut wx_sum = 0.0;
        let mut wy_sum = 0.0;
        let mut w_sum = 0.0;

        for (i, (x, y)) in self.points.iter().enumerate() {
            if *x > 0.0 {
                let w = WEIGHTS[i];
                wx_sum += x * w;
                wy_sum += y * w;
                w_sum += w;
            }
        }

        if w_sum == 0.0 {
            return None;
        }
        Some((wx_sum / w_sum, wy_sum / w_sum))
    }

    /// In-plane head tilt in radians: the angle of the eye line against the
    /// horizontal, positive when the right-hand eye sits lower in the image.
    ///
    /// Eyes are ordered by x so a mirrored landmark layout yields the same
    /// angle. `None` unless both eyes are visible and apart.
    pub fn roll(&self) -> Option<f64> {
        let a = self.points[LEFT_EYE];
        let b = self.points[RIGHT_EYE];
        if a.0 <= 0.0 || b.0 <= 0.0 {
            return None;
        }
        let (left, right) = if a.0 <= b.0 { (a, b) } else { (b, a) };
        let dx = right.0 - left.0;
        let dy = right.1 - left.1;
        if dx == 0.0 && dy == 0.0 {
            return None;
        }
        Some(dy.atan2(dx))
    }
}
