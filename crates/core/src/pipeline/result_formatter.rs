use crate::classification::domain::ranked_result::RankedResult;
use crate::pipeline::slot_table::SlotTable;
use crate::shared::bounding_box::BoundingBox;
use crate::shared::overlay::{Overlay, OverlayLine};

/// Number of categories shown per face.
pub const TOP_LINES: usize = 3;

/// Converts the top categories into relative-contrast percentages.
///
/// The lowest score across the whole result is subtracted from each of
/// the top scores before they are normalised to sum to 100. When the top
/// scores carry no contrast every line reads 0%.
pub fn format_result(result: &RankedResult) -> Vec<OverlayLine> {
    let baseline = f64::from(result.baseline());
    let top = result.top(TOP_LINES);
    let values: Vec<f64> = top.iter().map(|(_, s)| f64::from(*s) - baseline).collect();
    let sum: f64 = values.iter().sum();

    top.iter()
        .zip(values)
        .map(|(&(emotion, _), value)| OverlayLine {
            emotion,
            percentage: if sum > 0.0 { value / sum * 100.0 } else { 0.0 },
        })
        .collect()
}

/// Builds one overlay per face box whose slot already has a result.
/// Boxes past the table's capacity and slots without a result are
/// skipped. Reads never wait on running workers.
pub fn build_overlays(boxes: &[BoundingBox], table: &SlotTable) -> Vec<Overlay> {
    boxes
        .iter()
        .take(table.capacity())
        .enumerate()
        .filter_map(|(slot, bbox)| {
            table.last_result(slot).map(|result| Overlay {
                slot,
                bbox: *bbox,
                lines: format_result(&result),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::domain::emotion::Emotion;
    use approx::assert_relative_eq;

    fn face_box(x: i32) -> BoundingBox {
        BoundingBox::new(x, 0, x + 10, 10)
    }

    #[test]
    fn test_relative_contrast_percentages() {
        let result = RankedResult::from_scores(&[5.0, 3.0, 1.0, 0.0]).unwrap();
        let lines = format_result(&result);

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].emotion, Emotion::Neutral);
        assert_relative_eq!(lines[0].percentage, 55.555, epsilon = 0.01);
        assert_relative_eq!(lines[1].percentage, 33.333, epsilon = 0.01);
        assert_relative_eq!(lines[2].percentage, 11.111, epsilon = 0.01);
        assert_eq!(lines[0].to_string(), "neutral: 55.6%");
    }

    #[test]
    fn test_baseline_comes_from_full_result() {
        let result = RankedResult::from_scores(&[-1.0, 4.0, 2.0, 3.0, -6.0]).unwrap();
        let lines = format_result(&result);
        // Top three minus a baseline of -6: 10, 9, 8.
        assert_relative_eq!(lines[0].percentage, 10.0 / 27.0 * 100.0, epsilon = 1e-6);
        assert_relative_eq!(lines[2].percentage, 8.0 / 27.0 * 100.0, epsilon = 1e-6);
        let total: f64 = lines.iter().map(|l| l.percentage).sum();
        assert_relative_eq!(total, 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_exactly_three_entries_bottom_reads_zero() {
        let result = RankedResult::from_scores(&[2.0, 1.0, 0.5]).unwrap();
        let lines = format_result(&result);
        assert_relative_eq!(lines[2].percentage, 0.0);
        assert_relative_eq!(lines[0].percentage, 1.5 / 2.0 * 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_flat_scores_read_zero() {
        let result = RankedResult::from_scores(&[1.0, 1.0, 1.0, 1.0]).unwrap();
        assert!(format_result(&result).iter().all(|l| l.percentage == 0.0));
    }

    #[test]
    fn test_overlays_only_for_slots_with_results() {
        let table = SlotTable::new(2);
        table.begin_dispatch(1);
        table.complete_dispatch(1, Some(RankedResult::from_scores(&[0.0, 2.0, 1.0]).unwrap()));

        let overlays = build_overlays(&[face_box(0), face_box(20), face_box(40)], &table);
        assert_eq!(overlays.len(), 1);
        assert_eq!(overlays[0].slot, 1);
        assert_eq!(overlays[0].bbox, BoundingBox::new(20, 0, 30, 10));
        assert_eq!(overlays[0].lines[0].emotion, Emotion::Happy);
    }

    #[test]
    fn test_no_detections_no_overlays() {
        let table = SlotTable::new(2);
        assert!(build_overlays(&[], &table).is_empty());
    }
}
