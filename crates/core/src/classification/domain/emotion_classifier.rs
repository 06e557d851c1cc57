use crate::shared::frame::Frame;

use super::ranked_result::RankedResult;

/// Domain interface for scoring one aligned face crop.
///
/// Shared by every concurrently running worker, hence `&self` and `Sync`.
pub trait EmotionClassifier: Send + Sync {
    fn classify(&self, crop: &Frame) -> Result<RankedResult, Box<dyn std::error::Error>>;
}
