use thiserror::Error;

use super::emotion::Emotion;

/// Minimum number of categories a classifier must score.
pub const MIN_RANKED_ENTRIES: usize = 3;

#[derive(Error, Debug, PartialEq)]
pub enum RankedResultError {
    #[error("classifier produced {0} scores, need at least {MIN_RANKED_ENTRIES}")]
    TooFewEntries(usize),
    #[error("classifier produced a non-finite score")]
    NonFinite,
}

/// Emotion scores ordered by descending raw model output.
///
/// Scores are left unnormalized; display-time formatting turns them into
/// relative percentages.
#[derive(Clone, Debug, PartialEq)]
pub struct RankedResult {
    entries: Vec<(Emotion, f32)>,
}

impl RankedResult {
    /// Ranks raw per-class scores, where `scores[i]` belongs to category `i`.
    pub fn from_scores(scores: &[f32]) -> Result<Self, RankedResultError> {
        if scores.len() < MIN_RANKED_ENTRIES {
            return Err(RankedResultError::TooFewEntries(scores.len()));
        }
        if scores.iter().any(|s| !s.is_finite()) {
            return Err(RankedResultError::NonFinite);
        }

        let mut entries: Vec<(Emotion, f32)> = scores
            .iter()
            .enumerate()
            .map(|(i, &s)| (Emotion::from_index(i), s))
            .collect();
        // Stable sort keeps index order among ties.
        entries.sort_by(|a, b| b.1.total_cmp(&a.1));
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[(Emotion, f32)] {
        &self.entries
    }

    pub fn top(&self, n: usize) -> &[(Emotion, f32)] {
        &self.entries[..n.min(self.entries.len())]
    }

    pub fn best(&self) -> (Emotion, f32) {
        self.entries[0]
    }

    /// Lowest score across every ranked category.
    pub fn baseline(&self) -> f32 {
        self.entries[self.entries.len() - 1].1
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_from_scores_sorts_descending() {
        let result = RankedResult::from_scores(&[0.1, 2.0, -1.0, 0.5]).unwrap();
        let order: Vec<Emotion> = result.entries().iter().map(|(e, _)| *e).collect();
        assert_eq!(
            order,
            vec![Emotion::Happy, Emotion::Surprise, Emotion::Neutral, Emotion::Sad]
        );
        assert_eq!(result.best(), (Emotion::Happy, 2.0));
        assert_relative_eq!(result.baseline(), -1.0);
    }

    #[test]
    fn test_ties_keep_category_order() {
        let result = RankedResult::from_scores(&[1.0, 1.0, 1.0]).unwrap();
        assert_eq!(result.entries()[0].0, Emotion::Neutral);
        assert_eq!(result.entries()[2].0, Emotion::Sad);
    }

    #[test]
    fn test_too_few_scores_rejected() {
        assert_eq!(
            RankedResult::from_scores(&[1.0, 2.0]),
            Err(RankedResultError::TooFewEntries(2))
        );
    }

    #[test]
    fn test_nan_rejected() {
        assert_eq!(
            RankedResult::from_scores(&[1.0, f32::NAN, 0.0]),
            Err(RankedResultError::NonFinite)
        );
    }

    #[test]
    fn test_top_is_clamped_to_len() {
        let result = RankedResult::from_scores(&[3.0, 2.0, 1.0]).unwrap();
        assert_eq!(result.top(3).len(), 3);
        assert_eq!(result.top(10).len(), 3);
        assert_eq!(result.len(), 3);
    }
}
