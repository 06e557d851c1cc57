pub mod emotion;
pub mod emotion_classifier;
pub mod ranked_result;
