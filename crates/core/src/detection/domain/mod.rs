pub mod face_aligner;
pub mod face_landmarks;
pub mod face_locator;
