//! Emotion classifier backed by a pool of ONNX Runtime sessions.
//!
//! `Session::run` needs exclusive access, so each concurrently running
//! worker checks out its own session; with fewer sessions than workers the
//! surplus waits on the least recently handed-out one.
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

use ort::session::Session;

use crate::classification::domain::emotion_classifier::EmotionClassifier;
use crate::classification::domain::ranked_result::RankedResult;
use crate::shared::constants::DEFAULT_CROP_SIZE;
use crate::shared::frame::Frame;
use crate::shared::onnx_session::{self, LoadMode, ModelLoadError};

pub struct OnnxEmotionClassifier {
    sessions: Vec<Mutex<Session>>,
    next: AtomicUsize,
    input_size: u32,
}

impl OnnxEmotionClassifier {
    /// Loads `pool_size` sessions of the model at `model_path`.
    ///
    /// Every session after the first reuses the load mode that worked for
    /// the first, so a model that only loads in compatibility mode does not
    /// pay for a failed native attempt per session.
    pub fn new(model_path: &Path, pool_size: usize) -> Result<Self, ModelLoadError> {
        let pool_size = pool_size.max(1);
        let intra_threads = intra_threads_per_session(pool_size);

        let (first, mode) = onnx_session::load_session(model_path, intra_threads)?;
        log::info!(
            "Loaded emotion model {} ({mode:?} mode, {pool_size} session(s))",
            model_path.display()
        );
        let input_size = onnx_session::static_input_size(&first).unwrap_or(DEFAULT_CROP_SIZE);

        let mut sessions = vec![Mutex::new(first)];
        for _ in 1..pool_size {
            let (session, _) = match mode {
                LoadMode::Native => onnx_session::load_session(model_path, intra_threads)?,
                LoadMode::Compatibility => {
                    onnx_session::load_compatibility_session(model_path, intra_threads)?
                }
            };
            sessions.push(Mutex::new(session));
        }

        Ok(Self {
            sessions,
            next: AtomicUsize::new(0),
            input_size,
        })
    }

    pub fn input_size(&self) -> u32 {
        self.input_size
    }

    /// A worker that panicked mid-inference poisons its session's lock; the
    /// session itself holds no partial state, so poisoned locks are reclaimed.
    fn checkout(&self) -> MutexGuard<'_, Session> {
        let n = self.sessions.len();
        let start = self.next.fetch_add(1, Ordering::Relaxed) % n;
        for offset in 0..n {
            match self.sessions[(start + offset) % n].try_lock() {
                Ok(guard) => return guard,
                Err(TryLockError::Poisoned(e)) => return e.into_inner(),
                Err(TryLockError::WouldBlock) => continue,
            }
        }
        self.sessions[start]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl EmotionClassifier for OnnxEmotionClassifier {
    fn classify(&self, crop: &Frame) -> Result<RankedResult, Box<dyn std::error::Error>> {
        let tensor = preprocess(crop, self.input_size);
        let input_value = ort::value::Tensor::from_array(tensor)?;

        let mut session = self.checkout();
        let outputs = session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("Emotion model produced no outputs".into());
        }
        let scores = outputs[0].try_extract_array::<f32>()?;
        let scores = scores.as_slice().ok_or("Cannot get score slice")?;

        Ok(RankedResult::from_scores(scores)?)
    }
}

fn intra_threads_per_session(pool_size: usize) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (cores / pool_size).max(1)
}

/// Nearest-neighbour resize to `size` x `size`, NCHW float32 in raw 0..255.
///
/// The model was trained on unnormalized pixel values.
fn preprocess(crop: &Frame, size: u32) -> ndarray::Array4<f32> {
    let size = size as usize;
    let src_w = crop.width() as usize;
    let src_h = crop.height() as usize;
    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, size, size));
    if src_w == 0 || src_h == 0 {
        return tensor;
    }

    let src = crop.as_ndarray();
    let channels = (crop.channels() as usize).min(3);
    for y in 0..size {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / size as f64) as usize).min(src_h - 1);
        for x in 0..size {
            let src_x = (((x as f64 + 0.5) * src_w as f64 / size as f64) as usize).min(src_w - 1);
            for c in 0..channels {
                tensor[[0, c, y, x]] = src[[src_y, src_x, c]] as f32;
            }
        }
    }
    tensor
}
